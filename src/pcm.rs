//! Signed 16-bit sample arithmetic shared by every render path.

/// Additively mix `value` into `dst`, saturating at the i16 range.
///
/// Float-to-int casts truncate towards zero, so `32767 * 0.5` lands on 16383.
#[inline]
pub fn mix_into(dst: &mut i16, value: f32) {
    *dst = saturate(*dst as f32 + value);
}

/// Convert a float sample already in i16 scale, clamping out-of-range values.
#[inline]
pub fn saturate(value: f32) -> i16 {
    value.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Scale `samples` in place by `gain`.
pub fn apply_gain(samples: &mut [i16], gain: f32) {
    if gain == 1.0 {
        return;
    }
    for sample in samples {
        *sample = saturate(*sample as f32 * gain);
    }
}

/// Convert a normalised float sample (`-1.0..=1.0`) to i16.
#[inline]
pub fn float_to_i16(sample: f32) -> i16 {
    saturate(sample * i16::MAX as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixing_saturates_instead_of_wrapping() {
        let mut sample = 30_000i16;
        mix_into(&mut sample, 10_000.0);
        assert_eq!(sample, i16::MAX);

        let mut sample = -30_000i16;
        mix_into(&mut sample, -10_000.0);
        assert_eq!(sample, i16::MIN);
    }

    #[test]
    fn unit_gain_is_identity() {
        let mut samples = [i16::MIN, -1, 0, 1, 12_345, i16::MAX];
        let original = samples;
        apply_gain(&mut samples, 1.0);
        assert_eq!(samples, original);
    }

    #[test]
    fn half_gain_truncates() {
        let mut samples = [i16::MAX, -3];
        apply_gain(&mut samples, 0.5);
        assert_eq!(samples, [16_383, -1]);
    }

    #[test]
    fn float_conversion_clamps() {
        assert_eq!(float_to_i16(1.0), i16::MAX);
        assert_eq!(float_to_i16(4.0), i16::MAX);
        assert_eq!(float_to_i16(-4.0), i16::MIN);
        assert_eq!(float_to_i16(0.0), 0);
    }
}
