//! Circular sample queue used by the engine's raw PCM stream mode.
use once_cell::sync::Lazy;

/// Index-based ring of interleaved `i16` samples.
///
/// Pushing grows the backing storage when full so queued audio is never
/// dropped; popping only moves the read index.
pub struct SampleRing {
    data: Vec<i16>,
    read_index: usize,
    len: usize,
}

impl SampleRing {
    /// Create a ring able to hold `capacity` samples before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)],
            read_index: 0,
            len: 0,
        }
    }

    /// Samples ready for reading.
    pub fn available_read(&self) -> usize {
        self.len
    }

    /// Append samples, growing the ring if needed. Returns samples written.
    pub fn push(&mut self, samples: &[i16]) -> usize {
        if samples.is_empty() {
            return 0;
        }
        self.reserve(samples.len());
        let capacity = self.data.len();
        let write_index = (self.read_index + self.len) % capacity;
        let first_chunk = (capacity - write_index).min(samples.len());
        self.data[write_index..write_index + first_chunk].copy_from_slice(&samples[..first_chunk]);
        if samples.len() > first_chunk {
            let remaining = samples.len() - first_chunk;
            self.data[..remaining].copy_from_slice(&samples[first_chunk..]);
        }
        self.len += samples.len();
        samples.len()
    }

    /// Append samples produced by an iterator.
    pub fn extend<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = i16>,
    {
        let samples: Vec<i16> = samples.into_iter().collect();
        self.push(&samples);
    }

    /// Pop samples into `out`, returning samples read.
    pub fn pop(&mut self, out: &mut [i16]) -> usize {
        let to_read = out.len().min(self.len);
        if to_read == 0 {
            return 0;
        }
        let capacity = self.data.len();
        let first_chunk = (capacity - self.read_index).min(to_read);
        out[..first_chunk]
            .copy_from_slice(&self.data[self.read_index..self.read_index + first_chunk]);
        if to_read > first_chunk {
            let remaining = to_read - first_chunk;
            out[first_chunk..to_read].copy_from_slice(&self.data[..remaining]);
        }
        self.consume(to_read);
        to_read
    }

    fn consume(&mut self, samples: usize) {
        self.read_index = (self.read_index + samples) % self.data.len();
        self.len -= samples;
        if self.len == 0 {
            self.read_index = 0;
        }
    }

    fn reserve(&mut self, additional: usize) {
        let required = self.len + additional;
        if required <= self.data.len() {
            return;
        }
        let mut capacity = self.data.len();
        while capacity < required {
            capacity *= 2;
        }
        let mut data = vec![0; capacity];
        let len = self.len;
        let copied = self.pop(&mut data[..len]);
        self.data = data;
        self.read_index = 0;
        self.len = copied;
    }
}

/// Monotonic timestamp in nanoseconds since the first call in this process.
pub fn monotonic_timestamp_ns() -> u64 {
    static START: Lazy<std::time::Instant> = Lazy::new(std::time::Instant::now);
    let elapsed = START.elapsed();
    (elapsed.as_secs() * 1_000_000_000) + elapsed.subsec_nanos() as u64
}
