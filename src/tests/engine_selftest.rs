use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{AudioEngine, EngineConfig, OfflineBackend, SoundSample, ToneDecoder, TrackState};

#[test]
fn engine_selftest_music_and_effects_through_mixer() {
    let sample_rate = 8_000u32;
    let burst = 80usize;
    let (backend, handle) = OfflineBackend::new(burst);
    let config = EngineConfig::default()
        .with_sample_rate(sample_rate)
        .with_cache_frames(256);
    let engine = AudioEngine::new(&backend, config).expect("open engine");

    let music = engine
        .new_music(Box::new(ToneDecoder::new(
            440.0,
            0.5,
            0.25,
            2,
            sample_rate,
        )))
        .expect("create music");
    let completions = Arc::new(AtomicUsize::new(0));
    let counter = completions.clone();
    music.on_complete(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let click: Vec<f32> = (0..40).map(|n| if n % 2 == 0 { 0.25 } else { -0.25 }).collect();
    let pool = engine.new_sound_pool(SoundSample::from_f32(&click, 1));
    assert_eq!(engine.status().active_renderables, 2);

    engine.resume();
    music.play();
    let voice = pool.play(1.0, 1.0, 0.0);
    assert_ne!(voice, 0);

    // 0.25 s of music is 2000 frames; render a little past it.
    let mut rendered = Vec::new();
    for _ in 0..30 {
        rendered.extend(handle.pull(burst));
    }

    assert_eq!(rendered.len(), 30 * burst * 2);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert_eq!(music.state(), TrackState::Stopped);
    assert_eq!(music.position(), 0.0);
    assert!(!pool.is_playing(voice));

    let energy = |frames: &[i16]| frames.iter().map(|&s| (s as f64).powi(2)).sum::<f64>();
    let head = energy(&rendered[..1_000 * 2]);
    let tail = energy(&rendered[2_000 * 2..]);
    assert!(head > 0.0, "music should be audible");
    assert_eq!(tail, 0.0, "everything should have finished");

    // Channels carry identical content at centre pan.
    for frame in rendered.chunks_exact(2) {
        assert_eq!(frame[0], frame[1]);
    }

    assert_eq!(engine.status().callbacks, 30);
}
