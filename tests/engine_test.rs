use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mixkit::{
    AudioEngine, EngineConfig, EngineError, EngineMode, OfflineBackend, PcmDecoder, SoundSample,
    StreamError,
};

const BURST: usize = 4;

fn mono_engine() -> (AudioEngine, mixkit::OfflineStream) {
    let (backend, handle) = OfflineBackend::new(BURST);
    let engine = AudioEngine::new(&backend, EngineConfig::mono()).expect("open engine");
    engine.resume();
    (engine, handle)
}

#[test]
fn queued_pcm_is_played_once_then_silence() {
    let (engine, handle) = mono_engine();
    engine.play_pcm(&[1, 2, 3, 4, 5, 6]);

    assert_eq!(handle.pull(4), vec![1, 2, 3, 4]);
    assert_eq!(handle.pull(4), vec![5, 6, 0, 0]);
    assert_eq!(handle.pull(4), vec![0, 0, 0, 0]);

    let status = engine.status();
    assert_eq!(status.mode, EngineMode::Stream);
    assert_eq!(status.queued_samples, 0);
    assert_eq!(status.callbacks, 3);
    assert_eq!(status.underruns, 2);
}

#[test]
fn master_volume_scales_raw_pcm() {
    let (engine, handle) = mono_engine();
    engine.set_volume(0.5);
    engine.play_pcm(&[i16::MAX]);
    assert_eq!(handle.pull(1), vec![16_383]);
}

#[test]
fn volume_is_clamped_and_shared_with_the_mixer() {
    let (engine, handle) = mono_engine();
    engine.set_volume(4.0);
    assert_eq!(engine.volume(), 1.0);
    engine.set_volume(-0.5);
    assert_eq!(engine.volume(), 0.0);

    engine.set_volume(0.5);
    let pool = engine.new_sound_pool(SoundSample::new(vec![20_000, 20_000], 1));
    pool.play(1.0, 1.0, 0.0);
    pool.play(1.0, 1.0, 0.0);
    // Two voices saturate before the master volume halves the sum.
    assert_eq!(handle.pull(2), vec![16_383, 16_383]);
}

#[test]
fn open_failure_is_reported() {
    let backend = OfflineBackend::refusing("device busy");
    match AudioEngine::new(&backend, EngineConfig::default()) {
        Err(EngineError::StreamOpen(StreamError::Open(reason))) => assert_eq!(reason, "device busy"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("engine should not open"),
    }
}

#[test]
fn unsupported_channel_count_is_rejected() {
    let (backend, _handle) = OfflineBackend::new(BURST);
    let result = AudioEngine::new(&backend, EngineConfig::default().with_channels(3));
    assert!(matches!(result, Err(EngineError::UnsupportedChannels(3))));
}

#[test]
fn stopped_stream_renders_nothing() {
    let (engine, handle) = mono_engine();
    engine.play_pcm(&[7, 7, 7, 7]);
    engine.stop();
    assert_eq!(handle.pull(2), vec![0, 0]);
    assert_eq!(engine.status().queued_samples, 4);

    engine.resume();
    assert_eq!(handle.pull(2), vec![7, 7]);
}

#[test]
fn switching_back_to_mix_mode_renders_renderables() {
    let (engine, handle) = mono_engine();
    engine.play_pcm(&[9; 8]);
    assert_eq!(handle.pull(2), vec![9, 9]);

    let pool = Arc::new(mixkit::SoundPool::new(SoundSample::new(vec![3, 4], 1), 1, 4));
    engine.play(pool.clone());
    pool.play(1.0, 1.0, 0.0);
    assert_eq!(engine.mode(), EngineMode::Mix);
    assert_eq!(handle.pull(3), vec![3, 4, 0]);
}

#[test]
fn completion_callback_can_start_new_music() {
    let (backend, handle) = OfflineBackend::new(BURST);
    let engine = Arc::new(
        AudioEngine::new(&backend, EngineConfig::mono().with_cache_frames(8)).expect("open engine"),
    );
    let intro = engine
        .new_music(Box::new(PcmDecoder::new(vec![1, 2], 1, 44_100)))
        .expect("create intro");

    let weak = Arc::downgrade(&engine);
    intro.on_complete(move || {
        if let Some(engine) = weak.upgrade() {
            let next = engine
                .new_music(Box::new(PcmDecoder::new(vec![5, 6], 1, 44_100)))
                .expect("create follow-up");
            next.play();
        }
    });

    engine.resume();
    intro.play();

    let (tx, rx) = crossbeam_channel::bounded(1);
    let renderer = thread::spawn(move || {
        let first = handle.pull(4);
        let second = handle.pull(4);
        let _ = tx.send((first, second));
    });
    let (first, second) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("render callback did not return");
    renderer.join().expect("render thread panicked");

    assert_eq!(first, vec![1, 2, 0, 0]);
    assert_eq!(second, vec![5, 6, 0, 0]);
    assert_eq!(engine.status().active_renderables, 2);
}
