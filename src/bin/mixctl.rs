use std::env;
use std::process;

use mixkit::{
    AudioEngine, EngineConfig, EngineStatus, OfflineBackend, SoundSample, ToneDecoder, TrackState,
};

const BURST_FRAMES: usize = 192;

fn print_status(status: &EngineStatus) {
    println!("Sample Rate : {} Hz", status.sample_rate);
    println!("Channels    : {}", status.channels);
    println!("Burst       : {} frames", status.burst_frames);
    println!("Buffer Size : {} frames", status.buffer_frames);
    println!("Latency     : {:.2} ms", status.latency_ms);
    println!("Mode        : {:?}", status.mode);
    println!("Volume      : {:.2}", status.volume);
    println!("Renderables : {}", status.active_renderables);
    println!("Queued PCM  : {} samples", status.queued_samples);
    println!("Callbacks   : {}", status.callbacks);
    println!("Underruns   : {}", status.underruns);
}

fn peak(samples: &[i16]) -> f32 {
    samples
        .iter()
        .map(|&s| (s as f32 / i16::MAX as f32).abs())
        .fold(0.0, f32::max)
}

fn run(seconds: f32, show_status: bool) -> Result<(), mixkit::EngineError> {
    let config = EngineConfig::default();
    let (backend, stream) = OfflineBackend::new(BURST_FRAMES);
    let engine = AudioEngine::new(&backend, config.clone())?;

    let music = engine.new_music(Box::new(ToneDecoder::new(
        220.0,
        0.4,
        seconds,
        config.channels as usize,
        config.sample_rate,
    )))?;
    music.on_complete(|| println!("music finished"));

    let blip: Vec<f32> = (0..config.sample_rate / 20)
        .map(|n| {
            let t = n as f32 / config.sample_rate as f32;
            (t * 880.0 * std::f32::consts::TAU).sin() * 0.3
        })
        .collect();
    let effects = engine.new_sound_pool(SoundSample::from_f32(&blip, 1));

    engine.resume();
    music.play();

    let total_frames = (seconds.max(0.0) * config.sample_rate as f32) as usize;
    let bursts = total_frames.div_ceil(BURST_FRAMES) + 1;
    let mut loudest = 0.0f32;
    for burst in 0..bursts {
        if burst % 50 == 0 {
            let pan = if (burst / 50) % 2 == 0 { -0.8 } else { 0.8 };
            effects.play(0.8, 1.0, pan);
        }
        loudest = loudest.max(peak(&stream.pull(BURST_FRAMES)));
        if music.state() == TrackState::Stopped && effects.active_voices() == 0 {
            break;
        }
    }

    println!("rendered {seconds:.2}s, peak {loudest:.2}");
    if show_status {
        print_status(&engine.status());
    }
    Ok(())
}

fn main() {
    mixkit::init_tracing();

    let mut seconds = 2.0f32;
    let mut show_status = false;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--status" | "-s" => show_status = true,
            "--seconds" => match args.next().and_then(|value| value.parse().ok()) {
                Some(value) => seconds = value,
                None => {
                    eprintln!("mixctl: --seconds expects a number");
                    process::exit(1);
                }
            },
            "--help" | "-h" => {
                println!(
                    "Usage: mixctl [--seconds N] [--status]\n\nRenders a tone and a few effects offline through the mixer."
                );
                return;
            }
            other => {
                eprintln!("mixctl: unknown argument '{other}'");
                process::exit(1);
            }
        }
    }

    if let Err(err) = run(seconds, show_status) {
        eprintln!("mixctl: {err}");
        process::exit(1);
    }
}
