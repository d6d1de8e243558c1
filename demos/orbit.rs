use anyhow::Result;
use petalmix::{
    AudioClip, LoopMode, ONE_SECOND_FRAMES, OperationId, PetalMixEngine, PetalMixEngineDesc,
    VoiceDesc, VoiceEvent,
};
use std::time::Duration;

/// Circles a tone around the listener, applying each step's mix as one batch.
fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let engine = PetalMixEngine::new(PetalMixEngineDesc::default())?;
    let mut voice = engine.create_source_voice_with(VoiceDesc::new().use_filter(true))?;

    let tone: Vec<f32> = (0..ONE_SECOND_FRAMES)
        .map(|i| (i as f32 * 330.0 * std::f32::consts::TAU / 48000.0).sin() * 0.25)
        .collect();
    voice.queue(
        &AudioClip::new(tone)
            .with_loop_mode(LoopMode::Infinite)
            .with_context(1),
        OperationId::IMMEDIATE,
    )?;

    let radius = 4.0;
    let steps = 200;
    for step in 0..steps {
        let angle = step as f32 / steps as f32 * std::f32::consts::TAU * 2.0;
        voice.set_emitter_position(radius * angle.cos(), radius * angle.sin());

        let batch = engine.next_operation_set();
        let mix = voice.update_effects(batch)?;
        if step == 0 {
            voice.play(batch)?;
        }
        engine.commit_changes(batch)?;

        if step % 25 == 0 {
            log::info!(
                "step {:3}: L {:.3} R {:.3} doppler {:.3}",
                step,
                mix.gain(0, 0),
                mix.gain(0, 1),
                mix.doppler_ratio
            );
        }
        std::thread::sleep(Duration::from_millis(25));
    }

    voice.stop(OperationId::IMMEDIATE)?;
    for event in voice.poll_events() {
        if let VoiceEvent::BufferStarted { context, .. } = event {
            log::info!("Buffer {} started", context);
        }
    }
    log::info!("Rendered {} frames", engine.frames_rendered());
    Ok(())
}
