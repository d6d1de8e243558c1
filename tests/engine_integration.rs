use petalmix::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn headless_engine() -> PetalMixEngine {
    init_logging();
    PetalMixEngine::new(PetalMixEngineDesc::headless()).expect("Failed to create engine")
}

fn constant_clip(frames: usize, value: f32, context: u64) -> AudioClip {
    AudioClip::new(vec![value; frames]).with_context(context)
}

/// Renders `frames` stereo frames and returns the interleaved output.
fn render_frames(engine: &PetalMixEngine, frames: usize) -> Vec<f32> {
    let mut out = vec![0.0; frames * 2];
    engine.render(&mut out).expect("render failed");
    out
}

fn started(events: &[VoiceEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            VoiceEvent::BufferStarted { context, .. } => Some(*context),
            _ => None,
        })
        .collect()
}

fn ended(events: &[VoiceEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            VoiceEvent::BufferEnded { context, .. } => Some(*context),
            _ => None,
        })
        .collect()
}

#[test]
fn buffers_play_in_fifo_order() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    for context in 1..=3 {
        let clip = constant_clip(64, 0.1, context).with_end_of_stream(context == 3);
        voice.queue(&clip, OperationId::IMMEDIATE).unwrap();
    }
    voice.play(OperationId::IMMEDIATE).unwrap();
    render_frames(&engine, 256);

    let events = voice.poll_events();
    assert_eq!(started(&events), vec![1, 2, 3]);
    assert_eq!(ended(&events), vec![1, 2, 3]);
    assert_eq!(
        events.last(),
        Some(&VoiceEvent::StreamEnded { voice: voice.id() })
    );
}

#[test]
fn playing_flag_follows_the_stream() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    assert!(!voice.is_playing());

    voice
        .queue(&constant_clip(100, 0.2, 0), OperationId::IMMEDIATE)
        .unwrap();
    voice.play(OperationId::IMMEDIATE).unwrap();
    assert!(!voice.is_playing());

    render_frames(&engine, 50);
    assert!(voice.is_playing());
    assert!(voice.is_started());

    render_frames(&engine, 100);
    assert!(!voice.is_playing());
    assert!(voice.is_started());
    assert_eq!(voice.state().buffers_queued, 0);
}

#[test]
fn stop_keeps_playing_flag_and_position() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    voice
        .queue(&constant_clip(100, 0.2, 0), OperationId::IMMEDIATE)
        .unwrap();
    voice.play(OperationId::IMMEDIATE).unwrap();
    render_frames(&engine, 40);

    voice.stop(OperationId::IMMEDIATE).unwrap();
    let silent = render_frames(&engine, 40);
    assert!(silent.iter().all(|s| *s == 0.0));
    assert!(voice.is_playing());
    assert!(!voice.is_started());
    assert_eq!(voice.state().samples_played, 40);
}

#[test]
fn batched_effects_apply_at_commit() {
    let engine = headless_engine();
    let mut voice = engine.create_source_voice().unwrap();
    voice
        .queue(&constant_clip(128, 1.0, 0), OperationId::IMMEDIATE)
        .unwrap();

    voice.set_emitter_position(2.0, 0.0);
    let batch = engine.next_operation_set();
    let mix = voice.update_effects(batch).unwrap();
    voice.play(batch).unwrap();

    assert_eq!(voice.output_matrix(), vec![1.0, 1.0]);
    assert_eq!(voice.frequency_ratio(), 1.0);
    assert!(!voice.is_started());
    assert_eq!(engine.pending_changes(), 3);
    assert!(render_frames(&engine, 8).iter().all(|s| *s == 0.0));

    assert_eq!(engine.commit_changes(batch).unwrap(), 3);
    assert_eq!(voice.output_matrix(), mix.matrix);
    assert_eq!(voice.frequency_ratio(), mix.doppler_ratio);
    assert!(voice.is_started());

    let out = render_frames(&engine, 8);
    assert!(mix.gain(0, 1) > mix.gain(0, 0));
    assert!((out[1] - mix.gain(0, 1)).abs() < 1e-6);
    assert!((out[0] - mix.gain(0, 0)).abs() < 1e-6);
}

#[test]
fn commit_with_other_set_leaves_changes_pending() {
    let engine = PetalMixEngine::new(PetalMixEngineDesc::headless().max_operation_sets(4)).unwrap();
    let voice = engine.create_source_voice().unwrap();
    voice.set_volume(0.25, OperationId::batch(2)).unwrap();

    assert_eq!(voice.commit(OperationId::batch(3)).unwrap(), 0);
    assert_eq!(voice.get_volume(), 1.0);
    assert_eq!(engine.commit_changes(OperationId::IMMEDIATE).unwrap(), 0);
    assert!(matches!(
        engine.commit_changes(OperationId::batch(5)),
        Err(PetalMixError::InvalidOperationSet { id: 5, max: 4 })
    ));

    assert_eq!(voice.commit(OperationId::batch(2)).unwrap(), 1);
    assert_eq!(voice.get_volume(), 0.25);
}

#[test]
fn batched_queue_appears_after_commit() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    let batch = engine.next_operation_set();
    voice.queue(&constant_clip(16, 0.5, 7), batch).unwrap();
    assert_eq!(voice.state().buffers_queued, 0);

    engine.commit_all();
    assert_eq!(voice.state().buffers_queued, 1);
    assert_eq!(voice.state().current_context, Some(7));
}

#[test]
fn clear_queue_discards_unstarted_buffers() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    for context in 1..=3 {
        voice
            .queue(&constant_clip(32, 0.3, context), OperationId::IMMEDIATE)
            .unwrap();
    }
    assert_eq!(voice.clear_queue().unwrap(), 3);
    assert_eq!(voice.state().buffers_queued, 0);

    render_frames(&engine, 16);
    let events = voice.poll_events();
    assert!(started(&events).is_empty());
    assert_eq!(ended(&events), vec![1, 2, 3]);
}

#[test]
fn clear_queue_does_not_interrupt_current_buffer() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    for context in 1..=3 {
        voice
            .queue(&constant_clip(1000, 0.3, context), OperationId::IMMEDIATE)
            .unwrap();
    }
    voice.play(OperationId::IMMEDIATE).unwrap();
    render_frames(&engine, 100);

    assert_eq!(voice.clear_queue().unwrap(), 2);
    let out = render_frames(&engine, 900);
    assert!(out.iter().all(|s| (*s - 0.3).abs() < 1e-6));

    let events = voice.poll_events();
    assert_eq!(started(&events), vec![1]);
    assert_eq!(ended(&events), vec![2, 3, 1]);
}

#[test]
fn break_queue_ends_an_open_stream() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    voice
        .queue(
            &constant_clip(8, 0.1, 5).with_end_of_stream(false),
            OperationId::IMMEDIATE,
        )
        .unwrap();
    voice.break_queue().unwrap();
    voice.play(OperationId::IMMEDIATE).unwrap();
    render_frames(&engine, 16);

    assert!(voice
        .poll_events()
        .contains(&VoiceEvent::StreamEnded { voice: voice.id() }));
    assert!(!voice.is_playing());
}

#[test]
fn loop_count_repeats_then_ends() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    voice
        .queue(
            &constant_clip(10, 0.1, 4).with_loop_mode(LoopMode::Count(2)),
            OperationId::IMMEDIATE,
        )
        .unwrap();
    voice.play(OperationId::IMMEDIATE).unwrap();
    render_frames(&engine, 40);

    let id = voice.id();
    assert_eq!(
        voice.poll_events(),
        vec![
            VoiceEvent::BufferStarted { voice: id, context: 4 },
            VoiceEvent::LoopEnded { voice: id, context: 4 },
            VoiceEvent::LoopEnded { voice: id, context: 4 },
            VoiceEvent::BufferEnded { voice: id, context: 4 },
            VoiceEvent::StreamEnded { voice: id },
        ]
    );
}

#[test]
fn dropping_a_voice_discards_its_queue() {
    let engine = headless_engine();
    let counting = Arc::new(CountingCallback::default());
    let voice = engine
        .create_source_voice_with(VoiceDesc::new().callback(counting.clone()))
        .unwrap();
    for context in 1..=3 {
        voice
            .queue(&constant_clip(100, 0.4, context), OperationId::IMMEDIATE)
            .unwrap();
    }
    voice.play(OperationId::IMMEDIATE).unwrap();
    render_frames(&engine, 10);
    assert_eq!(counting.buffer_starts.load(Ordering::Relaxed), 1);
    drop(voice);

    let out = render_frames(&engine, 400);
    assert!(out.iter().all(|s| *s == 0.0));
    assert_eq!(counting.buffer_starts.load(Ordering::Relaxed), 1);
    assert_eq!(counting.buffer_ends.load(Ordering::Relaxed), 0);

    let replacement = engine.create_source_voice().unwrap();
    assert_eq!(replacement.state(), VoiceState::default());
}

#[test]
fn invalid_buffers_are_rejected() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    assert!(matches!(
        voice.queue(&AudioClip::new(Vec::<f32>::new()), OperationId::IMMEDIATE),
        Err(PetalMixError::InvalidBuffer(_))
    ));
    assert!(matches!(
        voice.queue(
            &constant_clip(4, 0.0, 0).with_loop_mode(LoopMode::Count(MAX_LOOP_COUNT + 1)),
            OperationId::IMMEDIATE
        ),
        Err(PetalMixError::InvalidBuffer(_))
    ));

    let stereo = engine
        .create_source_voice_with(VoiceDesc::new().format(VoiceFormat {
            sample_rate: 48000,
            channels: 2,
        }))
        .unwrap();
    assert!(matches!(
        stereo.queue(&constant_clip(5, 0.0, 0), OperationId::IMMEDIATE),
        Err(PetalMixError::InvalidBuffer(_))
    ));
}

#[test]
fn queue_is_bounded() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    let clip = constant_clip(4, 0.0, 0);
    for _ in 0..MAX_QUEUED_BUFFERS {
        voice.queue(&clip, OperationId::IMMEDIATE).unwrap();
    }
    assert!(matches!(
        voice.queue(&clip, OperationId::IMMEDIATE),
        Err(PetalMixError::QueueFull(_))
    ));
}

#[test]
fn volume_is_validated() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    for bad in [f32::NAN, f32::INFINITY, MAX_VOLUME_LEVEL * 2.0] {
        assert!(matches!(
            voice.set_volume(bad, OperationId::IMMEDIATE),
            Err(PetalMixError::InvalidParameter(_))
        ));
    }
    voice.set_volume(-1.0, OperationId::IMMEDIATE).unwrap();
    assert_eq!(voice.get_volume(), -1.0);
}

#[test]
fn master_volume_batch_applies_at_commit() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    voice
        .queue(&constant_clip(64, 1.0, 0), OperationId::IMMEDIATE)
        .unwrap();
    voice.play(OperationId::IMMEDIATE).unwrap();

    let batch = engine.next_operation_set();
    engine.set_volume(0.5, batch).unwrap();
    assert_eq!(engine.get_volume(), 1.0);
    assert!(render_frames(&engine, 4).iter().all(|s| *s == 1.0));

    engine.commit_changes(batch).unwrap();
    assert_eq!(engine.get_volume(), 0.5);
    assert!(render_frames(&engine, 4).iter().all(|s| *s == 0.5));
}

#[test]
fn listener_is_shared_by_all_voices() {
    let engine = headless_engine();
    let mut left = engine.create_source_voice().unwrap();
    let mut right = engine.create_source_voice().unwrap();
    left.set_emitter_position(-3.0, 0.0);
    right.set_emitter_position(-3.0, 0.0);

    left.set_listener_position(-3.0, 0.0);
    assert_eq!(engine.listener().position(), Vec3::new(-3.0, 0.0, 0.0));

    let a = left.update_effects(OperationId::IMMEDIATE).unwrap();
    let b = right.update_effects(OperationId::IMMEDIATE).unwrap();
    assert_eq!(a.matrix, b.matrix);
    assert!(a.distance < 1e-6);
    assert_eq!(a.attenuation, 1.0);
}

#[test]
fn filtered_voice_closes_with_distance() {
    let engine = headless_engine();
    let mut voice = engine
        .create_source_voice_with(VoiceDesc::new().use_filter(true))
        .unwrap();
    assert_eq!(voice.filter(), FilterParams::TRANSPARENT);

    voice.set_emitter_position(0.0, 5.0);
    voice.set_emitter_position(0.0, 5.0);
    let mix = voice.update_effects(OperationId::IMMEDIATE).unwrap();
    assert!(mix.lpf_direct_coefficient < 1.0);
    assert!(voice.filter().frequency < 1.0);
    assert_eq!(voice.filter(), FilterParams::from_lpf_direct(mix.lpf_direct_coefficient));

    let plain = engine.create_source_voice().unwrap();
    plain.update_effects(OperationId::IMMEDIATE).unwrap();
    assert_eq!(plain.filter(), FilterParams::TRANSPARENT);
}

#[derive(Default)]
struct CountingCallback {
    buffer_starts: AtomicUsize,
    buffer_ends: AtomicUsize,
    passes: AtomicUsize,
}

impl VoiceCallback for CountingCallback {
    fn on_processing_pass_start(&self, _bytes_required: u32) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    fn on_buffer_start(&self, _context: u64) {
        self.buffer_starts.fetch_add(1, Ordering::Relaxed);
    }

    fn on_buffer_end(&self, _context: u64) {
        self.buffer_ends.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn application_callback_receives_notifications() {
    let engine = headless_engine();
    let counting = Arc::new(CountingCallback::default());
    let voice = engine
        .create_source_voice_with(VoiceDesc::new().callback(counting.clone()))
        .unwrap();
    for context in 0..2 {
        voice
            .queue(&constant_clip(8, 0.1, context), OperationId::IMMEDIATE)
            .unwrap();
    }
    voice.play(OperationId::IMMEDIATE).unwrap();
    render_frames(&engine, 8);
    render_frames(&engine, 8);

    assert_eq!(counting.buffer_starts.load(Ordering::Relaxed), 2);
    assert_eq!(counting.buffer_ends.load(Ordering::Relaxed), 2);
    assert_eq!(counting.passes.load(Ordering::Relaxed), 2);
}

#[test]
fn voices_can_be_driven_from_another_thread() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();

    let voice = std::thread::spawn(move || {
        voice
            .queue(&constant_clip(32, 0.25, 9), OperationId::IMMEDIATE)
            .unwrap();
        voice.play(OperationId::IMMEDIATE).unwrap();
        voice
    })
    .join()
    .unwrap();

    let out = render_frames(&engine, 16);
    assert!(out.iter().all(|s| *s == 0.25));
    assert!(voice.is_playing());
    assert_eq!(voice.state().current_context, Some(9));
}

#[test]
fn two_voices_in_one_batch_change_together() {
    let engine = headless_engine();
    let mut near = engine.create_source_voice().unwrap();
    let mut far = engine.create_source_voice().unwrap();
    near.set_emitter_position(1.0, 0.0);
    far.set_emitter_position(-10.0, 0.0);

    let batch = engine.next_operation_set();
    let near_mix = near.update_effects(batch).unwrap();
    let far_mix = far.update_effects(batch).unwrap();
    assert_eq!(near.output_matrix(), vec![1.0, 1.0]);
    assert_eq!(far.output_matrix(), vec![1.0, 1.0]);

    engine.commit_changes(batch).unwrap();
    assert_eq!(near.output_matrix(), near_mix.matrix);
    assert_eq!(far.output_matrix(), far_mix.matrix);
    assert!(far_mix.attenuation < near_mix.attenuation);
}

#[test]
fn invalid_emitter_settings_leave_effects_untouched() {
    let engine = headless_engine();
    let mut voice = engine
        .create_source_voice_with(VoiceDesc::new().use_filter(true))
        .unwrap();
    voice.set_emitter_position(2.0, 0.0);
    voice.emitter_settings_mut().doppler_scaler = f32::NAN;

    assert!(matches!(
        voice.update_effects(OperationId::IMMEDIATE),
        Err(PetalMixError::Spatialization(_))
    ));
    assert_eq!(voice.output_matrix(), vec![1.0, 1.0]);
    assert_eq!(voice.frequency_ratio(), 1.0);
    assert_eq!(voice.filter(), FilterParams::TRANSPARENT);

    voice.emitter_settings_mut().doppler_scaler = 1.0;
    voice.emitter_settings_mut().curve_distance_scaler = 0.0;
    let batch = engine.next_operation_set();
    assert!(matches!(
        voice.update_effects(batch),
        Err(PetalMixError::Spatialization(_))
    ));
    assert_eq!(engine.pending_changes(), 0);
    assert_eq!(voice.output_matrix(), vec![1.0, 1.0]);
}

#[test]
fn unpolled_events_are_capped() {
    let engine = headless_engine();
    let voice = engine.create_source_voice().unwrap();
    voice
        .queue(
            &constant_clip(1, 0.1, 2).with_loop_mode(LoopMode::Infinite),
            OperationId::IMMEDIATE,
        )
        .unwrap();
    voice.play(OperationId::IMMEDIATE).unwrap();
    render_frames(&engine, 48000);

    let events = voice.poll_events();
    assert_eq!(events.len(), MAX_PENDING_EVENTS);
    assert_eq!(started(&events), vec![2]);
    assert!(voice.is_playing());

    render_frames(&engine, 16);
    assert_eq!(voice.poll_events().len(), 16);
}

#[test]
fn direct_parameter_overrides() {
    let engine = headless_engine();
    let voice = engine
        .create_source_voice_with(VoiceDesc::new().use_filter(true))
        .unwrap();
    voice
        .set_output_matrix(&[0.25, 0.75], OperationId::IMMEDIATE)
        .unwrap();
    voice.set_frequency_ratio(100.0, OperationId::IMMEDIATE).unwrap();
    voice
        .set_filter(FilterParams { frequency: 0.5 }, OperationId::IMMEDIATE)
        .unwrap();

    assert_eq!(voice.output_matrix(), vec![0.25, 0.75]);
    assert_eq!(voice.frequency_ratio(), 2.0);
    assert_eq!(voice.filter(), FilterParams { frequency: 0.5 });
    assert!(voice
        .set_output_matrix(&[1.0], OperationId::IMMEDIATE)
        .is_err());
}
