//! # PetalMix
//!
//! A real-time positional audio engine for Rust: point emitters, a single
//! listener, and a software mixing device with XAudio2-style batched
//! parameter commits.
//!
//! Each [`SourceVoice`] owns an emitter pose and a FIFO queue of
//! [`AudioClip`]s. Calling [`SourceVoice::update_effects`] runs the
//! spatial model against the engine's shared listener and applies the
//! resulting channel matrix, Doppler ratio and low-pass to the voice.
//! Changes tagged with a batch [`OperationId`] stay pending until
//! [`PetalMixEngine::commit_changes`] applies them together.
//!
//! ## Quick Start
//!
//! ```no_run
//! use petalmix::*;
//!
//! let engine = PetalMixEngine::new(PetalMixEngineDesc::default())?;
//! let mut voice = engine.create_source_voice()?;
//!
//! // One second of a 440 Hz tone
//! let tone: Vec<f32> = (0..ONE_SECOND_FRAMES)
//!     .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 48000.0).sin() * 0.2)
//!     .collect();
//! voice.queue(&AudioClip::new(tone).with_loop_mode(LoopMode::Infinite), OperationId::IMMEDIATE)?;
//!
//! // Move the emitter and apply the new mix together with `play`
//! let batch = engine.next_operation_set();
//! voice.set_emitter_position(3.0, 1.0);
//! voice.update_effects(batch)?;
//! voice.play(batch)?;
//! engine.commit_changes(batch)?;
//!
//! for event in voice.poll_events() {
//!     if let VoiceEvent::StreamEnded { voice } = event {
//!         println!("{} finished", voice);
//!     }
//! }
//! # Ok::<(), PetalMixError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`PetalMixEngine`]**: owns the device, the master output and the listener; creates voices
//! - **[`SourceVoice`]**: one playable sound with its own emitter and buffer queue
//! - **[`MasterOutput`]**: final gain stage every voice routes into
//! - **[`SpatialContext`]**: attenuation, panning, Doppler and low-pass from two poses
//! - **[`VoiceCallback`]**: buffer lifecycle notifications from the rendering thread
//!
//! ## Architecture
//!
//! 1. **Caller thread**: creates voices, queues clips, moves emitters, commits batches
//! 2. **Render thread**: mixes voices under the device lock, then runs callbacks
//! 3. **Audio callback**: lock-free consumption from a ring buffer to the cpal device
//!
//! Headless engines ([`OutputBackend::Headless`]) skip layers 2 and 3; the
//! application pulls audio with [`PetalMixEngine::render`].

pub mod clip;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod master;
pub mod math;
pub mod notifier;
pub mod operation;
mod output;
pub mod spatial;
pub mod voice;

pub use clip::{AudioClip, LoopMode, MAX_LOOP_COUNT, ONE_SECOND_FRAMES};
pub use config::{OutputBackend, PetalMixEngineDesc, VoiceDesc, VoiceFormat};
pub use device::{FilterParams, MAX_QUEUED_BUFFERS, MAX_VOLUME_LEVEL, VoiceState};
pub use engine::PetalMixEngine;
pub use error::{PetalMixError, Result};
pub use events::{VoiceErrorKind, VoiceEvent};
pub use master::MasterOutput;
pub use math::{Pose, Vec3};
pub use notifier::{MAX_PENDING_EVENTS, PlaybackNotifier, VoiceCallback};
pub use operation::OperationId;
pub use spatial::{
    AudioListener, ChannelMask, DistanceCurve, Emitter, EmitterSettings, MixResult,
    SpatialContext, VolumeCurve,
};
pub use voice::{SourceVoice, VoiceId};
