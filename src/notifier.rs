//! Asynchronous playback notifications.
//!
//! The device invokes a voice's [`VoiceCallback`] from its processing thread.
//! Implementations must not block and must only touch state that is safe to
//! share across threads (atomics, channels).

use crate::events::{VoiceErrorKind, VoiceEvent};
use crate::voice::VoiceId;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Events a voice holds before [`crate::SourceVoice::poll_events`] drains
/// them. Newer events are dropped while the channel is full.
pub const MAX_PENDING_EVENTS: usize = 1024;

/// Capability set for buffer-queue lifecycle notifications.
///
/// Every method has an empty default, so implementors only override what
/// they need. `context` is the value given to
/// [`AudioClip::with_context`](crate::AudioClip::with_context).
pub trait VoiceCallback: Send + Sync {
    /// A processing pass is about to read from the voice. `bytes_required` is
    /// how much more queued data the pass needs to avoid starving (0 if enough
    /// is queued).
    fn on_processing_pass_start(&self, _bytes_required: u32) {}

    fn on_processing_pass_end(&self) {}

    /// The last buffer of a stream (end-of-stream flag) has finished.
    fn on_stream_end(&self) {}

    fn on_buffer_start(&self, _context: u64) {}

    /// Called when a buffer finishes playing or is discarded by a flush.
    fn on_buffer_end(&self, _context: u64) {}

    fn on_loop_end(&self, _context: u64) {}

    fn on_voice_error(&self, _context: u64, _error: VoiceErrorKind) {}
}

/// Default notifier attached to every source voice.
///
/// Tracks whether the voice is audible in an atomic flag (set on buffer
/// start, cleared on stream end), publishes [`VoiceEvent`]s on a channel and
/// forwards every call to an optional application callback.
pub struct PlaybackNotifier {
    voice: VoiceId,
    is_playing: AtomicBool,
    events: Sender<VoiceEvent>,
    forward: Option<Arc<dyn VoiceCallback>>,
}

impl PlaybackNotifier {
    pub(crate) fn new(
        voice: VoiceId,
        events: Sender<VoiceEvent>,
        forward: Option<Arc<dyn VoiceCallback>>,
    ) -> Self {
        Self {
            voice,
            is_playing: AtomicBool::new(false),
            events,
            forward,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Acquire)
    }

    fn publish(&self, event: VoiceEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::trace!("Voice {} event queue full, dropping {:?}", self.voice, event);
            }
            // The receiver lives in the voice; once it is gone nobody is listening.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl VoiceCallback for PlaybackNotifier {
    fn on_processing_pass_start(&self, bytes_required: u32) {
        if let Some(forward) = &self.forward {
            forward.on_processing_pass_start(bytes_required);
        }
    }

    fn on_processing_pass_end(&self) {
        if let Some(forward) = &self.forward {
            forward.on_processing_pass_end();
        }
    }

    fn on_stream_end(&self) {
        self.is_playing.store(false, Ordering::Release);
        self.publish(VoiceEvent::StreamEnded { voice: self.voice });
        if let Some(forward) = &self.forward {
            forward.on_stream_end();
        }
    }

    fn on_buffer_start(&self, context: u64) {
        self.is_playing.store(true, Ordering::Release);
        self.publish(VoiceEvent::BufferStarted {
            voice: self.voice,
            context,
        });
        if let Some(forward) = &self.forward {
            forward.on_buffer_start(context);
        }
    }

    fn on_buffer_end(&self, context: u64) {
        self.publish(VoiceEvent::BufferEnded {
            voice: self.voice,
            context,
        });
        if let Some(forward) = &self.forward {
            forward.on_buffer_end(context);
        }
    }

    fn on_loop_end(&self, context: u64) {
        self.publish(VoiceEvent::LoopEnded {
            voice: self.voice,
            context,
        });
        if let Some(forward) = &self.forward {
            forward.on_loop_end(context);
        }
    }

    fn on_voice_error(&self, context: u64, error: VoiceErrorKind) {
        log::warn!("Voice {} reported {:?} (context {})", self.voice, error, context);
        self.publish(VoiceEvent::VoiceError {
            voice: self.voice,
            context,
            error,
        });
        if let Some(forward) = &self.forward {
            forward.on_voice_error(context, error);
        }
    }
}
