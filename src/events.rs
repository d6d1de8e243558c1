//! Event types for PetalMix

use crate::voice::VoiceId;

/// Error reported by the device while rendering a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceErrorKind {
    /// A queued buffer contained NaN or infinite samples; they were rendered as silence
    NonFiniteSample,
}

/// Buffer-queue lifecycle events reported by a voice's notifier.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    BufferStarted {
        voice: VoiceId,
        context: u64,
    },
    BufferEnded {
        voice: VoiceId,
        context: u64,
    },
    LoopEnded {
        voice: VoiceId,
        context: u64,
    },
    StreamEnded {
        voice: VoiceId,
    },
    VoiceError {
        voice: VoiceId,
        context: u64,
        error: VoiceErrorKind,
    },
}

impl VoiceEvent {
    pub fn voice_id(&self) -> VoiceId {
        match self {
            Self::BufferStarted { voice, .. }
            | Self::BufferEnded { voice, .. }
            | Self::LoopEnded { voice, .. }
            | Self::StreamEnded { voice }
            | Self::VoiceError { voice, .. } => *voice,
        }
    }

    /// Context of the buffer the event refers to, if any.
    pub fn context(&self) -> Option<u64> {
        match self {
            Self::BufferStarted { context, .. }
            | Self::BufferEnded { context, .. }
            | Self::LoopEnded { context, .. }
            | Self::VoiceError { context, .. } => Some(*context),
            Self::StreamEnded { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::VoiceError { .. })
    }
}
