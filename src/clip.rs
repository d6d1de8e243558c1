//! Audio clips: shared PCM views plus playback metadata.

use std::sync::Arc;

/// Frames in one second of the canonical 48 kHz mono clip.
pub const ONE_SECOND_FRAMES: usize = 48_000;

/// Largest explicit loop count a clip may request.
pub const MAX_LOOP_COUNT: u32 = 254;

/// How many times a clip repeats once it reaches its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Play once
    #[default]
    Once,
    /// Loop back `n` extra times (plays `n + 1` times in total)
    Count(u32),
    /// Loop until the voice is stopped, flushed or destroyed
    Infinite,
}

impl LoopMode {
    /// Loops still to run after the first pass, `None` for infinite.
    pub(crate) fn remaining(&self) -> Option<u32> {
        match self {
            Self::Once => Some(0),
            Self::Count(n) => Some(*n),
            Self::Infinite => None,
        }
    }
}

/// An immutable view over caller-provided PCM samples.
///
/// Samples are interleaved 32-bit float frames in the voice's format. The
/// clip shares the buffer with the caller and the device; queueing a clip
/// never copies sample data.
#[derive(Debug, Clone)]
pub struct AudioClip {
    samples: Arc<[f32]>,
    loop_mode: LoopMode,
    end_of_stream: bool,
    context: u64,
}

impl AudioClip {
    /// Creates a single-shot clip marked as the end of its stream.
    pub fn new(samples: impl Into<Arc<[f32]>>) -> Self {
        Self {
            samples: samples.into(),
            loop_mode: LoopMode::Once,
            end_of_stream: true,
            context: 0,
        }
    }

    pub fn with_loop_mode(mut self, loop_mode: LoopMode) -> Self {
        self.loop_mode = loop_mode;
        self
    }

    pub fn with_end_of_stream(mut self, end_of_stream: bool) -> Self {
        self.end_of_stream = end_of_stream;
        self
    }

    /// Tags the clip with a value echoed back in buffer callbacks.
    pub fn with_context(mut self, context: u64) -> Self {
        self.context = context;
        self
    }

    /// Marks (or unmarks) this clip as the last buffer of its stream.
    pub fn mark_break(&mut self, value: bool) {
        self.end_of_stream = value;
    }

    pub fn set_loops(&mut self, loop_mode: LoopMode) {
        self.loop_mode = loop_mode;
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    pub fn context(&self) -> u64 {
        self.context
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of whole frames for a given channel count.
    pub fn frames(&self, channels: u16) -> usize {
        self.samples.len() / channels.max(1) as usize
    }
}
