use crate::clip::AudioClip;
use crate::config::VoiceFormat;
use crate::events::VoiceErrorKind;
use crate::notifier::VoiceCallback;
use crate::operation::OperationId;
use crate::voice::VoiceId;
use std::collections::{BTreeMap, VecDeque};
use std::f32::consts::PI;
use std::sync::Arc;

/// One-pole low-pass settings of a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Filter coefficient in [0, 1]; 1.0 passes the signal unchanged
    pub frequency: f32,
}

impl FilterParams {
    pub const TRANSPARENT: Self = Self { frequency: 1.0 };

    /// Maps a direct-path low-pass coefficient from the spatial model to a filter.
    pub fn from_lpf_direct(coefficient: f32) -> Self {
        Self {
            frequency: (2.0 * (PI / 6.0 * coefficient).sin()).clamp(0.0, 1.0),
        }
    }
}

impl Default for FilterParams {
    fn default() -> Self {
        Self::TRANSPARENT
    }
}

/// Snapshot of a voice's queue and playback counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceState {
    /// Whether the voice is consuming its queue
    pub started: bool,
    /// Buffers in the queue, including the one currently playing
    pub buffers_queued: usize,
    /// Frames rendered since the voice was created
    pub samples_played: u64,
    /// Context of the buffer at the front of the queue
    pub current_context: Option<u64>,
}

pub(crate) struct MasterState {
    pub channels: u16,
    pub volume: f32,
}

pub(crate) struct QueuedBuffer {
    pub clip: AudioClip,
    pub frames: usize,
    /// Fractional read position in frames
    pub position: f64,
    /// `None` loops forever
    pub loops_remaining: Option<u32>,
    pub started: bool,
    pub end_of_stream: bool,
    pub reported_error: bool,
}

impl QueuedBuffer {
    pub fn new(clip: AudioClip, channels: u16) -> Self {
        Self {
            frames: clip.frames(channels),
            loops_remaining: clip.loop_mode().remaining(),
            end_of_stream: clip.is_end_of_stream(),
            clip,
            position: 0.0,
            started: false,
            reported_error: false,
        }
    }
}

pub(crate) struct VoiceSlot {
    pub format: VoiceFormat,
    pub callback: Arc<dyn VoiceCallback>,
    pub started: bool,
    pub volume: f32,
    pub frequency_ratio: f32,
    pub max_frequency_ratio: f32,
    pub use_filter: bool,
    pub output_matrix: Vec<f32>,
    pub filter: FilterParams,
    pub filter_state: Vec<f32>,
    pub queue: VecDeque<QueuedBuffer>,
    pub samples_played: u64,
    /// Scratch frame for the renderer
    pub frame: Vec<f32>,
}

impl VoiceSlot {
    pub fn new(
        format: VoiceFormat,
        callback: Arc<dyn VoiceCallback>,
        max_frequency_ratio: f32,
        use_filter: bool,
        dst_channels: u16,
    ) -> Self {
        let src = format.channels as usize;
        Self {
            format,
            callback,
            started: false,
            volume: 1.0,
            frequency_ratio: 1.0,
            max_frequency_ratio,
            use_filter,
            output_matrix: default_matrix(src, dst_channels as usize),
            filter: FilterParams::TRANSPARENT,
            filter_state: vec![0.0; src],
            queue: VecDeque::new(),
            samples_played: 0,
            frame: vec![0.0; src],
        }
    }

    pub fn state(&self) -> VoiceState {
        VoiceState {
            started: self.started,
            buffers_queued: self.queue.len(),
            samples_played: self.samples_played,
            current_context: self.queue.front().map(|b| b.clip.context()),
        }
    }
}

/// Mono fans out to every output, equal counts map one-to-one, otherwise channels are averaged.
fn default_matrix(src: usize, dst: usize) -> Vec<f32> {
    let mut matrix = vec![0.0; src * dst];
    for d in 0..dst {
        for s in 0..src {
            matrix[s + src * d] = if src == 1 {
                1.0
            } else if src == dst {
                if s == d { 1.0 } else { 0.0 }
            } else {
                1.0 / src as f32
            };
        }
    }
    matrix
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Master,
    Voice(VoiceId),
}

pub(crate) enum Change {
    Start,
    Stop,
    Volume(f32),
    FrequencyRatio(f32),
    OutputMatrix(Vec<f32>),
    Filter(FilterParams),
    Submit(AudioClip),
}

pub(crate) struct PendingChange {
    pub operation: OperationId,
    pub target: Target,
    pub change: Change,
}

pub(crate) enum NotificationKind {
    ProcessingPassStart(u32),
    ProcessingPassEnd,
    BufferStart(u64),
    BufferEnd(u64),
    LoopEnd(u64),
    StreamEnd,
    VoiceError(u64, VoiceErrorKind),
}

/// A callback invocation collected under the device lock and dispatched after it is released.
pub(crate) struct Notification {
    pub voice: VoiceId,
    callback: Arc<dyn VoiceCallback>,
    kind: NotificationKind,
}

impl Notification {
    pub fn new(voice: VoiceId, callback: &Arc<dyn VoiceCallback>, kind: NotificationKind) -> Self {
        Self {
            voice,
            callback: callback.clone(),
            kind,
        }
    }

    pub fn dispatch(&self) {
        match self.kind {
            NotificationKind::ProcessingPassStart(bytes) => {
                self.callback.on_processing_pass_start(bytes)
            }
            NotificationKind::ProcessingPassEnd => self.callback.on_processing_pass_end(),
            NotificationKind::BufferStart(context) => self.callback.on_buffer_start(context),
            NotificationKind::BufferEnd(context) => self.callback.on_buffer_end(context),
            NotificationKind::LoopEnd(context) => self.callback.on_loop_end(context),
            NotificationKind::StreamEnd => self.callback.on_stream_end(),
            NotificationKind::VoiceError(context, error) => {
                self.callback.on_voice_error(context, error)
            }
        }
    }
}

pub(crate) struct DeviceState {
    pub running: bool,
    pub master: Option<MasterState>,
    pub voices: BTreeMap<VoiceId, VoiceSlot>,
    pub pending: Vec<PendingChange>,
    /// Notifications raised outside a processing pass (flushes), delivered by the next one
    pub deferred: Vec<Notification>,
    pub next_voice_id: u64,
}

impl DeviceState {
    pub fn new() -> Self {
        Self {
            running: false,
            master: None,
            voices: BTreeMap::new(),
            pending: Vec::new(),
            deferred: Vec::new(),
            next_voice_id: 1,
        }
    }

    /// Applies an already validated change.
    pub fn apply(&mut self, target: Target, change: Change) {
        let voice = match target {
            Target::Master => {
                match (change, self.master.as_mut()) {
                    (Change::Volume(volume), Some(master)) => master.volume = volume,
                    (_, None) => log::warn!("Dropping master change: no master output"),
                    _ => log::warn!("Dropping unsupported master change"),
                }
                return;
            }
            Target::Voice(id) => match self.voices.get_mut(&id) {
                Some(slot) => slot,
                None => {
                    log::warn!("Dropping change for destroyed voice {}", id);
                    return;
                }
            },
        };

        match change {
            Change::Start => voice.started = true,
            Change::Stop => voice.started = false,
            Change::Volume(volume) => voice.volume = volume,
            Change::FrequencyRatio(ratio) => voice.frequency_ratio = ratio,
            Change::OutputMatrix(matrix) => voice.output_matrix = matrix,
            Change::Filter(params) => voice.filter = params,
            Change::Submit(clip) => {
                let channels = voice.format.channels;
                voice.queue.push_back(QueuedBuffer::new(clip, channels));
            }
        }
    }

    /// Submissions for `voice` waiting on a commit.
    pub fn pending_submits(&self, voice: VoiceId) -> usize {
        self.pending
            .iter()
            .filter(|c| c.target == Target::Voice(voice) && matches!(c.change, Change::Submit(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matrices() {
        assert_eq!(default_matrix(1, 2), vec![1.0, 1.0]);
        assert_eq!(default_matrix(2, 2), vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(default_matrix(2, 1), vec![0.5, 0.5]);
    }

    #[test]
    fn filter_mapping_is_transparent_at_unity() {
        assert!((FilterParams::from_lpf_direct(1.0).frequency - 1.0).abs() < 1e-6);
        assert!(FilterParams::from_lpf_direct(0.75).frequency < 1.0);
        assert_eq!(FilterParams::from_lpf_direct(0.0).frequency, 0.0);
    }
}
