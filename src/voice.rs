//! Source voices: one playable, spatialized sound each.

use crate::clip::AudioClip;
use crate::config::VoiceFormat;
use crate::device::{FilterParams, Target, VoiceState};
use crate::engine::EngineShared;
use crate::error::Result;
use crate::events::VoiceEvent;
use crate::math::Vec3;
use crate::notifier::PlaybackNotifier;
use crate::operation::OperationId;
use crate::spatial::{Emitter, EmitterSettings, MixResult};
use crossbeam_channel::Receiver;
use std::fmt;
use std::sync::Arc;

/// Identifier of a source voice, unique for the lifetime of its engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl VoiceId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoiceId({})", self.0)
    }
}

/// A playable sound with its own emitter pose and buffer queue.
///
/// Created by [`crate::PetalMixEngine::create_source_voice`]. Dropping the
/// voice destroys it on the device; buffers still queued are discarded
/// without notification.
pub struct SourceVoice {
    shared: Arc<EngineShared>,
    id: VoiceId,
    emitter: Emitter,
    notifier: Arc<PlaybackNotifier>,
    events: Receiver<VoiceEvent>,
    format: VoiceFormat,
    use_filter: bool,
}

impl SourceVoice {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        id: VoiceId,
        emitter: Emitter,
        notifier: Arc<PlaybackNotifier>,
        events: Receiver<VoiceEvent>,
        format: VoiceFormat,
        use_filter: bool,
    ) -> Self {
        Self {
            shared,
            id,
            emitter,
            notifier,
            events,
            format,
            use_filter,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn format(&self) -> VoiceFormat {
        self.format
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn emitter_settings_mut(&mut self) -> &mut EmitterSettings {
        self.emitter.settings_mut()
    }

    /// Moves the emitter to `(x, y, 0)`. Velocity becomes the displacement
    /// since the previous position and the orientation is reset.
    pub fn set_emitter_position(&mut self, x: f32, y: f32) {
        self.emitter.set_position_2d(x, y);
    }

    pub fn set_emitter_position_3d(&mut self, position: Vec3) {
        self.emitter.set_position(position);
    }

    /// Moves the engine's shared listener to `(x, y, 0)`.
    pub fn set_listener_position(&self, x: f32, y: f32) {
        self.shared.listener().set_position_2d(x, y);
    }

    /// Appends a clip to the voice's FIFO queue.
    pub fn queue(&self, clip: &AudioClip, operation: OperationId) -> Result<()> {
        self.shared.device.submit_buffer(self.id, clip, operation)
    }

    pub fn play(&self, operation: OperationId) -> Result<()> {
        self.shared.device.start_voice(self.id, operation)
    }

    /// Pauses queue consumption; the queue and read position are kept.
    pub fn stop(&self, operation: OperationId) -> Result<()> {
        self.shared.device.stop_voice(self.id, operation)
    }

    /// Ends the stream after the last queued buffer.
    pub fn break_queue(&self) -> Result<()> {
        if !self.shared.device.discontinuity(self.id)? {
            log::debug!("Voice {}: break on an empty queue", self.id);
        }
        Ok(())
    }

    /// Drops every buffer that has not started playing. Returns how many were dropped.
    pub fn clear_queue(&self) -> Result<usize> {
        self.shared.device.flush(self.id)
    }

    /// Recomputes the mix against the shared listener and applies the
    /// output matrix, Doppler ratio and (for filtered voices) the low-pass.
    pub fn update_effects(&self, operation: OperationId) -> Result<MixResult> {
        let listener = *self.shared.listener();
        let mix = self.shared.spatial.compute_mix_channels(
            listener.pose(),
            &self.emitter,
            self.format.channels,
            self.shared.master_channels,
        )?;

        let filter = self
            .use_filter
            .then(|| FilterParams::from_lpf_direct(mix.lpf_direct_coefficient));
        self.shared.device.set_effects(
            self.id,
            &mix.matrix,
            mix.doppler_ratio,
            filter,
            operation,
        )?;
        log::trace!(
            "Voice {} effects: distance {:.2}, doppler {:.3}, lpf {:.3}",
            self.id,
            mix.distance,
            mix.doppler_ratio,
            mix.lpf_direct_coefficient
        );
        Ok(mix)
    }

    /// Applies pending changes tagged with `operation` on every voice and the master.
    pub fn commit(&self, operation: OperationId) -> Result<usize> {
        self.shared.commit_changes(operation)
    }

    pub fn set_volume(&self, volume: f32, operation: OperationId) -> Result<()> {
        self.shared
            .device
            .set_volume(Target::Voice(self.id), volume, operation)
    }

    pub fn get_volume(&self) -> f32 {
        self.query(self.shared.device.volume(Target::Voice(self.id)))
    }

    /// Whether a buffer has started and the stream has not yet ended.
    ///
    /// Set from the device's rendering thread; stopping the voice does not clear it.
    pub fn is_playing(&self) -> bool {
        self.notifier.is_playing()
    }

    /// Whether the voice is consuming its queue.
    pub fn is_started(&self) -> bool {
        self.state().started
    }

    /// Overrides the output matrix, laid out as `matrix[src + src_channels * dst]`.
    /// The next [`Self::update_effects`] replaces it again.
    pub fn set_output_matrix(&self, matrix: &[f32], operation: OperationId) -> Result<()> {
        self.shared
            .device
            .set_output_matrix(self.id, matrix, operation)
    }

    /// Sets the playback speed, clamped to the voice's maximum ratio.
    pub fn set_frequency_ratio(&self, ratio: f32, operation: OperationId) -> Result<()> {
        self.shared
            .device
            .set_frequency_ratio(self.id, ratio, operation)
    }

    /// Only voices created with [`crate::VoiceDesc::use_filter`] accept a filter.
    pub fn set_filter(&self, params: FilterParams, operation: OperationId) -> Result<()> {
        self.shared.device.set_filter(self.id, params, operation)
    }

    pub fn output_matrix(&self) -> Vec<f32> {
        self.query(self.shared.device.output_matrix(self.id))
    }

    pub fn frequency_ratio(&self) -> f32 {
        self.query(self.shared.device.frequency_ratio(self.id))
    }

    pub fn filter(&self) -> FilterParams {
        self.query(self.shared.device.filter(self.id))
    }

    pub fn state(&self) -> VoiceState {
        self.query(self.shared.device.voice_state(self.id))
    }

    /// Drains lifecycle events published since the last call.
    ///
    /// At most [`crate::MAX_PENDING_EVENTS`] are held between calls; later
    /// ones are dropped until the queue is drained.
    pub fn poll_events(&self) -> Vec<VoiceEvent> {
        self.events.try_iter().collect()
    }

    // The device slot lives exactly as long as this handle.
    fn query<T: Default>(&self, result: Result<T>) -> T {
        result.unwrap_or_else(|e| {
            log::error!("Voice {} query failed: {}", self.id, e);
            T::default()
        })
    }
}

impl fmt::Debug for SourceVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceVoice")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("emitter", &self.emitter)
            .field("use_filter", &self.use_filter)
            .finish()
    }
}

impl Drop for SourceVoice {
    fn drop(&mut self) {
        self.shared.device.destroy_voice(self.id);
    }
}
