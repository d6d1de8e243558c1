//! In-process software mixing device.
//!
//! The device owns every voice's queue and parameters behind one mutex.
//! Control calls validate their arguments, then either apply the change at
//! once (immediate operation id) or park it until the matching commit.
//! [`Device::render`] runs one processing pass and dispatches the callbacks
//! it raised after the lock is released, so callbacks may call back into
//! the device.

mod render;
mod state;

pub use state::{FilterParams, VoiceState};
pub(crate) use state::Target;

use crate::clip::{AudioClip, LoopMode, MAX_LOOP_COUNT};
use crate::config::{MIN_FREQUENCY_RATIO, VoiceFormat};
use crate::error::{PetalMixError, Result};
use crate::notifier::VoiceCallback;
use crate::operation::OperationId;
use crate::spatial::ChannelMask;
use crate::voice::VoiceId;
use state::{
    Change, DeviceState, MasterState, Notification, NotificationKind, PendingChange, VoiceSlot,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Buffers a voice may hold, counting submissions waiting on a commit.
pub const MAX_QUEUED_BUFFERS: usize = 64;

/// Largest volume magnitude (2^24) a voice or the master accepts.
pub const MAX_VOLUME_LEVEL: f32 = 16_777_216.0;

#[derive(Clone)]
pub(crate) struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    state: Mutex<DeviceState>,
    sample_rate: u32,
    max_operation_sets: u32,
    max_voices: usize,
}

impl Device {
    pub(crate) fn new(sample_rate: u32, max_operation_sets: u32, max_voices: usize) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                state: Mutex::new(DeviceState::new()),
                sample_rate,
                max_operation_sets,
                max_voices,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, DeviceState> {
        // A panicking callback never runs under the lock, so the state is still consistent.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn start(&self) {
        self.lock_state().running = true;
        log::debug!("Device started");
    }

    pub(crate) fn stop(&self) {
        self.lock_state().running = false;
        log::debug!("Device stopped");
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock_state().running
    }

    pub(crate) fn create_master(&self, channels: u16) -> Result<ChannelMask> {
        let channel_mask = ChannelMask::for_channels(channels).ok_or_else(|| {
            PetalMixError::AudioFormat(format!(
                "Master output supports 1 or 2 channels, got {}",
                channels
            ))
        })?;
        let mut state = self.lock_state();
        if state.master.is_some() {
            return Err(PetalMixError::Engine(
                "A master output already exists".into(),
            ));
        }
        state.master = Some(MasterState {
            channels,
            volume: 1.0,
        });
        log::info!(
            "Master output created: {} channel(s) at {} Hz",
            channels,
            self.inner.sample_rate
        );
        Ok(channel_mask)
    }

    pub(crate) fn destroy_master(&self) {
        let mut state = self.lock_state();
        state.pending.retain(|c| c.target != Target::Master);
        if state.master.take().is_some() {
            log::debug!("Master output destroyed");
        }
    }

    pub(crate) fn create_voice(
        &self,
        format: VoiceFormat,
        max_frequency_ratio: f32,
        use_filter: bool,
        make_callback: impl FnOnce(VoiceId) -> Arc<dyn VoiceCallback>,
    ) -> Result<VoiceId> {
        if format.sample_rate != self.inner.sample_rate {
            return Err(PetalMixError::AudioFormat(format!(
                "Voice sample rate {} does not match the device rate {}",
                format.sample_rate, self.inner.sample_rate
            )));
        }
        if !(1..=2).contains(&format.channels) {
            return Err(PetalMixError::AudioFormat(format!(
                "Voices support 1 or 2 channels, got {}",
                format.channels
            )));
        }

        let mut state = self.lock_state();
        let dst_channels = match &state.master {
            Some(master) => master.channels,
            None => {
                return Err(PetalMixError::Engine(
                    "Cannot create a voice without a master output".into(),
                ));
            }
        };
        if state.voices.len() >= self.inner.max_voices {
            return Err(PetalMixError::Engine(format!(
                "Voice limit reached ({})",
                self.inner.max_voices
            )));
        }

        let id = VoiceId::from_raw(state.next_voice_id);
        state.next_voice_id += 1;
        let slot = VoiceSlot::new(
            format,
            make_callback(id),
            max_frequency_ratio,
            use_filter,
            dst_channels,
        );
        state.voices.insert(id, slot);
        log::debug!(
            "Voice {} created ({} ch, max ratio {}, filter: {})",
            id,
            format.channels,
            max_frequency_ratio,
            use_filter
        );
        Ok(id)
    }

    /// Removes a voice together with its queue, its uncommitted changes and
    /// any notifications not yet delivered.
    pub(crate) fn destroy_voice(&self, voice: VoiceId) {
        let mut state = self.lock_state();
        let Some(slot) = state.voices.remove(&voice) else {
            return;
        };
        state.pending.retain(|c| c.target != Target::Voice(voice));
        state.deferred.retain(|n| n.voice != voice);
        log::debug!(
            "Voice {} destroyed ({} buffer(s) dropped)",
            voice,
            slot.queue.len()
        );
    }

    fn check_operation(&self, operation: OperationId) -> Result<()> {
        if operation.raw() > self.inner.max_operation_sets {
            return Err(PetalMixError::InvalidOperationSet {
                id: operation.raw(),
                max: self.inner.max_operation_sets,
            });
        }
        Ok(())
    }

    fn voice_slot<'a>(state: &'a DeviceState, voice: VoiceId) -> Result<&'a VoiceSlot> {
        state
            .voices
            .get(&voice)
            .ok_or(PetalMixError::InvalidHandle(voice.raw()))
    }

    fn schedule(state: &mut DeviceState, operation: OperationId, target: Target, change: Change) {
        if operation.is_immediate() {
            state.apply(target, change);
        } else {
            state.pending.push(PendingChange {
                operation,
                target,
                change,
            });
        }
    }

    pub(crate) fn submit_buffer(
        &self,
        voice: VoiceId,
        clip: &AudioClip,
        operation: OperationId,
    ) -> Result<()> {
        self.check_operation(operation)?;
        let mut state = self.lock_state();
        let slot = Self::voice_slot(&state, voice)?;

        let channels = slot.format.channels as usize;
        if clip.is_empty() {
            return Err(PetalMixError::InvalidBuffer("Clip has no samples".into()));
        }
        if clip.len() % channels != 0 {
            return Err(PetalMixError::InvalidBuffer(format!(
                "{} samples do not form whole {}-channel frames",
                clip.len(),
                channels
            )));
        }
        if let LoopMode::Count(n) = clip.loop_mode() {
            if n > MAX_LOOP_COUNT {
                return Err(PetalMixError::InvalidBuffer(format!(
                    "Loop count {} exceeds {}",
                    n, MAX_LOOP_COUNT
                )));
            }
        }
        let queued = slot.queue.len() + state.pending_submits(voice);
        if queued >= MAX_QUEUED_BUFFERS {
            return Err(PetalMixError::QueueFull(queued));
        }

        Self::schedule(
            &mut state,
            operation,
            Target::Voice(voice),
            Change::Submit(clip.clone()),
        );
        Ok(())
    }

    pub(crate) fn start_voice(&self, voice: VoiceId, operation: OperationId) -> Result<()> {
        self.check_operation(operation)?;
        let mut state = self.lock_state();
        Self::voice_slot(&state, voice)?;
        Self::schedule(&mut state, operation, Target::Voice(voice), Change::Start);
        Ok(())
    }

    pub(crate) fn stop_voice(&self, voice: VoiceId, operation: OperationId) -> Result<()> {
        self.check_operation(operation)?;
        let mut state = self.lock_state();
        Self::voice_slot(&state, voice)?;
        Self::schedule(&mut state, operation, Target::Voice(voice), Change::Stop);
        Ok(())
    }

    pub(crate) fn set_volume(
        &self,
        target: Target,
        volume: f32,
        operation: OperationId,
    ) -> Result<()> {
        if !volume.is_finite() || volume.abs() > MAX_VOLUME_LEVEL {
            return Err(PetalMixError::InvalidParameter(format!(
                "Volume must be finite and within ±{}, got {}",
                MAX_VOLUME_LEVEL, volume
            )));
        }
        self.check_operation(operation)?;
        let mut state = self.lock_state();
        match target {
            Target::Master if state.master.is_none() => {
                return Err(PetalMixError::Engine("No master output".into()));
            }
            Target::Master => {}
            Target::Voice(voice) => {
                Self::voice_slot(&state, voice)?;
            }
        }
        Self::schedule(&mut state, operation, target, Change::Volume(volume));
        Ok(())
    }

    pub(crate) fn volume(&self, target: Target) -> Result<f32> {
        let state = self.lock_state();
        match target {
            Target::Master => state
                .master
                .as_ref()
                .map(|m| m.volume)
                .ok_or_else(|| PetalMixError::Engine("No master output".into())),
            Target::Voice(voice) => Self::voice_slot(&state, voice).map(|v| v.volume),
        }
    }

    /// Sets the playback speed. Out-of-range ratios are clamped to
    /// `[MIN_FREQUENCY_RATIO, max_frequency_ratio]`.
    pub(crate) fn set_frequency_ratio(
        &self,
        voice: VoiceId,
        ratio: f32,
        operation: OperationId,
    ) -> Result<()> {
        self.check_operation(operation)?;
        let mut state = self.lock_state();
        let clamped = Self::clamp_ratio(Self::voice_slot(&state, voice)?, ratio)?;
        Self::schedule(
            &mut state,
            operation,
            Target::Voice(voice),
            Change::FrequencyRatio(clamped),
        );
        Ok(())
    }

    pub(crate) fn frequency_ratio(&self, voice: VoiceId) -> Result<f32> {
        let state = self.lock_state();
        Self::voice_slot(&state, voice).map(|v| v.frequency_ratio)
    }

    /// Replaces the voice's output matrix, laid out as `matrix[src + src_channels * dst]`.
    pub(crate) fn set_output_matrix(
        &self,
        voice: VoiceId,
        matrix: &[f32],
        operation: OperationId,
    ) -> Result<()> {
        self.check_operation(operation)?;
        let mut state = self.lock_state();
        Self::check_matrix(Self::voice_slot(&state, voice)?, matrix)?;
        Self::schedule(
            &mut state,
            operation,
            Target::Voice(voice),
            Change::OutputMatrix(matrix.to_vec()),
        );
        Ok(())
    }

    pub(crate) fn output_matrix(&self, voice: VoiceId) -> Result<Vec<f32>> {
        let state = self.lock_state();
        Self::voice_slot(&state, voice).map(|v| v.output_matrix.clone())
    }

    pub(crate) fn set_filter(
        &self,
        voice: VoiceId,
        params: FilterParams,
        operation: OperationId,
    ) -> Result<()> {
        self.check_operation(operation)?;
        let mut state = self.lock_state();
        Self::check_filter(Self::voice_slot(&state, voice)?, voice, params)?;
        Self::schedule(
            &mut state,
            operation,
            Target::Voice(voice),
            Change::Filter(params),
        );
        Ok(())
    }

    /// Output matrix, frequency ratio and optional filter in one step.
    ///
    /// Every argument is checked before anything is scheduled, so either all
    /// of the changes land (or wait on the same commit) or none do.
    pub(crate) fn set_effects(
        &self,
        voice: VoiceId,
        matrix: &[f32],
        ratio: f32,
        filter: Option<FilterParams>,
        operation: OperationId,
    ) -> Result<()> {
        self.check_operation(operation)?;
        let mut state = self.lock_state();
        let slot = Self::voice_slot(&state, voice)?;
        Self::check_matrix(slot, matrix)?;
        let clamped = Self::clamp_ratio(slot, ratio)?;
        if let Some(params) = filter {
            Self::check_filter(slot, voice, params)?;
        }

        let target = Target::Voice(voice);
        Self::schedule(
            &mut state,
            operation,
            target,
            Change::OutputMatrix(matrix.to_vec()),
        );
        Self::schedule(
            &mut state,
            operation,
            target,
            Change::FrequencyRatio(clamped),
        );
        if let Some(params) = filter {
            Self::schedule(&mut state, operation, target, Change::Filter(params));
        }
        Ok(())
    }

    fn check_matrix(slot: &VoiceSlot, matrix: &[f32]) -> Result<()> {
        let expected = slot.output_matrix.len();
        if matrix.len() != expected {
            return Err(PetalMixError::InvalidParameter(format!(
                "Output matrix needs {} coefficients, got {}",
                expected,
                matrix.len()
            )));
        }
        if matrix
            .iter()
            .any(|c| !c.is_finite() || c.abs() > MAX_VOLUME_LEVEL)
        {
            return Err(PetalMixError::InvalidParameter(
                "Output matrix coefficients must be finite".into(),
            ));
        }
        Ok(())
    }

    fn clamp_ratio(slot: &VoiceSlot, ratio: f32) -> Result<f32> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(PetalMixError::InvalidParameter(format!(
                "Frequency ratio must be positive, got {}",
                ratio
            )));
        }
        Ok(ratio.clamp(MIN_FREQUENCY_RATIO, slot.max_frequency_ratio))
    }

    fn check_filter(slot: &VoiceSlot, voice: VoiceId, params: FilterParams) -> Result<()> {
        if !params.frequency.is_finite() || !(0.0..=1.0).contains(&params.frequency) {
            return Err(PetalMixError::InvalidParameter(format!(
                "Filter frequency must be within [0, 1], got {}",
                params.frequency
            )));
        }
        if !slot.use_filter {
            return Err(PetalMixError::InvalidParameter(format!(
                "Voice {} was created without a filter",
                voice
            )));
        }
        Ok(())
    }

    pub(crate) fn filter(&self, voice: VoiceId) -> Result<FilterParams> {
        let state = self.lock_state();
        Self::voice_slot(&state, voice).map(|v| v.filter)
    }

    /// Marks the last queued buffer as the end of its stream. Returns whether
    /// there was a buffer to mark.
    pub(crate) fn discontinuity(&self, voice: VoiceId) -> Result<bool> {
        let mut state = self.lock_state();
        let slot = state
            .voices
            .get_mut(&voice)
            .ok_or(PetalMixError::InvalidHandle(voice.raw()))?;
        match slot.queue.back_mut() {
            Some(last) => {
                last.end_of_stream = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drops every queued buffer except one that has already started playing.
    /// A buffer-end notification for each dropped buffer is delivered by the
    /// next processing pass. Returns the number of buffers dropped.
    pub(crate) fn flush(&self, voice: VoiceId) -> Result<usize> {
        let mut state = self.lock_state();
        let slot = state
            .voices
            .get_mut(&voice)
            .ok_or(PetalMixError::InvalidHandle(voice.raw()))?;

        let keep = match slot.queue.front() {
            Some(front) if front.started => 1,
            _ => 0,
        };
        let flushed: Vec<_> = slot.queue.drain(keep..).collect();
        let callback = slot.callback.clone();

        let count = flushed.len();
        state.deferred.extend(flushed.into_iter().map(|buffer| {
            Notification::new(
                voice,
                &callback,
                NotificationKind::BufferEnd(buffer.clip.context()),
            )
        }));
        log::debug!("Voice {} flushed {} buffer(s)", voice, count);
        Ok(count)
    }

    pub(crate) fn voice_state(&self, voice: VoiceId) -> Result<VoiceState> {
        let state = self.lock_state();
        Self::voice_slot(&state, voice).map(|v| v.state())
    }

    /// Applies every change tagged with `operation` at once. Returns how many
    /// changes were applied.
    pub(crate) fn commit(&self, operation: OperationId) -> Result<usize> {
        if operation.is_immediate() {
            log::debug!("Commit of the immediate operation set ignored");
            return Ok(0);
        }
        self.check_operation(operation)?;

        let mut state = self.lock_state();
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
            .into_iter()
            .partition(|c| c.operation == operation);
        state.pending = rest;

        let applied = matching.len();
        for change in matching {
            state.apply(change.target, change.change);
        }
        log::debug!("Committed {}: {} change(s)", operation, applied);
        Ok(applied)
    }

    pub(crate) fn commit_all(&self) -> usize {
        let mut state = self.lock_state();
        let pending = std::mem::take(&mut state.pending);
        let applied = pending.len();
        for change in pending {
            state.apply(change.target, change.change);
        }
        log::debug!("Committed all operation sets: {} change(s)", applied);
        applied
    }

    pub(crate) fn pending_changes(&self) -> usize {
        self.lock_state().pending.len()
    }
}
