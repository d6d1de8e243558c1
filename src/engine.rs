//! Audio engine for PetalMix

use crate::config::{
    MAX_FREQUENCY_RATIO, MIN_FREQUENCY_RATIO, OutputBackend, PetalMixEngineDesc, VoiceDesc,
};
use crate::device::Device;
use crate::error::{PetalMixError, Result};
use crate::master::MasterOutput;
use crate::math::Vec3;
use crate::notifier::{MAX_PENDING_EVENTS, PlaybackNotifier, VoiceCallback};
use crate::operation::{OperationId, OperationSetAllocator};
use crate::output::OutputStream;
use crate::spatial::{AudioListener, Emitter, SpatialContext};
use crate::voice::SourceVoice;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// State every voice of an engine shares.
pub(crate) struct EngineShared {
    pub(crate) device: Device,
    pub(crate) spatial: SpatialContext,
    pub(crate) master_channels: u16,
    listener: Mutex<AudioListener>,
    operation_sets: OperationSetAllocator,
}

impl EngineShared {
    pub(crate) fn listener(&self) -> MutexGuard<'_, AudioListener> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn commit_changes(&self, operation: OperationId) -> Result<usize> {
        self.device.commit(operation)
    }
}

/// Composition root: owns the device, the master output, the spatial
/// context and the shared listener, and creates source voices.
pub struct PetalMixEngine {
    desc: PetalMixEngineDesc,
    output: Option<OutputStream>,
    master: MasterOutput,
    shared: Arc<EngineShared>,
}

impl PetalMixEngine {
    /// Creates the engine and starts rendering.
    ///
    /// With [`OutputBackend::Cpal`] the default output device is opened; with
    /// [`OutputBackend::Headless`] audio is pulled through [`Self::render`].
    pub fn new(desc: PetalMixEngineDesc) -> Result<Self> {
        desc.validate()?;

        let device = Device::new(desc.sample_rate, desc.max_operation_sets, desc.max_voices);
        let master = MasterOutput::create(device.clone(), desc.channels)?;
        let spatial = SpatialContext::new(master.channel_mask(), desc.speed_of_sound)?;

        let shared = Arc::new(EngineShared {
            device: device.clone(),
            spatial,
            master_channels: master.channels(),
            listener: Mutex::new(AudioListener::default()),
            operation_sets: OperationSetAllocator::new(desc.max_operation_sets),
        });

        device.start();
        let output = match desc.output {
            OutputBackend::Cpal => Some(OutputStream::start(device, &desc)?),
            OutputBackend::Headless => None,
        };

        log::info!(
            "PetalMix engine created ({:?} output, {} Hz, {} channel(s))",
            desc.output,
            desc.sample_rate,
            desc.channels
        );

        Ok(Self {
            desc,
            output,
            master,
            shared,
        })
    }

    /// Mono 48 kHz voice with default emitter settings.
    pub fn create_source_voice(&self) -> Result<SourceVoice> {
        self.create_source_voice_with(VoiceDesc::default())
    }

    pub fn create_source_voice_with(&self, desc: VoiceDesc) -> Result<SourceVoice> {
        if !desc.max_frequency_ratio.is_finite()
            || !(MIN_FREQUENCY_RATIO..=MAX_FREQUENCY_RATIO).contains(&desc.max_frequency_ratio)
        {
            return Err(PetalMixError::InvalidParameter(format!(
                "Max frequency ratio must be within [{}, {}], got {}",
                MIN_FREQUENCY_RATIO, MAX_FREQUENCY_RATIO, desc.max_frequency_ratio
            )));
        }
        desc.emitter.validate()?;

        let (sender, receiver) = crossbeam_channel::bounded(MAX_PENDING_EVENTS);
        let forward = desc.callback.clone();
        let mut notifier = None;
        let id = self.shared.device.create_voice(
            desc.format,
            desc.max_frequency_ratio,
            desc.use_filter,
            |id| -> Arc<dyn VoiceCallback> {
                let created = Arc::new(PlaybackNotifier::new(id, sender, forward));
                notifier = Some(created.clone());
                created
            },
        )?;
        let notifier = notifier
            .ok_or_else(|| PetalMixError::Engine("Voice notifier was not created".into()))?;

        Ok(SourceVoice::new(
            self.shared.clone(),
            id,
            Emitter::new(desc.emitter),
            notifier,
            receiver,
            desc.format,
            desc.use_filter,
        ))
    }

    /// Atomically applies every pending change tagged with `operation`
    /// across all voices and the master. Returns the number of changes applied.
    pub fn commit_changes(&self, operation: OperationId) -> Result<usize> {
        self.shared.commit_changes(operation)
    }

    /// Applies every pending change regardless of its operation set.
    pub fn commit_all(&self) -> usize {
        self.shared.device.commit_all()
    }

    /// Changes waiting on a commit.
    pub fn pending_changes(&self) -> usize {
        self.shared.device.pending_changes()
    }

    /// Next batch id, round-robin over `1..=max_operation_sets`.
    pub fn next_operation_set(&self) -> OperationId {
        self.shared.operation_sets.next()
    }

    pub fn get_volume(&self) -> f32 {
        self.master.get_volume()
    }

    pub fn set_volume(&self, volume: f32, operation: OperationId) -> Result<()> {
        self.master.set_volume(volume, operation)
    }

    pub fn master(&self) -> &MasterOutput {
        &self.master
    }

    pub fn spatial(&self) -> &SpatialContext {
        &self.shared.spatial
    }

    pub fn listener(&self) -> AudioListener {
        *self.shared.listener()
    }

    /// Moves the shared listener to `(x, y, 0)`.
    pub fn set_listener_position(&self, x: f32, y: f32) {
        self.shared.listener().set_position_2d(x, y);
    }

    pub fn set_listener_position_3d(&self, position: Vec3) {
        self.shared.listener().set_position(position);
    }

    /// Runs one processing pass into `out` (interleaved master channels).
    ///
    /// Only available on headless engines; cpal engines render on their own thread.
    pub fn render(&self, out: &mut [f32]) -> Result<usize> {
        if self.desc.output != OutputBackend::Headless {
            return Err(PetalMixError::Engine(
                "render() is only available on headless engines".into(),
            ));
        }
        let channels = self.master.channels() as usize;
        if out.len() % channels != 0 {
            return Err(PetalMixError::InvalidParameter(format!(
                "Output length {} is not a multiple of {} channel(s)",
                out.len(),
                channels
            )));
        }
        Ok(self.shared.device.render(out))
    }

    /// Restarts rendering after [`Self::stop`].
    pub fn start(&mut self) -> Result<()> {
        if self.shared.device.is_running() {
            return Ok(());
        }
        self.shared.device.start();
        if self.desc.output == OutputBackend::Cpal {
            self.output = Some(OutputStream::start(self.shared.device.clone(), &self.desc)?);
        }
        log::info!("PetalMix engine started");
        Ok(())
    }

    /// Stops the output backend, then the device. Voices keep their queues.
    pub fn stop(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.stop();
        }
        if self.shared.device.is_running() {
            self.shared.device.stop();
            log::info!("PetalMix engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.device.is_running()
            && self.output.as_ref().is_none_or(OutputStream::is_running)
    }

    /// Frames handed to the audio device so far; always 0 for headless engines.
    pub fn frames_rendered(&self) -> usize {
        self.output.as_ref().map_or(0, OutputStream::frames_rendered)
    }

    pub fn desc(&self) -> &PetalMixEngineDesc {
        &self.desc
    }
}

impl Drop for PetalMixEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoiceFormat;

    fn headless() -> PetalMixEngine {
        PetalMixEngine::new(PetalMixEngineDesc::headless().max_operation_sets(4)).unwrap()
    }

    #[test]
    fn headless_engine_starts_running() {
        let engine = headless();
        assert!(engine.is_running());
        assert_eq!(engine.master().channels(), 2);
        assert_eq!(engine.get_volume(), 1.0);
        assert_eq!(engine.frames_rendered(), 0);
    }

    #[test]
    fn invalid_desc_aborts_construction() {
        let result = PetalMixEngine::new(PetalMixEngineDesc::headless().channels(0));
        assert!(matches!(result, Err(PetalMixError::Configuration(_))));
    }

    #[test]
    fn operation_sets_cycle() {
        let engine = headless();
        let ids: Vec<u32> = (0..5).map(|_| engine.next_operation_set().raw()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 1]);
    }

    #[test]
    fn rejects_bad_voice_descs() {
        let engine = headless();
        assert!(engine
            .create_source_voice_with(VoiceDesc::new().max_frequency_ratio(0.0))
            .is_err());
        assert!(engine
            .create_source_voice_with(VoiceDesc::new().format(VoiceFormat {
                sample_rate: 44100,
                channels: 1,
            }))
            .is_err());
    }

    #[test]
    fn voice_limit_is_enforced() {
        let engine =
            PetalMixEngine::new(PetalMixEngineDesc::headless().max_voices(1)).unwrap();
        let first = engine.create_source_voice().unwrap();
        assert!(engine.create_source_voice().is_err());
        drop(first);
        assert!(engine.create_source_voice().is_ok());
    }

    #[test]
    fn stopped_engine_renders_silence() {
        let mut engine = headless();
        engine.stop();
        assert!(!engine.is_running());
        let mut out = [1.0f32; 4];
        assert_eq!(engine.render(&mut out).unwrap(), 0);
        assert_eq!(out, [0.0; 4]);

        engine.start().unwrap();
        assert_eq!(engine.render(&mut out).unwrap(), 2);
    }

    #[test]
    fn render_rejects_partial_frames() {
        let engine = headless();
        let mut out = [0.0f32; 3];
        assert!(matches!(
            engine.render(&mut out),
            Err(PetalMixError::InvalidParameter(_))
        ));
    }
}
