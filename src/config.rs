//! Configuration for PetalMix

use crate::error::{PetalMixError, Result};
use crate::notifier::VoiceCallback;
use crate::spatial::{EmitterSettings, SPEED_OF_SOUND};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lowest playback speed a voice can be set to.
pub const MIN_FREQUENCY_RATIO: f32 = 1.0 / 1024.0;

/// Highest `max_frequency_ratio` a voice may be created with.
pub const MAX_FREQUENCY_RATIO: f32 = 1024.0;

/// Default `max_frequency_ratio` for new voices.
pub const DEFAULT_FREQUENCY_RATIO: f32 = 2.0;

/// Where rendered audio goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputBackend {
    /// A processing thread renders into a ring buffer drained by the default cpal output device
    #[default]
    Cpal,
    /// Nothing is opened; the application pulls audio with [`crate::PetalMixEngine::render`]
    Headless,
}

/// Configuration descriptor for a PetalMix engine
#[derive(Debug, Clone)]
pub struct PetalMixEngineDesc {
    /// Sample rate of the mix; voices must use the same rate
    pub sample_rate: u32,
    /// Master output channel count (1 or 2)
    pub channels: u16,
    /// Frames rendered per processing pass
    pub block_size: usize,
    /// Idle time of the processing thread when the output buffer is full
    pub buffer_duration: Duration,
    /// Speed of sound used for Doppler, in world units per second
    pub speed_of_sound: f32,
    /// Number of batch operation ids available alongside the immediate one
    pub max_operation_sets: u32,
    /// Maximum number of live source voices
    pub max_voices: usize,
    pub output: OutputBackend,
}

impl Default for PetalMixEngineDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            block_size: 512,
            buffer_duration: Duration::from_millis(10),
            speed_of_sound: SPEED_OF_SOUND,
            max_operation_sets: 32,
            max_voices: 64,
            output: OutputBackend::Cpal,
        }
    }
}

impl PetalMixEngineDesc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headless defaults, for tests and offline rendering.
    pub fn headless() -> Self {
        Self::default().output(OutputBackend::Headless)
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn buffer_duration(mut self, duration: Duration) -> Self {
        self.buffer_duration = duration;
        self
    }

    pub fn speed_of_sound(mut self, speed: f32) -> Self {
        self.speed_of_sound = speed;
        self
    }

    pub fn max_operation_sets(mut self, max: u32) -> Self {
        self.max_operation_sets = max;
        self
    }

    pub fn max_voices(mut self, max: usize) -> Self {
        self.max_voices = max;
        self
    }

    pub fn output(mut self, output: OutputBackend) -> Self {
        self.output = output;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(PetalMixError::Configuration(
                "Sample rate must be non-zero".into(),
            ));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(PetalMixError::Configuration(format!(
                "Master output supports 1 or 2 channels, got {}",
                self.channels
            )));
        }
        if self.block_size == 0 {
            return Err(PetalMixError::Configuration(
                "Block size must be non-zero".into(),
            ));
        }
        if !self.speed_of_sound.is_finite() || self.speed_of_sound <= 0.0 {
            return Err(PetalMixError::Configuration(format!(
                "Speed of sound must be positive, got {}",
                self.speed_of_sound
            )));
        }
        if self.max_operation_sets == 0 {
            return Err(PetalMixError::Configuration(
                "At least one operation set is required".into(),
            ));
        }
        if self.max_voices == 0 {
            return Err(PetalMixError::Configuration(
                "At least one voice is required".into(),
            ));
        }
        Ok(())
    }
}

/// PCM layout a source voice accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for VoiceFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
        }
    }
}

impl VoiceFormat {
    pub const BITS_PER_SAMPLE: u16 = 32;

    /// Bytes per interleaved frame.
    pub fn block_align(&self) -> usize {
        self.channels as usize * (Self::BITS_PER_SAMPLE / 8) as usize
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.block_align()
    }
}

/// Creation parameters for a source voice.
#[derive(Clone)]
pub struct VoiceDesc {
    pub format: VoiceFormat,
    /// Upper bound for the frequency ratio (Doppler and pitch)
    pub max_frequency_ratio: f32,
    /// Route the voice through a one-pole low-pass driven by the spatial model
    pub use_filter: bool,
    pub emitter: EmitterSettings,
    /// Application callback invoked alongside the built-in notifier
    pub callback: Option<Arc<dyn VoiceCallback>>,
}

impl Default for VoiceDesc {
    fn default() -> Self {
        Self {
            format: VoiceFormat::default(),
            max_frequency_ratio: DEFAULT_FREQUENCY_RATIO,
            use_filter: false,
            emitter: EmitterSettings::default(),
            callback: None,
        }
    }
}

impl fmt::Debug for VoiceDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceDesc")
            .field("format", &self.format)
            .field("max_frequency_ratio", &self.max_frequency_ratio)
            .field("use_filter", &self.use_filter)
            .field("emitter", &self.emitter)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl VoiceDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: VoiceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn max_frequency_ratio(mut self, ratio: f32) -> Self {
        self.max_frequency_ratio = ratio;
        self
    }

    pub fn use_filter(mut self, enable: bool) -> Self {
        self.use_filter = enable;
        self
    }

    pub fn emitter(mut self, settings: EmitterSettings) -> Self {
        self.emitter = settings;
        self
    }

    pub fn callback(mut self, callback: Arc<dyn VoiceCallback>) -> Self {
        self.callback = Some(callback);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PetalMixEngineDesc::default().validate().is_ok());
        assert_eq!(PetalMixEngineDesc::headless().output, OutputBackend::Headless);
    }

    #[test]
    fn rejects_invalid_descs() {
        let bad = [
            PetalMixEngineDesc::headless().sample_rate(0),
            PetalMixEngineDesc::headless().channels(6),
            PetalMixEngineDesc::headless().block_size(0),
            PetalMixEngineDesc::headless().speed_of_sound(-1.0),
            PetalMixEngineDesc::headless().max_operation_sets(0),
            PetalMixEngineDesc::headless().max_voices(0),
        ];
        for desc in bad {
            assert!(matches!(
                desc.validate(),
                Err(PetalMixError::Configuration(_))
            ));
        }
    }

    #[test]
    fn mono_float_format_layout() {
        let format = VoiceFormat::default();
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.bytes_per_second(), 48000 * 4);
    }
}
