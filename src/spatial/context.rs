use super::emitter::Emitter;
use crate::error::{PetalMixError, Result};
use crate::math::{Pose, Vec3};
use std::f32::consts::FRAC_PI_4;

/// Speed of sound in world units per second.
pub const SPEED_OF_SOUND: f32 = 343.5;

/// Below this distance the emitter is treated as sitting on the listener.
const MIN_DISTANCE: f32 = 1.0e-6;

/// Velocity components are clamped to this fraction of the speed of sound.
const MAX_DOPPLER_VELOCITY_FRACTION: f32 = 0.99;

/// Speaker layout of the mastering output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelMask(u32);

impl ChannelMask {
    pub const FRONT_LEFT: u32 = 0x1;
    pub const FRONT_RIGHT: u32 = 0x2;
    pub const FRONT_CENTER: u32 = 0x4;

    pub const MONO: Self = Self(Self::FRONT_CENTER);
    pub const STEREO: Self = Self(Self::FRONT_LEFT | Self::FRONT_RIGHT);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn channel_count(&self) -> u16 {
        self.0.count_ones() as u16
    }

    /// Default layout for a channel count, if one is supported.
    pub fn for_channels(channels: u16) -> Option<Self> {
        match channels {
            1 => Some(Self::MONO),
            2 => Some(Self::STEREO),
            _ => None,
        }
    }
}

/// Output of a single spatial calculation.
///
/// The gain of source channel `s` into destination channel `d` is stored at
/// `matrix[s + src_channels * d]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MixResult {
    pub src_channels: u16,
    pub dst_channels: u16,
    pub matrix: Vec<f32>,
    /// Playback speed multiplier, 1.0 = no shift
    pub doppler_ratio: f32,
    /// Direct-path low-pass coefficient, 1.0 = unfiltered
    pub lpf_direct_coefficient: f32,
    /// Emitter to listener distance in world units
    pub distance: f32,
    /// Distance attenuation folded into the matrix
    pub attenuation: f32,
}

impl MixResult {
    /// Gain of source channel `src` into destination channel `dst`.
    ///
    /// # Panics
    ///
    /// Panics if `src >= src_channels` or `dst >= dst_channels`.
    pub fn gain(&self, src: usize, dst: usize) -> f32 {
        self.try_gain(src, dst).unwrap_or_else(|| {
            panic!(
                "gain({}, {}) out of range for a {}x{} matrix",
                src, dst, self.src_channels, self.dst_channels
            )
        })
    }

    /// Like [`Self::gain`], but `None` for out-of-range channels.
    pub fn try_gain(&self, src: usize, dst: usize) -> Option<f32> {
        if src >= self.src_channels as usize || dst >= self.dst_channels as usize {
            return None;
        }
        self.matrix
            .get(src + self.src_channels as usize * dst)
            .copied()
    }
}

/// Process-wide spatialization state, bound to the master output's layout.
#[derive(Debug, Clone)]
pub struct SpatialContext {
    channel_mask: ChannelMask,
    speed_of_sound: f32,
}

impl SpatialContext {
    pub fn new(channel_mask: ChannelMask, speed_of_sound: f32) -> Result<Self> {
        if ChannelMask::for_channels(channel_mask.channel_count()) != Some(channel_mask) {
            return Err(PetalMixError::Spatialization(format!(
                "Unsupported channel mask {:#x} (only mono and stereo)",
                channel_mask.bits()
            )));
        }

        if !speed_of_sound.is_finite() || speed_of_sound <= 0.0 {
            return Err(PetalMixError::Spatialization(format!(
                "Speed of sound must be positive and finite, got {}",
                speed_of_sound
            )));
        }

        log::info!(
            "Spatial context initialized (channel mask: {:#x}, speed of sound: {})",
            channel_mask.bits(),
            speed_of_sound
        );

        Ok(Self {
            channel_mask,
            speed_of_sound,
        })
    }

    pub fn channel_mask(&self) -> ChannelMask {
        self.channel_mask
    }

    pub fn speed_of_sound(&self) -> f32 {
        self.speed_of_sound
    }

    /// Mono emitter into the master layout.
    pub fn compute_mix(&self, listener: &Pose, emitter: &Emitter) -> Result<MixResult> {
        self.compute_mix_channels(listener, emitter, 1, self.channel_mask.channel_count())
    }

    /// Computes gains, Doppler ratio and low-pass coefficient for one emitter.
    ///
    /// All source channels are treated as collocated at the emitter position.
    pub fn compute_mix_channels(
        &self,
        listener: &Pose,
        emitter: &Emitter,
        src_channels: u16,
        dst_channels: u16,
    ) -> Result<MixResult> {
        if src_channels == 0 {
            return Err(PetalMixError::Spatialization(
                "Source channel count must be at least 1".into(),
            ));
        }
        if !(1..=2).contains(&dst_channels) {
            return Err(PetalMixError::Spatialization(format!(
                "Unsupported destination channel count {}",
                dst_channels
            )));
        }
        if !listener.is_finite() {
            return Err(PetalMixError::Spatialization(format!(
                "Non-finite listener pose: {:?}",
                listener
            )));
        }
        if !emitter.pose().is_finite() {
            return Err(PetalMixError::Spatialization(format!(
                "Non-finite emitter pose: {:?}",
                emitter.pose()
            )));
        }

        let settings = emitter.settings();
        settings.validate().map_err(|e| {
            PetalMixError::Spatialization(format!("Invalid emitter settings: {}", e))
        })?;
        let offset = emitter.position() - listener.position();
        let distance = offset.length();

        let (attenuation, doppler_ratio, lpf_direct_coefficient, pan) = if distance <= MIN_DISTANCE
        {
            (1.0, 1.0, 1.0, 0.0)
        } else {
            let normalized = distance / settings.curve_distance_scaler;
            let attenuation = settings.volume_curve.evaluate(normalized).clamp(0.0, 1.0);
            let lpf = settings.lpf_direct_curve.evaluate(normalized).clamp(0.0, 1.0);
            let direction = offset / distance;
            let doppler = self.doppler_ratio(listener, emitter, direction);
            (attenuation, doppler, lpf, stereo_pan(listener, offset))
        };

        let (left, right) = constant_power_gains(pan);
        let src = src_channels as usize;
        let dst = dst_channels as usize;
        let mut matrix = vec![0.0; src * dst];
        for s in 0..src {
            if dst == 1 {
                matrix[s] = attenuation;
            } else {
                matrix[s] = left * attenuation;
                matrix[s + src] = right * attenuation;
            }
        }

        Ok(MixResult {
            src_channels,
            dst_channels,
            matrix,
            doppler_ratio,
            lpf_direct_coefficient,
            distance,
            attenuation,
        })
    }

    /// `direction` is the unit vector from the listener towards the emitter.
    fn doppler_ratio(&self, listener: &Pose, emitter: &Emitter, direction: Vec3) -> f32 {
        let c = self.speed_of_sound;
        let limit = c * MAX_DOPPLER_VELOCITY_FRACTION;
        let scaler = emitter.settings().doppler_scaler;

        let listener_approach = (listener.velocity().dot(direction) * scaler).clamp(-limit, limit);
        let emitter_approach =
            (-emitter.pose().velocity().dot(direction) * scaler).clamp(-limit, limit);

        (c + listener_approach) / (c - emitter_approach)
    }
}

/// Pan in [-1, 1] from the emitter's azimuth in the listener's horizontal plane.
fn stereo_pan(listener: &Pose, offset: Vec3) -> f32 {
    let x = offset.dot(listener.right());
    let z = offset.dot(listener.front());
    let planar = (x * x + z * z).sqrt();
    if planar <= MIN_DISTANCE {
        0.0
    } else {
        (x / planar).clamp(-1.0, 1.0)
    }
}

fn constant_power_gains(pan: f32) -> (f32, f32) {
    let angle = (pan + 1.0) * FRAC_PI_4;
    (angle.cos().clamp(0.0, 1.0), angle.sin().clamp(0.0, 1.0))
}
