use super::curve::{DistanceCurve, VolumeCurve};
use crate::error::{PetalMixError, Result};
use crate::math::{Pose, Vec3};

/// Per-emitter tuning of the spatial model.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterSettings {
    /// World distance that maps to 1.0 on the distance curves
    pub curve_distance_scaler: f32,
    /// Multiplier on emitter and listener velocity for Doppler (0.0 disables it)
    pub doppler_scaler: f32,
    /// Distance falloff of the mix matrix
    pub volume_curve: VolumeCurve,
    /// Distance curve for the direct-path low-pass coefficient
    pub lpf_direct_curve: DistanceCurve,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            curve_distance_scaler: 1.0,
            doppler_scaler: 1.0,
            volume_curve: VolumeCurve::InverseDistance,
            lpf_direct_curve: DistanceCurve::default_lpf_direct(),
        }
    }
}

impl EmitterSettings {
    pub fn curve_distance_scaler(mut self, scaler: f32) -> Self {
        self.curve_distance_scaler = scaler;
        self
    }

    pub fn doppler_scaler(mut self, scaler: f32) -> Self {
        self.doppler_scaler = scaler;
        self
    }

    pub fn volume_curve(mut self, curve: VolumeCurve) -> Self {
        self.volume_curve = curve;
        self
    }

    pub fn lpf_direct_curve(mut self, curve: DistanceCurve) -> Self {
        self.lpf_direct_curve = curve;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.curve_distance_scaler.is_finite() || self.curve_distance_scaler <= 0.0 {
            return Err(PetalMixError::Configuration(format!(
                "Curve distance scaler must be positive and finite, got {}",
                self.curve_distance_scaler
            )));
        }

        if !self.doppler_scaler.is_finite() || self.doppler_scaler < 0.0 {
            return Err(PetalMixError::Configuration(format!(
                "Doppler scaler must be non-negative and finite, got {}",
                self.doppler_scaler
            )));
        }

        Ok(())
    }
}

/// The point source a single voice is heard from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emitter {
    pose: Pose,
    settings: EmitterSettings,
}

impl Emitter {
    pub fn new(settings: EmitterSettings) -> Self {
        Self {
            pose: Pose::identity(),
            settings,
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn position(&self) -> Vec3 {
        self.pose.position()
    }

    pub fn settings(&self) -> &EmitterSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut EmitterSettings {
        &mut self.settings
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.pose.set_position(position);
    }

    pub fn set_position_2d(&mut self, x: f32, y: f32) {
        self.pose.set_position_2d(x, y);
    }
}
