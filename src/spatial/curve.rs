//! Piecewise-linear distance curves.

use crate::error::{PetalMixError, Result};

/// A single point on a [`DistanceCurve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    /// Normalized distance (world distance divided by the curve distance scaler)
    pub distance: f32,
    /// Curve value at this distance
    pub value: f32,
}

impl CurvePoint {
    pub const fn new(distance: f32, value: f32) -> Self {
        Self { distance, value }
    }
}

/// Piecewise-linear curve over normalized distance.
///
/// Points start at distance 0 and are strictly increasing. Past the last
/// point the curve holds its final value.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceCurve {
    points: Vec<CurvePoint>,
}

impl DistanceCurve {
    pub fn new(points: Vec<CurvePoint>) -> Result<Self> {
        let Some(first) = points.first() else {
            return Err(PetalMixError::InvalidParameter(
                "Distance curve needs at least one point".into(),
            ));
        };

        if first.distance != 0.0 {
            return Err(PetalMixError::InvalidParameter(format!(
                "Distance curve must start at distance 0.0, got {}",
                first.distance
            )));
        }

        for point in &points {
            if !point.distance.is_finite() || !point.value.is_finite() || point.value < 0.0 {
                return Err(PetalMixError::InvalidParameter(format!(
                    "Invalid curve point {:?}",
                    point
                )));
            }
        }

        if points.windows(2).any(|pair| pair[1].distance <= pair[0].distance) {
            return Err(PetalMixError::InvalidParameter(
                "Distance curve points must be strictly increasing".into(),
            ));
        }

        Ok(Self { points })
    }

    /// Builds a curve from `(distance, value)` pairs.
    pub fn linear(pairs: &[(f32, f32)]) -> Result<Self> {
        Self::new(
            pairs
                .iter()
                .map(|&(distance, value)| CurvePoint::new(distance, value))
                .collect(),
        )
    }

    /// Direct-path low-pass curve: 1.0 at the emitter, 0.75 at one scaler unit and beyond.
    pub fn default_lpf_direct() -> Self {
        Self {
            points: vec![CurvePoint::new(0.0, 1.0), CurvePoint::new(1.0, 0.75)],
        }
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    pub fn evaluate(&self, normalized_distance: f32) -> f32 {
        let d = normalized_distance.max(0.0);

        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if d <= b.distance {
                let t = (d - a.distance) / (b.distance - a.distance);
                return a.value + (b.value - a.value) * t;
            }
        }

        self.points.last().map_or(1.0, |p| p.value)
    }
}

impl Default for DistanceCurve {
    fn default() -> Self {
        Self::default_lpf_direct()
    }
}

/// Volume falloff applied to the mix matrix.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum VolumeCurve {
    /// No attenuation within one scaler unit, `1 / d` beyond it.
    #[default]
    InverseDistance,
    /// Custom piecewise-linear falloff
    Custom(DistanceCurve),
}

impl VolumeCurve {
    pub fn evaluate(&self, normalized_distance: f32) -> f32 {
        match self {
            Self::InverseDistance => {
                if normalized_distance <= 1.0 {
                    1.0
                } else {
                    1.0 / normalized_distance
                }
            }
            Self::Custom(curve) => curve.evaluate(normalized_distance),
        }
    }
}
