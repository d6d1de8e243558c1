// Spatial audio module
//
// Point-emitter / point-listener model: distance attenuation, constant-power
// stereo panning, Doppler ratio and a direct-path low-pass coefficient.

mod context;
mod curve;
mod emitter;
mod listener;

// Public API
pub use context::{ChannelMask, MixResult, SPEED_OF_SOUND, SpatialContext};
pub use curve::{CurvePoint, DistanceCurve, VolumeCurve};
pub use emitter::{Emitter, EmitterSettings};
pub use listener::AudioListener;
