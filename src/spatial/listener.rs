use crate::math::{Pose, Vec3};

/// The single perceiving point of the scene.
///
/// One listener exists per engine. Voices hold a reference to it rather than
/// a copy, so every emitter is heard relative to the same pose.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioListener {
    pose: Pose,
}

impl AudioListener {
    pub fn new(position: Vec3) -> Self {
        Self {
            pose: Pose::new(position),
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn position(&self) -> Vec3 {
        self.pose.position()
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.pose.set_position(position);
    }

    pub fn set_position_2d(&mut self, x: f32, y: f32) {
        self.pose.set_position_2d(x, y);
    }
}
