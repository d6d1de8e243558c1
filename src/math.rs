//! Math types for PetalMix

pub use glam::Vec3;

/// Fixed front orientation shared by every pose.
pub const POSE_FRONT: Vec3 = Vec3::Z;

/// Fixed top orientation shared by every pose.
pub const POSE_TOP: Vec3 = Vec3::Y;

/// Position, orientation and velocity of a point in the scene.
///
/// Velocity is never set directly: every position update stores the delta
/// from the previous position as the new velocity. Orientation is pinned to
/// [`POSE_FRONT`] / [`POSE_TOP`]; the model does not rotate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    position: Vec3,
    front: Vec3,
    top: Vec3,
    velocity: Vec3,
}

impl Pose {
    /// Pose at `position` with zero velocity.
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            front: POSE_FRONT,
            top: POSE_TOP,
            velocity: Vec3::ZERO,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::ZERO)
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn top(&self) -> Vec3 {
        self.top
    }

    /// Position delta recorded by the last position update.
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Right-hand axis derived from the top and front vectors.
    pub fn right(&self) -> Vec3 {
        self.top.cross(self.front)
    }

    /// Moves the pose, recording the delta from the previous position as velocity.
    pub fn set_position(&mut self, position: Vec3) {
        self.velocity = position - self.position;
        self.position = position;
        self.front = POSE_FRONT;
        self.top = POSE_TOP;
    }

    /// Moves the pose within the z = 0 plane.
    pub fn set_position_2d(&mut self, x: f32, y: f32) {
        self.set_position(Vec3::new(x, y, 0.0));
    }

    pub fn distance(&self, other: &Self) -> f32 {
        self.position.distance(other.position)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.velocity.is_finite()
            && self.front.is_finite()
            && self.top.is_finite()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_is_position_delta() {
        let mut pose = Pose::identity();
        pose.set_position_2d(3.0, -2.0);
        pose.set_position_2d(4.5, 1.0);

        assert_eq!(pose.velocity(), Vec3::new(1.5, 3.0, 0.0));
        assert_eq!(pose.position(), Vec3::new(4.5, 1.0, 0.0));
    }

    #[test]
    fn first_update_measures_from_origin() {
        let mut pose = Pose::default();
        pose.set_position_2d(10.0, 0.0);
        assert_eq!(pose.velocity(), Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn orientation_is_fixed() {
        let mut pose = Pose::identity();
        pose.set_position(Vec3::new(1.0, 2.0, 3.0));

        assert_eq!(pose.front(), Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(pose.top(), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(pose.right(), Vec3::X);
    }

    #[test]
    fn non_finite_position_is_detected() {
        let mut pose = Pose::identity();
        assert!(pose.is_finite());
        pose.set_position_2d(f32::NAN, 0.0);
        assert!(!pose.is_finite());
    }
}
