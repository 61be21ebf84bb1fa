//! Pose extrapolation by closed-form integration of the motion state.
//!
//! Position advances with constant velocity (optionally constant
//! acceleration). Orientation advances by the rotation vector
//! `dt·ω (+ dt²/2·α)` mapped to a unit quaternion and applied in the
//! reference frame, i.e. multiplied on the left.

use glam::{Quat, Vec3};
use tether_data::Pose;

/// θ² below which `sin θ / θ` is replaced by `1 − θ²/6`.
fn taylor_threshold() -> f32 {
    (120.0 * f32::EPSILON).sqrt()
}

fn sinc_taylor(theta_sq: f32) -> f32 {
    1.0 - theta_sq / 6.0
}

fn sinc_exact(theta: f32) -> f32 {
    theta.sin() / theta
}

/// Hamilton product `a ⊗ b`.
pub fn hamilton_product(a: Quat, b: Quat) -> Quat {
    Quat::from_xyzw(
        a.x * b.w + a.w * b.x - a.z * b.y + a.y * b.z,
        a.y * b.w + a.z * b.x + a.w * b.y - a.x * b.z,
        a.z * b.w - a.y * b.x + a.x * b.y + a.w * b.z,
        a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
    )
}

/// Exponential map from a rotation vector (axis × angle) to a unit quaternion.
pub fn quaternion_exp(rotation: Vec3) -> Quat {
    let half = rotation * 0.5;
    let theta_sq = half.length_squared();
    let theta = theta_sq.sqrt();
    let scale = if theta_sq < taylor_threshold() {
        sinc_taylor(theta_sq)
    } else {
        sinc_exact(theta)
    };
    let v = half * scale;
    Quat::from_xyzw(v.x, v.y, v.z, theta.cos())
}

/// Predict `pose` forward by `dt_seconds` (backward if negative).
///
/// Only translation, rotation and timestamp change; velocity and
/// acceleration fields are carried over. NaN inputs propagate.
pub fn predict(pose: &Pose, dt_seconds: f64, include_acceleration: bool) -> Pose {
    let dt = dt_seconds as f32;

    let mut translation = pose.translation + pose.velocity * dt;
    let mut rotation_vector = pose.angular_velocity * dt;
    if include_acceleration {
        let half_dt_sq = dt * dt / 2.0;
        translation += pose.acceleration * half_dt_sq;
        rotation_vector += pose.angular_acceleration * half_dt_sq;
    }

    Pose {
        translation,
        rotation: hamilton_product(quaternion_exp(rotation_vector), pose.rotation),
        timestamp_ms: pose.timestamp_ms + dt_seconds * 1000.0,
        ..*pose
    }
}

/// Configured pose predictor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoseExtrapolator {
    include_acceleration: bool,
}

impl PoseExtrapolator {
    pub fn new(include_acceleration: bool) -> Self {
        Self {
            include_acceleration,
        }
    }

    pub fn includes_acceleration(&self) -> bool {
        self.include_acceleration
    }

    pub fn predict(&self, pose: &Pose, dt_seconds: f64) -> Pose {
        predict(pose, dt_seconds, self.include_acceleration)
    }
}
