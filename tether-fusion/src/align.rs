//! Temporal alignment between the depth and pose streams.

use tether_data::{PointCloud, Pose};

/// Seconds from the pose sample to the depth frame (both in milliseconds).
///
/// Positive when the depth frame is newer than the pose.
pub fn delta_seconds(pointcloud_timestamp_ms: f64, pose_timestamp_ms: f64) -> f64 {
    (pointcloud_timestamp_ms - pose_timestamp_ms) / 1000.0
}

/// Timestamps of the pair being fused and the offset between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    pub pointcloud_timestamp_ms: f64,
    pub pose_timestamp_ms: f64,
    pub delta_seconds: f64,
}

impl Alignment {
    pub fn between(cloud: &PointCloud, pose: &Pose) -> Self {
        let pointcloud_timestamp_ms = cloud.timestamp_ms();
        let pose_timestamp_ms = pose.timestamp_ms;
        Self {
            pointcloud_timestamp_ms,
            pose_timestamp_ms,
            delta_seconds: delta_seconds(pointcloud_timestamp_ms, pose_timestamp_ms),
        }
    }
}

/// Align the latest cloud and pose, if both have been seen.
pub fn align(cloud: Option<&PointCloud>, pose: Option<&Pose>) -> Option<Alignment> {
    match (cloud, pose) {
        (Some(cloud), Some(pose)) => Some(Alignment::between(cloud, pose)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn test_delta_seconds() {
        assert!((delta_seconds(100.0, 90.0) - 0.01).abs() < 1e-12);
        assert!((delta_seconds(90.0, 100.0) + 0.01).abs() < 1e-12);
        assert_eq!(delta_seconds(42.0, 42.0), 0.0);
    }

    #[test]
    fn test_align_requires_both_streams() {
        let cloud = PointCloud::empty(100.0, 1);
        let pose = Pose::new(Vec3::ZERO, Quat::IDENTITY, 90.0);

        assert!(align(None, None).is_none());
        assert!(align(Some(&cloud), None).is_none());
        assert!(align(None, Some(&pose)).is_none());

        let alignment = align(Some(&cloud), Some(&pose)).unwrap();
        assert_eq!(alignment.pointcloud_timestamp_ms, 100.0);
        assert_eq!(alignment.pose_timestamp_ms, 90.0);
        assert!((alignment.delta_seconds - 0.01).abs() < 1e-12);
    }
}
