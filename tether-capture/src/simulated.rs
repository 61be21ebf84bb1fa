//! Simulated tracking + depth rig.
//!
//! Stands in for hardware: a pose-only tracking device and a depth device
//! rigidly mounted on it follow a shared circular trajectory past a static
//! scene. Depth clouds are the scene expressed in the depth sensor's frame
//! at capture time, so a correct fusion places them back on the scene.
//!
//! Time is virtual by default (frames are produced as fast as they are
//! polled, one capture per poll); enable pacing with
//! [`SimulatedProvider::realtime`]. Paced devices drop captures that a newer
//! one has superseded by the time they are polled.

use crate::device::{DeviceError, DeviceInfo, DevicePipeline, DeviceProvider, FrameSet};
use glam::{Mat4, Quat, Vec3};
use image::{GrayImage, Luma, Rgb, RgbImage};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tether_data::{ExtrinsicTransform, PointCloud, Pose, TextureCoordinate, Vertex};
use tracing::{debug, info};

/// Capture times closer than this (ms) are delivered in one frame set.
const SAME_TICK_MS: f64 = 1e-6;

/// Texture size of simulated color and infrared frames.
const TEXTURE_SIZE: (u32, u32) = (16, 12);

/// Device motion: an orbit in the XZ plane while yawing about +Y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularTrajectory {
    /// Orbit radius in meters.
    pub radius: f32,
    /// Orbit and yaw rate in rad/s.
    pub angular_rate: f32,
    /// Constant Y coordinate in meters.
    pub height: f32,
}

impl Default for CircularTrajectory {
    fn default() -> Self {
        Self {
            radius: 1.0,
            angular_rate: 0.5,
            height: 1.2,
        }
    }
}

impl CircularTrajectory {
    /// Exact pose (with derivatives) at `seconds` on the host clock.
    pub fn pose_at(&self, seconds: f64) -> Pose {
        let r = self.radius as f64;
        let w = self.angular_rate as f64;
        let theta = w * seconds;
        let (s, c) = theta.sin_cos();

        let translation = Vec3::new((r * c) as f32, self.height, (r * s) as f32);
        let velocity = Vec3::new((-r * w * s) as f32, 0.0, (r * w * c) as f32);
        let acceleration = Vec3::new((-r * w * w * c) as f32, 0.0, (-r * w * w * s) as f32);

        Pose::new(translation, Quat::from_rotation_y(theta as f32), seconds * 1000.0)
            .with_velocity(velocity)
            .with_acceleration(acceleration)
            .with_angular_velocity(Vec3::new(0.0, self.angular_rate, 0.0))
    }
}

/// Static world points with the texture coordinates they carry.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedScene {
    pub points: Vec<Vec3>,
    pub texture_coordinates: Vec<TextureCoordinate>,
}

impl SimulatedScene {
    /// Points on the inside of a vertical cylinder centered on the origin.
    pub fn cylinder(radius: f32, height: f32, columns: usize, rows: usize) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(2);
        let mut points = Vec::with_capacity(columns * rows);
        let mut texture_coordinates = Vec::with_capacity(columns * rows);

        for row in 0..rows {
            let v = row as f32 / (rows - 1) as f32;
            for col in 0..columns {
                let u = col as f32 / columns as f32;
                let angle = u * std::f32::consts::TAU;
                points.push(Vec3::new(radius * angle.cos(), v * height, radius * angle.sin()));
                texture_coordinates.push(TextureCoordinate::new(u, v));
            }
        }

        Self {
            points,
            texture_coordinates,
        }
    }
}

impl Default for SimulatedScene {
    fn default() -> Self {
        Self::cylinder(4.0, 2.5, 64, 16)
    }
}

/// Shared model behind every simulated device.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRig {
    pub trajectory: CircularTrajectory,
    /// Depth sensor pose in the tracking frame.
    pub extrinsic: ExtrinsicTransform,
    pub scene: SimulatedScene,
}

impl SimulatedRig {
    /// World placement of the depth sensor at `seconds`.
    pub fn world_from_depth(&self, seconds: f64) -> Mat4 {
        let pose = self.trajectory.pose_at(seconds);
        Mat4::from_rotation_translation(pose.rotation, pose.translation) * self.extrinsic.matrix()
    }

    /// The scene as the depth sensor sees it at `seconds`.
    pub fn depth_cloud_at(
        &self,
        seconds: f64,
        timestamp_ms: f64,
        frame_number: u64,
    ) -> Result<PointCloud, DeviceError> {
        let pose = self.trajectory.pose_at(seconds);
        let tracking_from_world =
            Mat4::from_rotation_translation(pose.rotation, pose.translation).inverse();
        let depth_from_world = self.extrinsic.inverse().matrix() * tracking_from_world;
        let vertices = self
            .scene
            .points
            .iter()
            .map(|p| Vertex::from(depth_from_world.transform_point3(*p)))
            .collect();
        Ok(PointCloud::new(
            vertices,
            self.scene.texture_coordinates.clone(),
            timestamp_ms,
            frame_number,
        )?)
    }
}

/// Texture stream of a simulated depth device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedTexture {
    None,
    Color,
    Infrared,
}

/// Streams and timing of one simulated device.
#[derive(Debug, Clone)]
pub struct SimulatedDeviceConfig {
    pub serial: String,
    pub name: String,
    pub pose_rate_hz: Option<f64>,
    pub depth_rate_hz: Option<f64>,
    /// Delivered alongside each depth frame.
    pub texture: SimulatedTexture,
    /// Delay between capture and delivery.
    pub latency_ms: f64,
    /// Device clock minus host clock.
    pub clock_offset_ms: f64,
    /// Fail with a stream fault after this many frame sets.
    pub fail_after: Option<u64>,
}

impl SimulatedDeviceConfig {
    /// Pose-only tracking device at 200 Hz.
    pub fn tracking(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            name: "Simulated Tracking Camera".to_string(),
            pose_rate_hz: Some(200.0),
            depth_rate_hz: None,
            texture: SimulatedTexture::None,
            latency_ms: 2.0,
            clock_offset_ms: 0.0,
            fail_after: None,
        }
    }

    /// Depth + color device at 30 Hz.
    pub fn depth(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            name: "Simulated Depth Camera".to_string(),
            pose_rate_hz: None,
            depth_rate_hz: Some(30.0),
            texture: SimulatedTexture::Color,
            latency_ms: 30.0,
            clock_offset_ms: 0.0,
            fail_after: None,
        }
    }

    pub fn with_texture(mut self, texture: SimulatedTexture) -> Self {
        self.texture = texture;
        self
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_clock_offset(mut self, clock_offset_ms: f64) -> Self {
        self.clock_offset_ms = clock_offset_ms;
        self
    }

    pub fn failing_after(mut self, frame_sets: u64) -> Self {
        self.fail_after = Some(frame_sets);
        self
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::new(self.serial.clone(), self.name.clone())
    }
}

/// Provider over a fixed set of simulated devices sharing one rig.
pub struct SimulatedProvider {
    rig: Arc<SimulatedRig>,
    devices: Vec<SimulatedDeviceConfig>,
    realtime: bool,
}

impl SimulatedProvider {
    pub fn new(rig: SimulatedRig, devices: Vec<SimulatedDeviceConfig>) -> Self {
        Self {
            rig: Arc::new(rig),
            devices,
            realtime: false,
        }
    }

    /// One tracking camera plus one depth camera, the usual pairing.
    pub fn tracking_and_depth(rig: SimulatedRig) -> Self {
        Self::new(
            rig,
            vec![
                SimulatedDeviceConfig::tracking("SIM-T265-0001"),
                SimulatedDeviceConfig::depth("SIM-D435-0001"),
            ],
        )
    }

    /// Pace frame delivery against the wall clock.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn rig(&self) -> &SimulatedRig {
        &self.rig
    }
}

impl DeviceProvider for SimulatedProvider {
    fn query_devices(&mut self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(self.devices.iter().map(SimulatedDeviceConfig::info).collect())
    }

    #[tracing::instrument(skip_all, fields(serial = %device.serial))]
    fn start(&mut self, device: &DeviceInfo) -> Result<Box<dyn DevicePipeline>, DeviceError> {
        let config = self
            .devices
            .iter()
            .find(|c| c.serial == device.serial)
            .ok_or_else(|| DeviceError::DeviceNotFound(device.serial.clone()))?;

        if config.pose_rate_hz.is_none() && config.depth_rate_hz.is_none() {
            return Err(DeviceError::StartFailed {
                serial: config.serial.clone(),
                reason: "no pose or depth stream enabled".to_string(),
            });
        }

        info!(
            "Simulated device started: pose {:?} Hz, depth {:?} Hz, latency {} ms",
            config.pose_rate_hz, config.depth_rate_hz, config.latency_ms
        );
        Ok(Box::new(SimulatedPipeline::new(
            config.clone(),
            Arc::clone(&self.rig),
            self.realtime,
        )))
    }
}

/// A running simulated device.
pub struct SimulatedPipeline {
    info: DeviceInfo,
    config: SimulatedDeviceConfig,
    rig: Arc<SimulatedRig>,
    realtime: bool,
    started: Instant,
    pose_index: u64,
    depth_index: u64,
    delivered: u64,
    stopped: bool,
}

impl SimulatedPipeline {
    pub fn new(config: SimulatedDeviceConfig, rig: Arc<SimulatedRig>, realtime: bool) -> Self {
        Self {
            info: config.info(),
            config,
            rig,
            realtime,
            started: Instant::now(),
            pose_index: 0,
            depth_index: 0,
            delivered: 0,
            stopped: false,
        }
    }

    fn capture_ms(index: u64, rate_hz: f64) -> f64 {
        index as f64 * 1000.0 / rate_hz
    }

    fn next_pose_capture_ms(&self) -> Option<f64> {
        self.config
            .pose_rate_hz
            .map(|hz| Self::capture_ms(self.pose_index, hz))
    }

    fn next_depth_capture_ms(&self) -> Option<f64> {
        self.config
            .depth_rate_hz
            .map(|hz| Self::capture_ms(self.depth_index, hz))
    }

    /// Host time of the next capture on any stream.
    fn next_capture_ms(&self) -> f64 {
        match (self.next_pose_capture_ms(), self.next_depth_capture_ms()) {
            (Some(pose), Some(depth)) => pose.min(depth),
            (Some(pose), None) => pose,
            (None, Some(depth)) => depth,
            (None, None) => f64::INFINITY,
        }
    }

    /// Latest capture index of a `rate_hz` stream delivered by `now_ms`.
    fn newest_due(index: u64, rate_hz: f64, now_ms: f64) -> u64 {
        if now_ms < 0.0 {
            return index;
        }
        index.max((now_ms * rate_hz / 1000.0).floor() as u64)
    }

    /// Drop captures superseded by a newer one on the same stream, like a
    /// device frame queue discarding stale frames.
    fn skip_stale(&mut self) {
        let now_ms = self.started.elapsed().as_secs_f64() * 1000.0 - self.config.latency_ms;
        let (pose_before, depth_before) = (self.pose_index, self.depth_index);
        if let Some(hz) = self.config.pose_rate_hz {
            self.pose_index = Self::newest_due(self.pose_index, hz, now_ms);
        }
        if let Some(hz) = self.config.depth_rate_hz {
            self.depth_index = Self::newest_due(self.depth_index, hz, now_ms);
        }

        let dropped = (self.pose_index - pose_before) + (self.depth_index - depth_before);
        if dropped > 0 {
            debug!("{} dropped {} stale capture(s)", self.info.serial, dropped);
        }
    }

    /// Wall-clock time left until the next frame set is due.
    fn time_until_due(&self) -> Duration {
        let due_ms = self.next_capture_ms() + self.config.latency_ms;
        if !due_ms.is_finite() {
            return Duration::ZERO;
        }
        let due = Duration::from_secs_f64(due_ms.max(0.0) / 1000.0);
        due.saturating_sub(self.started.elapsed())
    }

    fn texture_frames(&self, frames: FrameSet) -> FrameSet {
        let (width, height) = TEXTURE_SIZE;
        let shade = (self.depth_index % 256) as u8;
        match self.config.texture {
            SimulatedTexture::None => frames,
            SimulatedTexture::Color => frames.with_color(RgbImage::from_fn(width, height, |x, y| {
                Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, shade])
            })),
            SimulatedTexture::Infrared => {
                frames.with_infrared(GrayImage::from_fn(width, height, |x, _| {
                    Luma([((x * 255 / width) as u8).wrapping_add(shade)])
                }))
            }
        }
    }

    fn emit(&mut self) -> Result<FrameSet, DeviceError> {
        if self.stopped {
            return Err(DeviceError::Stopped(self.info.serial.clone()));
        }
        if let Some(limit) = self.config.fail_after {
            if self.delivered >= limit {
                return Err(DeviceError::StreamFault {
                    serial: self.info.serial.clone(),
                    reason: format!("simulated fault after {} frame sets", limit),
                });
            }
        }

        let capture_ms = self.next_capture_ms();
        let device_ms = capture_ms + self.config.clock_offset_ms;
        let mut frames = FrameSet::new();

        if let Some(pose_ms) = self.next_pose_capture_ms() {
            if (pose_ms - capture_ms).abs() < SAME_TICK_MS {
                let mut pose = self.rig.trajectory.pose_at(pose_ms / 1000.0);
                pose.timestamp_ms = device_ms;
                frames = frames.with_pose(pose);
                self.pose_index += 1;
            }
        }

        if let Some(depth_ms) = self.next_depth_capture_ms() {
            if (depth_ms - capture_ms).abs() < SAME_TICK_MS {
                let cloud =
                    self.rig
                        .depth_cloud_at(depth_ms / 1000.0, device_ms, self.depth_index + 1)?;
                frames = self.texture_frames(frames.with_point_cloud(cloud));
                self.depth_index += 1;
            }
        }

        self.delivered += 1;
        debug!(
            "{} delivered frame set {} captured at {:.3} ms",
            self.info.serial, self.delivered, device_ms
        );
        Ok(frames)
    }
}

impl DevicePipeline for SimulatedPipeline {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn wait_for_frames(&mut self) -> Result<FrameSet, DeviceError> {
        if self.realtime && !self.stopped {
            self.skip_stale();
            thread::sleep(self.time_until_due());
        }
        self.emit()
    }

    fn try_wait_for_frames(&mut self, timeout: Duration) -> Result<Option<FrameSet>, DeviceError> {
        if self.realtime && !self.stopped {
            self.skip_stale();
            let remaining = self.time_until_due();
            if remaining > timeout {
                thread::sleep(timeout);
                return Ok(None);
            }
            thread::sleep(remaining);
        }
        self.emit().map(Some)
    }

    fn stop(&mut self) {
        if !self.stopped {
            info!(
                "Simulated device {} stopped after {} frame sets",
                self.info.serial, self.delivered
            );
        }
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(config: SimulatedDeviceConfig) -> SimulatedPipeline {
        SimulatedPipeline::new(config, Arc::new(SimulatedRig::default()), false)
    }

    #[test]
    fn test_trajectory_velocity_matches_finite_difference() {
        let trajectory = CircularTrajectory::default();
        let h = 1e-3;
        let a = trajectory.pose_at(2.0);
        let b = trajectory.pose_at(2.0 + h);
        let numeric = (b.translation - a.translation) / h as f32;
        assert!(numeric.abs_diff_eq(a.velocity, 1e-3));
        assert!(a.is_normalized());
    }

    #[test]
    fn test_tracking_device_emits_poses_at_rate() {
        let mut tracking = pipeline(SimulatedDeviceConfig::tracking("t"));
        let stamps: Vec<f64> = (0..4)
            .map(|_| tracking.wait_for_frames().unwrap().pose.unwrap().timestamp_ms)
            .collect();
        assert_eq!(stamps, vec![0.0, 5.0, 10.0, 15.0]);
    }

    #[test]
    fn test_depth_device_emits_textured_clouds() {
        let mut depth = pipeline(SimulatedDeviceConfig::depth("d"));
        let first = depth.wait_for_frames().unwrap();
        let second = depth.wait_for_frames().unwrap();

        assert!(first.pose.is_none());
        assert!(first.color.is_some());
        let cloud = second.point_cloud.unwrap();
        assert_eq!(cloud.frame_number(), 2);
        assert!((cloud.timestamp_ms() - 1000.0 / 30.0).abs() < 1e-9);
        assert_eq!(cloud.len(), SimulatedScene::default().points.len());
    }

    #[test]
    fn test_infrared_texture_when_no_color() {
        let mut depth =
            pipeline(SimulatedDeviceConfig::depth("d").with_texture(SimulatedTexture::Infrared));
        let frames = depth.wait_for_frames().unwrap();
        assert!(frames.color.is_none());
        assert!(frames.infrared.is_some());
    }

    #[test]
    fn test_depth_cloud_reprojects_onto_scene() {
        let rig = SimulatedRig::default();
        let cloud = rig.depth_cloud_at(3.7, 3700.0, 1).unwrap();
        let world_from_depth = rig.world_from_depth(3.7);
        for (vertex, point) in cloud.positions().zip(&rig.scene.points) {
            assert!(world_from_depth.transform_point3(vertex).abs_diff_eq(*point, 1e-4));
        }
    }

    #[test]
    fn test_combined_device_bundles_coincident_captures() {
        let mut config = SimulatedDeviceConfig::tracking("combo");
        config.depth_rate_hz = Some(100.0);
        let mut combo = pipeline(config);

        // t = 0 ms: both streams fire together.
        let first = combo.wait_for_frames().unwrap();
        assert!(first.pose.is_some() && first.point_cloud.is_some());
        // t = 5 ms: pose only.
        let second = combo.wait_for_frames().unwrap();
        assert!(second.pose.is_some() && second.point_cloud.is_none());
    }

    #[test]
    fn test_clock_offset_shifts_timestamps() {
        let mut tracking =
            pipeline(SimulatedDeviceConfig::tracking("t").with_clock_offset(250.0));
        let pose = tracking.wait_for_frames().unwrap().pose.unwrap();
        assert_eq!(pose.timestamp_ms, 250.0);
    }

    #[test]
    fn test_fault_after_limit() {
        let mut tracking = pipeline(SimulatedDeviceConfig::tracking("t").failing_after(2));
        assert!(tracking.wait_for_frames().is_ok());
        assert!(tracking.wait_for_frames().is_ok());
        assert!(matches!(
            tracking.wait_for_frames(),
            Err(DeviceError::StreamFault { .. })
        ));
    }

    #[test]
    fn test_provider_rejects_unknown_and_streamless_devices() {
        let mut silent = SimulatedDeviceConfig::tracking("silent");
        silent.pose_rate_hz = None;
        let mut provider = SimulatedProvider::new(SimulatedRig::default(), vec![silent]);

        let unknown = DeviceInfo::new("nope", "Nobody");
        assert!(matches!(
            provider.start(&unknown),
            Err(DeviceError::DeviceNotFound(_))
        ));
        let listed = provider.query_devices().unwrap();
        assert!(matches!(
            provider.start(&listed[0]),
            Err(DeviceError::StartFailed { .. })
        ));
    }

    #[test]
    fn test_realtime_pipeline_delivers_newest_due_capture() {
        let mut tracking = SimulatedPipeline::new(
            SimulatedDeviceConfig::tracking("t"),
            Arc::new(SimulatedRig::default()),
            true,
        );
        thread::sleep(Duration::from_millis(50));
        let pose = tracking.wait_for_frames().unwrap().pose.unwrap();
        // 2 ms latency: the capture at >= 45 ms is due, older ones are gone.
        assert!(pose.timestamp_ms >= 45.0, "got {} ms", pose.timestamp_ms);
    }

    #[test]
    fn test_realtime_try_wait_times_out_before_due() {
        let mut depth = SimulatedPipeline::new(
            SimulatedDeviceConfig::depth("d"),
            Arc::new(SimulatedRig::default()),
            true,
        );
        // First capture is due after the 30 ms latency.
        assert!(depth
            .try_wait_for_frames(Duration::from_millis(1))
            .unwrap()
            .is_none());
        let frames = depth
            .try_wait_for_frames(Duration::from_millis(500))
            .unwrap()
            .unwrap();
        assert!(frames.point_cloud.is_some());
    }

    #[test]
    fn test_stopped_pipeline_errors() {
        let mut tracking = pipeline(SimulatedDeviceConfig::tracking("t"));
        tracking.stop();
        assert!(matches!(
            tracking.wait_for_frames(),
            Err(DeviceError::Stopped(_))
        ));
    }
}
