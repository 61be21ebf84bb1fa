//! The fusion loop: poll every device, merge, align, predict, project, draw.
//!
//! The driver keeps the last point cloud, pose and texture it has seen, so
//! when one stream drops a frame the other keeps rendering against
//! stale-but-valid data. Nothing is drawn until both a cloud and a pose
//! exist.

use crate::align::{Alignment, align};
use crate::config::FusionConfig;
use crate::fault::PoseFaultMonitor;
use crate::predict::PoseExtrapolator;
use crate::project::project;
use crate::rate::RateMonitor;
use crate::render::{FrameRenderer, RenderError, RenderFrame};
use std::sync::Arc;
use std::time::Instant;
use tether_capture::{DeviceError, FrameBundle, StreamAggregator};
use tether_data::{ExtrinsicTransform, PointCloud, Pose, TextureImage};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that end the fusion loop.
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Pose at {timestamp_ms:.3} ms has a non-finite translation")]
    NonFinitePose { timestamp_ms: f64 },
}

/// Whether the driver has enough data to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// A point cloud or a pose has not been seen yet.
    NoData,
    /// Both a point cloud and a pose are held (possibly stale).
    DataReady,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Still missing a cloud or a pose; nothing was drawn.
    Waiting,
    /// A frame was drawn with the pose moved by `delta_seconds`.
    Rendered { delta_seconds: f64 },
}

/// Owns the current fused state and drives one render per iteration.
pub struct FusionDriver {
    extrinsic: Arc<ExtrinsicTransform>,
    extrapolator: PoseExtrapolator,
    predict_pose: bool,
    abort_on_nonfinite_pose: bool,
    point_cloud: Option<PointCloud>,
    pose: Option<Pose>,
    texture: Option<TextureImage>,
    rates: RateMonitor,
    faults: PoseFaultMonitor,
    render_count: u64,
}

impl FusionDriver {
    pub fn new(config: &FusionConfig, extrinsic: Arc<ExtrinsicTransform>) -> Self {
        Self {
            extrinsic,
            extrapolator: PoseExtrapolator::new(config.include_acceleration),
            predict_pose: config.predict_pose,
            abort_on_nonfinite_pose: config.abort_on_nonfinite_pose,
            point_cloud: None,
            pose: None,
            texture: None,
            rates: RateMonitor::new(Instant::now()),
            faults: PoseFaultMonitor::new(),
            render_count: 0,
        }
    }

    pub fn state(&self) -> DriverState {
        if self.alignment().is_some() {
            DriverState::DataReady
        } else {
            DriverState::NoData
        }
    }

    /// Offset between the held cloud and pose, once both exist.
    pub fn alignment(&self) -> Option<Alignment> {
        align(self.point_cloud.as_ref(), self.pose.as_ref())
    }

    pub fn point_cloud(&self) -> Option<&PointCloud> {
        self.point_cloud.as_ref()
    }

    pub fn pose(&self) -> Option<&Pose> {
        self.pose.as_ref()
    }

    pub fn texture(&self) -> Option<&TextureImage> {
        self.texture.as_ref()
    }

    pub fn extrinsic(&self) -> &ExtrinsicTransform {
        &self.extrinsic
    }

    /// Frames drawn since the driver was created.
    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    /// Non-finite poses seen since the driver was created.
    pub fn pose_fault_count(&self) -> u64 {
        self.faults.fault_count()
    }

    /// Fold one bundle into the current state. Absent streams leave the
    /// previous value in place.
    pub fn merge(&mut self, bundle: FrameBundle) -> Result<(), FusionError> {
        let FrameBundle {
            pipeline,
            mut frames,
        } = bundle;

        if let Some(texture) = frames.take_texture() {
            self.texture = Some(texture);
        }

        if let Some(cloud) = frames.point_cloud {
            debug!(
                "{}: depth frame {} at {:.3} ms ({} points)",
                pipeline,
                cloud.frame_number(),
                cloud.timestamp_ms(),
                cloud.len()
            );
            self.point_cloud = Some(cloud);
            self.rates.record_depth();
        }

        if let Some(pose) = frames.pose {
            if self.faults.check(&pose) && self.abort_on_nonfinite_pose {
                return Err(FusionError::NonFinitePose {
                    timestamp_ms: pose.timestamp_ms,
                });
            }
            self.pose = Some(pose);
            self.rates.record_pose();
        }

        Ok(())
    }

    /// Draw the current state if both a cloud and a pose are held.
    pub fn render<R>(&mut self, renderer: &mut R) -> Result<StepOutcome, FusionError>
    where
        R: FrameRenderer + ?Sized,
    {
        let (Some(cloud), Some(pose)) = (self.point_cloud.as_ref(), self.pose.as_ref()) else {
            return Ok(StepOutcome::Waiting);
        };

        let alignment = Alignment::between(cloud, pose);
        let world_pose = if self.predict_pose {
            self.extrapolator.predict(pose, alignment.delta_seconds)
        } else {
            *pose
        };
        let world = project(&world_pose, &self.extrinsic);

        debug!(
            "depth {:.3} ms, pose {:.3} ms, dt {:+.6} s",
            alignment.pointcloud_timestamp_ms, alignment.pose_timestamp_ms, alignment.delta_seconds
        );

        let (width, height) = renderer.viewport();
        let frame = RenderFrame {
            width,
            height,
            point_cloud: cloud,
            texture: self.texture.as_ref(),
            pose: &world_pose,
            extrinsic: &self.extrinsic,
            world,
            delta_seconds: alignment.delta_seconds,
        };
        renderer.draw(&frame)?;

        self.rates.record_render();
        self.render_count += 1;
        Ok(StepOutcome::Rendered {
            delta_seconds: alignment.delta_seconds,
        })
    }

    /// One iteration: poll every pipeline, merge all bundles, then render.
    pub fn step<R>(
        &mut self,
        aggregator: &mut StreamAggregator,
        renderer: &mut R,
    ) -> Result<StepOutcome, FusionError>
    where
        R: FrameRenderer + ?Sized,
    {
        for bundle in aggregator.poll_all()? {
            self.merge(bundle)?;
        }
        let outcome = self.render(renderer)?;
        self.rates.tick(Instant::now());
        Ok(outcome)
    }

    /// Iterate until the renderer reports it was closed.
    #[tracing::instrument(skip_all)]
    pub fn run<R>(
        &mut self,
        aggregator: &mut StreamAggregator,
        renderer: &mut R,
    ) -> Result<(), FusionError>
    where
        R: FrameRenderer + ?Sized,
    {
        info!(
            "Fusing {} pipeline(s): prediction {}, acceleration terms {}",
            aggregator.len(),
            if self.predict_pose { "on" } else { "off" },
            if self.extrapolator.includes_acceleration() { "on" } else { "off" }
        );
        while renderer.is_open() {
            self.step(aggregator, renderer)?;
        }
        info!("Renderer closed after {} frames", self.render_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};
    use image::RgbImage;
    use std::f32::consts::FRAC_PI_2;
    use tether_capture::scripted::ScriptedPipeline;
    use tether_capture::simulated::{SimulatedDeviceConfig, SimulatedProvider, SimulatedRig};
    use tether_capture::{FrameSet, PipelineId};
    use tether_data::{TextureCoordinate, Vertex};

    /// What the renderer was given for one draw.
    struct Drawn {
        width: u32,
        cloud_frame: u64,
        cloud: PointCloud,
        pose: Pose,
        world: crate::WorldTransform,
        delta_seconds: f64,
        textured: bool,
    }

    struct RecordingRenderer {
        frames: Vec<Drawn>,
        close_after: usize,
    }

    impl RecordingRenderer {
        fn new(close_after: usize) -> Self {
            Self {
                frames: Vec::new(),
                close_after,
            }
        }
    }

    impl FrameRenderer for RecordingRenderer {
        fn is_open(&self) -> bool {
            self.frames.len() < self.close_after
        }

        fn viewport(&self) -> (u32, u32) {
            (1280, 720)
        }

        fn draw(&mut self, frame: &RenderFrame<'_>) -> Result<(), RenderError> {
            self.frames.push(Drawn {
                width: frame.width,
                cloud_frame: frame.point_cloud.frame_number(),
                cloud: frame.point_cloud.clone(),
                pose: *frame.pose,
                world: frame.world,
                delta_seconds: frame.delta_seconds,
                textured: frame.texture.is_some(),
            });
            Ok(())
        }
    }

    fn driver(config: FusionConfig) -> FusionDriver {
        FusionDriver::new(&config, Arc::new(ExtrinsicTransform::default()))
    }

    fn cloud_at(ms: f64, frame_number: u64) -> PointCloud {
        PointCloud::new(
            vec![Vertex::new(0.0, 0.0, 1.0)],
            vec![TextureCoordinate::new(0.5, 0.5)],
            ms,
            frame_number,
        )
        .unwrap()
    }

    fn spinning_pose_at(ms: f64) -> Pose {
        Pose::new(Vec3::ZERO, Quat::IDENTITY, ms)
            .with_angular_velocity(Vec3::new(0.0, 0.0, FRAC_PI_2))
    }

    fn bundle(frames: FrameSet) -> FrameBundle {
        FrameBundle {
            pipeline: PipelineId(0),
            frames,
        }
    }

    #[test]
    fn test_depth_newer_than_pose_scenario() {
        let depth = ScriptedPipeline::new(
            "depth",
            vec![FrameSet::new()
                .with_point_cloud(cloud_at(100.0, 1))
                .with_color(RgbImage::new(4, 4))],
        );
        let tracking = ScriptedPipeline::new(
            "tracking",
            vec![FrameSet::new().with_pose(spinning_pose_at(90.0))],
        );
        let mut aggregator = StreamAggregator::new(vec![Box::new(depth), Box::new(tracking)]);
        let mut renderer = RecordingRenderer::new(1);
        let mut driver = driver(FusionConfig::default());

        let outcome = driver.step(&mut aggregator, &mut renderer).unwrap();
        let StepOutcome::Rendered { delta_seconds } = outcome else {
            panic!("expected a render, got {outcome:?}");
        };
        assert!((delta_seconds - 0.01).abs() < 1e-12);

        let drawn = &renderer.frames[0];
        let half_angle = 0.01 * FRAC_PI_2 / 2.0;
        let expected = Quat::from_xyzw(0.0, 0.0, half_angle.sin(), half_angle.cos());
        assert!(drawn.pose.rotation.abs_diff_eq(expected, 1e-7));
        assert!(drawn.world.rotation().abs_diff_eq(expected, 1e-7));
        assert!(drawn.textured);
        assert_eq!(drawn.width, 1280);
        assert_eq!(driver.state(), DriverState::DataReady);
    }

    #[test]
    fn test_no_pose_means_no_render() {
        let depth = ScriptedPipeline::new(
            "depth",
            (1..=3)
                .map(|i| FrameSet::new().with_point_cloud(cloud_at(i as f64 * 33.0, i)))
                .collect(),
        );
        let mut aggregator = StreamAggregator::new(vec![Box::new(depth)]);
        let mut renderer = RecordingRenderer::new(usize::MAX);
        let mut driver = driver(FusionConfig::default());

        for _ in 0..3 {
            let outcome = driver.step(&mut aggregator, &mut renderer).unwrap();
            assert_eq!(outcome, StepOutcome::Waiting);
        }
        assert!(renderer.frames.is_empty());
        assert_eq!(driver.state(), DriverState::NoData);
        assert_eq!(driver.point_cloud().unwrap().frame_number(), 3);
    }

    #[test]
    fn test_no_cloud_means_no_render() {
        let mut driver = driver(FusionConfig::default());
        driver
            .merge(bundle(FrameSet::new().with_pose(spinning_pose_at(5.0))))
            .unwrap();
        let mut renderer = RecordingRenderer::new(usize::MAX);
        assert_eq!(driver.render(&mut renderer).unwrap(), StepOutcome::Waiting);
        assert!(renderer.frames.is_empty());
    }

    #[test]
    fn test_stale_cloud_rendered_with_fresh_pose() {
        let mut depth_frames = vec![FrameSet::new().with_point_cloud(cloud_at(100.0, 1))];
        depth_frames.extend((0..4).map(|_| FrameSet::new()));
        let depth = ScriptedPipeline::new("depth", depth_frames);
        let tracking = ScriptedPipeline::new(
            "tracking",
            (0..5)
                .map(|i| FrameSet::new().with_pose(spinning_pose_at(100.0 + 5.0 * i as f64)))
                .collect(),
        );
        let mut aggregator = StreamAggregator::new(vec![Box::new(depth), Box::new(tracking)]);
        let mut renderer = RecordingRenderer::new(5);
        let mut driver = driver(FusionConfig::default());

        driver.run(&mut aggregator, &mut renderer).unwrap();

        assert_eq!(renderer.frames.len(), 5);
        for (i, drawn) in renderer.frames.iter().enumerate() {
            assert_eq!(drawn.cloud_frame, 1);
            // Pose advances 5 ms per iteration; prediction pulls it back.
            let expected_dt = -0.005 * i as f64;
            assert!((drawn.delta_seconds - expected_dt).abs() < 1e-12);
            let expected = Quat::from_rotation_z(FRAC_PI_2 * expected_dt as f32);
            assert!(drawn.pose.rotation.abs_diff_eq(expected, 1e-6));
        }
    }

    #[test]
    fn test_prediction_disabled_renders_raw_pose() {
        let config = FusionConfig {
            predict_pose: false,
            ..FusionConfig::default()
        };
        let mut driver = driver(config);
        driver
            .merge(bundle(FrameSet::new().with_point_cloud(cloud_at(100.0, 1))))
            .unwrap();
        driver
            .merge(bundle(FrameSet::new().with_pose(spinning_pose_at(90.0))))
            .unwrap();

        let mut renderer = RecordingRenderer::new(usize::MAX);
        driver.render(&mut renderer).unwrap();
        assert_eq!(renderer.frames[0].pose.rotation, Quat::IDENTITY);
        assert_eq!(renderer.frames[0].pose.timestamp_ms, 90.0);
    }

    #[test]
    fn test_newest_bundle_wins_within_iteration() {
        let first = ScriptedPipeline::new(
            "first",
            vec![FrameSet::new().with_point_cloud(cloud_at(10.0, 1))],
        );
        let second = ScriptedPipeline::new(
            "second",
            vec![FrameSet::new()
                .with_point_cloud(cloud_at(12.0, 7))
                .with_pose(spinning_pose_at(11.0))],
        );
        let mut aggregator = StreamAggregator::new(vec![Box::new(first), Box::new(second)]);
        let mut renderer = RecordingRenderer::new(1);
        let mut driver = driver(FusionConfig::default());

        driver.step(&mut aggregator, &mut renderer).unwrap();
        assert_eq!(renderer.frames.len(), 1);
        assert_eq!(renderer.frames[0].cloud_frame, 7);
        assert!(!renderer.frames[0].textured);
    }

    #[test]
    fn test_device_error_propagates() {
        let exhausted = ScriptedPipeline::new("exhausted", vec![]);
        let mut aggregator = StreamAggregator::new(vec![Box::new(exhausted)]);
        let mut renderer = RecordingRenderer::new(usize::MAX);
        let mut driver = driver(FusionConfig::default());

        let err = driver.run(&mut aggregator, &mut renderer).unwrap_err();
        assert!(matches!(err, FusionError::Device(DeviceError::Stopped(_))));
    }

    #[test]
    fn test_nonfinite_pose_passes_through_unless_aborting() {
        let nan_pose = Pose::new(Vec3::new(f32::NAN, 0.0, 0.0), Quat::IDENTITY, 1.0);

        let mut tolerant = driver(FusionConfig::default());
        tolerant
            .merge(bundle(FrameSet::new().with_pose(nan_pose)))
            .unwrap();
        assert_eq!(tolerant.pose_fault_count(), 1);
        assert!(tolerant.pose().unwrap().translation.x.is_nan());

        let mut strict = driver(FusionConfig {
            abort_on_nonfinite_pose: true,
            ..FusionConfig::default()
        });
        let err = strict
            .merge(bundle(FrameSet::new().with_pose(nan_pose)))
            .unwrap_err();
        assert!(matches!(err, FusionError::NonFinitePose { timestamp_ms } if timestamp_ms == 1.0));
        assert!(strict.pose().is_none());
    }

    #[test]
    fn test_realtime_pair_keeps_alignment_bounded() {
        let rig = SimulatedRig::default();
        let mut provider = SimulatedProvider::tracking_and_depth(rig.clone()).realtime(true);
        let mut aggregator = StreamAggregator::enumerate_and_start(&mut provider).unwrap();
        let mut renderer = RecordingRenderer::new(30);
        let mut driver = FusionDriver::new(&FusionConfig::default(), Arc::new(rig.extrinsic));

        driver.run(&mut aggregator, &mut renderer).unwrap();

        // Depth runs at 30 Hz with 28 ms more latency than tracking, so the
        // newest pose stays within about one depth period of the cloud.
        for (i, drawn) in renderer.frames.iter().enumerate() {
            assert!(
                drawn.delta_seconds.abs() < 0.1,
                "render {i}: dt {} s",
                drawn.delta_seconds
            );
        }
        assert_eq!(driver.alignment().map(|a| a.delta_seconds.abs() < 0.1), Some(true));
    }

    #[test]
    fn test_simulated_rig_reprojects_onto_scene() {
        let rig = SimulatedRig::default();
        let mut combined = SimulatedDeviceConfig::tracking("rig");
        combined.depth_rate_hz = Some(40.0);
        let mut provider = SimulatedProvider::new(rig.clone(), vec![combined]);
        let mut aggregator = StreamAggregator::enumerate_and_start(&mut provider).unwrap();
        let mut renderer = RecordingRenderer::new(40);
        let mut driver = FusionDriver::new(
            &FusionConfig {
                include_acceleration: true,
                ..FusionConfig::default()
            },
            Arc::new(rig.extrinsic),
        );

        driver.run(&mut aggregator, &mut renderer).unwrap();

        assert_eq!(renderer.frames.len(), 40);
        // Later frames render a cloud that is several pose samples old.
        assert!(renderer.frames.iter().any(|f| f.delta_seconds < -0.01));
        for drawn in &renderer.frames {
            for (vertex, point) in drawn.cloud.positions().zip(&rig.scene.points) {
                let world = drawn.world.transform_point(vertex);
                assert!(
                    world.abs_diff_eq(*point, 1e-3),
                    "frame {}: {world:?} vs {point:?}",
                    drawn.cloud_frame
                );
            }
        }
    }
}
