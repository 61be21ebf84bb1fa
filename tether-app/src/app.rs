//! Application setup and run loop.

use crate::errors::AppError;
use crate::trace::TraceRenderer;
use clap::ValueEnum;
use std::sync::Arc;
use tether_capture::StreamAggregator;
use tether_capture::simulated::{
    SimulatedDeviceConfig, SimulatedProvider, SimulatedRig, SimulatedTexture,
};
use tether_fusion::{FusionConfig, FusionDriver};
use tracing::{info, warn};

/// Which simulated devices stand in for hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RigLayout {
    /// One device carrying both the pose and depth streams.
    #[default]
    Combined,
    /// A pose-only tracking camera plus a depth + color camera.
    Pair,
}

impl RigLayout {
    pub fn provider(self, rig: SimulatedRig) -> SimulatedProvider {
        match self {
            RigLayout::Pair => SimulatedProvider::tracking_and_depth(rig),
            RigLayout::Combined => {
                let mut device = SimulatedDeviceConfig::tracking("SIM-RIG-0001")
                    .with_texture(SimulatedTexture::Color);
                device.name = "Simulated Tracking + Depth Rig".to_string();
                device.depth_rate_hz = Some(30.0);
                SimulatedProvider::new(rig, vec![device])
            }
        }
    }
}

/// Everything [`run`] needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: FusionConfig,
    /// Renders before the trace renderer closes; 0 runs until killed.
    pub frames: u64,
    pub layout: RigLayout,
    pub realtime: bool,
    pub webcam: bool,
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) -> Result<(), AppError> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    #[cfg(feature = "tracy")]
    let result = {
        use tracing_subscriber::Layer;
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;
        tracing_subscriber::registry()
            .with(tracing_tracy::TracyLayer::default())
            .with(tracing_subscriber::fmt::layer().with_filter(filter))
            .try_init()
            .map_err(|e| e.to_string())
    };

    #[cfg(not(feature = "tracy"))]
    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| e.to_string());

    result.map_err(AppError::Logging)
}

/// Start every device, then fuse until the renderer closes.
pub fn run(options: RunOptions) -> Result<(), AppError> {
    let RunOptions {
        config,
        frames,
        layout,
        realtime,
        webcam,
    } = options;

    info!("Starting tether");

    let extrinsic = Arc::new(config.load_extrinsic());
    let rig = SimulatedRig {
        extrinsic: *extrinsic,
        ..SimulatedRig::default()
    };

    if layout == RigLayout::Pair && !realtime {
        warn!("Without --realtime each poll advances a simulated device by one capture, so separate devices drift apart");
    }

    let mut provider = layout.provider(rig).realtime(realtime);
    let mut aggregator = StreamAggregator::enumerate_and_start(&mut provider)?
        .with_poll_timeout(config.poll_timeout());

    if webcam {
        add_webcams(&mut aggregator)?;
    }

    let mut renderer = TraceRenderer::new(frames);
    let mut driver = FusionDriver::new(&config, extrinsic);
    driver.run(&mut aggregator, &mut renderer)?;

    if driver.pose_fault_count() > 0 {
        warn!("{} non-finite poses were received", driver.pose_fault_count());
    }
    info!("Shutting down after {} frames", renderer.frames());
    Ok(())
}

#[cfg(feature = "webcam")]
fn add_webcams(aggregator: &mut StreamAggregator) -> Result<(), AppError> {
    let mut webcams = StreamAggregator::enumerate_and_start(&mut tether_capture::WebcamProvider)?;
    aggregator.append(&mut webcams);
    Ok(())
}

#[cfg(not(feature = "webcam"))]
fn add_webcams(_aggregator: &mut StreamAggregator) -> Result<(), AppError> {
    Err(AppError::WebcamUnavailable)
}
