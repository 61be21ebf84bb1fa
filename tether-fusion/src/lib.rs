//! Tether Fusion Crate
//!
//! This crate fuses a high-rate pose stream with a lower-rate depth stream
//! into a world-referenced point cloud. The two streams arrive on different
//! clocks and with different latencies, so each render aligns the newest
//! pose to the newest depth frame before placing the cloud in the world.
//!
//! ## Modules
//!
//! - [`predict`]: Pose extrapolation (quaternion exponential map + linear motion)
//! - [`align`]: Time offset between the latest depth frame and pose sample
//! - [`project`]: World placement of the depth sensor via the extrinsic
//! - [`driver`]: The polling/merge/render loop and its retained state
//! - [`rate`]: Per-second stream and render rate reporting
//! - [`fault`]: Detection of non-finite pose samples
//! - [`render`]: Renderer boundary
//! - [`config`]: Runtime configuration

pub mod align;
pub mod config;
pub mod driver;
pub mod fault;
pub mod predict;
pub mod project;
pub mod rate;
pub mod render;

pub use align::{Alignment, align, delta_seconds};
pub use config::{ConfigError, FusionConfig};
pub use driver::{DriverState, FusionDriver, FusionError, StepOutcome};
pub use fault::PoseFaultMonitor;
pub use predict::{PoseExtrapolator, hamilton_product, predict, quaternion_exp};
pub use project::{WorldTransform, project};
pub use rate::{RateMonitor, RateReport};
pub use render::{FrameRenderer, RenderError, RenderFrame};
