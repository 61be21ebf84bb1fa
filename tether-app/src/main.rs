//! Tether Application
//!
//! Fuses a tracking camera's pose stream with a depth camera's point clouds
//! and renders the cloud in world space.
//!
//! Features:
//! - Simulated tracking + depth rig when no hardware is attached
//! - Optional webcam texture source (`webcam` feature)
//! - JSON configuration with command-line overrides
//! - Tracy profiling (`tracy` feature)

mod app;
mod errors;
mod trace;

use app::{RigLayout, RunOptions};
use clap::Parser;
use std::path::PathBuf;
use tether_fusion::{ConfigError, FusionConfig};
use tracing::error;

/// Tether - fused tracking + depth point cloud viewer
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extrinsic calibration file (16 row-major values)
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Include acceleration terms in pose prediction
    #[arg(long)]
    include_acceleration: bool,

    /// Render the latest pose as-is instead of predicting it to the depth timestamp
    #[arg(long)]
    no_predict: bool,

    /// Skip a device for one iteration if it delivers nothing within this many milliseconds
    #[arg(long)]
    poll_timeout_ms: Option<u64>,

    /// Exit with code 2 on a pose with a non-finite translation
    #[arg(long)]
    abort_on_nan: bool,

    /// Frames to render before exiting (0 = run until killed)
    #[arg(short, long, default_value_t = 300)]
    frames: u64,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Simulated device layout
    #[arg(long, value_enum, default_value_t = RigLayout::Combined)]
    devices: RigLayout,

    /// Pace simulated devices against the wall clock
    #[arg(long)]
    realtime: bool,

    /// Add every connected webcam as a texture source
    #[arg(long)]
    webcam: bool,
}

impl Args {
    /// The configuration file (or defaults) with command-line overrides applied.
    fn fusion_config(&self) -> Result<FusionConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => FusionConfig::from_path(path)?,
            None => FusionConfig::default(),
        };

        if let Some(path) = &self.calibration {
            config.calibration_path = path.clone();
        }
        if self.include_acceleration {
            config.include_acceleration = true;
        }
        if self.no_predict {
            config.predict_pose = false;
        }
        if self.poll_timeout_ms.is_some() {
            config.poll_timeout_ms = self.poll_timeout_ms;
        }
        if self.abort_on_nan {
            config.abort_on_nonfinite_pose = true;
        }
        Ok(config)
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = app::init_logging(&args.log_level) {
        eprintln!("Application error: {}", e);
        std::process::exit(e.exit_code());
    }

    let result = args
        .fusion_config()
        .map_err(errors::AppError::from)
        .and_then(|config| {
            app::run(RunOptions {
                config,
                frames: args.frames,
                layout: args.devices,
                realtime: args.realtime,
                webcam: args.webcam,
            })
        });

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_without_flags() {
        let args = Args::try_parse_from(["tether"]).unwrap();
        assert_eq!(args.fusion_config().unwrap(), FusionConfig::default());
        assert_eq!(args.devices, RigLayout::Combined);
        assert_eq!(args.frames, 300);
    }

    #[test]
    fn test_flags_override_config_file() {
        let path = std::env::temp_dir().join(format!("tether_cli_{}.json", std::process::id()));
        fs::write(
            &path,
            r#"{ "calibration_path": "from_file.txt", "poll_timeout_ms": 100 }"#,
        )
        .unwrap();

        let args = Args::try_parse_from([
            "tether",
            "--config",
            path.to_str().unwrap(),
            "--no-predict",
            "--include-acceleration",
            "--abort-on-nan",
            "--devices",
            "pair",
        ])
        .unwrap();
        let config = args.fusion_config().unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.calibration_path, PathBuf::from("from_file.txt"));
        assert_eq!(config.poll_timeout_ms, Some(100));
        assert!(!config.predict_pose);
        assert!(config.include_acceleration);
        assert!(config.abort_on_nonfinite_pose);
        assert_eq!(args.devices, RigLayout::Pair);

        let args = Args::try_parse_from(["tether", "--calibration", "rig.txt", "--poll-timeout-ms", "7"])
            .unwrap();
        let config = args.fusion_config().unwrap();
        assert_eq!(config.calibration_path, PathBuf::from("rig.txt"));
        assert_eq!(config.poll_timeout_ms, Some(7));
    }
}
