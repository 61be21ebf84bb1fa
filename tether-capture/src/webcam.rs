//! Webcam color pipeline using nokhwa.
//!
//! A webcam has no depth or pose streams; it only contributes the color
//! texture that point clouds are mapped to.

use crate::device::{DeviceError, DeviceInfo, DevicePipeline, DeviceProvider, FrameSet};
use image::RgbImage;
use nokhwa::Camera;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use std::time::Instant;
use tracing::{debug, info};

/// Webcam capture pipeline.
pub struct WebcamPipeline {
    info: DeviceInfo,
    camera: Camera,
    start_time: Instant,
    frame_count: u64,
    active: bool,
}

impl WebcamPipeline {
    /// Open the webcam at `index` at its highest resolution.
    pub fn open(info: DeviceInfo, index: CameraIndex) -> Result<Self, DeviceError> {
        let start_failed = |e: nokhwa::NokhwaError| DeviceError::StartFailed {
            serial: info.serial.clone(),
            reason: e.to_string(),
        };

        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
        let mut camera = Camera::new(index, requested).map_err(start_failed)?;
        camera.open_stream().map_err(start_failed)?;

        let resolution = camera.resolution();
        info!(
            "Webcam {} opened: {}x{} @ {:?} fps",
            info,
            resolution.width(),
            resolution.height(),
            camera.frame_rate()
        );

        Ok(Self {
            info,
            camera,
            start_time: Instant::now(),
            frame_count: 0,
            active: true,
        })
    }

    fn stream_fault(&self, reason: impl ToString) -> DeviceError {
        DeviceError::StreamFault {
            serial: self.info.serial.clone(),
            reason: reason.to_string(),
        }
    }
}

impl DevicePipeline for WebcamPipeline {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn wait_for_frames(&mut self) -> Result<FrameSet, DeviceError> {
        if !self.active {
            return Err(DeviceError::Stopped(self.info.serial.clone()));
        }

        let frame = self.camera.frame().map_err(|e| self.stream_fault(e))?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| self.stream_fault(e))?;

        self.frame_count += 1;
        debug!(
            "Captured webcam frame {} at {:.3} ms",
            self.frame_count,
            self.start_time.elapsed().as_secs_f64() * 1000.0
        );

        // nokhwa and tether may link different image versions
        let (width, height) = (decoded.width(), decoded.height());
        let color = RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| self.stream_fault("decoded frame has unexpected size"))?;

        Ok(FrameSet::new().with_color(color))
    }

    fn stop(&mut self) {
        if self.active {
            self.camera.stop_stream().ok();
            info!("Webcam capture stopped after {} frames", self.frame_count);
        }
        self.active = false;
    }
}

impl Drop for WebcamPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Enumerates webcams through the platform's native backend.
#[derive(Debug, Default)]
pub struct WebcamProvider;

impl DeviceProvider for WebcamProvider {
    fn query_devices(&mut self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let devices = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| DeviceError::EnumerationFailed(e.to_string()))?;

        Ok(devices
            .into_iter()
            .map(|camera| DeviceInfo::new(camera.index().to_string(), camera.human_name()))
            .collect())
    }

    fn start(&mut self, device: &DeviceInfo) -> Result<Box<dyn DevicePipeline>, DeviceError> {
        let index = device
            .serial
            .parse::<u32>()
            .map(CameraIndex::Index)
            .unwrap_or_else(|_| CameraIndex::String(device.serial.clone()));
        Ok(Box::new(WebcamPipeline::open(device.clone(), index)?))
    }
}
