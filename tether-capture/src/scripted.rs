//! In-memory pipelines that replay a fixed sequence of frame sets.
//!
//! Useful for exercising the aggregator and fusion loop without hardware.

use crate::device::{DeviceError, DeviceInfo, DevicePipeline, DeviceProvider, FrameSet};
use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

/// Pipeline that hands out queued frame sets in order.
///
/// Once the queue is drained every wait returns [`DeviceError::Stopped`].
pub struct ScriptedPipeline {
    info: DeviceInfo,
    queue: VecDeque<FrameSet>,
    stalled: bool,
    stopped: bool,
}

impl ScriptedPipeline {
    pub fn new(serial: impl Into<String>, frames: Vec<FrameSet>) -> Self {
        let serial = serial.into();
        Self {
            info: DeviceInfo::new(serial.clone(), format!("Scripted {}", serial)),
            queue: frames.into(),
            stalled: false,
            stopped: false,
        }
    }

    /// Never deliver anything, like an unplugged device.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Frame sets not yet delivered.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    fn next(&mut self) -> Result<FrameSet, DeviceError> {
        if self.stopped {
            return Err(DeviceError::Stopped(self.info.serial.clone()));
        }
        self.queue
            .pop_front()
            .ok_or_else(|| DeviceError::Stopped(self.info.serial.clone()))
    }
}

impl DevicePipeline for ScriptedPipeline {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn wait_for_frames(&mut self) -> Result<FrameSet, DeviceError> {
        if self.stalled {
            loop {
                thread::sleep(Duration::from_secs(3600));
            }
        }
        self.next()
    }

    fn try_wait_for_frames(&mut self, timeout: Duration) -> Result<Option<FrameSet>, DeviceError> {
        if self.stalled {
            thread::sleep(timeout);
            return Ok(None);
        }
        self.next().map(Some)
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Provider over a fixed list of scripted devices.
#[derive(Default)]
pub struct ScriptedProvider {
    devices: Vec<(DeviceInfo, Option<ScriptedPipeline>)>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, pipeline: ScriptedPipeline) -> Self {
        self.devices.push((pipeline.info.clone(), Some(pipeline)));
        self
    }

    /// A listed device whose start always fails.
    pub fn with_failing_device(mut self, serial: impl Into<String>) -> Self {
        let serial = serial.into();
        self.devices
            .push((DeviceInfo::new(serial.clone(), format!("Broken {}", serial)), None));
        self
    }
}

impl DeviceProvider for ScriptedProvider {
    fn query_devices(&mut self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(self.devices.iter().map(|(info, _)| info.clone()).collect())
    }

    fn start(&mut self, device: &DeviceInfo) -> Result<Box<dyn DevicePipeline>, DeviceError> {
        let slot = self
            .devices
            .iter_mut()
            .find(|(info, _)| info.serial == device.serial)
            .ok_or_else(|| DeviceError::DeviceNotFound(device.serial.clone()))?;

        match slot.1.take() {
            Some(pipeline) => Ok(Box::new(pipeline)),
            None => Err(DeviceError::StartFailed {
                serial: device.serial.clone(),
                reason: "device refused to start".to_string(),
            }),
        }
    }
}
