//! Round-robin aggregation over every started device pipeline.

use crate::device::{DeviceError, DeviceInfo, DevicePipeline, DeviceProvider, FrameBundle, PipelineId};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Owns one pipeline per device connected at startup.
///
/// Each [`poll_all`](Self::poll_all) waits on every pipeline in startup
/// order, so a slow pipeline throttles the whole iteration. Devices plugged
/// in after startup are not picked up.
pub struct StreamAggregator {
    pipelines: Vec<Box<dyn DevicePipeline>>,
    poll_timeout: Option<Duration>,
}

impl StreamAggregator {
    /// Wrap already-started pipelines. Polling order is the vector order.
    pub fn new(pipelines: Vec<Box<dyn DevicePipeline>>) -> Self {
        Self {
            pipelines,
            poll_timeout: None,
        }
    }

    /// Discover every connected device and start one pipeline per device.
    ///
    /// Start failures are not retried; the first one is returned.
    #[tracing::instrument(skip_all)]
    pub fn enumerate_and_start<P>(provider: &mut P) -> Result<Self, DeviceError>
    where
        P: DeviceProvider + ?Sized,
    {
        let devices = provider.query_devices()?;
        if devices.is_empty() {
            warn!("No devices connected; nothing will be rendered");
        }

        let mut pipelines = Vec::with_capacity(devices.len());
        for device in &devices {
            info!("Starting pipeline for {}", device);
            pipelines.push(provider.start(device)?);
        }

        info!("Started {} pipeline(s)", pipelines.len());
        Ok(Self::new(pipelines))
    }

    /// Bound each poll by `timeout`. A pipeline that times out is skipped for
    /// that iteration instead of blocking it. `None` restores blocking polls.
    pub fn with_poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Devices in polling order.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceInfo> + '_ {
        self.pipelines.iter().map(|p| p.info())
    }

    /// Wait for the next bundle from one pipeline.
    ///
    /// Returns `Ok(None)` only when a poll timeout is configured and expired.
    pub fn poll(&mut self, id: PipelineId) -> Result<Option<FrameBundle>, DeviceError> {
        let pipeline = self
            .pipelines
            .get_mut(id.0)
            .ok_or_else(|| DeviceError::DeviceNotFound(id.to_string()))?;

        let frames = match self.poll_timeout {
            None => Some(pipeline.wait_for_frames()?),
            Some(timeout) => {
                let frames = pipeline.try_wait_for_frames(timeout)?;
                if frames.is_none() {
                    warn!(
                        "{} ({}) produced nothing within {:?}; skipping it this iteration",
                        id,
                        pipeline.info(),
                        timeout
                    );
                }
                frames
            }
        };

        Ok(frames.map(|frames| FrameBundle {
            pipeline: id,
            frames,
        }))
    }

    /// Poll every pipeline once, in order.
    ///
    /// The first device error aborts the iteration.
    pub fn poll_all(&mut self) -> Result<Vec<FrameBundle>, DeviceError> {
        let mut bundles = Vec::with_capacity(self.pipelines.len());
        for index in 0..self.pipelines.len() {
            if let Some(bundle) = self.poll(PipelineId(index))? {
                bundles.push(bundle);
            }
        }
        debug!("Polled {} bundle(s)", bundles.len());
        Ok(bundles)
    }

    /// Move every pipeline of `other` to the end of the polling order.
    pub fn append(&mut self, other: &mut StreamAggregator) {
        self.pipelines.append(&mut other.pipelines);
    }

    /// Stop every pipeline.
    pub fn stop(&mut self) {
        for pipeline in &mut self.pipelines {
            pipeline.stop();
        }
    }
}

impl Drop for StreamAggregator {
    fn drop(&mut self) {
        self.stop();
    }
}
