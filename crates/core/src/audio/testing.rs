//! In-memory audio backend for exercising monitors without hardware.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::{Duration, Instant},
};

use super::{AudioBackend, CaptureRequest, CaptureStream, DeviceHandle};
use crate::{Result, RipplesError};

pub(crate) fn handle(id: usize) -> DeviceHandle {
    DeviceHandle {
        id,
        name: format!("device {id}"),
        channels: 2,
        sample_rate: 48_000,
        is_output: id == 1,
        host_api: "Scripted".to_string(),
    }
}

/// Every stream produces a constant signal at `level`.
pub(crate) struct ScriptedBackend {
    pub level: f32,
    pub fail_open: bool,
    /// Reads after which every stream starts failing.
    pub fail_after: Option<usize>,
    pub opens: AtomicUsize,
}

impl ScriptedBackend {
    pub fn steady(level: f32) -> Self {
        Self {
            level,
            fail_open: false,
            fail_after: None,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl AudioBackend for ScriptedBackend {
    fn enumerate(&self) -> Result<Vec<DeviceHandle>> {
        Ok(vec![handle(0), handle(1)])
    }

    fn default_output(&self) -> Result<Option<DeviceHandle>> {
        Ok(Some(handle(1)))
    }

    fn open_capture(
        &self,
        device: &DeviceHandle,
        request: &CaptureRequest,
    ) -> Result<Box<dyn CaptureStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(RipplesError::device(device.id, "device busy"));
        }
        Ok(Box::new(ScriptedStream {
            level: self.level,
            channels: request.channels as usize,
            reads: 0,
            fail_after: self.fail_after,
        }))
    }
}

struct ScriptedStream {
    level: f32,
    channels: usize,
    reads: usize,
    fail_after: Option<usize>,
}

impl CaptureStream for ScriptedStream {
    fn channels(&self) -> usize {
        self.channels
    }

    fn read(&mut self, max_frames: usize, _timeout: Duration) -> Result<Vec<f32>> {
        thread::sleep(Duration::from_millis(1));
        self.reads += 1;
        if self.fail_after.is_some_and(|limit| self.reads > limit) {
            return Err(RipplesError::Stream("device unplugged".to_string()));
        }
        Ok(vec![self.level; max_frames.min(64) * self.channels])
    }
}

/// Polls `condition` for up to two seconds.
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
