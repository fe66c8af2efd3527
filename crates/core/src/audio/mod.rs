//! Audio-system collaborator: device descriptions, the capture traits the
//! monitors are written against, and the cpal implementation of them.

mod host;
#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AudioConfig, Result};

pub use host::CpalBackend;

/// Stable index of a device within one enumeration.
pub type DeviceId = usize;

/// Immutable description of one audio-capable device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    pub id: DeviceId,
    pub name: String,
    pub channels: u16,
    pub sample_rate: u32,
    /// The device can play audio, which makes it a loopback candidate.
    pub is_output: bool,
    pub host_api: String,
}

/// Stream parameters requested from [`AudioBackend::open_capture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub channels: u16,
    pub sample_rate: u32,
    /// Capture what the device plays rather than what it records.
    pub loopback: bool,
    /// Preferred host buffer size in frames, honoured when the host allows it.
    pub buffer_frames: Option<u32>,
}

impl CaptureRequest {
    /// Builds the request a monitor issues for `device`: at most
    /// `max_channels` channels at the native rate, loopback for playback
    /// devices on hosts that support it.
    pub fn for_device(device: &DeviceHandle, config: &AudioConfig) -> Self {
        Self {
            channels: device.channels.min(config.max_channels).max(1),
            sample_rate: device.sample_rate,
            loopback: device.is_output && config.supports_loopback(&device.host_api),
            buffer_frames: Some(config.low_latency_frames),
        }
    }
}

/// Readable source of interleaved `f32` samples.
///
/// Streams are opened and consumed on the monitor thread that owns them, so
/// implementations need not be `Send`.
pub trait CaptureStream {
    /// Number of interleaved channels per frame.
    fn channels(&self) -> usize;

    /// Waits up to `timeout` for samples and returns at most `max_frames`
    /// whole frames. An empty vector means nothing arrived in time.
    fn read(&mut self, max_frames: usize, timeout: Duration) -> Result<Vec<f32>>;
}

/// Host audio system as seen by the core.
pub trait AudioBackend: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeviceHandle>>;

    fn default_output(&self) -> Result<Option<DeviceHandle>>;

    fn open_capture(
        &self,
        device: &DeviceHandle,
        request: &CaptureRequest,
    ) -> Result<Box<dyn CaptureStream>>;
}

/// Root mean square over every sample of an interleaved chunk.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(channels: u16, is_output: bool, host_api: &str) -> DeviceHandle {
        DeviceHandle {
            id: 3,
            name: "Speakers".to_string(),
            channels,
            sample_rate: 44_100,
            is_output,
            host_api: host_api.to_string(),
        }
    }

    #[test]
    fn rms_of_constant_signal_is_its_magnitude() {
        assert!((compute_rms(&[0.5; 64]) - 0.5).abs() < 1e-6);
        assert!((compute_rms(&[-0.25; 7]) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn rms_matches_norm_over_sqrt_count() {
        let samples = [3.0_f32, 4.0, 0.0, 0.0];
        // |x| = 5, sqrt(4) = 2
        assert!((compute_rms(&samples) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn rms_of_empty_chunk_is_silence() {
        assert_eq!(compute_rms(&[]), 0.0);
    }

    #[test]
    fn request_caps_channels_and_keeps_native_rate() {
        let config = AudioConfig::default();
        let request = CaptureRequest::for_device(&device(8, false, "ALSA"), &config);

        assert_eq!(request.channels, 2);
        assert_eq!(request.sample_rate, 44_100);
        assert!(!request.loopback);

        let mono = CaptureRequest::for_device(&device(1, false, "ALSA"), &config);
        assert_eq!(mono.channels, 1);
    }

    #[test]
    fn request_uses_loopback_only_on_capable_hosts() {
        let config = AudioConfig::default();

        assert!(CaptureRequest::for_device(&device(2, true, "WASAPI"), &config).loopback);
        assert!(!CaptureRequest::for_device(&device(2, true, "CoreAudio"), &config).loopback);
        assert!(!CaptureRequest::for_device(&device(2, false, "WASAPI"), &config).loopback);
    }
}
