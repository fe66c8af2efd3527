use std::{
    collections::VecDeque,
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender},
    time::Duration,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, FromSample, Host, HostId, Sample, SampleFormat, SizedSample, StreamConfig,
    SupportedBufferSize,
};
use tracing::{debug, info};

use super::{AudioBackend, CaptureRequest, CaptureStream, DeviceHandle, DeviceId};
use crate::{Result, RipplesError};

/// Callback chunks buffered between the audio thread and the monitor. When the
/// monitor falls this far behind, new chunks are dropped.
const CHUNK_QUEUE_DEPTH: usize = 64;

/// [`AudioBackend`] over a cpal host.
///
/// Only the host id is stored; the host and its devices are looked up again on
/// every call because cpal handles are not `Send` on every platform.
#[derive(Debug, Clone, Copy)]
pub struct CpalBackend {
    host_id: HostId,
}

impl CpalBackend {
    /// Uses the platform's default host.
    pub fn new() -> Self {
        Self::with_host(cpal::default_host().id())
    }

    pub fn with_host(host_id: HostId) -> Self {
        Self { host_id }
    }

    pub fn host_api(&self) -> &'static str {
        self.host_id.name()
    }

    fn host(&self) -> Result<Host> {
        cpal::host_from_id(self.host_id).map_err(|err| {
            RipplesError::msg(format!("audio host {} unavailable: {err}", self.host_api()))
        })
    }

    fn find_device(&self, host: &Host, handle: &DeviceHandle) -> Result<Device> {
        let device = host
            .devices()
            .map_err(|err| RipplesError::device(handle.id, format!("listing devices: {err}")))?
            .nth(handle.id)
            .ok_or_else(|| RipplesError::device(handle.id, "device is no longer present"))?;

        let name = device.name().unwrap_or_default();
        if name != handle.name {
            return Err(RipplesError::device(
                handle.id,
                format!("device list changed: found `{name}`, expected `{}`", handle.name),
            ));
        }
        Ok(device)
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn enumerate(&self) -> Result<Vec<DeviceHandle>> {
        let host = self.host()?;
        let host_api = self.host_api();
        let devices = host
            .devices()
            .map_err(|err| RipplesError::msg(format!("listing devices: {err}")))?;

        let handles: Vec<DeviceHandle> = devices
            .enumerate()
            .filter_map(|(id, device)| describe(id, &device, host_api))
            .collect();

        debug!(count = handles.len(), host_api, "enumerated audio devices");
        Ok(handles)
    }

    fn default_output(&self) -> Result<Option<DeviceHandle>> {
        let host = self.host()?;
        let Some(name) = host.default_output_device().and_then(|d| d.name().ok()) else {
            return Ok(None);
        };

        Ok(self
            .enumerate()?
            .into_iter()
            .find(|device| device.is_output && device.name == name))
    }

    fn open_capture(
        &self,
        handle: &DeviceHandle,
        request: &CaptureRequest,
    ) -> Result<Box<dyn CaptureStream>> {
        let host = self.host()?;
        let device = self.find_device(&host, handle)?;

        // Loopback streams are input streams built on a playback device, so the
        // sample format comes from its output configuration.
        let supported = if request.loopback {
            device.default_output_config()
        } else {
            device.default_input_config()
        }
        .map_err(|err| RipplesError::device(handle.id, format!("querying stream config: {err}")))?;

        let config = StreamConfig {
            channels: request.channels,
            sample_rate: cpal::SampleRate(request.sample_rate),
            buffer_size: buffer_size(supported.buffer_size(), request.buffer_frames),
        };

        let (chunk_tx, chunk_rx) = mpsc::sync_channel(CHUNK_QUEUE_DEPTH);
        let (error_tx, error_rx) = mpsc::channel();

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, chunk_tx, error_tx),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, chunk_tx, error_tx),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, chunk_tx, error_tx),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, chunk_tx, error_tx),
            other => {
                return Err(RipplesError::device(
                    handle.id,
                    format!("unsupported sample format {other:?}"),
                ))
            }
        }
        .map_err(|err| RipplesError::device(handle.id, format!("building stream: {err}")))?;

        stream
            .play()
            .map_err(|err| RipplesError::device(handle.id, format!("starting stream: {err}")))?;

        info!(
            device = %handle.name,
            id = handle.id,
            channels = config.channels,
            sample_rate = request.sample_rate,
            loopback = request.loopback,
            "capture stream opened"
        );

        Ok(Box::new(CpalCapture {
            _stream: stream,
            queue: ChunkQueue::new(chunk_rx, error_rx, request.channels as usize),
        }))
    }
}

fn describe(id: DeviceId, device: &Device, host_api: &str) -> Option<DeviceHandle> {
    let name = device.name().ok()?;
    let input_channels = device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let output_channels = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);

    if input_channels == 0 && output_channels == 0 {
        return None;
    }

    let default_config = if input_channels > 0 {
        device.default_input_config()
    } else {
        device.default_output_config()
    };
    let sample_rate = default_config.ok()?.sample_rate().0;

    Some(DeviceHandle {
        id,
        name,
        channels: input_channels.max(output_channels),
        sample_rate,
        is_output: output_channels > 0,
        host_api: host_api.to_string(),
    })
}

fn buffer_size(supported: &SupportedBufferSize, preferred: Option<u32>) -> BufferSize {
    match (supported, preferred) {
        (SupportedBufferSize::Range { min, max }, Some(frames)) if min <= max => {
            BufferSize::Fixed(frames.clamp(*min, *max))
        }
        _ => BufferSize::Default,
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    chunks: SyncSender<Vec<f32>>,
    errors: Sender<String>,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data
                .iter()
                .map(|sample| <f32 as Sample>::from_sample(*sample))
                .collect();
            // Never block the audio callback.
            let _ = chunks.try_send(samples);
        },
        move |err| {
            let _ = errors.send(err.to_string());
        },
        None,
    )
}

/// Capture stream that owns the cpal stream for as long as the monitor reads.
struct CpalCapture {
    _stream: cpal::Stream,
    queue: ChunkQueue,
}

impl CaptureStream for CpalCapture {
    fn channels(&self) -> usize {
        self.queue.channels
    }

    fn read(&mut self, max_frames: usize, timeout: Duration) -> Result<Vec<f32>> {
        self.queue.read(max_frames, timeout)
    }
}

/// Reassembles callback chunks into whole interleaved frames.
struct ChunkQueue {
    chunks: Receiver<Vec<f32>>,
    errors: Receiver<String>,
    pending: VecDeque<f32>,
    channels: usize,
}

impl ChunkQueue {
    fn new(chunks: Receiver<Vec<f32>>, errors: Receiver<String>, channels: usize) -> Self {
        Self {
            chunks,
            errors,
            pending: VecDeque::new(),
            channels: channels.max(1),
        }
    }

    fn read(&mut self, max_frames: usize, timeout: Duration) -> Result<Vec<f32>> {
        if let Ok(err) = self.errors.try_recv() {
            return Err(RipplesError::Stream(err));
        }

        let wanted = max_frames * self.channels;
        if self.pending.len() < self.channels {
            match self.chunks.recv_timeout(timeout) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => return Ok(Vec::new()),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RipplesError::Stream("capture callback has stopped".to_string()))
                }
            }
        }
        while self.pending.len() < wanted {
            match self.chunks.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(_) => break,
            }
        }

        let frames = (self.pending.len() / self.channels).min(max_frames);
        Ok(self.pending.drain(..frames * self.channels).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(channels: usize) -> (SyncSender<Vec<f32>>, Sender<String>, ChunkQueue) {
        let (chunk_tx, chunk_rx) = mpsc::sync_channel(8);
        let (error_tx, error_rx) = mpsc::channel();
        (chunk_tx, error_tx, ChunkQueue::new(chunk_rx, error_rx, channels))
    }

    #[test]
    fn prefers_fixed_buffer_within_supported_range() {
        let range = SupportedBufferSize::Range { min: 64, max: 4096 };
        assert_eq!(buffer_size(&range, Some(256)), BufferSize::Fixed(256));
        assert_eq!(buffer_size(&range, Some(16)), BufferSize::Fixed(64));
        assert_eq!(buffer_size(&range, None), BufferSize::Default);
        assert_eq!(
            buffer_size(&SupportedBufferSize::Unknown, Some(256)),
            BufferSize::Default
        );
    }

    #[test]
    fn read_times_out_with_empty_chunk() {
        let (_chunks, _errors, mut queue) = queue(2);
        let samples = queue.read(1024, Duration::from_millis(1)).unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn read_returns_whole_frames_up_to_limit() {
        let (chunks, _errors, mut queue) = queue(2);
        chunks.send(vec![0.1; 5]).unwrap();
        chunks.send(vec![0.2; 6]).unwrap();

        let first = queue.read(3, Duration::from_millis(10)).unwrap();
        assert_eq!(first.len(), 6);

        // 5 samples remain: two whole frames and a dangling half frame.
        let second = queue.read(1024, Duration::from_millis(10)).unwrap();
        assert_eq!(second.len(), 4);
    }

    #[test]
    fn read_surfaces_stream_errors() {
        let (_chunks, errors, mut queue) = queue(1);
        errors.send("device unplugged".to_string()).unwrap();

        let err = queue.read(1024, Duration::from_millis(1)).unwrap_err();
        assert!(format!("{err}").contains("device unplugged"));
    }

    #[test]
    fn read_fails_once_callback_is_gone() {
        let (chunks, _errors, mut queue) = queue(1);
        drop(chunks);

        assert!(queue.read(16, Duration::from_millis(1)).is_err());
    }
}
