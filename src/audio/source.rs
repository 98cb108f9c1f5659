use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{Receiver, SyncSender, TrySendError},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::*;

use crate::error::{JarvisError, JarvisResult};

pub const SAMPLE_RATE: u32 = 16_000;
pub const CHANNELS: u16 = 1;
/// Samples per frame. 1280 samples is 80ms at 16kHz
pub const CHUNK: usize = 1280;

/// One fixed-size chunk of mono signed 16 bit samples
pub type AudioFrame = Vec<i16>;

/// Pull based reader of fixed size audio frames
pub trait FrameSource {
    /// Blocks until a full frame is available
    fn read_frame(&mut self) -> JarvisResult<AudioFrame>;
}

/// Microphone capture on a dedicated thread.
///
/// The capture thread owns the cpal stream so the device handle is released
/// whenever the thread winds down. Frames are forwarded over a bounded
/// channel. If the consumer falls behind the newest frame is dropped instead
/// of blocking the device callback.
pub struct MicrophoneSource {
    frame_receiver: Receiver<AudioFrame>,
    stop_flag: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
}

impl MicrophoneSource {
    pub fn open(input_device: Option<&str>) -> JarvisResult<Self> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        // roughly 2.5 seconds of backlog before frames get dropped
        let (frame_sender, frame_receiver) = std::sync::mpsc::sync_channel::<AudioFrame>(32);
        let (init_sender, init_receiver) = std::sync::mpsc::channel::<JarvisResult<()>>();

        let device_name = input_device.map(str::to_owned);
        let thread_stop_flag = stop_flag.clone();
        let capture_thread = std::thread::Builder::new()
            .name("audio-capture".to_owned())
            .spawn(move || {
                capture_loop(
                    device_name.as_deref(),
                    frame_sender,
                    init_sender,
                    thread_stop_flag,
                )
            })?;

        // wait for the capture thread to either open the device or fail
        init_receiver
            .recv()
            .map_err(|_| JarvisError::AudioStreamClosed)??;

        Ok(Self {
            frame_receiver,
            stop_flag,
            capture_thread: Some(capture_thread),
        })
    }

    /// Signals the capture thread to drop the stream and release the device.
    /// Idempotent.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.capture_thread.take() {
            if handle.join().is_err() {
                error!("Audio capture thread panicked");
            }
        }
    }
}

impl FrameSource for MicrophoneSource {
    fn read_frame(&mut self) -> JarvisResult<AudioFrame> {
        self.frame_receiver
            .recv()
            .map_err(|_| JarvisError::AudioStreamClosed)
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    device_name: Option<&str>,
    frame_sender: SyncSender<AudioFrame>,
    init_sender: std::sync::mpsc::Sender<JarvisResult<()>>,
    stop_flag: Arc<AtomicBool>,
) {
    let stream = match build_input_stream(device_name, frame_sender) {
        Ok(stream) => {
            _ = init_sender.send(Ok(()));
            stream
        }
        Err(error) => {
            _ = init_sender.send(Err(error));
            return;
        }
    };

    if let Err(error) = stream.play() {
        error!("Failed to start audio capture stream: {}", error);
        return;
    }

    while !stop_flag.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(50));
    }

    // dropping the stream here releases the device handle
    drop(stream);
    info!("Audio capture stream stopped");
}

fn build_input_stream(
    device_name: Option<&str>,
    frame_sender: SyncSender<AudioFrame>,
) -> JarvisResult<cpal::Stream> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|error| JarvisError::AudioDeviceError(error.to_string()))?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| JarvisError::AudioDeviceError(format!("No device named {}", name)))?,
        None => host.default_input_device().ok_or(JarvisError::NoInputDevice)?,
    };

    info!(
        "Capturing from input device {:?}",
        device.name().unwrap_or_else(|_| "unknown".to_owned())
    );

    let supported = select_input_config(&device)?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    let mut chunker = FrameChunker::new(frame_sender);

    let error_callback = |error| {
        // overruns and other transient driver errors must not kill the loop
        warn!("Audio capture stream error: {}", error);
    };

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| chunker.push_i16(data),
            error_callback,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| chunker.push_f32(data),
            error_callback,
            None,
        ),
        other => {
            return Err(JarvisError::AudioDeviceError(format!(
                "Unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(|error| JarvisError::AudioDeviceError(error.to_string()))?;

    Ok(stream)
}

fn select_input_config(device: &cpal::Device) -> JarvisResult<cpal::SupportedStreamConfig> {
    let supported_configs = device
        .supported_input_configs()
        .map_err(|error| JarvisError::AudioDeviceError(error.to_string()))?;
    pick_native_config(supported_configs)
}

/// The whole pipeline runs at 16kHz mono. A device that cannot capture that
/// natively is rejected at startup, any other rate would feed mis-pitched
/// samples into the wake word model and the transcription encoder.
fn pick_native_config(
    supported_configs: impl IntoIterator<Item = cpal::SupportedStreamConfigRange>,
) -> JarvisResult<cpal::SupportedStreamConfig> {
    for config_range in supported_configs {
        if config_range.channels() != CHANNELS {
            continue;
        }
        if config_range.min_sample_rate().0 <= SAMPLE_RATE
            && config_range.max_sample_rate().0 >= SAMPLE_RATE
        {
            return Ok(config_range.with_sample_rate(cpal::SampleRate(SAMPLE_RATE)));
        }
    }

    Err(JarvisError::AudioDeviceError(format!(
        "No mono input configuration supporting {}Hz found",
        SAMPLE_RATE
    )))
}

/// Accumulates device callback buffers into fixed CHUNK sized frames
struct FrameChunker {
    pending: Vec<i16>,
    frame_sender: SyncSender<AudioFrame>,
}

impl FrameChunker {
    fn new(frame_sender: SyncSender<AudioFrame>) -> Self {
        Self {
            pending: Vec::with_capacity(CHUNK * 2),
            frame_sender,
        }
    }

    fn push_i16(&mut self, data: &[i16]) {
        self.pending.extend_from_slice(data);
        self.flush_full_frames();
    }

    fn push_f32(&mut self, data: &[f32]) {
        self.pending
            .extend(data.iter().map(|sample| (sample * i16::MAX as f32) as i16));
        self.flush_full_frames();
    }

    fn flush_full_frames(&mut self) {
        while self.pending.len() >= CHUNK {
            let frame: AudioFrame = self.pending.drain(..CHUNK).collect();
            match self.frame_sender.try_send(frame) {
                Ok(()) => (),
                Err(TrySendError::Full(_)) => {
                    // consumer is behind, drop the frame like an overrun
                    trace!("Frame channel full, dropping frame");
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.pending.clear();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleRate, SupportedBufferSize, SupportedStreamConfigRange};

    fn range(channels: u16, min_rate: u32, max_rate: u32) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min_rate),
            SampleRate(max_rate),
            SupportedBufferSize::Unknown,
            SampleFormat::I16,
        )
    }

    #[test]
    fn native_rate_within_supported_range_is_selected() {
        let config = pick_native_config(vec![range(2, 44_100, 48_000), range(1, 8_000, 48_000)])
            .unwrap();
        assert_eq!(config.channels(), CHANNELS);
        assert_eq!(config.sample_rate(), SampleRate(SAMPLE_RATE));
    }

    #[test]
    fn device_without_16khz_mono_is_rejected() {
        // a 48kHz only device must fail at startup instead of streaming
        // mis-pitched audio into the pipeline
        let result = pick_native_config(vec![range(1, 44_100, 48_000)]);
        assert!(matches!(result, Err(JarvisError::AudioDeviceError(_))));
    }

    #[test]
    fn stereo_only_device_is_rejected() {
        let result = pick_native_config(vec![range(2, 8_000, 48_000)]);
        assert!(matches!(result, Err(JarvisError::AudioDeviceError(_))));
    }
}
