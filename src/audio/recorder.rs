use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::*;

use crate::audio::source::{FrameSource, CHUNK, SAMPLE_RATE};
use crate::error::JarvisResult;

#[derive(Debug, Clone)]
pub struct RecorderSettings {
    /// Mean absolute sample amplitude at or below which a frame is silent
    pub silence_threshold: f32,
    /// Length of trailing silence that ends the utterance
    pub silence_duration: Duration,
    /// Keep the trailing silent frames in the returned buffer
    pub keep_trailing_silence: bool,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            silence_threshold: 500.0,
            silence_duration: Duration::from_secs_f32(1.5),
            keep_trailing_silence: true,
        }
    }
}

pub fn mean_abs_amplitude(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame.iter().map(|sample| (*sample as f64).abs()).sum();
    (sum / frame.len() as f64) as f32
}

/// Captures one utterance from a frame source.
///
/// Leading silence is discarded. Recording starts with the first loud frame
/// and ends once the configured silence duration passes without one. Pauses
/// shorter than the silence duration never cut the utterance.
pub struct UtteranceRecorder {
    settings: RecorderSettings,
}

impl UtteranceRecorder {
    pub fn new(settings: RecorderSettings) -> Self {
        Self { settings }
    }

    pub fn max_silent_frames(&self) -> usize {
        let frames = self.settings.silence_duration.as_secs_f64() * SAMPLE_RATE as f64
            / CHUNK as f64;
        frames as usize
    }

    /// Energy based end of speech policy. Returns `None` when aborted before
    /// speech starts. A source failure before speech starts propagates, no
    /// partial buffer is ever returned.
    pub fn record_utterance(
        &self,
        source: &mut dyn FrameSource,
        abort: &AtomicBool,
    ) -> JarvisResult<Option<Vec<i16>>> {
        let max_silent_frames = self.max_silent_frames();
        let mut buffer: Vec<i16> = vec![];
        let mut silent_frames = 0usize;
        let mut started = false;

        loop {
            let frame = source.read_frame()?;
            let volume = mean_abs_amplitude(&frame);

            if volume > self.settings.silence_threshold {
                started = true;
                silent_frames = 0;
                buffer.extend_from_slice(&frame);
            } else if started {
                silent_frames += 1;
                buffer.extend_from_slice(&frame);
                if silent_frames >= max_silent_frames {
                    break;
                }
            } else if abort.load(Ordering::Acquire) {
                debug!("Utterance recording aborted before speech started");
                return Ok(None);
            }
        }

        if !self.settings.keep_trailing_silence {
            buffer.truncate(buffer.len() - silent_frames * CHUNK);
        }

        debug!(
            "Recorded utterance of {} samples",
            buffer.len()
        );
        Ok(Some(buffer))
    }

    /// Manual start/stop policy. Waits until `active` is raised, appends
    /// every frame unconditionally and stops once it is lowered again.
    pub fn record_manual(
        &self,
        source: &mut dyn FrameSource,
        active: &AtomicBool,
    ) -> JarvisResult<Vec<i16>> {
        while !active.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(20));
        }

        let mut buffer: Vec<i16> = vec![];
        while active.load(Ordering::Acquire) {
            let frame = source.read_frame()?;
            buffer.extend_from_slice(&frame);
        }
        Ok(buffer)
    }
}
