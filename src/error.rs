use std::result::Result;
use thiserror::Error;

pub type JarvisResult<T> = Result<T, JarvisError>;

#[derive(Error, Debug)]
pub enum JarvisError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Json serde error")]
    JsonError(#[from] serde_json::Error),
    #[error("Wav codec error")]
    WavError(#[from] hound::Error),
    #[error("No input audio device available")]
    NoInputDevice,
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),
    #[error("Audio capture stream closed")]
    AudioStreamClosed,
    #[error("Failed to load wake word model: {0}")]
    WakeWordModelError(String),
    #[error("Failed to create audio output stream")]
    FailedToCreateAudioOutputStream,
    #[error("Failed to create audio sink")]
    FailedToCreateAudioSink,
    #[error("Failed to decode audio file")]
    FailedToDecodeAudioFile,
}
