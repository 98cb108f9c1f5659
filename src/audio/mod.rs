pub mod activation;
pub mod recorder;
pub mod source;
pub mod wav;

pub use source::{AudioFrame, FrameSource, MicrophoneSource, CHANNELS, CHUNK, SAMPLE_RATE};
