pub mod app_config;
pub mod assistant;
pub mod audio;
pub mod error;
pub mod lights;
pub mod openai;
pub mod speech;
pub mod transcribe;
pub mod utilities;
pub mod weather;
