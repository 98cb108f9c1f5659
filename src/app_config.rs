use config::Config;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use tracing::*;

use crate::lights::{GroupModel, LightModel};

/// Use default config if no path is provided
pub fn get_configuration(config: &Option<PathBuf>) -> Result<AppConfig, anyhow::Error> {
    // environment comes last so `APP_OPENAI__API_KEY` style variables
    // override the file
    let settings = if let Some(config) = config {
        info!("Using configuration from {:?}", config);
        Config::builder()
            .add_source(config::File::with_name(
                config
                    .to_str()
                    .ok_or_else(|| anyhow::anyhow!("Failed to convert path"))?,
            ))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?
    } else {
        info!("Using default configuration");
        Config::builder()
            .add_source(config::File::with_name("config/settings"))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?
    };

    Ok(settings.try_deserialize()?)
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub wake_word: WakeWordConfig,
    pub recording: RecordingSettings,
    pub openai: JarvisOpenAiConfig,
    pub hue: HueConfig,
    pub weather: WeatherConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AudioConfig {
    /// Input device name. Uses the system default if unset.
    pub input_device: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct WakeWordConfig {
    pub model_path: String,
    pub threshold: f32,
    pub cooldown_seconds: f32,
    pub save_delay_seconds: f32,
    /// Pending activations older than this are discarded
    pub stale_after_seconds: f32,
}

impl WakeWordConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f32(self.cooldown_seconds)
    }

    pub fn save_delay(&self) -> Duration {
        Duration::from_secs_f32(self.save_delay_seconds)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs_f32(self.stale_after_seconds)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RecordingSettings {
    /// Mean absolute sample amplitude below which a frame counts as silent
    pub silence_threshold: f32,
    pub silence_duration_seconds: f32,
    pub keep_trailing_silence: bool,
}

impl RecordingSettings {
    pub fn silence_duration(&self) -> Duration {
        Duration::from_secs_f32(self.silence_duration_seconds)
    }
}

/// Named like this because OpenAiConfig is already a type in the openai crate
#[derive(Deserialize, Debug, Clone)]
pub struct JarvisOpenAiConfig {
    pub api_key: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct HueConfig {
    pub bridge_ip: String,
    pub app_key: String,
    pub lights: Vec<LightModel>,
    pub groups: Vec<GroupModel>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct WeatherConfig {
    pub api_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    static DEFAULT_CONFIG: &str = include_str!("../config/settings.yaml");

    #[test]
    fn test_config() {
        let builder = Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap();
        let config = builder.try_deserialize::<AppConfig>().unwrap();
        assert!(config.wake_word.cooldown() > config.wake_word.save_delay());
    }

    #[test]
    fn environment_overrides_nested_keys() {
        std::env::set_var("APP_OPENAI__API_KEY", "from-environment");

        let builder = Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Yaml,
            ))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()
            .unwrap();
        let config = builder.try_deserialize::<AppConfig>().unwrap();

        std::env::remove_var("APP_OPENAI__API_KEY");
        assert_eq!(config.openai.api_key, "from-environment");
    }
}
