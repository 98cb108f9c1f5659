use anyhow::Result;
use async_openai::{config::OpenAIConfig, Client};
use clap::Parser;
use jarvis_rust::{
    app_config::get_configuration,
    assistant::AssistantLoop,
    audio::{
        activation::{ActivationDetector, DetectorSettings, RustpotterScorer, WakeWordScorer},
        recorder::{RecorderSettings, UtteranceRecorder},
        MicrophoneSource,
    },
    lights::HueClient,
    openai::OpenAiOrchestrator,
    speech::SpeechService,
    transcribe::Transcriber,
    utilities,
    weather::WeatherClient,
};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::*;

const TRANSCRIPTION_PROMPT: &str = "Voice command for a home assistant called Jarvis";

/// Jarvis voice assistant
#[derive(Parser)]
#[command(author, version)]
struct Args {
    /// application configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Wake word model path. Overrides the configured one.
    #[arg(long)]
    wake_word_model: Option<String>,
    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = Args::parse();
    utilities::setup_tracing(args.verbose);
    info!("Starting jarvis");

    let app_config = get_configuration(&args.config)?;

    let wake_word_model_path = args
        .wake_word_model
        .unwrap_or_else(|| app_config.wake_word.model_path.clone());

    // device and model failures here are fatal, nothing works without them
    let source = MicrophoneSource::open(app_config.audio.input_device.as_deref())?;
    let scorer = RustpotterScorer::new(&wake_word_model_path, app_config.wake_word.threshold)?;

    let detector = ActivationDetector::new(
        scorer.models(),
        DetectorSettings {
            threshold: app_config.wake_word.threshold,
            cooldown: app_config.wake_word.cooldown(),
            save_delay: app_config.wake_word.save_delay(),
            stale_after: app_config.wake_word.stale_after(),
        },
    );

    let recorder = UtteranceRecorder::new(RecorderSettings {
        silence_threshold: app_config.recording.silence_threshold,
        silence_duration: app_config.recording.silence_duration(),
        keep_trailing_silence: app_config.recording.keep_trailing_silence,
    });

    let openai_client = Client::with_config(
        OpenAIConfig::new().with_api_key(app_config.openai.api_key.as_str()),
    );

    let transcriber = Transcriber::new(openai_client.clone(), TRANSCRIPTION_PROMPT);

    let hue_client = HueClient::new(&app_config.hue)?;
    let weather_client = WeatherClient::new(&app_config.weather);
    let orchestrator =
        OpenAiOrchestrator::new(&app_config.openai.api_key, hue_client, weather_client)?;

    let speech_service = SpeechService::new(openai_client);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                shutdown.store(true, Ordering::Release);
            }
        });
    }

    let mut assistant = AssistantLoop::new(
        source,
        Box::new(scorer),
        detector,
        recorder,
        transcriber,
        Box::new(orchestrator),
        Box::new(speech_service),
        shutdown,
    );

    assistant.run().await?;

    // dropping the assistant releases the microphone stream
    Ok(())
}
