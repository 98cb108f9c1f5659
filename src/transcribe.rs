use async_openai::{config::OpenAIConfig, types::CreateTranscriptionRequestArgs, Client};
use tempdir::TempDir;
use tracing::*;

use crate::audio::wav;

const VOICE_TO_TEXT_TRANSCRIBE_MODEL: &str = "whisper-1";
const VOICE_TO_TEXT_TRANSCRIBE_MODEL_ENGLISH_LANGUAGE: &str = "en";

/// Turns a finished utterance buffer into text.
///
/// The samples go through a scoped temporary WAV file that is removed on
/// every exit path when the temp dir guard drops.
pub struct Transcriber {
    client: Client<OpenAIConfig>,
    prompt: String,
}

impl Transcriber {
    pub fn new(client: Client<OpenAIConfig>, prompt: &str) -> Self {
        Self {
            client,
            prompt: prompt.to_owned(),
        }
    }

    pub async fn transcribe(&self, samples: &[i16]) -> anyhow::Result<String> {
        let temp_dir = TempDir::new("utterance_temp_dir")?;
        let temp_audio_file = temp_dir.path().join("recorded.wav");

        wav::write_wav(&temp_audio_file, samples)?;

        let request = CreateTranscriptionRequestArgs::default()
            .file(temp_audio_file)
            .model(VOICE_TO_TEXT_TRANSCRIBE_MODEL)
            .language(VOICE_TO_TEXT_TRANSCRIBE_MODEL_ENGLISH_LANGUAGE)
            .prompt(self.prompt.as_str())
            .build()?;

        let response = self.client.audio().transcribe(request).await?;
        debug!("Transcribed utterance: {:?}", response.text);
        Ok(response.text)
    }
}
