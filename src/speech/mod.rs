use async_openai::{
    config::OpenAIConfig,
    types::{CreateSpeechRequestArgs, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;
use std::io::Cursor;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use tracing::*;

use crate::assistant::SpeechOutput;
use crate::error::JarvisError;

enum AudioPlayerCommand {
    Play(Box<dyn Playable>),
    Terminate,
}

pub trait Playable: std::io::Read + std::io::Seek + Send + Sync {}

impl Playable for Cursor<Vec<u8>> {}

fn audio_player_loop(receiver: &Receiver<AudioPlayerCommand>) -> Result<(), JarvisError> {
    let (_output_stream, output_stream_handle) = rodio::OutputStream::try_default()
        .map_err(|_| JarvisError::FailedToCreateAudioOutputStream)?;
    let sink = rodio::Sink::try_new(&output_stream_handle)
        .map_err(|_| JarvisError::FailedToCreateAudioSink)?;
    loop {
        let command = match receiver.recv() {
            Ok(command) => command,
            Err(_) => break,
        };
        match command {
            AudioPlayerCommand::Play(sound) => {
                sink.append(
                    rodio::Decoder::new(sound)
                        .map_err(|_| JarvisError::FailedToDecodeAudioFile)?,
                );
            }
            AudioPlayerCommand::Terminate => {
                warn!("Audio player loop terminated");
                break;
            }
        }
    }
    Ok(())
}

fn create_player() -> Sender<AudioPlayerCommand> {
    let (sender, receiver) = channel();
    thread::spawn(move || {
        if let Err(e) = audio_player_loop(&receiver) {
            error!("Audio player loop failed with {}", e);
        }
    });
    sender
}

/// Speaks responses through the default output device using OpenAI speech
/// synthesis. Playback failures are logged, never fatal to a turn.
pub struct SpeechService {
    client: Client<OpenAIConfig>,
    voice: Voice,
    audio_sender: Sender<AudioPlayerCommand>,
}

impl SpeechService {
    pub fn new(client: Client<OpenAIConfig>) -> SpeechService {
        let audio_sender = create_player();

        SpeechService {
            client,
            voice: Voice::Nova,
            audio_sender,
        }
    }

    async fn say(&self, text: &str) -> anyhow::Result<()> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .voice(self.voice.clone())
            .model(SpeechModel::Tts1)
            .build()?;

        let response = self.client.audio().speech(request).await?;
        let sound: Box<dyn Playable> = Box::new(Cursor::new(response.bytes.to_vec()));

        self.audio_sender
            .send(AudioPlayerCommand::Play(sound))
            .map_err(|_| anyhow::anyhow!("Audio player thread is gone"))?;
        Ok(())
    }
}

#[async_trait]
impl SpeechOutput for SpeechService {
    async fn speak(&self, text: &str) -> anyhow::Result<()> {
        info!("Speaking response");
        self.say(text).await
    }
}

impl Drop for SpeechService {
    fn drop(&mut self) {
        _ = self.audio_sender.send(AudioPlayerCommand::Terminate);
    }
}
