use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::*;

use crate::audio::activation::{ActivationDetector, ActivationState, WakeWordScorer};
use crate::audio::recorder::UtteranceRecorder;
use crate::audio::FrameSource;
use crate::error::JarvisResult;
use crate::transcribe::Transcriber;

const EXIT_KEYWORD: &str = "exit";
const TURN_FAILED_MESSAGE: &str = "Sorry, I could not process that request";

/// Language model driven collaborator that resolves one user request,
/// possibly calling tools along the way
#[async_trait]
pub trait Orchestrator: Send {
    async fn dispatch(&mut self, text: &str) -> anyhow::Result<String>;
}

/// Spoken output collaborator. Best effort, failures are not fatal.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    async fn speak(&self, text: &str) -> anyhow::Result<()>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Continue,
    Exit,
}

/// Resolves one transcribed request. The exit keyword short circuits
/// without touching the orchestrator; dispatch failures are reported to the
/// user and the loop keeps listening.
pub async fn run_turn(
    text: &str,
    orchestrator: &mut dyn Orchestrator,
    speech: &dyn SpeechOutput,
) -> TurnOutcome {
    if text.trim().eq_ignore_ascii_case(EXIT_KEYWORD) {
        info!("Exit keyword heard, ending the conversation");
        return TurnOutcome::Exit;
    }

    info!("You > {}", text);

    match orchestrator.dispatch(text).await {
        Ok(response) => {
            info!("Assistant > {}", response);
            if let Err(error) = speech.speak(&response).await {
                error!("Failed to speak response: {}", error);
            }
        }
        Err(error) => {
            error!("Request failed: {}", error);
            if let Err(error) = speech.speak(TURN_FAILED_MESSAGE).await {
                error!("Failed to speak error message: {}", error);
            }
        }
    }

    TurnOutcome::Continue
}

/// Top level driver: waiting, recording, transcribing, dispatching,
/// speaking, one conversational turn at a time
pub struct AssistantLoop<S: FrameSource> {
    source: S,
    scorer: Box<dyn WakeWordScorer>,
    detector: ActivationDetector,
    recorder: UtteranceRecorder,
    transcriber: Transcriber,
    orchestrator: Box<dyn Orchestrator>,
    speech: Box<dyn SpeechOutput>,
    shutdown: Arc<AtomicBool>,
}

impl<S: FrameSource> AssistantLoop<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        scorer: Box<dyn WakeWordScorer>,
        detector: ActivationDetector,
        recorder: UtteranceRecorder,
        transcriber: Transcriber,
        orchestrator: Box<dyn Orchestrator>,
        speech: Box<dyn SpeechOutput>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            scorer,
            detector,
            recorder,
            transcriber,
            orchestrator,
            speech,
            shutdown,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut state = ActivationState::new(Instant::now());

        info!(
            "Say the wake word followed by a request. Say the wake word and '{}' to end the conversation.",
            EXIT_KEYWORD
        );

        loop {
            let utterance =
                tokio::task::block_in_place(|| self.capture_utterance(&mut state))?;

            let utterance = match utterance {
                Some(utterance) => utterance,
                // interrupted while waiting or recording
                None => break,
            };

            info!("Transcribing...");
            let text = match self.transcriber.transcribe(&utterance).await {
                Ok(text) => text,
                Err(error) => {
                    // the turn is over, no partial transcript is used
                    error!("Transcription failed: {}", error);
                    if let Err(error) = self.speech.speak(TURN_FAILED_MESSAGE).await {
                        error!("Failed to speak error message: {}", error);
                    }
                    continue;
                }
            };

            match run_turn(&text, self.orchestrator.as_mut(), self.speech.as_ref()).await {
                TurnOutcome::Continue => (),
                TurnOutcome::Exit => break,
            }
        }

        info!("Assistant loop finished");
        Ok(())
    }

    /// Blocks polling frames until the wake word fires, then records the
    /// utterance that follows. Returns `None` on shutdown.
    fn capture_utterance(
        &mut self,
        state: &mut ActivationState,
    ) -> JarvisResult<Option<Vec<i16>>> {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Ok(None);
            }

            let frame = self.source.read_frame()?;
            let (triggered, next_state) = self.detector.process_frame(
                self.scorer.as_mut(),
                &frame,
                Instant::now(),
                state.clone(),
            );
            *state = next_state;

            if triggered {
                info!("Heard wake word. Listening...");
                return self
                    .recorder
                    .record_utterance(&mut self.source, &self.shutdown);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockOrchestrator {
        fail: bool,
        dispatched: Vec<String>,
    }

    #[async_trait]
    impl Orchestrator for MockOrchestrator {
        async fn dispatch(&mut self, text: &str) -> anyhow::Result<String> {
            self.dispatched.push(text.to_owned());
            if self.fail {
                anyhow::bail!("service unavailable");
            }
            Ok(format!("done: {}", text))
        }
    }

    #[derive(Default)]
    struct MockSpeech {
        spoken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechOutput for MockSpeech {
        async fn speak(&self, text: &str) -> anyhow::Result<()> {
            self.spoken.lock().unwrap().push(text.to_owned());
            Ok(())
        }
    }

    #[tokio::test]
    async fn exit_keyword_skips_the_orchestrator() {
        let mut orchestrator = MockOrchestrator::default();
        let speech = MockSpeech::default();

        let outcome = run_turn(" Exit ", &mut orchestrator, &speech).await;
        assert_eq!(outcome, TurnOutcome::Exit);
        assert!(orchestrator.dispatched.is_empty());
        assert!(speech.spoken.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn response_is_spoken() {
        let mut orchestrator = MockOrchestrator::default();
        let speech = MockSpeech::default();

        let outcome = run_turn("turn on the lights", &mut orchestrator, &speech).await;
        assert_eq!(outcome, TurnOutcome::Continue);
        assert_eq!(orchestrator.dispatched, vec!["turn on the lights"]);
        assert_eq!(
            *speech.spoken.lock().unwrap(),
            vec!["done: turn on the lights"]
        );
    }

    #[tokio::test]
    async fn dispatch_failure_is_reported_and_loop_continues() {
        let mut orchestrator = MockOrchestrator {
            fail: true,
            ..MockOrchestrator::default()
        };
        let speech = MockSpeech::default();

        let outcome = run_turn("what's the weather", &mut orchestrator, &speech).await;
        assert_eq!(outcome, TurnOutcome::Continue);
        assert_eq!(
            *speech.spoken.lock().unwrap(),
            vec![TURN_FAILED_MESSAGE.to_owned()]
        );
    }

    #[tokio::test]
    async fn exit_is_not_a_substring_match() {
        let mut orchestrator = MockOrchestrator::default();
        let speech = MockSpeech::default();

        let outcome = run_turn("exit the house", &mut orchestrator, &speech).await;
        assert_eq!(outcome, TurnOutcome::Continue);
        assert_eq!(orchestrator.dispatched, vec!["exit the house"]);
    }
}
