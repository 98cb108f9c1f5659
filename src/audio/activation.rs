use rustpotter::{Rustpotter, RustpotterConfig, SampleFormat};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::*;

use crate::audio::source::SAMPLE_RATE;
use crate::error::{JarvisError, JarvisResult};

/// One wake word model's confidence for the current frame
#[derive(Debug, Clone)]
pub struct Activation {
    pub model: String,
    pub score: f32,
}

/// Opaque wake word inference over a single frame.
///
/// One call scores all configured models so alternate implementations
/// (batched, accelerated) can be swapped in without touching the
/// trigger state machine.
pub trait WakeWordScorer: Send {
    fn score_frame(&mut self, frame: &[i16]) -> Vec<Activation>;

    /// Model identifiers in evaluation order
    fn models(&self) -> Vec<String>;
}

/// Per model activation history threaded through the detector
/// rather than kept as shared mutable state
#[derive(Debug, Clone)]
pub struct ActivationState {
    activation_times: HashMap<String, Vec<Instant>>,
    last_save: Instant,
}

impl ActivationState {
    pub fn new(now: Instant) -> Self {
        Self {
            activation_times: HashMap::new(),
            last_save: now,
        }
    }

    pub fn last_save(&self) -> Instant {
        self.last_save
    }

    pub fn pending_activations(&self, model: &str) -> usize {
        self.activation_times
            .get(model)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub threshold: f32,
    /// Minimum time between two accepted triggers
    pub cooldown: Duration,
    /// Minimum age of the earliest pending activation before it is accepted
    pub save_delay: Duration,
    /// Pending activations older than this are discarded
    pub stale_after: Duration,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            cooldown: Duration::from_secs(4),
            save_delay: Duration::from_secs(1),
            stale_after: Duration::from_secs(8),
        }
    }
}

/// Debounce and cooldown state machine over wake word scores
pub struct ActivationDetector {
    models: Vec<String>,
    settings: DetectorSettings,
}

impl ActivationDetector {
    pub fn new(models: Vec<String>, settings: DetectorSettings) -> Self {
        Self { models, settings }
    }

    /// Score one frame and advance the trigger state machine
    pub fn process_frame(
        &self,
        scorer: &mut dyn WakeWordScorer,
        frame: &[i16],
        now: Instant,
        state: ActivationState,
    ) -> (bool, ActivationState) {
        let activations = scorer.score_frame(frame);
        self.process_scores(&activations, now, state)
    }

    /// Pure transition. Appends above threshold activations and checks the
    /// trigger condition for every configured model in order. The first model
    /// to satisfy the condition wins, clears its history and bumps
    /// `last_save`. Without a trigger all histories and `last_save` carry
    /// over unchanged, which is what suppresses duplicate triggers inside
    /// the cooldown window.
    pub fn process_scores(
        &self,
        activations: &[Activation],
        now: Instant,
        mut state: ActivationState,
    ) -> (bool, ActivationState) {
        for activation in activations {
            if activation.score >= self.settings.threshold {
                debug!(
                    "Model {} activated with score {}",
                    activation.model, activation.score
                );
                state
                    .activation_times
                    .entry(activation.model.clone())
                    .or_default()
                    .push(now);
            }
        }

        for model in &self.models {
            let times = match state.activation_times.get_mut(model) {
                Some(times) => times,
                None => continue,
            };

            // a lone activation that never led to a trigger should not arm
            // the detector forever
            times.retain(|time| now.duration_since(*time) < self.settings.stale_after);

            let earliest = match times.first() {
                Some(earliest) => *earliest,
                None => continue,
            };

            if now.duration_since(state.last_save) >= self.settings.cooldown
                && now.duration_since(earliest) >= self.settings.save_delay
            {
                info!("Wake word {} triggered", model);
                times.clear();
                state.last_save = now;
                return (true, state);
            }
        }

        (false, state)
    }
}

/// Wake word scoring backed by a rustpotter model file
pub struct RustpotterScorer {
    detector: Rustpotter,
    model_name: String,
    pending: Vec<f32>,
    samples_per_frame: usize,
}

impl RustpotterScorer {
    pub fn new(model_path: &str, threshold: f32) -> JarvisResult<Self> {
        let model_name = Path::new(model_path)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("wake_word")
            .to_owned();

        let mut config = RustpotterConfig::default();
        config.fmt.sample_rate = SAMPLE_RATE as usize;
        config.fmt.channels = 1;
        config.fmt.sample_format = SampleFormat::F32;
        config.detector.threshold = threshold;

        let mut detector = Rustpotter::new(&config)
            .map_err(|error| JarvisError::WakeWordModelError(format!("{:?}", error)))?;
        detector
            .add_wakeword_from_file(&model_name, model_path)
            .map_err(|error| JarvisError::WakeWordModelError(format!("{:?}", error)))?;

        let samples_per_frame = detector.get_samples_per_frame();
        info!(
            "Loaded wake word model {} from {}",
            model_name, model_path
        );

        Ok(Self {
            detector,
            model_name,
            pending: vec![],
            samples_per_frame,
        })
    }
}

impl WakeWordScorer for RustpotterScorer {
    fn score_frame(&mut self, frame: &[i16]) -> Vec<Activation> {
        // bridge our fixed frame size to the model's native frame size
        self.pending
            .extend(frame.iter().map(|sample| *sample as f32 / i16::MAX as f32));

        let mut best_scores: HashMap<String, f32> = HashMap::new();
        while self.pending.len() >= self.samples_per_frame {
            let chunk: Vec<f32> = self.pending.drain(..self.samples_per_frame).collect();
            if let Some(detection) = self.detector.process_samples(chunk) {
                let score = best_scores.entry(detection.name.clone()).or_default();
                *score = score.max(detection.score);
            }
        }

        best_scores
            .into_iter()
            .map(|(model, score)| Activation { model, score })
            .collect()
    }

    fn models(&self) -> Vec<String> {
        vec![self.model_name.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "hey_jarvis";

    fn detector() -> ActivationDetector {
        ActivationDetector::new(vec![MODEL.to_owned()], DetectorSettings::default())
    }

    fn activation(score: f32) -> Vec<Activation> {
        vec![Activation {
            model: MODEL.to_owned(),
            score,
        }]
    }

    fn seconds(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[test]
    fn below_threshold_never_triggers() {
        let detector = detector();
        let start = Instant::now();
        let mut state = ActivationState::new(start);

        // a full cooldown plus save delay window of quiet frames
        for frame_index in 0..80 {
            let now = start + Duration::from_millis(80 * frame_index);
            let (triggered, next) = detector.process_scores(&activation(0.3), now, state);
            assert!(!triggered);
            state = next;
        }
        assert_eq!(state.pending_activations(MODEL), 0);
    }

    #[test]
    fn triggers_once_after_save_delay_and_cooldown() {
        let detector = detector();
        let start = Instant::now();
        let mut state = ActivationState::new(start);

        // single activation, cooldown not yet elapsed
        let (triggered, next) = detector.process_scores(&activation(0.9), start, state);
        assert!(!triggered);
        state = next;
        assert_eq!(state.pending_activations(MODEL), 1);

        // cooldown satisfied but frame is scored below threshold, the
        // pending activation from earlier still carries the trigger
        let now = start + seconds(5);
        let (triggered, next) = detector.process_scores(&activation(0.1), now, state);
        assert!(triggered);
        state = next;
        assert_eq!(state.pending_activations(MODEL), 0);
        assert_eq!(state.last_save(), now);
    }

    #[test]
    fn no_retrigger_within_cooldown() {
        let detector = detector();
        let start = Instant::now();
        let mut state = ActivationState::new(start);

        let trigger_time = start + seconds(6);
        let (_, next) = detector.process_scores(&activation(0.9), start + seconds(4), state);
        state = next;
        let (triggered, next) = detector.process_scores(&activation(0.9), trigger_time, state);
        assert!(triggered);
        state = next;

        // keep feeding high scores right after the accepted trigger
        for frame_index in 1..40 {
            let now = trigger_time + Duration::from_millis(80 * frame_index);
            let (triggered, next) = detector.process_scores(&activation(0.9), now, state);
            assert!(!triggered, "re-triggered {:?} after accepted trigger", now - trigger_time);
            state = next;
        }

        // once the cooldown has passed the pending activations are old
        // enough to satisfy the save delay immediately
        let (triggered, _) = detector.process_scores(&activation(0.9), trigger_time + seconds(5), state);
        assert!(triggered);
    }

    #[test]
    fn trigger_waits_for_save_delay() {
        // activation at t=0 with cooldown long satisfied triggers at t=1
        let detector = detector();
        let base = Instant::now();
        let t0 = base + seconds(10);
        let state = ActivationState::new(base);

        let (triggered, state) = detector.process_scores(&activation(0.9), t0, state);
        assert!(!triggered);

        let (triggered, state) =
            detector.process_scores(&[], t0 + Duration::from_millis(500), state);
        assert!(!triggered);

        let (triggered, _) = detector.process_scores(&[], t0 + seconds(1), state);
        assert!(triggered);
    }

    #[test]
    fn stale_activation_expires() {
        let detector = detector();
        let base = Instant::now();
        let t0 = base + seconds(10);
        let state = ActivationState::new(base);

        let (triggered, state) = detector.process_scores(&activation(0.9), t0, state);
        assert!(!triggered);

        // stale_after has elapsed, the pending activation must be gone
        let late = t0 + seconds(9);
        let (triggered, state) = detector.process_scores(&[], late, state);
        assert!(!triggered);
        assert_eq!(state.pending_activations(MODEL), 0);
    }

    #[test]
    fn first_model_in_order_wins() {
        let settings = DetectorSettings::default();
        let detector = ActivationDetector::new(
            vec!["first".to_owned(), "second".to_owned()],
            settings,
        );
        let base = Instant::now();
        let t0 = base + seconds(10);
        let state = ActivationState::new(base);

        let activations = vec![
            Activation {
                model: "second".to_owned(),
                score: 0.9,
            },
            Activation {
                model: "first".to_owned(),
                score: 0.9,
            },
        ];

        let (triggered, state) = detector.process_scores(&activations, t0, state);
        assert!(!triggered);

        let (triggered, state) = detector.process_scores(&[], t0 + seconds(2), state);
        assert!(triggered);
        // the winning model cleared, the other still pending
        assert_eq!(state.pending_activations("first"), 0);
        assert_eq!(state.pending_activations("second"), 1);
    }
}
