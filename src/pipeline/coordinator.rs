//! The turn state machine.
//!
//! One coordinator serializes conversational turns for a session:
//! `Idle → Capturing → Transcribing → Querying → Generating → Storing →
//! Idle`, with `Speaking` after `Storing` when voice output is enabled
//! and `Aborted` reachable from any non-idle state via cancellation.
//!
//! Every degradation decision lives here rather than in the adapters:
//! an unreachable memory store becomes a notice and an empty context, a
//! mid-stream generation fault keeps the partial reply, a store failure
//! is reported and never fatal. Adapter failures are translated into
//! state transitions, never allowed to escape as session faults.

use crate::audio::AudioBridge;
use crate::character::Character;
use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::history::SessionLog;
use crate::llm::stream::ReplyEvent;
use crate::llm::{self, OllamaClient};
use crate::memory::MemoryOrchestrator;
use crate::pipeline::messages::{ConversationTurn, Role, Transcript, TranscriptStatus, Utterance};
use crate::stt::SpeechToText;
use crate::tts::TextToSpeech;
use crate::worker::InferenceWorker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Phase of the active turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Capturing,
    Transcribing,
    Querying,
    Generating,
    Storing,
    Speaking,
    Aborted,
}

/// Progress reported to the presentation layer while a turn runs.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// The coordinator entered a new phase.
    Phase(TurnPhase),
    /// The user's utterance was transcribed to this text.
    Transcript(String),
    /// An incremental piece of the reply, in order.
    ReplyFragment(String),
    /// The reply finished; `complete` is false when a generation fault
    /// cut it short (the text shown is still kept and stored).
    ReplyFinished { text: String, complete: bool },
    /// A human-readable degradation or failure notice.
    Notice(String),
}

/// What one turn produced.
#[derive(Debug)]
pub struct TurnOutcome {
    /// The user's turn, when one was established.
    pub user_turn: Option<ConversationTurn>,
    /// The assistant's turn, when any reply text was produced.
    pub assistant_turn: Option<ConversationTurn>,
    /// Whether the reply stream reached its normal end marker.
    pub reply_complete: bool,
    /// Whether the turn ended in the aborted state.
    pub aborted: bool,
}

impl TurnOutcome {
    fn aborted() -> Self {
        Self {
            user_turn: None,
            assistant_turn: None,
            reply_complete: false,
            aborted: true,
        }
    }
}

/// Cloneable handle for interrupting the active turn from the
/// presentation layer.
#[derive(Clone)]
pub struct TurnController {
    cancel: Arc<Mutex<CancellationToken>>,
    stop: Arc<Mutex<CancellationToken>>,
}

impl TurnController {
    /// Abort the active turn. Observable by whichever stage is running;
    /// the coordinator returns to idle within one scheduling tick.
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// End the current recording window early. Unlike [`Self::cancel`],
    /// the captured audio so far still flows through the turn.
    pub fn stop_recording(&self) {
        self.stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

/// The top-level turn state machine.
pub struct InteractionCoordinator {
    config: AppConfig,
    llm: OllamaClient,
    memory: MemoryOrchestrator,
    bridge: AudioBridge,
    stt: InferenceWorker<Utterance, Result<Transcript>>,
    tts: Option<SynthesisStage>,
    events: mpsc::UnboundedSender<TurnEvent>,
    log: Mutex<SessionLog>,
    active: AtomicBool,
    cancel: Arc<Mutex<CancellationToken>>,
    stop: Arc<Mutex<CancellationToken>>,
}

struct SynthesisStage {
    worker: InferenceWorker<String, Result<Vec<f32>>>,
    sample_rate: u32,
}

impl InteractionCoordinator {
    /// Wire up the coordinator from config and the two inference
    /// engines. Returns the coordinator and the receiver for turn
    /// events.
    ///
    /// `tts_engine` is optional; without it voice output is disabled
    /// regardless of config.
    ///
    /// # Errors
    ///
    /// Returns an error if a client or worker cannot be constructed.
    pub fn new(
        config: AppConfig,
        stt_engine: Box<dyn SpeechToText>,
        tts_engine: Option<Box<dyn TextToSpeech>>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TurnEvent>)> {
        let llm = OllamaClient::new(&config.llm)?;
        let memory = MemoryOrchestrator::new(&config.memory)?;
        let bridge = AudioBridge::new(config.audio.clone());

        let mut stt_engine = stt_engine;
        let stt = InferenceWorker::spawn("selkie-stt", move |utterance: Utterance| {
            stt_engine.transcribe(&utterance)
        })?;

        let tts = match tts_engine {
            Some(mut engine) => {
                let sample_rate = engine.sample_rate();
                let worker = InferenceWorker::spawn("selkie-tts", move |text: String| {
                    engine.synthesize(&text)
                })?;
                Some(SynthesisStage {
                    worker,
                    sample_rate,
                })
            }
            None => None,
        };

        let (events, events_rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                config,
                llm,
                memory,
                bridge,
                stt,
                tts,
                events,
                log: Mutex::new(SessionLog::new()),
                active: AtomicBool::new(false),
                cancel: Arc::new(Mutex::new(CancellationToken::new())),
                stop: Arc::new(Mutex::new(CancellationToken::new())),
            },
            events_rx,
        ))
    }

    /// Handle for cancelling or stopping the active turn.
    pub fn controller(&self) -> TurnController {
        TurnController {
            cancel: Arc::clone(&self.cancel),
            stop: Arc::clone(&self.stop),
        }
    }

    /// Probe both remote services, returning (generation, memory)
    /// reachability.
    pub async fn check_services(&self) -> (bool, bool) {
        tokio::join!(self.llm.check_connection(), self.memory.check_connection())
    }

    /// Export the session transcript as JSON Lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn export_transcript(&self, path: &std::path::Path) -> Result<()> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .export_jsonl(path)
    }

    /// Run one typed turn.
    ///
    /// # Errors
    ///
    /// Returns an error only when another turn is already active;
    /// in-turn failures surface as notices and the outcome.
    pub async fn text_turn(&self, text: &str, character: &Character) -> Result<TurnOutcome> {
        let _turn = self.begin_turn()?;
        let cancel = self.current_cancel();
        let outcome = self.run_exchange(text.to_owned(), character, &cancel).await;
        self.finish(&outcome);
        Ok(outcome)
    }

    /// Run one spoken turn: capture, transcribe, then the shared
    /// exchange path.
    ///
    /// # Errors
    ///
    /// Returns an error only when another turn is already active.
    pub async fn voice_turn(&self, character: &Character) -> Result<TurnOutcome> {
        let _turn = self.begin_turn()?;
        let cancel = self.current_cancel();
        let stop = self.current_stop();

        self.emit(TurnEvent::Phase(TurnPhase::Capturing));
        // `stop` ends the recording window and keeps the audio; dropping
        // the capture future on `cancel` releases the device and aborts.
        let captured = tokio::select! {
            result = self.bridge.capture(&stop) => result,
            _ = cancel.cancelled() => {
                let outcome = self.abort("turn cancelled");
                self.finish(&outcome);
                return Ok(outcome);
            }
        };

        let utterance = match captured {
            Ok(utterance) => utterance,
            Err(e) => {
                let outcome = self.abort(&format!("audio device failed: {e}"));
                self.finish(&outcome);
                return Ok(outcome);
            }
        };

        let outcome = self.run_utterance(utterance, character, &cancel).await;
        self.finish(&outcome);
        Ok(outcome)
    }

    /// Run the spoken-turn path below capture. Used by [`Self::voice_turn`]
    /// and directly by frontends that source audio elsewhere.
    ///
    /// # Errors
    ///
    /// Returns an error only when another turn is already active.
    pub async fn utterance_turn(
        &self,
        utterance: Utterance,
        character: &Character,
    ) -> Result<TurnOutcome> {
        let _turn = self.begin_turn()?;
        let cancel = self.current_cancel();
        let outcome = self.run_utterance(utterance, character, &cancel).await;
        self.finish(&outcome);
        Ok(outcome)
    }

    async fn run_utterance(
        &self,
        utterance: Utterance,
        character: &Character,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        if utterance.is_empty() {
            return self.abort("heard nothing — try again or type instead");
        }

        self.emit(TurnEvent::Phase(TurnPhase::Transcribing));
        let timeout = Duration::from_secs(self.config.stt.timeout_secs.max(1));
        let transcript = match self.stt.submit(utterance, timeout, cancel).await {
            Ok(Ok(transcript)) => transcript,
            Ok(Err(e)) => {
                warn!("transcription failed: {e}");
                Transcript::failed()
            }
            Err(PipelineError::Cancelled) => {
                return self.abort("turn cancelled");
            }
            Err(e) => {
                warn!("transcription worker unavailable: {e}");
                Transcript::failed()
            }
        };

        match transcript.status {
            TranscriptStatus::Ok => {
                self.emit(TurnEvent::Transcript(transcript.text.clone()));
                self.run_exchange(transcript.text, character, cancel).await
            }
            TranscriptStatus::Empty => {
                self.abort("didn't catch that — try again or type instead")
            }
            TranscriptStatus::Failed => {
                self.abort("transcription failed — try again or type instead")
            }
        }
    }

    /// The shared path for one exchange: recall, generate, store, speak.
    async fn run_exchange(
        &self,
        user_text: String,
        character: &Character,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let user_turn = ConversationTurn::new(Role::User, user_text.clone());

        // ── Querying ──────────────────────────────────────────────
        self.emit(TurnEvent::Phase(TurnPhase::Querying));
        let memories = tokio::select! {
            result = self.memory.recall(&user_text, character) => match result {
                Ok(records) => records,
                Err(e) => {
                    debug!("memory recall failed: {e}");
                    self.emit(TurnEvent::Notice(
                        "memory unavailable — continuing without context".into(),
                    ));
                    Vec::new()
                }
            },
            _ = cancel.cancelled() => return self.abort("turn cancelled"),
        };

        // ── Generating ────────────────────────────────────────────
        self.emit(TurnEvent::Phase(TurnPhase::Generating));
        let request = {
            let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            llm::build_request(
                character,
                &memories,
                log.tail(self.config.llm.history_window),
                &user_text,
                &self.config.llm,
                self.config.memory.context_limit,
            )
        };

        let stream_cancel = cancel.child_token();
        let mut stream = self.llm.stream_generate(&request, stream_cancel.clone());
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.config.turn.generation_timeout_secs.max(1));

        let mut reply_text = String::new();
        let mut reply_complete = false;
        let mut generation_fault: Option<String> = None;

        let finished = loop {
            let event = tokio::select! {
                event = stream.next() => event,
                _ = cancel.cancelled() => break false,
                _ = tokio::time::sleep_until(deadline) => {
                    stream_cancel.cancel();
                    break false;
                }
            };

            match event {
                Some(ReplyEvent::Fragment(text)) => {
                    reply_text.push_str(&text);
                    self.emit(TurnEvent::ReplyFragment(text));
                }
                Some(ReplyEvent::Done) => {
                    reply_complete = true;
                    break true;
                }
                Some(ReplyEvent::Failed(message)) => {
                    generation_fault = Some(message);
                    break true;
                }
                None => {
                    // The producer only stops without a terminal event
                    // when it observed cancellation first.
                    if cancel.is_cancelled() {
                        break false;
                    }
                    generation_fault = Some("reply stream closed unexpectedly".into());
                    break true;
                }
            }
        };

        if !finished {
            // Cancellation or stage timeout: drop the stream (closing the
            // connection) and abort without storing.
            drop(stream);
            return self.abort("turn cancelled");
        }

        if let Some(message) = generation_fault {
            warn!("generation fault after {} chars: {message}", reply_text.len());
            self.emit(TurnEvent::Notice(format!(
                "reply interrupted — keeping what arrived ({message})"
            )));
        }

        let assistant_turn = if reply_text.is_empty() {
            None
        } else {
            let tags = if reply_complete {
                Vec::new()
            } else {
                vec!["incomplete".to_owned()]
            };
            Some(ConversationTurn::with_tags(
                Role::Assistant,
                reply_text.clone(),
                tags,
            ))
        };

        self.emit(TurnEvent::ReplyFinished {
            text: reply_text.clone(),
            complete: reply_complete,
        });

        // ── Storing ───────────────────────────────────────────────
        // Both stores run concurrently with no mutual ordering; either
        // failure is reported and neither blocks the other or the turn.
        self.emit(TurnEvent::Phase(TurnPhase::Storing));
        match &assistant_turn {
            Some(assistant) => {
                let (user_stored, assistant_stored) = self
                    .memory
                    .store_exchange(&user_turn, assistant, character)
                    .await;
                self.report_store("your message", user_stored);
                self.report_store("the reply", assistant_stored);
            }
            None => {
                let user_stored = self.memory.store_turn(&user_turn, character).await;
                self.report_store("your message", user_stored);
            }
        }

        {
            let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            log.append(user_turn.clone());
            if let Some(ref assistant) = assistant_turn {
                log.append(assistant.clone());
            }
        }

        // ── Speaking ──────────────────────────────────────────────
        if let Some(ref assistant) = assistant_turn
            && self.config.tts.speak_replies
        {
            self.speak(&assistant.text, cancel).await;
        }

        self.emit(TurnEvent::Phase(TurnPhase::Idle));
        TurnOutcome {
            user_turn: Some(user_turn),
            assistant_turn,
            reply_complete,
            aborted: false,
        }
    }

    async fn speak(&self, text: &str, cancel: &CancellationToken) {
        let Some(ref stage) = self.tts else {
            return;
        };

        self.emit(TurnEvent::Phase(TurnPhase::Speaking));
        let timeout = Duration::from_secs(self.config.tts.timeout_secs.max(1));
        let samples = match stage.worker.submit(text.to_owned(), timeout, cancel).await {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => {
                self.emit(TurnEvent::Notice(format!("speech synthesis failed: {e}")));
                return;
            }
            Err(_) => {
                debug!("synthesis cancelled");
                return;
            }
        };

        if let Err(e) = self.bridge.play(samples, stage.sample_rate, cancel).await {
            self.emit(TurnEvent::Notice(format!("playback failed: {e}")));
        }
    }

    fn report_store(&self, what: &str, outcome: Result<String>) {
        match outcome {
            Ok(id) => debug!("stored {what} as {id}"),
            Err(e) => {
                warn!("failed to store {what}: {e}");
                self.emit(TurnEvent::Notice(format!(
                    "couldn't save {what} to memory — continuing"
                )));
            }
        }
    }

    fn abort(&self, notice: &str) -> TurnOutcome {
        self.emit(TurnEvent::Notice(notice.to_owned()));
        self.emit(TurnEvent::Phase(TurnPhase::Aborted));
        self.emit(TurnEvent::Phase(TurnPhase::Idle));
        TurnOutcome::aborted()
    }

    fn finish(&self, outcome: &TurnOutcome) {
        if !outcome.aborted {
            info!(
                "turn finished (reply_complete={}, reply={})",
                outcome.reply_complete,
                outcome.assistant_turn.is_some()
            );
        }
    }

    /// Claim the session for one turn, installing fresh cancellation
    /// tokens. A second turn while one is active is rejected, not
    /// queued.
    fn begin_turn(&self) -> Result<ActiveTurn<'_>> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PipelineError::Pipeline(
                "a turn is already active — cancel it first".into(),
            ));
        }

        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = CancellationToken::new();
        *self.stop.lock().unwrap_or_else(PoisonError::into_inner) = CancellationToken::new();

        Ok(ActiveTurn { flag: &self.active })
    }

    fn current_cancel(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn current_stop(&self) -> CancellationToken {
        self.stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn emit(&self, event: TurnEvent) {
        // The presentation layer may have gone away; events are best-effort.
        let _ = self.events.send(event);
    }
}

/// RAII marker releasing the active-turn flag on every exit path.
struct ActiveTurn<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ActiveTurn<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
