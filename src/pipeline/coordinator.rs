//! Session coordinator: the single thread of control that owns the
//! timeline, the arbiter, and every in-flight activity.
//!
//! All asynchronous sources (presentation intents, stream chunks, capture
//! events, AI-ply timers) funnel into one queue and are processed one
//! input at a time. Ordering races between callbacks are the primary
//! hazard, so every deferred input carries the arbiter generation captured
//! when it was scheduled and is dropped if the generation has moved on by
//! the time it arrives.

use crate::arbiter::{Mode, TurnArbiter};
use crate::config::AssistantConfig;
use crate::events::{SessionEvent, SessionView};
use crate::game::{ClickOutcome, GameKind, GameOutcome, GameSession, GameStatus};
use crate::llm::{ApiChat, ChatBackend};
use crate::pipeline::messages::{Intent, SessionInput};
use crate::timeline::{BoardWidget, EntryId, Speaker, TimelineStore};
use crate::voice::{CaptureEnd, CaptureEvent, CaptureService, PlaybackService, VoiceController};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Channel buffer sizes.
const EVENT_CHANNEL_SIZE: usize = 256;
const CHUNK_CHANNEL_SIZE: usize = 16;

/// Fixed substitution text for a failed streaming reply. Partial output is
/// discarded wholesale: a half-formed sentence is worse than a clear
/// substitution.
const TRANSPORT_APOLOGY: &str =
    "Sorry — I couldn't reach my language model just now. Please try that again.";

/// Builds a session and spawns its coordinator task.
pub struct SessionBuilder {
    config: AssistantConfig,
    chat: Option<Arc<Mutex<dyn ChatBackend>>>,
    chat_init_error: Option<String>,
    capture: Option<Arc<dyn CaptureService>>,
    playback: Option<Arc<dyn PlaybackService>>,
}

impl SessionBuilder {
    pub fn new(config: AssistantConfig) -> Self {
        Self {
            config,
            chat: None,
            chat_init_error: None,
            capture: None,
            playback: None,
        }
    }

    /// Use a specific chat backend.
    pub fn chat(mut self, backend: impl ChatBackend + 'static) -> Self {
        self.chat = Some(Arc::new(Mutex::new(backend)));
        self.chat_init_error = None;
        self
    }

    /// Construct the [`ApiChat`] backend from the session config.
    ///
    /// A construction failure is not fatal: the session starts with a
    /// single explanatory assistant entry and submissions take the
    /// transport-failure path.
    pub fn api_chat(self) -> Self {
        match ApiChat::new(&self.config.llm) {
            Ok(backend) => self.chat(backend),
            Err(e) => {
                warn!("chat backend unavailable: {e}");
                self.chat_unavailable(e.to_string())
            }
        }
    }

    /// Record that no chat backend could be initialized.
    pub fn chat_unavailable(mut self, reason: impl Into<String>) -> Self {
        self.chat = None;
        self.chat_init_error = Some(reason.into());
        self
    }

    pub fn capture(mut self, service: Arc<dyn CaptureService>) -> Self {
        self.capture = Some(service);
        self
    }

    pub fn playback(mut self, service: Arc<dyn PlaybackService>) -> Self {
        self.playback = Some(service);
        self
    }

    /// Spawn the coordinator task and return the session handle.
    pub fn spawn(self) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        let voice = VoiceController::new(&self.config.voice, self.capture, self.playback);
        let coordinator = Coordinator {
            config: self.config,
            timeline: TimelineStore::new(),
            arbiter: TurnArbiter::new(),
            voice,
            chat: self.chat,
            chat_init_error: self.chat_init_error,
            game: None,
            pending_reply: None,
            capture_cancel: None,
            capture_transcript: String::new(),
            rng: StdRng::from_entropy(),
            tx: tx.clone(),
            events: events.clone(),
        };
        tokio::spawn(coordinator.run(rx));

        SessionHandle { tx, events }
    }
}

/// Cheap, cloneable handle for issuing intents and observing the session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionInput>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Issue a presentation intent. Illegal intents are no-ops.
    pub fn intent(&self, intent: Intent) {
        let _ = self.tx.send(SessionInput::Intent(intent));
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Request the current render source: mode plus a full copy of the
    /// timeline, consistent because the coordinator answers between inputs.
    pub async fn view(&self) -> SessionView {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SessionInput::Snapshot(tx)).is_err() {
            return SessionView::closed();
        }
        rx.await.unwrap_or_else(|_| SessionView::closed())
    }

    /// Tear down the session loop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(SessionInput::Shutdown);
    }
}

struct Coordinator {
    config: AssistantConfig,
    timeline: TimelineStore,
    arbiter: TurnArbiter,
    voice: VoiceController,
    chat: Option<Arc<Mutex<dyn ChatBackend>>>,
    chat_init_error: Option<String>,
    game: Option<GameSession>,
    /// Streaming assistant entry currently being accumulated.
    pending_reply: Option<EntryId>,
    capture_cancel: Option<CancellationToken>,
    /// Last interim transcript of the active capture session.
    capture_transcript: String,
    rng: StdRng,
    /// Self-sender handed to deferred tasks (stream forwarders, timers).
    tx: mpsc::UnboundedSender<SessionInput>,
    events: broadcast::Sender<SessionEvent>,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionInput>) {
        self.startup();
        while let Some(input) = rx.recv().await {
            match input {
                SessionInput::Intent(intent) => self.handle_intent(intent).await,
                SessionInput::StreamChunk { generation, text } => {
                    self.on_stream_chunk(generation, &text);
                }
                SessionInput::StreamDone { generation, error } => {
                    self.on_stream_done(generation, error);
                }
                SessionInput::Capture { generation, event } => {
                    self.on_capture_event(generation, event);
                }
                SessionInput::AiPly { generation } => self.on_ai_ply(generation),
                SessionInput::Snapshot(reply) => {
                    let _ = reply.send(self.view());
                }
                SessionInput::Shutdown => break,
            }
        }
        info!("session coordinator stopped");
    }

    fn startup(&mut self) {
        if let Some(reason) = self.chat_init_error.take() {
            let text = format!(
                "I couldn't reach my language model ({reason}). You can keep typing, but \
                 replies may fail until it's back."
            );
            self.append_entry(Speaker::Assistant, Some(text), None);
        } else if !self.config.llm.greeting.is_empty() {
            let greeting = self.config.llm.greeting.clone();
            self.append_entry(Speaker::Assistant, Some(greeting.clone()), None);
            self.voice.speak(&greeting);
        }
    }

    async fn handle_intent(&mut self, intent: Intent) {
        match intent {
            Intent::SubmitText(text) => self.submit_text(text),
            Intent::StartCapture => self.start_capture().await,
            Intent::StopCapture => self.stop_capture(),
            Intent::BoardClick { generation, x, y } => self.board_click(generation, x, y),
            Intent::StartGame(kind) => self.start_game(kind),
            Intent::ForfeitGame => self.forfeit_game(),
            Intent::ToggleVoiceOutput => {
                let enabled = self.voice.toggle_output();
                self.emit(SessionEvent::VoiceOutputChanged(enabled));
            }
            Intent::ToggleVoiceGender => {
                let gender = self.voice.toggle_gender();
                self.emit(SessionEvent::VoiceGenderChanged(gender));
            }
        }
    }

    // ── Streaming reply accumulation ────────────────────────────────────

    fn submit_text(&mut self, text: String) {
        let text = text.trim().to_owned();
        if text.is_empty() {
            return;
        }
        match self.arbiter.mode() {
            Mode::Sending | Mode::GameActive => {
                debug!("submit ignored in {:?}", self.arbiter.mode());
                return;
            }
            // Capture is stopped as part of submit, not left dangling.
            Mode::Listening => self.stop_capture(),
            Mode::Idle => {}
        }
        self.voice.cancel_playback();

        let Some(generation) = self.arbiter.begin_sending() else {
            return;
        };
        self.emit_mode();

        self.append_entry(Speaker::User, Some(text.clone()), None);
        let pending = self.timeline.append_streaming(Speaker::Assistant);
        self.emit_last_appended();
        self.pending_reply = Some(pending);

        let Some(chat) = self.chat.clone() else {
            // No backend: fail at the transport layer, same apology path.
            let _ = self.tx.send(SessionInput::StreamDone {
                generation,
                error: Some("chat backend unavailable".to_owned()),
            });
            return;
        };

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(CHUNK_CHANNEL_SIZE);
            let forward_tx = tx.clone();
            let forward = tokio::spawn(async move {
                while let Some(text) = chunk_rx.recv().await {
                    if forward_tx
                        .send(SessionInput::StreamChunk { generation, text })
                        .is_err()
                    {
                        break;
                    }
                }
            });

            let result = {
                let mut backend = chat.lock().await;
                backend.stream_reply(&text, chunk_tx).await
            };
            let _ = forward.await;
            let _ = tx.send(SessionInput::StreamDone {
                generation,
                error: result.err().map(|e| e.to_string()),
            });
        });
    }

    fn on_stream_chunk(&mut self, generation: u64, text: &str) {
        if self.arbiter.mode() != Mode::Sending || !self.arbiter.is_current(generation) {
            debug!("dropping stale stream chunk");
            return;
        }
        let Some(id) = self.pending_reply else {
            return;
        };
        let applied = self.timeline.mutate_last(id, |entry| {
            entry.text.get_or_insert_with(String::new).push_str(text);
        });
        if applied {
            self.emit_last_updated();
        } else {
            debug!("chunk for a superseded entry dropped");
        }
    }

    fn on_stream_done(&mut self, generation: u64, error: Option<String>) {
        if self.arbiter.mode() != Mode::Sending || !self.arbiter.is_current(generation) {
            debug!("dropping stale stream completion");
            return;
        }
        let Some(id) = self.pending_reply.take() else {
            return;
        };

        let spoken = match error {
            None => {
                self.timeline.freeze(id);
                self.timeline
                    .last()
                    .and_then(|entry| entry.text.clone())
                    .unwrap_or_default()
            }
            Some(reason) => {
                warn!("streaming reply failed: {reason}");
                self.timeline.replace(id, TRANSPORT_APOLOGY.to_owned());
                TRANSPORT_APOLOGY.to_owned()
            }
        };
        self.emit_last_updated();

        self.arbiter.finish_sending();
        self.emit_mode();
        self.voice.speak(&spoken);
    }

    // ── Voice capture ───────────────────────────────────────────────────

    async fn start_capture(&mut self) {
        if self.arbiter.mode() != Mode::Idle {
            debug!("start-capture ignored in {:?}", self.arbiter.mode());
            return;
        }
        self.voice.cancel_playback();

        // Start the service first so a failure leaves the mode untouched.
        let Some(session) = self.voice.start_capture().await else {
            return;
        };
        let Some(generation) = self.arbiter.begin_listening() else {
            return;
        };
        self.emit_mode();
        self.capture_cancel = Some(session.cancel.clone());
        self.capture_transcript.clear();

        let tx = self.tx.clone();
        let mut events = session.events;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let ended = matches!(event, CaptureEvent::Ended(_));
                if tx
                    .send(SessionInput::Capture { generation, event })
                    .is_err()
                {
                    break;
                }
                if ended {
                    break;
                }
            }
        });
    }

    /// Force Listening → Idle, cancelling the capture session. The
    /// service's later `Ended` event arrives with a stale generation and
    /// is dropped.
    fn stop_capture(&mut self) {
        if self.arbiter.mode() != Mode::Listening {
            return;
        }
        if let Some(cancel) = self.capture_cancel.take() {
            cancel.cancel();
        }
        self.arbiter.finish_listening();
        self.emit_mode();
    }

    fn on_capture_event(&mut self, generation: u64, event: CaptureEvent) {
        if self.arbiter.mode() != Mode::Listening || !self.arbiter.is_current(generation) {
            debug!("dropping stale capture event");
            return;
        }
        match event {
            CaptureEvent::Interim(text) => {
                self.capture_transcript = text.clone();
                self.emit(SessionEvent::InterimTranscript(text));
            }
            CaptureEvent::Ended(reason) => {
                if let CaptureEnd::Error(ref e) = reason {
                    warn!("capture ended with error: {e}");
                }
                self.capture_cancel = None;
                self.arbiter.finish_listening();
                self.emit_mode();
                let transcript = std::mem::take(&mut self.capture_transcript);
                self.emit(SessionEvent::CaptureEnded { transcript, reason });
            }
        }
    }

    // ── Game sessions ───────────────────────────────────────────────────

    fn start_game(&mut self, kind: GameKind) {
        if self.arbiter.mode() != Mode::Idle {
            debug!("start-game ignored in {:?}", self.arbiter.mode());
            return;
        }
        self.voice.cancel_playback();
        let Some(generation) = self.arbiter.begin_game(kind) else {
            return;
        };
        self.emit_mode();

        let game = GameSession::start(kind);
        let intro = game.intro_text().to_owned();
        let snapshot = game.snapshot();
        self.game = Some(game);

        self.append_entry(Speaker::Assistant, Some(intro.clone()), None);
        self.append_entry(
            Speaker::Assistant,
            None,
            Some(BoardWidget {
                snapshot,
                generation,
            }),
        );
        self.voice.speak(&intro);
    }

    fn board_click(&mut self, generation: u64, x: u8, y: u8) {
        if self.arbiter.mode() != Mode::GameActive || !self.arbiter.is_current(generation) {
            debug!("ignoring click on a superseded board");
            return;
        }
        let Some(game) = self.game.as_mut() else {
            return;
        };
        match game.apply_human_move(x, y) {
            ClickOutcome::Rejected => {}
            ClickOutcome::Selection(selection) => {
                self.emit(SessionEvent::SelectionChanged(selection));
            }
            ClickOutcome::Applied => {
                let snapshot = game.snapshot();
                let kind = game.kind();
                let status = game.status();
                if kind == GameKind::Chess {
                    self.emit(SessionEvent::SelectionChanged(None));
                }
                self.append_entry(
                    Speaker::Assistant,
                    None,
                    Some(BoardWidget {
                        snapshot,
                        generation,
                    }),
                );
                match status {
                    GameStatus::InProgress => self.schedule_ai_ply(generation),
                    GameStatus::Over(outcome) => self.conclude_game(outcome),
                }
            }
        }
    }

    /// Fire the AI ply after the pacing delay. The timer carries the game's
    /// generation; if the game ends or is forfeited first, the fire is a
    /// no-op.
    fn schedule_ai_ply(&self, generation: u64) {
        let delay = Duration::from_millis(self.config.game.ai_ply_delay_ms);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionInput::AiPly { generation });
        });
    }

    fn on_ai_ply(&mut self, generation: u64) {
        if self.arbiter.mode() != Mode::GameActive || !self.arbiter.is_current(generation) {
            debug!("AI-ply timer fired for a concluded game, ignoring");
            return;
        }
        let Some(game) = self.game.as_mut() else {
            return;
        };
        let Some(gives_check) = game.apply_ai_move(&mut self.rng) else {
            return;
        };
        let snapshot = game.snapshot();
        let status = game.status();
        let notice = gives_check.then(|| "Check.".to_owned());
        self.append_entry(
            Speaker::Assistant,
            notice,
            Some(BoardWidget {
                snapshot,
                generation,
            }),
        );
        if let GameStatus::Over(outcome) = status {
            self.conclude_game(outcome);
        }
    }

    /// Narrate the result, destroy the game state, and return to Idle. The
    /// generation bump makes any still-scheduled AI-ply timer stale.
    fn conclude_game(&mut self, outcome: GameOutcome) {
        let Some(game) = self.game.take() else {
            return;
        };
        let narration = game.describe_outcome(outcome);
        self.append_entry(Speaker::Assistant, Some(narration.clone()), None);
        self.arbiter.end_game();
        self.emit_mode();
        self.voice.speak(&narration);
    }

    /// Forfeit works from any point in the game, regardless of whose turn
    /// it is.
    fn forfeit_game(&mut self) {
        if self.arbiter.mode() != Mode::GameActive {
            return;
        }
        let narration = match self.game.take() {
            Some(game) => game.forfeit_text().to_owned(),
            None => "Game over.".to_owned(),
        };
        self.append_entry(Speaker::Assistant, Some(narration.clone()), None);
        self.arbiter.end_game();
        self.emit_mode();
        self.voice.speak(&narration);
    }

    // ── Shared helpers ──────────────────────────────────────────────────

    fn view(&self) -> SessionView {
        SessionView {
            mode: self.arbiter.mode(),
            active_game: self.arbiter.active_game(),
            entries: self.timeline.entries().to_vec(),
        }
    }

    fn append_entry(
        &mut self,
        speaker: Speaker,
        text: Option<String>,
        widget: Option<BoardWidget>,
    ) -> EntryId {
        let id = self.timeline.append(speaker, text, widget);
        self.emit_last_appended();
        id
    }

    fn emit_last_appended(&self) {
        if let Some(entry) = self.timeline.last() {
            self.emit(SessionEvent::EntryAppended(entry.clone()));
        }
    }

    fn emit_last_updated(&self) {
        if let Some(entry) = self.timeline.last() {
            self.emit(SessionEvent::EntryUpdated(entry.clone()));
        }
    }

    fn emit_mode(&self) {
        self.emit(SessionEvent::ModeChanged(self.arbiter.mode()));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
