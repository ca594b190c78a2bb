//! End-to-end tests of the session coordinator with scripted collaborators.
//!
//! Time is paused (`start_paused`), so pacing timers and timeouts advance
//! deterministically as soon as the runtime is idle.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use wisp::events::{SessionEvent, SessionView};
use wisp::game::{BoardSnapshot, Cell, GameKind};
use wisp::llm::ChatBackend;
use wisp::timeline::Speaker;
use wisp::voice::{
    CaptureEnd, CaptureEvent, CaptureService, CaptureSession, PlaybackService, VoiceGender,
    VoiceInfo,
};
use wisp::{AssistantConfig, AssistantError, Intent, Mode, SessionBuilder, SessionHandle};

// ── Scripted collaborator doubles ───────────────────────────────────────

struct ScriptedReply {
    chunks: Vec<&'static str>,
    /// When set, the stream stalls after its chunks until notified.
    hold: Option<Arc<Notify>>,
    error: Option<&'static str>,
}

fn reply(chunks: &[&'static str]) -> ScriptedReply {
    ScriptedReply {
        chunks: chunks.to_vec(),
        hold: None,
        error: None,
    }
}

struct ScriptedChat {
    replies: VecDeque<ScriptedReply>,
}

impl ScriptedChat {
    fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: replies.into(),
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn stream_reply(
        &mut self,
        _user_text: &str,
        tx: mpsc::Sender<String>,
    ) -> wisp::Result<()> {
        let reply = self.replies.pop_front().expect("unscripted chat call");
        for chunk in reply.chunks {
            let _ = tx.send(chunk.to_owned()).await;
        }
        if let Some(hold) = reply.hold {
            hold.notified().await;
        }
        match reply.error {
            Some(e) => Err(AssistantError::Chat(e.to_owned())),
            None => Ok(()),
        }
    }
}

/// Playback double whose utterances only end when cancelled, recording
/// every start and cancellation.
struct RecordingPlayback {
    voices: Vec<VoiceInfo>,
    started: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
}

impl RecordingPlayback {
    fn with_voice() -> Self {
        Self {
            voices: vec![VoiceInfo {
                name: "Ava".to_owned(),
                lang: "en-US".to_owned(),
                gender: Some(VoiceGender::Feminine),
            }],
            started: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    fn empty_catalog() -> Self {
        Self {
            voices: Vec::new(),
            started: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaybackService for RecordingPlayback {
    async fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }

    async fn speak(
        &self,
        text: &str,
        _voice: &VoiceInfo,
        cancel: CancellationToken,
    ) -> wisp::Result<()> {
        self.started.lock().unwrap().push(text.to_owned());
        cancel.cancelled().await;
        self.cancelled.lock().unwrap().push(text.to_owned());
        Ok(())
    }
}

/// Capture double: the test holds the sending side of each session.
struct ScriptedCapture {
    sessions: Mutex<VecDeque<mpsc::UnboundedReceiver<CaptureEvent>>>,
    cancels: Mutex<Vec<CancellationToken>>,
}

impl ScriptedCapture {
    fn with_one_session() -> (Self, mpsc::UnboundedSender<CaptureEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            sessions: Mutex::new(VecDeque::from([rx])),
            cancels: Mutex::new(Vec::new()),
        };
        (service, tx)
    }

    fn cancel_token(&self, index: usize) -> CancellationToken {
        self.cancels.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl CaptureService for ScriptedCapture {
    async fn start(&self, _locale: &str) -> wisp::Result<CaptureSession> {
        let events = self
            .sessions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AssistantError::Capture("no scripted session".to_owned()))?;
        let cancel = CancellationToken::new();
        self.cancels.lock().unwrap().push(cancel.clone());
        Ok(CaptureSession { events, cancel })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn test_config() -> AssistantConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let mut config = AssistantConfig::default();
    // Keep startup silent so every timeline entry comes from the test.
    config.llm.greeting = String::new();
    config
}

async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event channel closed")
}

async fn wait_for_mode(rx: &mut broadcast::Receiver<SessionEvent>, mode: Mode) {
    for _ in 0..64 {
        if let SessionEvent::ModeChanged(m) = next_event(rx).await
            && m == mode
        {
            return;
        }
    }
    panic!("mode {mode:?} never reached");
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// Poll the session view until at least `count` board widgets exist.
async fn wait_for_widgets(handle: &SessionHandle, count: usize) {
    for _ in 0..500 {
        if widget_count(&handle.view().await) >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("never reached {count} board widgets");
}

fn widget_count(view: &SessionView) -> usize {
    view.entries.iter().filter(|e| e.widget.is_some()).count()
}

fn last_widget_generation(view: &SessionView) -> u64 {
    view.entries
        .iter()
        .rev()
        .find_map(|e| e.widget.as_ref())
        .expect("no board widget in timeline")
        .generation
}

// ── Streaming replies ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn streaming_reply_concatenates_chunks_without_separators() {
    let chat = ScriptedChat::new(vec![reply(&["Hello", ", Srabon."])]);
    let handle = SessionBuilder::new(test_config()).chat(chat).spawn();
    let mut events = handle.subscribe();

    handle.intent(Intent::SubmitText("  hi there  ".to_owned()));
    wait_for_mode(&mut events, Mode::Sending).await;
    wait_for_mode(&mut events, Mode::Idle).await;

    let view = handle.view().await;
    assert_eq!(view.mode, Mode::Idle);
    assert_eq!(view.entries.len(), 2);
    assert_eq!(view.entries[0].speaker, Speaker::User);
    assert_eq!(view.entries[0].text.as_deref(), Some("hi there"));
    assert_eq!(view.entries[1].speaker, Speaker::Assistant);
    assert_eq!(view.entries[1].text.as_deref(), Some("Hello, Srabon."));
}

#[tokio::test(start_paused = true)]
async fn transport_failure_replaces_partial_output_with_apology() {
    let chat = ScriptedChat::new(vec![ScriptedReply {
        chunks: vec!["par", "tial"],
        hold: None,
        error: Some("connection reset"),
    }]);
    let handle = SessionBuilder::new(test_config()).chat(chat).spawn();
    let mut events = handle.subscribe();

    handle.intent(Intent::SubmitText("question".to_owned()));
    wait_for_mode(&mut events, Mode::Idle).await;

    let view = handle.view().await;
    let text = view.entries[1].text.as_deref().unwrap();
    assert!(text.starts_with("Sorry"), "apology expected, got: {text}");
    assert!(!text.contains("partial"));
    // The session stays usable: no entry was removed, mode is Idle.
    assert_eq!(view.entries.len(), 2);
    assert_eq!(view.mode, Mode::Idle);
}

#[tokio::test(start_paused = true)]
async fn exclusive_intents_are_noops_while_sending() {
    let hold = Arc::new(Notify::new());
    let chat = ScriptedChat::new(vec![
        ScriptedReply {
            chunks: vec!["thinking"],
            hold: Some(hold.clone()),
            error: None,
        },
        reply(&["done"]),
    ]);
    let handle = SessionBuilder::new(test_config()).chat(chat).spawn();
    let mut events = handle.subscribe();

    handle.intent(Intent::SubmitText("first".to_owned()));
    wait_for_mode(&mut events, Mode::Sending).await;

    // None of these may be accepted while the reply is in flight.
    handle.intent(Intent::SubmitText("second".to_owned()));
    handle.intent(Intent::StartCapture);
    handle.intent(Intent::StartGame(GameKind::TicTacToe));

    let view = handle.view().await;
    assert_eq!(view.mode, Mode::Sending);
    assert_eq!(view.entries.len(), 2, "no entry may be appended by no-ops");

    hold.notify_one();
    wait_for_mode(&mut events, Mode::Idle).await;

    // The arbiter is free again: the next submission works.
    handle.intent(Intent::SubmitText("second".to_owned()));
    wait_for_mode(&mut events, Mode::Idle).await;
    let view = handle.view().await;
    assert_eq!(view.entries.len(), 4);
    assert_eq!(view.entries[3].text.as_deref(), Some("done"));
}

#[tokio::test(start_paused = true)]
async fn missing_chat_backend_surfaces_init_entry_and_apologies() {
    let handle = SessionBuilder::new(test_config())
        .chat_unavailable("no models configured")
        .spawn();
    let mut events = handle.subscribe();

    let view = handle.view().await;
    assert_eq!(view.entries.len(), 1);
    let text = view.entries[0].text.as_deref().unwrap();
    assert!(text.contains("no models configured"));

    // Submissions still run, failing at the transport layer.
    handle.intent(Intent::SubmitText("anyone home?".to_owned()));
    wait_for_mode(&mut events, Mode::Idle).await;
    let view = handle.view().await;
    assert_eq!(view.entries.len(), 3);
    assert!(view.entries[2].text.as_deref().unwrap().starts_with("Sorry"));
}

// ── Voice capture ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn interim_transcripts_replace_and_capture_resolves_to_idle() {
    let (capture, capture_tx) = ScriptedCapture::with_one_session();
    let handle = SessionBuilder::new(test_config())
        .capture(Arc::new(capture))
        .spawn();
    let mut events = handle.subscribe();

    handle.intent(Intent::StartCapture);
    wait_for_mode(&mut events, Mode::Listening).await;

    capture_tx
        .send(CaptureEvent::Interim("hel".to_owned()))
        .unwrap();
    capture_tx
        .send(CaptureEvent::Interim("hello world".to_owned()))
        .unwrap();
    capture_tx
        .send(CaptureEvent::Ended(CaptureEnd::Completed))
        .unwrap();

    let mut interims = Vec::new();
    loop {
        match next_event(&mut events).await {
            SessionEvent::InterimTranscript(text) => interims.push(text),
            SessionEvent::CaptureEnded { transcript, reason } => {
                assert_eq!(transcript, "hello world");
                assert_eq!(reason, CaptureEnd::Completed);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(interims, ["hel", "hello world"]);
    assert_eq!(handle.view().await.mode, Mode::Idle);
}

#[tokio::test(start_paused = true)]
async fn submit_stops_capture_and_stale_end_event_is_dropped() {
    let (capture, capture_tx) = ScriptedCapture::with_one_session();
    let capture = Arc::new(capture);
    let chat = ScriptedChat::new(vec![reply(&["answer"])]);
    let handle = SessionBuilder::new(test_config())
        .capture(capture.clone())
        .chat(chat)
        .spawn();
    let mut events = handle.subscribe();

    handle.intent(Intent::StartCapture);
    wait_for_mode(&mut events, Mode::Listening).await;
    capture_tx
        .send(CaptureEvent::Interim("never mind".to_owned()))
        .unwrap();

    // Submitting stops the capture session as part of the submit.
    handle.intent(Intent::SubmitText("typed question".to_owned()));
    wait_for_mode(&mut events, Mode::Sending).await;
    assert!(capture.cancel_token(0).is_cancelled());

    // The service still delivers its end event; it must be idempotent.
    capture_tx
        .send(CaptureEvent::Ended(CaptureEnd::Stopped))
        .unwrap();

    wait_for_mode(&mut events, Mode::Idle).await;
    let view = handle.view().await;
    assert_eq!(view.mode, Mode::Idle);
    assert_eq!(view.entries.len(), 2);
    assert_eq!(view.entries[1].text.as_deref(), Some("answer"));
}

#[tokio::test(start_paused = true)]
async fn capture_unavailable_degrades_to_a_noop() {
    let handle = SessionBuilder::new(test_config()).spawn();
    let mut events = handle.subscribe();

    handle.intent(Intent::StartCapture);
    let view = handle.view().await;
    assert_eq!(view.mode, Mode::Idle);
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

// ── Playback arbitration ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn new_playback_preempts_the_previous_utterance() {
    let playback = Arc::new(RecordingPlayback::with_voice());
    let chat = ScriptedChat::new(vec![reply(&["first reply"]), reply(&["second reply"])]);
    let handle = SessionBuilder::new(test_config())
        .chat(chat)
        .playback(playback.clone())
        .spawn();
    let mut events = handle.subscribe();

    handle.intent(Intent::SubmitText("one".to_owned()));
    wait_for_mode(&mut events, Mode::Idle).await;
    eventually(|| playback.started().len() == 1).await;

    handle.intent(Intent::SubmitText("two".to_owned()));
    wait_for_mode(&mut events, Mode::Idle).await;

    eventually(|| playback.started().len() == 2).await;
    eventually(|| playback.cancelled() == ["first reply"]).await;
    assert_eq!(playback.started(), ["first reply", "second reply"]);
}

#[tokio::test(start_paused = true)]
async fn empty_voice_catalog_skips_playback_silently() {
    let playback = Arc::new(RecordingPlayback::empty_catalog());
    let chat = ScriptedChat::new(vec![reply(&["quiet reply"])]);
    let handle = SessionBuilder::new(test_config())
        .chat(chat)
        .playback(playback.clone())
        .spawn();
    let mut events = handle.subscribe();

    handle.intent(Intent::SubmitText("one".to_owned()));
    wait_for_mode(&mut events, Mode::Idle).await;

    // Give the playback task time to run; nothing may start.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(playback.started().is_empty());
    assert_eq!(
        handle.view().await.entries[1].text.as_deref(),
        Some("quiet reply")
    );
}

// ── Game sessions ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn tictactoe_ply_appends_board_and_schedules_ai_reply() {
    let handle = SessionBuilder::new(test_config()).spawn();
    let mut events = handle.subscribe();

    handle.intent(Intent::StartGame(GameKind::TicTacToe));
    wait_for_mode(&mut events, Mode::GameActive).await;

    let view = handle.view().await;
    assert_eq!(view.active_game, Some(GameKind::TicTacToe));
    assert_eq!(view.entries.len(), 2, "intro text plus initial board");
    let generation = last_widget_generation(&view);

    handle.intent(Intent::BoardClick {
        generation,
        x: 1,
        y: 1,
    });
    wait_for_widgets(&handle, 3).await;

    let view = handle.view().await;
    // Human board, then the AI board after the pacing delay.
    assert_eq!(widget_count(&view), 3);
    let human_board = view
        .entries
        .iter()
        .filter_map(|e| e.widget.as_ref())
        .nth(1)
        .unwrap();
    let BoardSnapshot::TicTacToe { cells } = &human_board.snapshot else {
        panic!("tic-tac-toe snapshot expected");
    };
    assert_eq!(cells[1][1], Cell::Human);

    // A click on the now-occupied center is rejected without a new entry.
    let before = handle.view().await.entries.len();
    handle.intent(Intent::BoardClick {
        generation,
        x: 1,
        y: 1,
    });
    assert_eq!(handle.view().await.entries.len(), before);

    handle.intent(Intent::ForfeitGame);
    wait_for_mode(&mut events, Mode::Idle).await;
    let view = handle.view().await;
    assert_eq!(view.active_game, None);
    assert!(
        view.entries
            .last()
            .unwrap()
            .text
            .as_deref()
            .unwrap()
            .contains("abandoned")
    );
}

#[tokio::test(start_paused = true)]
async fn forfeit_beats_the_scheduled_ai_ply_timer() {
    let mut config = test_config();
    config.game.ai_ply_delay_ms = 60_000;
    let handle = SessionBuilder::new(config).spawn();
    let mut events = handle.subscribe();

    handle.intent(Intent::StartGame(GameKind::TicTacToe));
    wait_for_mode(&mut events, Mode::GameActive).await;
    let generation = last_widget_generation(&handle.view().await);

    handle.intent(Intent::BoardClick {
        generation,
        x: 0,
        y: 0,
    });
    handle.intent(Intent::ForfeitGame);
    wait_for_mode(&mut events, Mode::Idle).await;

    let concluded = handle.view().await.entries.len();

    // Let the pacing timer fire well past its delay: it must no-op.
    tokio::time::sleep(Duration::from_secs(61)).await;
    let view = handle.view().await;
    assert_eq!(view.entries.len(), concluded);
    assert_eq!(view.mode, Mode::Idle);
    assert_eq!(widget_count(&view), 2, "no AI board after the forfeit");
}

#[tokio::test(start_paused = true)]
async fn chess_selection_then_move_then_engine_reply() {
    let handle = SessionBuilder::new(test_config()).spawn();
    let mut events = handle.subscribe();

    handle.intent(Intent::StartGame(GameKind::Chess));
    wait_for_mode(&mut events, Mode::GameActive).await;
    let generation = last_widget_generation(&handle.view().await);

    // Selecting e2 highlights it without appending anything.
    handle.intent(Intent::BoardClick {
        generation,
        x: 4,
        y: 1,
    });
    loop {
        if let SessionEvent::SelectionChanged(selection) = next_event(&mut events).await {
            assert_eq!(selection, Some((4, 1)));
            break;
        }
    }
    assert_eq!(handle.view().await.entries.len(), 2);

    // e2-e4 applies; the engine answers after the pacing delay.
    handle.intent(Intent::BoardClick {
        generation,
        x: 4,
        y: 3,
    });
    wait_for_widgets(&handle, 3).await;

    let view = handle.view().await;
    let boards: Vec<&BoardSnapshot> = view
        .entries
        .iter()
        .filter_map(|e| e.widget.as_ref())
        .map(|w| &w.snapshot)
        .collect();
    let BoardSnapshot::Chess { fen } = boards[1] else {
        panic!("chess snapshot expected");
    };
    assert!(fen.starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b"));
    let BoardSnapshot::Chess { fen } = boards[2] else {
        panic!("chess snapshot expected");
    };
    assert!(fen.contains(" w "), "after the engine ply it is White to move");

    handle.intent(Intent::ForfeitGame);
    wait_for_mode(&mut events, Mode::Idle).await;

    // Clicks carrying the dead game's generation are dropped.
    let before = handle.view().await.entries.len();
    handle.intent(Intent::BoardClick {
        generation,
        x: 4,
        y: 1,
    });
    assert_eq!(handle.view().await.entries.len(), before);
}
