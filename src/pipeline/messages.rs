//! Message types processed by the session coordinator.

use crate::events::SessionView;
use crate::game::GameKind;
use crate::voice::CaptureEvent;
use tokio::sync::oneshot;

/// Intents issued by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Submit a typed (or captured) message to the assistant.
    SubmitText(String),
    /// Start a speech capture session.
    StartCapture,
    /// Explicitly stop the active capture session.
    StopCapture,
    /// Click a board cell or square. `x`/`y` are column/row for
    /// tic-tac-toe and file/rank for chess, both 0-based. `generation` is
    /// taken from the widget the click landed on.
    BoardClick { generation: u64, x: u8, y: u8 },
    /// Start a game.
    StartGame(GameKind),
    /// Forfeit the active game.
    ForfeitGame,
    /// Toggle voice output on or off.
    ToggleVoiceOutput,
    /// Toggle the preferred voice gender.
    ToggleVoiceGender,
}

/// Everything the coordinator task processes, one input at a time.
///
/// All asynchronous sources (presentation intents, stream chunks, capture
/// events, AI-ply timers) funnel into one queue, which is what makes the
/// session a single logical thread of control: no locks, only value-based
/// staleness checks on `generation`.
pub enum SessionInput {
    Intent(Intent),
    /// One streamed reply chunk for the pending entry of `generation`.
    StreamChunk { generation: u64, text: String },
    /// The streaming reply finished; `error` carries a transport failure.
    StreamDone {
        generation: u64,
        error: Option<String>,
    },
    /// A capture session event, tagged with the session's generation.
    Capture {
        generation: u64,
        event: CaptureEvent,
    },
    /// The AI-ply pacing timer fired for the game of `generation`.
    AiPly { generation: u64 },
    /// Request the current render source (mode + full timeline copy).
    Snapshot(oneshot::Sender<SessionView>),
    /// Tear down the session loop.
    Shutdown,
}
