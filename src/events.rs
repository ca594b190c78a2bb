//! Session events emitted for the presentation layer and observability.
//!
//! Intentionally lightweight: entry payloads are clones of timeline
//! entries, so a renderer can update incrementally or fall back to a full
//! snapshot request at any time.

use crate::arbiter::Mode;
use crate::game::GameKind;
use crate::timeline::TimelineEntry;
use crate::voice::{CaptureEnd, VoiceGender};

/// Render source handed to the presentation layer on request: the current
/// conversation state plus a full copy of the timeline.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub mode: Mode,
    /// The game being played, when `mode` is [`Mode::GameActive`].
    pub active_game: Option<GameKind>,
    pub entries: Vec<TimelineEntry>,
}

impl SessionView {
    /// View of a session whose coordinator has already stopped.
    pub(crate) fn closed() -> Self {
        Self {
            mode: Mode::Idle,
            active_game: None,
            entries: Vec::new(),
        }
    }
}

/// Events that describe what the session is doing "right now".
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Arbitration mode changed.
    ModeChanged(Mode),
    /// A new entry was appended to the timeline.
    EntryAppended(TimelineEntry),
    /// The tail entry was mutated in place (streaming chunk, freeze, or
    /// error substitution).
    EntryUpdated(TimelineEntry),
    /// Interim capture transcript; each value fully replaces the previous
    /// one in the pending input field.
    InterimTranscript(String),
    /// The capture session ended; `transcript` is the last interim text.
    CaptureEnded {
        transcript: String,
        reason: CaptureEnd,
    },
    /// Chess square selection highlight changed (`(file, rank)`).
    SelectionChanged(Option<(u8, u8)>),
    /// Voice output was toggled.
    VoiceOutputChanged(bool),
    /// The preferred voice gender was toggled.
    VoiceGenderChanged(VoiceGender),
}
