//! Conversation turn arbitration.
//!
//! The arbiter is the single source of truth for what may happen next.
//! Exactly one mode holds at any instant; an intent that does not match a
//! legal transition from the current mode is a no-op, never an error, so
//! concurrent or stale UI events cannot corrupt state.

use crate::game::GameKind;
use tracing::debug;

/// Exclusive session modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    /// A streaming reply is in flight.
    Sending,
    /// A speech capture session is open.
    Listening,
    /// A game is running.
    GameActive,
}

/// Mode state machine plus the generation counter used to detect stale
/// asynchronous callbacks.
///
/// The generation is bumped on every exclusive-mode transition. Deferred
/// work (stream chunks, capture events, AI-ply timers) captures the
/// generation at scheduling time and is discarded on arrival unless it
/// still matches.
#[derive(Debug, Default)]
pub struct TurnArbiter {
    mode: Option<ModeState>,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeState {
    Sending,
    Listening,
    Game(GameKind),
}

impl TurnArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        match self.mode {
            None => Mode::Idle,
            Some(ModeState::Sending) => Mode::Sending,
            Some(ModeState::Listening) => Mode::Listening,
            Some(ModeState::Game(_)) => Mode::GameActive,
        }
    }

    /// The game being played, when mode is [`Mode::GameActive`].
    pub fn active_game(&self) -> Option<GameKind> {
        match self.mode {
            Some(ModeState::Game(kind)) => Some(kind),
            _ => None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a captured generation token is still the live one.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Idle → Sending. Returns the new generation, or `None` as a no-op.
    pub fn begin_sending(&mut self) -> Option<u64> {
        self.enter(ModeState::Sending)
    }

    /// Sending → Idle, on stream completion or failure.
    pub fn finish_sending(&mut self) -> bool {
        self.leave(ModeState::Sending)
    }

    /// Idle → Listening. Returns the new generation, or `None` as a no-op.
    pub fn begin_listening(&mut self) -> Option<u64> {
        self.enter(ModeState::Listening)
    }

    /// Listening → Idle, on explicit stop, natural end, or capture error.
    pub fn finish_listening(&mut self) -> bool {
        self.leave(ModeState::Listening)
    }

    /// Idle → GameActive. Returns the new generation, or `None` as a no-op.
    pub fn begin_game(&mut self, kind: GameKind) -> Option<u64> {
        self.enter(ModeState::Game(kind))
    }

    /// GameActive → Idle, on game end or forfeit.
    pub fn end_game(&mut self) -> bool {
        match self.mode {
            Some(ModeState::Game(_)) => {
                self.mode = None;
                self.bump();
                true
            }
            _ => {
                debug!("end_game ignored outside GameActive");
                false
            }
        }
    }

    fn enter(&mut self, target: ModeState) -> Option<u64> {
        if self.mode.is_some() {
            debug!(current = ?self.mode, requested = ?target, "transition ignored");
            return None;
        }
        self.mode = Some(target);
        self.bump();
        Some(self.generation)
    }

    fn leave(&mut self, expected: ModeState) -> bool {
        if self.mode != Some(expected) {
            debug!(current = ?self.mode, expected = ?expected, "exit ignored");
            return false;
        }
        self.mode = None;
        self.bump();
        true
    }

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}
