//! Wisp: timeline and turn orchestration core for a conversational
//! assistant.
//!
//! One session owns a single linear timeline shared by three concerns:
//! streaming chat with a language model, voice capture/playback, and two
//! embedded turn-based games whose plies land in the same history.
//!
//! # Architecture
//!
//! Everything mutable lives inside a coordinator task fed by one queue:
//! - **Turn arbiter**: the {idle, sending, listening, game-active} state
//!   machine; illegal intents are no-ops
//! - **Timeline store**: append-only entry log; only the streaming tail
//!   may be mutated
//! - **Streaming accumulation**: chunked replies folded into the pending
//!   entry, apology substitution on transport failure
//! - **Voice controller**: one-shot capture and playback sessions, with
//!   playback preemption
//! - **Game sessions**: tic-tac-toe and chess behind one closed variant,
//!   uniform-random AI plies on a pacing timer
//!
//! Deferred callbacks (chunks, capture events, timers) carry a generation
//! token and are dropped when stale, so ordering races never corrupt the
//! history.

pub mod arbiter;
pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod llm;
pub mod pipeline;
pub mod timeline;
pub mod voice;

pub use arbiter::{Mode, TurnArbiter};
pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use events::{SessionEvent, SessionView};
pub use game::GameKind;
pub use pipeline::coordinator::{SessionBuilder, SessionHandle};
pub use pipeline::messages::Intent;
pub use timeline::{EntryId, Speaker, TimelineEntry, TimelineStore};
