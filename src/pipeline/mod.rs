//! Session orchestration: the coordinator task and its message types.

pub mod coordinator;
pub mod messages;

pub use coordinator::{SessionBuilder, SessionHandle};
pub use messages::{Intent, SessionInput};
