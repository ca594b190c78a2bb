//! Language-model chat collaborators.

pub mod api;

pub use api::ApiChat;

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A streaming chat collaborator with prior-turn awareness.
///
/// `stream_reply` delivers each incremental text chunk through `tx` in
/// arrival order and returns once the reply is complete. The chunks carry
/// no ordering guarantee beyond delivery order. An `Err` is a transport
/// failure: the caller discards whatever chunks already arrived.
#[async_trait]
pub trait ChatBackend: Send {
    async fn stream_reply(&mut self, user_text: &str, tx: mpsc::Sender<String>) -> Result<()>;
}
