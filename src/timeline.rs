//! Append-only timeline of conversation entries.
//!
//! The timeline is the single ordered history shared by chat, voice, and
//! game activity. Entries are never reordered or removed; the only mutation
//! permitted is on the most recently appended entry while it is still in
//! its streaming sub-state, so a renderer can always walk the log linearly
//! without observing torn state.

use crate::game::BoardSnapshot;
use uuid::Uuid;

/// Opaque identity of a timeline entry, assigned at append time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(Uuid);

impl EntryId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Who produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// An interactive board embedded in a timeline entry.
///
/// The snapshot is the position at the moment the entry was appended, never
/// a live reference: replayed history shows boards as they were. Clicks
/// routed through a widget carry `generation`; once the arbiter generation
/// has moved on (game over, forfeit, new game) those clicks are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardWidget {
    pub snapshot: BoardSnapshot,
    pub generation: u64,
}

/// One unit of conversation history: text, an embedded board, or both.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub id: EntryId,
    pub speaker: Speaker,
    pub text: Option<String>,
    pub widget: Option<BoardWidget>,
}

/// Ordered, append-only log of timeline entries.
#[derive(Debug, Default)]
pub struct TimelineStore {
    entries: Vec<TimelineEntry>,
    /// Entry currently accepting streamed text, if any.
    streaming: Option<EntryId>,
}

impl TimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finalized entry and return its assigned id.
    pub fn append(
        &mut self,
        speaker: Speaker,
        text: Option<String>,
        widget: Option<BoardWidget>,
    ) -> EntryId {
        let id = EntryId::new();
        self.entries.push(TimelineEntry {
            id,
            speaker,
            text,
            widget,
        });
        id
    }

    /// Append an empty entry in the streaming sub-state.
    ///
    /// The entry starts with empty text so a renderer can show a pending
    /// indicator immediately; chunks are folded in via [`mutate_last`].
    ///
    /// [`mutate_last`]: TimelineStore::mutate_last
    pub fn append_streaming(&mut self, speaker: Speaker) -> EntryId {
        let id = self.append(speaker, Some(String::new()), None);
        self.streaming = Some(id);
        id
    }

    /// Mutate the entry with `id` only if it is still the streaming tail.
    ///
    /// Returns `false` (dropping the mutation) when a later append has
    /// superseded the entry or it has been frozen. This is the last-writer
    /// tail-mutation rule: a stale stream handle can never corrupt entries
    /// appended after it.
    pub fn mutate_last<F>(&mut self, id: EntryId, f: F) -> bool
    where
        F: FnOnce(&mut TimelineEntry),
    {
        if self.streaming != Some(id) {
            return false;
        }
        match self.entries.last_mut() {
            Some(entry) if entry.id == id => {
                f(entry);
                true
            }
            _ => false,
        }
    }

    /// Replace the payload of the still-forming tail entry with `text`.
    ///
    /// Used for error substitution of a streaming reply: the partial text is
    /// discarded wholesale. The entry keeps its id and speaker, is frozen,
    /// and a stale replace (entry no longer the tail) is dropped.
    pub fn replace(&mut self, id: EntryId, text: String) -> bool {
        let replaced = self.mutate_last(id, |entry| {
            entry.text = Some(text);
            entry.widget = None;
        });
        if replaced {
            self.freeze(id);
        }
        replaced
    }

    /// Freeze the streaming entry: no further tail mutation is accepted.
    pub fn freeze(&mut self, id: EntryId) {
        if self.streaming == Some(id) {
            self.streaming = None;
        }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TimelineEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
