//! The stream event vocabulary.

use crate::error::ErrorItem;
use crate::value::Item;

/// One event on a [`crate::stream::Stream`].
///
/// Within one stream, events reach a receiver in emission order. `Done`
/// terminates the stream: it appears at most once and nothing may follow
/// it.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A data item.
    Item { item: Item },
    /// An item was deleted (change feeds).
    Delete { item: Item },
    /// An in-band error. A stream may carry several before `Done`.
    Error { error: ErrorItem },
    /// Out-of-band header metadata.
    Header { item: Item },
    /// The expected output shape, sent before data.
    Schema { item: Item },
    /// Begin a bulk patch; following events buffer until `FinishPatch`.
    StartPatch {
        /// Delete all existing rows before applying the patch.
        replace_all: bool,
    },
    /// Atomically apply the buffered patch.
    FinishPatch,
    /// Terminal event.
    Done,
}

impl StreamEvent {
    /// Convenience constructor for item events.
    pub fn item(item: Item) -> Self {
        StreamEvent::Item { item }
    }

    /// Whether this is the terminal event.
    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }
}
