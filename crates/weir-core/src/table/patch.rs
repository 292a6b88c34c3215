//! Stream ingestion for tables, including atomic bulk patches.

use std::sync::Arc;

use crate::error::Error;
use crate::stream::{Receiver, Stream, StreamEvent};
use crate::table::Table;
use crate::value::Item;

impl Table {
    /// Apply one incoming stream event to the table.
    ///
    /// While a patch is open (`StartPatch` seen), events buffer instead of
    /// applying; `FinishPatch` applies the whole buffer atomically
    /// (deleting all rows first when the patch was opened with
    /// `replace_all`), and an early `Done` discards the buffer; an
    /// aborted patch leaves the table untouched.
    pub fn receive_stream_event(self: &Arc<Self>, event: StreamEvent) -> Result<(), Error> {
        if self.is_during_patch() {
            match event {
                StreamEvent::Done => {
                    self.end_patch();
                    Ok(())
                }
                StreamEvent::FinishPatch => {
                    for buffered in self.end_patch() {
                        match buffered {
                            StreamEvent::StartPatch { replace_all } => {
                                if replace_all {
                                    self.delete_all();
                                }
                            }
                            StreamEvent::Item { item } => {
                                self.apply_put(item);
                            }
                            StreamEvent::Delete { item } => {
                                self.delete(&item)?;
                            }
                            StreamEvent::Error { error } => self.put_error(error),
                            StreamEvent::Header { item } => self.put_header(item),
                            _ => {}
                        }
                    }
                    Ok(())
                }
                other => {
                    self.push_patch_event(other);
                    Ok(())
                }
            }
        } else {
            match event {
                StreamEvent::Item { item } => {
                    self.apply_put(item);
                    Ok(())
                }
                StreamEvent::Delete { item } => {
                    self.delete(&item)?;
                    Ok(())
                }
                StreamEvent::Error { error } => {
                    self.put_error(error);
                    Ok(())
                }
                StreamEvent::Header { item } => {
                    self.put_header(item);
                    Ok(())
                }
                StreamEvent::StartPatch { replace_all } => {
                    self.begin_patch(StreamEvent::StartPatch { replace_all });
                    Ok(())
                }
                StreamEvent::FinishPatch => Err(Error::ProtocolViolation(
                    format!("table '{}' wasn't expecting finish_patch", self.name()),
                )),
                StreamEvent::Schema { .. } | StreamEvent::Done => Ok(()),
            }
        }
    }

    /// A receiver that feeds this table; wire it to a stream to ingest it.
    pub fn receiver(self: &Arc<Self>) -> TableReceiver {
        TableReceiver {
            table: self.clone(),
        }
    }

    /// Put that records constraint failures as captured errors instead of
    /// failing the feeding stream.
    fn apply_put(self: &Arc<Self>, item: Item) {
        if let Err(err) = self.put(item) {
            tracing::warn!(table = self.name(), error = %err, "stream put rejected");
            self.put_error(crate::error::ErrorItem::from_error(&err, None));
        }
    }
}

/// Feeds a stream into a table.
pub struct TableReceiver {
    table: Arc<Table>,
}

impl Receiver for TableReceiver {
    fn receive(&mut self, event: StreamEvent) -> Result<(), Error> {
        self.table.receive_stream_event(event)
    }
}

impl Table {
    /// Capture an entire stream into this table.
    pub fn capture_stream(self: &Arc<Self>, stream: &Stream) {
        stream.send_to(self.receiver());
    }
}
