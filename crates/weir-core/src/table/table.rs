//! The in-memory table: ordered rows, indexes, mutation, change feeds.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::Rng;

use crate::error::{Error, ErrorItem};
use crate::stream::{Stream, StreamEvent};
use crate::table::{GenerateMethod, OnConflict, OnDelete, TableIndex, TableSchema};
use crate::value::{Item, Value};

/// A registered back-reference: some other table's attr points at one of
/// our attrs, with an on-delete action.
struct IncomingRef {
    table: Weak<Table>,
    /// The referencing attr on the other table.
    attr: String,
    /// The referenced attr on this table.
    referenced_attr: String,
    on_delete: OnDelete,
}

struct TableState {
    rows: BTreeMap<u64, Item>,
    next_row_id: u64,
    indexes: Vec<TableIndex>,
    listeners: Vec<Stream>,
    increment_counters: HashMap<String, i64>,
    incoming_refs: Vec<IncomingRef>,
    headers: Vec<Item>,
    errors: Vec<ErrorItem>,
    is_during_patch: bool,
    pending_patch_events: Vec<StreamEvent>,
}

/// A named, schema-bound, insertion-ordered collection of items.
///
/// Mutation happens only through `put`/`update`/`delete`; indexes update
/// incrementally and change listeners are notified per row.
pub struct Table {
    name: String,
    schema: TableSchema,
    state: Mutex<TableState>,
}

impl Table {
    /// Create a table. The schema is normalized (generated attrs become
    /// unique and indexed) and foreign keys register back-references on
    /// the referenced tables.
    pub fn new(schema: TableSchema) -> Arc<Table> {
        let schema = schema.normalized();
        let name = schema
            .name
            .clone()
            .unwrap_or_else(|| "anonymous".to_string());

        let indexes = schema
            .index_attr_sets()
            .into_iter()
            .map(TableIndex::new)
            .collect();

        let table = Arc::new(Table {
            name,
            schema,
            state: Mutex::new(TableState {
                rows: BTreeMap::new(),
                next_row_id: 1,
                indexes,
                listeners: Vec::new(),
                increment_counters: HashMap::new(),
                incoming_refs: Vec::new(),
                headers: Vec::new(),
                errors: Vec::new(),
                is_during_patch: false,
                pending_patch_events: Vec::new(),
            }),
        });

        for (attr, config) in table.schema.attrs() {
            if let Some(fk) = &config.foreign_key {
                fk.table.state.lock().incoming_refs.push(IncomingRef {
                    table: Arc::downgrade(&table),
                    attr: attr.to_string(),
                    referenced_attr: fk.attr.clone(),
                    on_delete: fk.on_delete,
                });
            }
        }

        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Insert an item: fill generated attrs, enforce unique constraints,
    /// index, and notify listeners. Returns the stored item including
    /// generated values (or, under `DropNew`, the surviving existing row).
    pub fn put(&self, mut item: Item) -> Result<Item, Error> {
        let mut events: Vec<StreamEvent> = Vec::new();

        let stored = {
            let mut st = self.state.lock();

            // Fill generated attrs not supplied by the caller.
            for (attr, config) in self.schema.attrs() {
                let Some(generate) = &config.generate else {
                    continue;
                };
                let missing = item.get(attr).map(|v| v.is_null()).unwrap_or(true);
                if !missing {
                    continue;
                }

                let value = match generate.method {
                    GenerateMethod::Increment => {
                        let counter =
                            st.increment_counters.entry(attr.to_string()).or_insert(0);
                        *counter += 1;
                        match &generate.prefix {
                            Some(prefix) => Value::String(format!("{prefix}{counter}")),
                            None => Value::Int(*counter),
                        }
                    }
                    GenerateMethod::Random => {
                        let hex = random_hex(generate.length.unwrap_or(8));
                        match &generate.prefix {
                            Some(prefix) => Value::String(format!("{prefix}{hex}")),
                            None => Value::String(hex),
                        }
                    }
                    GenerateMethod::TimePut => Value::Int(current_timestamp_micros()),
                };
                item.set(attr, value);
            }

            // Unique checks happen before any mutation so an Error policy
            // leaves the table unchanged.
            let mut replaced: Vec<u64> = Vec::new();
            for (attr, config) in self.schema.attrs() {
                let Some(unique) = &config.unique else {
                    continue;
                };
                let Some(value) = item.get(attr) else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }

                let filter = Item::new().with(attr, value.clone());
                let conflicts = match_row_ids(&st, &filter);
                if conflicts.is_empty() {
                    continue;
                }

                match unique.on_conflict {
                    OnConflict::Error => {
                        return Err(Error::UniqueViolation {
                            table: self.name.clone(),
                            attr: attr.to_string(),
                        });
                    }
                    OnConflict::DropNew => {
                        let existing = st.rows[&conflicts[0]].clone();
                        return Ok(existing);
                    }
                    OnConflict::Overwrite => replaced.extend(conflicts),
                }
            }

            replaced.sort_unstable();
            replaced.dedup();
            for row_id in replaced {
                if let Some(old) = st.rows.remove(&row_id) {
                    for index in &mut st.indexes {
                        index.remove(&old, row_id);
                    }
                    events.push(StreamEvent::Delete { item: old });
                }
            }

            let row_id = st.next_row_id;
            st.next_row_id += 1;
            for index in &mut st.indexes {
                index.insert(&item, row_id);
            }
            st.rows.insert(row_id, item.clone());
            events.push(StreamEvent::Item { item: item.clone() });
            item
        };

        self.notify_listeners(&events);
        Ok(stored)
    }

    /// Every row, in insertion order.
    pub fn scan(&self) -> Vec<Item> {
        self.state.lock().rows.values().cloned().collect()
    }

    /// Rows matching the filter (attr = value, canonical-string equality),
    /// index-assisted when the filter's attrs match a configured index.
    pub fn where_filter(&self, filter: &Item) -> Vec<Item> {
        let st = self.state.lock();
        match_row_ids(&st, filter)
            .into_iter()
            .filter_map(|id| st.rows.get(&id).cloned())
            .collect()
    }

    /// The first row matching the filter.
    pub fn one(&self, filter: &Item) -> Option<Item> {
        self.where_filter(filter).into_iter().next()
    }

    /// The first row in insertion order.
    pub fn first(&self) -> Option<Item> {
        self.state.lock().rows.values().next().cloned()
    }

    /// Number of rows.
    pub fn count(&self) -> usize {
        self.state.lock().rows.len()
    }

    /// Update matching rows in place. Indexed attrs are re-indexed; an
    /// item-changed event is emitted per row. Returns the match count.
    pub fn update<F>(&self, filter: &Item, mut mutate: F) -> Result<usize, Error>
    where
        F: FnMut(&mut Item),
    {
        let mut events: Vec<StreamEvent> = Vec::new();

        let count = {
            let mut st = self.state.lock();
            let ids = match_row_ids(&st, filter);

            for row_id in &ids {
                let Some(old) = st.rows.get(row_id).cloned() else {
                    continue;
                };
                let mut updated = old.clone();
                mutate(&mut updated);

                for index in &mut st.indexes {
                    index.remove(&old, *row_id);
                    index.insert(&updated, *row_id);
                }
                st.rows.insert(*row_id, updated.clone());
                events.push(StreamEvent::Item { item: updated });
            }
            ids.len()
        };

        self.notify_listeners(&events);
        Ok(count)
    }

    /// Delete matching rows, apply on-delete actions to referencing
    /// foreign keys, and emit delete events. Returns the removed count.
    pub fn delete(&self, filter: &Item) -> Result<usize, Error> {
        let (removed, refs) = {
            let mut st = self.state.lock();
            let ids = match_row_ids(&st, filter);

            let mut removed = Vec::new();
            for row_id in ids {
                if let Some(old) = st.rows.remove(&row_id) {
                    for index in &mut st.indexes {
                        index.remove(&old, row_id);
                    }
                    removed.push(old);
                }
            }

            let refs: Vec<(Weak<Table>, String, String, OnDelete)> = st
                .incoming_refs
                .iter()
                .map(|r| {
                    (
                        r.table.clone(),
                        r.attr.clone(),
                        r.referenced_attr.clone(),
                        r.on_delete,
                    )
                })
                .collect();
            (removed, refs)
        };

        let events: Vec<StreamEvent> = removed
            .iter()
            .map(|item| StreamEvent::Delete { item: item.clone() })
            .collect();
        self.notify_listeners(&events);

        for item in &removed {
            for (weak, attr, referenced_attr, on_delete) in &refs {
                let Some(referencing) = weak.upgrade() else {
                    continue;
                };
                let Some(value) = item.get(referenced_attr) else {
                    continue;
                };
                let ref_filter = Item::new().with(attr.clone(), value.clone());
                match on_delete {
                    OnDelete::Cascade => {
                        referencing.delete(&ref_filter)?;
                    }
                    OnDelete::SetNull => {
                        let attr = attr.clone();
                        referencing.update(&ref_filter, |row| row.set(attr.clone(), Value::Null))?;
                    }
                }
            }
        }

        Ok(removed.len())
    }

    /// Remove every row. Bulk-replace semantics: no foreign-key actions.
    pub fn delete_all(&self) {
        let events: Vec<StreamEvent> = {
            let mut st = self.state.lock();
            let removed: Vec<Item> = st.rows.values().cloned().collect();
            st.rows.clear();
            let attr_sets: Vec<Vec<String>> = st
                .indexes
                .iter()
                .map(|i| i.attrs().to_vec())
                .collect();
            st.indexes = attr_sets.into_iter().map(TableIndex::new).collect();
            removed
                .into_iter()
                .map(|item| StreamEvent::Delete { item })
                .collect()
        };
        self.notify_listeners(&events);
    }

    /// A live change feed. With `backlog`, current rows replay as `item`
    /// events first; the stream then carries put/delete events until the
    /// receiver stops it or the graph closes it.
    pub fn start_listener_stream(&self, backlog: bool) -> Stream {
        let stream = Stream::with_label(format!("listener:{}", self.name));
        let mut st = self.state.lock();
        if backlog {
            for row in st.rows.values() {
                let _ = stream.put(row.clone());
            }
        }
        st.listeners.push(stream.clone());
        stream
    }

    /// Record an in-band error captured from a stream.
    pub fn put_error(&self, error: ErrorItem) {
        self.state.lock().errors.push(error);
    }

    /// Record header metadata captured from a stream.
    pub fn put_header(&self, item: Item) {
        self.state.lock().headers.push(item);
    }

    /// Captured stream errors.
    pub fn errors(&self) -> Vec<ErrorItem> {
        self.state.lock().errors.clone()
    }

    /// Captured stream headers.
    pub fn headers(&self) -> Vec<Item> {
        self.state.lock().headers.clone()
    }

    fn notify_listeners(&self, events: &[StreamEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners: Vec<Stream> = self.state.lock().listeners.clone();
        if listeners.is_empty() {
            return;
        }

        for listener in &listeners {
            for event in events {
                if listener.receive(event.clone()).is_err() {
                    break;
                }
            }
        }

        self.state
            .lock()
            .listeners
            .retain(|s| !s.is_stopped() && !s.is_done());
    }

    // Patch-buffer accessors used by the stream ingestion path.

    pub(crate) fn is_during_patch(&self) -> bool {
        self.state.lock().is_during_patch
    }

    pub(crate) fn begin_patch(&self, first_event: StreamEvent) {
        let mut st = self.state.lock();
        st.is_during_patch = true;
        st.pending_patch_events = vec![first_event];
    }

    pub(crate) fn push_patch_event(&self, event: StreamEvent) {
        self.state.lock().pending_patch_events.push(event);
    }

    pub(crate) fn end_patch(&self) -> Vec<StreamEvent> {
        let mut st = self.state.lock();
        st.is_during_patch = false;
        std::mem::take(&mut st.pending_patch_events)
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("rows", &self.count())
            .finish()
    }
}

/// Row ids matching a filter, in insertion order. An empty filter matches
/// everything. Uses an index when one covers the filter's attrs.
fn match_row_ids(st: &TableState, filter: &Item) -> Vec<u64> {
    if filter.is_empty() {
        return st.rows.keys().copied().collect();
    }

    let mut sorted_attrs: Vec<String> = filter.attrs().map(str::to_string).collect();
    sorted_attrs.sort();

    if let Some(index) = st.indexes.iter().find(|i| i.covers(&sorted_attrs)) {
        let key: Vec<String> = sorted_attrs
            .iter()
            .map(|attr| {
                filter
                    .get(attr)
                    .map(|v| v.canonical_string())
                    .unwrap_or_else(|| "null".to_string())
            })
            .collect();
        return index.get(&key);
    }

    st.rows
        .iter()
        .filter(|(_, row)| {
            filter.iter().all(|(attr, value)| {
                row.get(attr)
                    .map(|v| v.canonical_string() == value.canonical_string())
                    .unwrap_or(false)
            })
        })
        .map(|(id, _)| *id)
        .collect()
}

fn random_hex(length: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}

fn current_timestamp_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
