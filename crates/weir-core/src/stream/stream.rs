//! The stream channel: buffering, delivery, termination, cancellation.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, ErrorItem};
use crate::stream::StreamEvent;
use crate::value::Item;

/// A receiver of stream events.
///
/// Returning `Err(Error::BackpressureStop)` is the cooperative cancellation
/// signal: the stream records it and rejects further events, and a
/// well-behaved producer terminates with `done`.
pub trait Receiver: Send {
    fn receive(&mut self, event: StreamEvent) -> Result<(), Error>;
}

impl<F> Receiver for F
where
    F: FnMut(StreamEvent) -> Result<(), Error> + Send,
{
    fn receive(&mut self, event: StreamEvent) -> Result<(), Error> {
        self(event)
    }
}

struct StreamInner {
    label: Option<String>,
    receiver: Option<Box<dyn Receiver>>,
    backlog: VecDeque<StreamEvent>,
    /// A `Done` has been accepted on this channel.
    done_sent: bool,
    /// The receiver raised the backpressure-stop condition.
    stopped: bool,
    /// The receiver is checked out for delivery (guards re-entrancy).
    delivering: bool,
}

/// A push-based ordered event channel.
///
/// Events are buffered until a receiver attaches with [`Stream::send_to`];
/// after that they are delivered synchronously in emission order. At most
/// one `Done` is accepted; offering any event after `Done` fails with
/// [`Error::ProtocolViolation`].
#[derive(Clone)]
pub struct Stream {
    inner: Arc<Mutex<StreamInner>>,
}

impl Stream {
    /// Create a new stream with no receiver.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StreamInner {
                label: None,
                receiver: None,
                backlog: VecDeque::new(),
                done_sent: false,
                stopped: false,
                delivering: false,
            })),
        }
    }

    /// Create a stream with a debugging label.
    pub fn with_label(label: impl Into<String>) -> Self {
        let stream = Self::new();
        stream.inner.lock().label = Some(label.into());
        stream
    }

    /// A stream that is already done, with no events.
    pub fn new_empty() -> Self {
        let stream = Self::new();
        let _ = stream.done();
        stream
    }

    /// A stream preloaded with items, already done.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let stream = Self::new();
        for item in items {
            let _ = stream.put(item);
        }
        let _ = stream.done();
        stream
    }

    /// A new stream wired to the given receiver from the start.
    pub fn to_receiver(receiver: impl Receiver + 'static) -> Self {
        let stream = Self::new();
        stream.send_to(receiver);
        stream
    }

    /// Whether two handles refer to the same channel.
    pub fn same_channel(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Offer an event to the channel.
    ///
    /// Fails with `ProtocolViolation` after `Done`, and with
    /// `BackpressureStop` once the receiver has raised the stop condition
    /// (except for `Done` itself, which is always accepted so producers can
    /// terminate cleanly).
    pub fn receive(&self, event: StreamEvent) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        if inner.done_sent {
            return Err(Error::ProtocolViolation(format!(
                "stream {} received an event after done",
                inner.label.as_deref().unwrap_or("(unlabeled)")
            )));
        }

        let is_done = event.is_done();

        if inner.stopped && !is_done {
            return Err(Error::BackpressureStop);
        }

        if is_done {
            inner.done_sent = true;
        }

        inner.backlog.push_back(event);

        if inner.receiver.is_none() || inner.delivering {
            // Buffered; an active delivery loop will pick it up.
            return Ok(());
        }

        self.drain(inner)
    }

    fn drain<'a>(&'a self, mut inner: parking_lot::MutexGuard<'a, StreamInner>) -> Result<(), Error> {
        let Some(mut receiver) = inner.receiver.take() else {
            return Ok(());
        };
        inner.delivering = true;

        let mut result = Ok(());

        loop {
            let Some(event) = inner.backlog.pop_front() else {
                break;
            };
            let was_done = event.is_done();
            drop(inner);
            let outcome = receiver.receive(event);
            inner = self.inner.lock();

            if outcome.is_err() {
                inner.stopped = true;
                inner.backlog.clear();
                // A refused `Done` still counts as delivered: the channel
                // is terminating anyway and the producer must not see an
                // error for terminating cleanly.
                if !was_done {
                    result = Err(Error::BackpressureStop);
                }
                break;
            }
        }

        inner.receiver = Some(receiver);
        inner.delivering = false;
        result
    }

    /// Attach a receiver; buffered events flush to it immediately.
    pub fn send_to(&self, receiver: impl Receiver + 'static) {
        self.send_to_boxed(Box::new(receiver));
    }

    /// Attach a boxed receiver.
    pub fn send_to_boxed(&self, receiver: Box<dyn Receiver>) {
        let mut inner = self.inner.lock();
        if inner.receiver.is_some() {
            tracing::warn!(
                label = inner.label.as_deref().unwrap_or("(unlabeled)"),
                "stream receiver replaced"
            );
        }
        inner.receiver = Some(receiver);
        let _ = self.drain(inner);
    }

    /// Pipe this stream into another stream.
    pub fn send_to_stream(&self, downstream: Stream) {
        self.send_to(move |event: StreamEvent| downstream.receive(event));
    }

    /// Emit an item.
    pub fn put(&self, item: Item) -> Result<(), Error> {
        self.receive(StreamEvent::Item { item })
    }

    /// Emit an in-band error.
    pub fn put_error(&self, error: ErrorItem) -> Result<(), Error> {
        self.receive(StreamEvent::Error { error })
    }

    /// Emit a header.
    pub fn put_header(&self, item: Item) -> Result<(), Error> {
        self.receive(StreamEvent::Header { item })
    }

    /// Emit a schema event.
    pub fn put_schema(&self, item: Item) -> Result<(), Error> {
        self.receive(StreamEvent::Schema { item })
    }

    /// Terminate the stream.
    pub fn done(&self) -> Result<(), Error> {
        self.receive(StreamEvent::Done)
    }

    /// Terminate the stream unless it already is; never fails.
    pub fn send_done_if_needed(&self) {
        if !self.is_done() {
            let _ = self.done();
        }
    }

    /// Whether a `Done` has been accepted.
    pub fn is_done(&self) -> bool {
        self.inner.lock().done_sent
    }

    /// Whether the receiver has raised the stop condition.
    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    /// Raise the stop condition from outside a receiver (used for resource
    /// cleanup). The producer sees `BackpressureStop` on its next put.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = true;
        inner.backlog.clear();
    }

    /// Drain buffered events without attaching a receiver. Only meaningful
    /// for streams nothing is wired to (e.g. schema-only dry runs).
    pub fn take_events(&self) -> Vec<StreamEvent> {
        let mut inner = self.inner.lock();
        inner.backlog.drain(..).collect()
    }

    /// Drain buffered events, split into items and errors.
    pub fn take_items_and_errors(&self) -> (Vec<Item>, Vec<ErrorItem>) {
        let mut items = Vec::new();
        let mut errors = Vec::new();
        for event in self.take_events() {
            match event {
                StreamEvent::Item { item } => items.push(item),
                StreamEvent::Error { error } => errors.push(error),
                _ => {}
            }
        }
        (items, errors)
    }

    /// Collect every event until `Done` (inclusive of nothing after).
    pub async fn collect_events(self) -> Vec<StreamEvent> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        self.send_to(move |event: StreamEvent| {
            // A dropped collector counts as a stopped receiver.
            tx.send(event).map_err(|_| Error::BackpressureStop)
        });

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let is_done = event.is_done();
            events.push(event);
            if is_done {
                break;
            }
        }
        events
    }

    /// Collect items and errors until `Done`.
    pub async fn collect_items(self) -> (Vec<Item>, Vec<ErrorItem>) {
        let mut items = Vec::new();
        let mut errors = Vec::new();
        for event in self.collect_events().await {
            match event {
                StreamEvent::Item { item } => items.push(item),
                StreamEvent::Error { error } => errors.push(error),
                _ => {}
            }
        }
        (items, errors)
    }

    /// Resolve the first item, or the first error if none arrives.
    pub async fn one_item(self) -> Result<Item, Error> {
        let (items, errors) = self.collect_items().await;
        if let Some(item) = items.into_iter().next() {
            return Ok(item);
        }
        match errors.into_iter().next() {
            Some(error) => Err(Error::Callback(error.message)),
            None => Err(Error::InvalidData("stream produced no items".to_string())),
        }
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver for Stream {
    fn receive(&mut self, event: StreamEvent) -> Result<(), Error> {
        Stream::receive(self, event)
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Stream")
            .field("label", &inner.label)
            .field("done", &inner.done_sent)
            .field("stopped", &inner.stopped)
            .field("backlog", &inner.backlog.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffering_until_receiver_attaches() {
        let stream = Stream::new();
        stream.put(Item::new().with("a", 1i64)).unwrap();
        stream.put(Item::new().with("a", 2i64)).unwrap();
        stream.done().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        stream.send_to(move |event: StreamEvent| {
            sink.lock().push(event);
            Ok(())
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen[2].is_done());
    }

    #[test]
    fn test_event_after_done_is_protocol_violation() {
        let stream = Stream::new();
        stream.done().unwrap();

        let err = stream.put(Item::new()).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));

        let err = stream.done().unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[test]
    fn test_backpressure_stop_rejects_items_but_accepts_done() {
        let stream = Stream::new();
        stream.send_to(|_event: StreamEvent| Err(Error::BackpressureStop));

        let err = stream.put(Item::new()).unwrap_err();
        assert!(err.is_backpressure_stop());

        // Further items keep failing.
        assert!(stream.put(Item::new()).unwrap_err().is_backpressure_stop());

        // Done is always accepted so the producer can terminate.
        stream.done().unwrap();
        assert!(stream.is_done());
    }

    #[test]
    fn test_delivery_order() {
        let stream = Stream::new();
        let seen: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        stream.send_to(move |event: StreamEvent| {
            if let StreamEvent::Item { item } = event {
                sink.lock().push(item.get("n").unwrap().as_i64().unwrap());
            }
            Ok(())
        });

        for n in 0..5 {
            stream.put(Item::new().with("n", n)).unwrap();
        }
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_collect_events() {
        let stream = Stream::from_items(vec![Item::new().with("a", 1i64)]);
        let events = stream.collect_events().await;
        assert_eq!(events.len(), 2);
        assert!(events[1].is_done());
    }

    #[tokio::test]
    async fn test_one_item_error_when_empty() {
        let stream = Stream::new_empty();
        assert!(stream.one_item().await.is_err());
    }
}
