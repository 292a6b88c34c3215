//! Stream combinators used by verbs and the join engine.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;
use crate::stream::{Stream, StreamEvent};
use crate::value::Item;

impl Stream {
    /// Per-item transform: each input item maps to zero or more output
    /// items; all other events forward unchanged.
    pub fn transform<F>(&self, output: Stream, mut f: F)
    where
        F: FnMut(Item) -> Vec<Item> + Send + 'static,
    {
        self.send_to(move |event: StreamEvent| match event {
            StreamEvent::Item { item } => {
                for out in f(item) {
                    output.put(out)?;
                }
                Ok(())
            }
            other => output.receive(other),
        });
    }

    /// Whole-stream transform: collect every item, map the batch once at
    /// `Done`, and re-emit. Other events forward immediately.
    pub fn aggregate<F>(&self, output: Stream, f: F)
    where
        F: FnOnce(Vec<Item>) -> Vec<Item> + Send + 'static,
    {
        let mut collected: Vec<Item> = Vec::new();
        let mut f = Some(f);
        self.send_to(move |event: StreamEvent| match event {
            StreamEvent::Item { item } => {
                collected.push(item);
                Ok(())
            }
            StreamEvent::Done => {
                if let Some(f) = f.take() {
                    for item in f(std::mem::take(&mut collected)) {
                        output.put(item)?;
                    }
                }
                output.receive(StreamEvent::Done)
            }
            other => output.receive(other),
        });
    }

    /// Per-item streaming transform; see [`streaming_transform`].
    pub fn streaming_transform<F>(
        &self,
        output: Stream,
        callback: F,
        options: StreamingTransformOptions,
    ) where
        F: FnMut(Item) -> Stream + Send + 'static,
    {
        streaming_transform(self.clone(), output, callback, options);
    }
}

/// Options for [`streaming_transform`].
#[derive(Debug, Clone, Default)]
pub struct StreamingTransformOptions {
    /// Bound on concurrently running item-triggered sub-streams. Excess
    /// items queue FIFO and start as slots free up. Unbounded when None.
    pub max_concurrency: Option<usize>,
}

struct TransformState<F> {
    callback: F,
    output: Stream,
    incoming_done: bool,
    unfinished: usize,
    queue: VecDeque<Item>,
    max_concurrency: Option<usize>,
}

impl<F> TransformState<F> {
    fn at_limit(&self) -> bool {
        self.max_concurrency
            .map(|max| self.unfinished >= max)
            .unwrap_or(false)
    }

    fn all_finished(&self) -> bool {
        self.incoming_done && self.unfinished == 0 && self.queue.is_empty()
    }
}

/// Map each input item to a sub-stream and merge every sub-stream into
/// `output`. Each branch's events stay ordered; no cross-branch order is
/// guaranteed. A single `Done` is emitted after the input and every branch
/// have finished.
pub fn streaming_transform<F>(
    input: Stream,
    output: Stream,
    callback: F,
    options: StreamingTransformOptions,
) where
    F: FnMut(Item) -> Stream + Send + 'static,
{
    let state = Arc::new(Mutex::new(TransformState {
        callback,
        output: output.clone(),
        incoming_done: false,
        unfinished: 0,
        queue: VecDeque::new(),
        max_concurrency: options.max_concurrency,
    }));

    let input_state = state.clone();
    input.send_to(move |event: StreamEvent| match event {
        StreamEvent::Item { item } => {
            {
                let mut st = input_state.lock();
                if st.at_limit() {
                    st.queue.push_back(item);
                    return Ok(());
                }
                st.unfinished += 1;
            }
            start_item(&input_state, item);
            Ok(())
        }
        StreamEvent::Done => {
            let finished = {
                let mut st = input_state.lock();
                st.incoming_done = true;
                st.all_finished()
            };
            if finished {
                output.send_done_if_needed();
            }
            Ok(())
        }
        other => output.receive(other),
    });
}

/// Run one item's sub-stream. The caller must have already incremented
/// `unfinished` for this item (the slot is reserved under the lock).
fn start_item<F>(state: &Arc<Mutex<TransformState<F>>>, item: Item)
where
    F: FnMut(Item) -> Stream + Send + 'static,
{
    let sub = {
        let mut st = state.lock();
        (st.callback)(item)
    };

    let sub_state = state.clone();
    sub.send_to(move |event: StreamEvent| match event {
        StreamEvent::Done => {
            let (ready, finished_output) = {
                let mut st = sub_state.lock();
                st.unfinished -= 1;
                let mut ready = Vec::new();
                while !st.queue.is_empty() && !st.at_limit() {
                    st.unfinished += 1;
                    ready.push(st.queue.pop_front().unwrap());
                }
                (ready, st.all_finished().then(|| st.output.clone()))
            };

            for next in ready {
                start_item(&sub_state, next);
            }

            if let Some(output) = finished_output {
                output.send_done_if_needed();
            }
            Ok(())
        }
        StreamEvent::Item { item } => {
            let output = sub_state.lock().output.clone();
            output.put(item)
        }
        other => {
            let output = sub_state.lock().output.clone();
            output.receive(other)
        }
    });
}

/// Fan `count` producers into one output with a single shared `Done`.
///
/// Returns `count` receiver streams; each producer gets one. All non-done
/// events forward immediately; the output's `Done` fires when the last
/// producer finishes.
pub fn join_streams(count: usize, output: Stream) -> Vec<Stream> {
    let remaining = Arc::new(Mutex::new(count));

    (0..count)
        .map(|_| {
            let remaining = remaining.clone();
            let output = output.clone();
            Stream::to_receiver(move |event: StreamEvent| match event {
                StreamEvent::Done => {
                    let mut left = remaining.lock();
                    debug_assert!(*left > 0, "join_streams got too many done events");
                    *left -= 1;
                    if *left == 0 {
                        drop(left);
                        return output.receive(StreamEvent::Done);
                    }
                    Ok(())
                }
                other => output.receive(other),
            })
        })
        .collect()
}

/// Copy one input into `count` independent output streams.
pub fn tee(input: Stream, count: usize) -> Vec<Stream> {
    let outputs: Vec<Stream> = (0..count).map(|_| Stream::new()).collect();
    let sinks = outputs.clone();
    input.send_to(move |event: StreamEvent| {
        for out in &sinks {
            if let Err(err) = out.receive(event.clone()) {
                tracing::debug!(error = %err, "tee branch refused an event");
            }
        }
        Ok(())
    });
    outputs
}
