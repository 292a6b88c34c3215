//! Normalization of native callback results into stream events.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{Error, ErrorItem};
use crate::exec::Task;
use crate::stream::Stream;
use crate::table::Table;
use crate::value::Item;

/// What a native callback can produce.
///
/// Every variant normalizes into the task's output stream: items become
/// `item` events, a stream is piped wholesale, a table emits one item per
/// row in scan order, and a future re-enters normalization on resolution.
pub enum CallbackOutput {
    /// No events. The task auto-terminates unless it declared itself
    /// async or streaming.
    None,
    /// One item event.
    Item(Item),
    /// One item event per element, in order.
    Items(Vec<Item>),
    /// Piped wholesale into the output; marks the task streaming, so the
    /// source stream owns termination.
    Stream(Stream),
    /// One item event per row in scan order.
    Table(Arc<Table>),
    /// Resolved on the async runtime; the task is marked async.
    Future(BoxFuture<'static, Result<CallbackOutput, Error>>),
}

impl CallbackOutput {
    /// Wrap a future for async normalization.
    pub fn future<F>(f: F) -> CallbackOutput
    where
        F: std::future::Future<Output = Result<CallbackOutput, Error>> + Send + 'static,
    {
        CallbackOutput::Future(Box::pin(f))
    }
}

impl From<Item> for CallbackOutput {
    fn from(item: Item) -> Self {
        CallbackOutput::Item(item)
    }
}

impl From<Vec<Item>> for CallbackOutput {
    fn from(items: Vec<Item>) -> Self {
        CallbackOutput::Items(items)
    }
}

impl From<Stream> for CallbackOutput {
    fn from(stream: Stream) -> Self {
        CallbackOutput::Stream(stream)
    }
}

impl From<Arc<Table>> for CallbackOutput {
    fn from(table: Arc<Table>) -> Self {
        CallbackOutput::Table(table)
    }
}

/// A mount point or verb implementation.
pub type NativeCallback = Arc<dyn Fn(&Task) -> Result<CallbackOutput, Error> + Send + Sync>;

/// Wrap a closure as a [`NativeCallback`].
pub fn native_callback<F>(f: F) -> NativeCallback
where
    F: Fn(&Task) -> Result<CallbackOutput, Error> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Invoke a callback and normalize its result into the task's output.
///
/// Failures become one `error` event followed by `done`. The cooperative
/// cancellation signal is the exception: it is swallowed (`done` only).
/// After a synchronous return the output auto-terminates unless the task
/// declared itself async or streaming.
pub fn run_native_callback(task: &Task, callback: &NativeCallback) {
    let result = callback(task);
    finish(task, result);
}

fn finish(task: &Task, result: Result<CallbackOutput, Error>) {
    match result {
        Ok(output) => {
            if let Err(err) = handle_output(task, output) {
                handle_error(task, err);
                return;
            }
            if !task.declared_async() && !task.declared_streaming() {
                task.output().send_done_if_needed();
            }
        }
        Err(err) => handle_error(task, err),
    }
}

fn handle_error(task: &Task, err: Error) {
    if err.is_backpressure_stop() {
        // The receiver asked us to stop. Terminate cleanly, no error.
        task.output().send_done_if_needed();
        return;
    }

    let item = ErrorItem::from_error(
        &err,
        Some(task.tuple_without_params().to_query_string()),
    );
    let _ = task.output().put_error(item);
    task.output().send_done_if_needed();
}

fn handle_output(task: &Task, output: CallbackOutput) -> Result<(), Error> {
    match output {
        CallbackOutput::None => Ok(()),
        CallbackOutput::Item(item) => task.put(item),
        CallbackOutput::Items(items) => {
            for item in items {
                task.put(item)?;
            }
            Ok(())
        }
        CallbackOutput::Stream(stream) => {
            task.declare_streaming();
            stream.send_to_stream(task.output().clone());
            Ok(())
        }
        CallbackOutput::Table(table) => {
            for item in table.scan() {
                task.put(item)?;
            }
            Ok(())
        }
        CallbackOutput::Future(future) => {
            task.declare_async();
            let task = task.clone();
            tokio::spawn(async move {
                match future.await {
                    Ok(output) => {
                        if let Err(err) = handle_output(&task, output) {
                            handle_error(&task, err);
                            return;
                        }
                        if !task.declared_streaming() {
                            task.output().send_done_if_needed();
                        }
                    }
                    Err(err) => handle_error(&task, err),
                }
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::query::{QueryParameters, QueryTuple};
    use crate::stream::StreamEvent;

    fn test_task(output: Stream) -> Task {
        let tuple = QueryTuple::new().with_attr("value");
        Task::new(crate::exec::TaskSetup {
            graph: Graph::new(),
            tuple: tuple.clone(),
            after_verb: tuple.without_first_tag(),
            parameters: QueryParameters::new(),
            input: Stream::new_empty(),
            output,
            context: Default::default(),
            schema_only: false,
        })
    }

    #[test]
    fn test_none_auto_terminates() {
        let output = Stream::new();
        let task = test_task(output.clone());
        run_native_callback(&task, &native_callback(|_t| Ok(CallbackOutput::None)));

        let events = output.take_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_done());
    }

    #[test]
    fn test_items_emit_in_order() {
        let output = Stream::new();
        let task = test_task(output.clone());
        run_native_callback(
            &task,
            &native_callback(|_t| {
                Ok(CallbackOutput::Items(vec![
                    Item::new().with("n", 1i64),
                    Item::new().with("n", 2i64),
                ]))
            }),
        );

        let (items, errors) = output.take_items_and_errors();
        assert!(errors.is_empty());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("n").unwrap().as_i64(), Some(1));
        assert!(output.is_done());
    }

    #[test]
    fn test_error_becomes_error_event_then_done() {
        let output = Stream::new();
        let task = test_task(output.clone());
        run_native_callback(
            &task,
            &native_callback(|_t| Err(Error::Callback("boom".to_string()))),
        );

        let events = output.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::Error { error } if error.message.contains("boom")));
        assert!(events[1].is_done());
    }

    #[test]
    fn test_backpressure_stop_is_swallowed() {
        let output = Stream::new();
        let task = test_task(output.clone());
        run_native_callback(&task, &native_callback(|_t| Err(Error::BackpressureStop)));

        let events = output.take_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_done());
    }

    #[test]
    fn test_stream_output_suppresses_auto_done() {
        let output = Stream::new();
        let task = test_task(output.clone());

        let source = Stream::new();
        let source_for_callback = source.clone();
        run_native_callback(
            &task,
            &native_callback(move |_t| Ok(CallbackOutput::Stream(source_for_callback.clone()))),
        );

        // The source hasn't finished, so the output must not be done yet.
        assert!(!output.is_done());
        source.put(Item::new().with("n", 1i64)).unwrap();
        source.done().unwrap();
        assert!(output.is_done());
    }

    #[tokio::test]
    async fn test_future_output_resolves_async() {
        let output = Stream::new();
        let task = test_task(output.clone());
        run_native_callback(
            &task,
            &native_callback(|_t| {
                Ok(CallbackOutput::future(async {
                    Ok(CallbackOutput::Item(Item::new().with("n", 42i64)))
                }))
            }),
        );

        let (items, errors) = output.collect_items().await;
        assert!(errors.is_empty());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get("n").unwrap().as_i64(), Some(42));
    }

    #[tokio::test]
    async fn test_future_rejection_becomes_error() {
        let output = Stream::new();
        let task = test_task(output.clone());
        run_native_callback(
            &task,
            &native_callback(|_t| {
                Ok(CallbackOutput::future(async {
                    Err(Error::Callback("later".to_string()))
                }))
            }),
        );

        let (items, errors) = output.collect_items().await;
        assert!(items.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("later"));
    }
}
