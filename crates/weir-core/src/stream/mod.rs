//! Push-based ordered event streams.

mod event;
#[allow(clippy::module_inception)]
mod stream;
mod util;

pub use event::StreamEvent;
pub use stream::{Receiver, Stream};
pub use util::{join_streams, streaming_transform, tee, StreamingTransformOptions};
