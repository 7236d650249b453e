//! The framed channel and the blocking work queue it feeds.

mod channel;
mod queue;

pub use channel::{Channel, MAX_MESSAGE_SIZE};
pub use queue::BlockingQueue;
