use std::collections::VecDeque;
use std::path::PathBuf;

use tracing::debug;

/// FIFO buffer decoupling "file selected" from "file being processed".
///
/// The queue never advances on its own: a consumer pulls the next path
/// explicitly after the previous file's pipeline reaches a terminal state.
/// An empty queue is inert, not an error.
#[derive(Debug, Default)]
pub struct FileIntakeQueue {
    pending: VecDeque<PathBuf>,
}

impl FileIntakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append paths at the tail, preserving submission order
    pub fn enqueue<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for path in paths {
            let path = path.into();
            debug!("Queued file for intake: {}", path.display());
            self.pending.push_back(path);
        }
    }

    /// Pop the head of the queue, or `None` when nothing is pending
    pub fn dequeue_next(&mut self) -> Option<PathBuf> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
