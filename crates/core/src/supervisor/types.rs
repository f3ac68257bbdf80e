//! Types for process supervision.

use std::time::Duration;

/// How a supervised tool run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Exit code zero. The output still has to be verified.
    Completed { stderr_tail: String },
    /// Non-zero exit, or killed by a signal nobody sent on purpose.
    ToolError {
        exit_code: Option<i32>,
        stderr_tail: String,
    },
    /// The wall-clock budget ran out and the process tree was killed.
    Timeout { after: Duration },
    /// Cancellation was requested and the process tree was killed.
    Cancelled,
}

impl ProcessOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Keeps the last `limit` bytes written to it.
#[derive(Debug)]
pub(crate) struct TailBuffer {
    limit: usize,
    buf: Vec<u8>,
}

impl TailBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            buf: Vec::with_capacity(limit.min(64 * 1024)),
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        if chunk.len() >= self.limit {
            self.buf.clear();
            self.buf.extend_from_slice(&chunk[chunk.len() - self.limit..]);
            return;
        }
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > self.limit {
            let excess = self.buf.len() - self.limit;
            self.buf.drain(..excess);
        }
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
