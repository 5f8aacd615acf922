//! Queue + stack scheduler
//!
//! Batch work waits in a FIFO queue, follow-up work on a LIFO stack. The
//! single ordering rule is: the stack is always drained before the queue is
//! touched, so a tree of follow-ups completes depth-first before sibling
//! batch items run.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::QueryError;
use crate::types::{QueryId, QueryRequest};

/// Pending work plus the in-flight counter
#[derive(Debug)]
pub struct Scheduler {
    queue: VecDeque<QueryRequest>,
    stack: Vec<QueryRequest>,
    in_flight: usize,
    max_depth: u32,
}

impl Scheduler {
    /// Create an empty scheduler with the given depth guard
    #[must_use]
    pub fn new(max_depth: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            stack: Vec::new(),
            in_flight: 0,
            max_depth,
        }
    }

    /// Append a batch request to the tail of the queue
    pub fn enqueue_batch(&mut self, request: QueryRequest) {
        debug!(query_id = %request.id, queued = self.queue.len() + 1, "Batch query enqueued");
        self.queue.push_back(request);
    }

    /// Push a follow-up onto the stack.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::DepthExceeded` (and schedules nothing) when the
    /// request sits deeper than the configured maximum.
    pub fn push_recursive(&mut self, request: QueryRequest) -> Result<(), QueryError> {
        if request.depth > self.max_depth {
            return Err(QueryError::DepthExceeded {
                depth: request.depth,
                max_depth: self.max_depth,
            });
        }
        debug!(
            query_id = %request.id,
            depth = request.depth,
            stacked = self.stack.len() + 1,
            "Follow-up query pushed"
        );
        self.stack.push(request);
        Ok(())
    }

    /// Take the next request: stack top first, then queue head.
    ///
    /// The returned request counts as in flight until [`Scheduler::complete`]
    /// is called.
    pub fn next(&mut self) -> Option<QueryRequest> {
        let request = self.stack.pop().or_else(|| self.queue.pop_front())?;
        self.in_flight += 1;
        Some(request)
    }

    /// Mark one in-flight execution as finished
    pub fn complete(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Remove a pending request from whichever structure holds it
    pub fn remove(&mut self, id: QueryId) -> Option<QueryRequest> {
        if let Some(pos) = self.stack.iter().position(|r| r.id == id) {
            return Some(self.stack.remove(pos));
        }
        let pos = self.queue.iter().position(|r| r.id == id)?;
        self.queue.remove(pos)
    }

    /// Remove every pending request (used on shutdown)
    pub fn drain_pending(&mut self) -> Vec<QueryRequest> {
        let mut pending: Vec<_> = self.stack.drain(..).rev().collect();
        pending.extend(self.queue.drain(..));
        pending
    }

    /// Whether a request is pending
    #[must_use]
    pub fn contains(&self, id: QueryId) -> bool {
        self.stack.iter().any(|r| r.id == id) || self.queue.iter().any(|r| r.id == id)
    }

    /// Nothing pending and nothing in flight
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.stack.is_empty() && self.in_flight == 0
    }

    /// Whether there is pending work
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty() || !self.stack.is_empty()
    }

    /// Batch requests waiting in the queue
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Follow-ups waiting on the stack
    #[must_use]
    pub fn stacked_len(&self) -> usize {
        self.stack.len()
    }

    /// Executions currently in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Configured depth guard
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }
}

#[cfg(test)]
mod tests;
