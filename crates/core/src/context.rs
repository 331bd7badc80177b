//! Per-operation deadline and cancellation
//!
//! Every engine call takes an [`OpContext`]. The backend checks it while
//! waiting for a connection and while statements run, and reports
//! [`Error::DeadlineExceeded`] or [`Error::Cancelled`] instead of hanging.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag a caller trips to abandon in-flight work
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an untripped token
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token. Every clone observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check whether the token was tripped
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Deadline and cancellation signal for one operation
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl OpContext {
    /// No deadline, no cancellation. The engine still applies its configured
    /// default timeout.
    pub fn background() -> Self {
        Self::default()
    }

    /// Give up once `timeout` has elapsed from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::default().timeout(timeout)
    }

    /// Give up at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Tighten the deadline to at most `timeout` from now
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        self.deadline = match (self.deadline, candidate) {
            (Some(existing), Some(new)) => Some(existing.min(new)),
            (existing, new) => existing.or(new),
        };
        self
    }

    /// Attach a cancellation token
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Apply `default` only if the caller did not set a deadline
    pub fn or_timeout(&self, default: Duration) -> Self {
        if self.deadline.is_some() {
            self.clone()
        } else {
            self.clone().timeout(default)
        }
    }

    /// Whether this operation can ever be interrupted
    pub fn is_bounded(&self) -> bool {
        self.deadline.is_some() || self.cancel.is_some()
    }

    /// Check whether the caller cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancelToken::is_cancelled)
    }

    /// Check whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Return the interruption error if the operation should stop.
    ///
    /// Cancellation wins over an expired deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.is_expired() {
            return Err(Error::DeadlineExceeded);
        }
        Ok(())
    }

    /// The error describing why an interrupted statement was stopped
    pub fn interruption(&self) -> Error {
        if self.is_cancelled() {
            Error::Cancelled
        } else {
            Error::DeadlineExceeded
        }
    }
}
