// src/utils/cancel.rs
//! Caller cancellation and deadlines.
//!
//! A `Context` is cancelled when every `CancelHandle` tied to it is dropped or
//! `cancel()`ed: the sender side goes away and the `done()` receiver becomes
//! ready (disconnected). Waiting code races `done()` in a `select!`.

use std::time::{Duration, Instant};

use crossbeam_channel::{self as chan, Receiver, Sender};

#[derive(Debug, Clone)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<Receiver<()>>,
}

/// Cancels its `Context` on `cancel()` or drop.
#[derive(Debug)]
pub struct CancelHandle {
    tx: Option<Sender<()>>,
}

impl CancelHandle {
    pub fn cancel(&mut self) {
        self.tx.take();
    }
}

impl Context {
    /// Never cancelled, no deadline.
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancel: None,
        }
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = chan::bounded(0);
        (
            Self {
                deadline: None,
                cancel: Some(rx),
            },
            CancelHandle { tx: Some(tx) },
        )
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().child_with_timeout(timeout)
    }

    /// Same cancellation, deadline tightened to at most `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let mine = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < mine => parent,
            _ => mine,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    /// Ready once cancelled. Never ready for contexts without a cancel handle.
    pub fn done(&self) -> Receiver<()> {
        match &self.cancel {
            Some(rx) => rx.clone(),
            None => chan::never(),
        }
    }

    /// Ready at the deadline. Never ready without one.
    pub fn expired(&self) -> Receiver<Instant> {
        match self.deadline {
            Some(at) => chan::at(at),
            None => chan::never(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        let cancelled = match &self.cancel {
            Some(rx) => matches!(rx.try_recv(), Err(chan::TryRecvError::Disconnected)),
            None => false,
        };
        cancelled || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
