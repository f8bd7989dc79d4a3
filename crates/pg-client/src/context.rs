//! Cancellation-aware operation context.
//!
//! Every operation on [`Client`](crate::Client) takes a [`Context`]. A
//! context built with [`Context::background`] can never be cancelled and
//! costs nothing: no watcher task is spawned for it. Any other context arms
//! a cancellation watcher for the duration of the operation.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation signal and optional deadline passed alongside every call.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context with no cancellation capability.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context cancelled through `token`.
    #[must_use]
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token: Some(token),
            deadline: None,
        }
    }

    /// A cancellable context that also expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A cancellable context that also expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: Some(CancellationToken::new()),
            deadline: Some(deadline),
        }
    }

    /// Cancel the context. Has no effect on a background context.
    pub fn cancel(&self) {
        if let Some(token) = &self.token {
            token.cancel();
        }
    }

    /// The underlying token, if the context is cancellable.
    #[must_use]
    pub fn token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    /// The deadline, if one was set.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether this context can ever become done.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        self.token.is_some() || self.deadline.is_some()
    }

    /// Whether the context has been cancelled or its deadline has passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// An owned future source for the watcher task, or `None` for a
    /// background context.
    pub(crate) fn done_signal(&self) -> Option<DoneSignal> {
        self.is_cancellable().then(|| DoneSignal {
            token: self.token.clone(),
            deadline: self.deadline,
        })
    }
}

/// The parts of a [`Context`] a watcher waits on.
#[derive(Debug)]
pub(crate) struct DoneSignal {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl DoneSignal {
    /// Resolve when the token is cancelled or the deadline passes.
    pub(crate) async fn wait(self) {
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        match self.token {
            Some(token) => {
                tokio::select! {
                    () = token.cancelled() => {}
                    () = expired => {}
                }
            }
            None => expired.await,
        }
    }
}
