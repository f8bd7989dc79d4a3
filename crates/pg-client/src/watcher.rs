//! Per-operation cancellation watchers.
//!
//! When an operation starts with a cancellable [`Context`], a supervisory
//! task is spawned next to it. The task and the operation race for a single
//! claim:
//!
//! ```text
//!            operation path                  watcher task
//!            --------------                  ------------
//!   start -> spawn watcher ----------------> wait(ctx done | finished)
//!            protocol I/O ...                   |
//!            stop(): try_claim ──┐              | ctx done: try_claim
//!                                └── exactly one claim succeeds
//! ```
//!
//! If the operation claims first, the task exits without side effects. If
//! the watcher claims first it sends a cancel request on a fresh side
//! connection, and for a [`WatchScope::Connection`] watcher it also marks
//! the connection bad before doing so.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::cancel::{BackendKey, CancelTarget};
use crate::context::{Context, DoneSignal};

/// What a fired watcher is allowed to invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchScope {
    /// Whole-connection operations. A fired watcher marks the connection
    /// bad; the socket is in an unknown protocol state afterwards.
    Connection,
    /// A prepared statement's execution. Only the server-side statement is
    /// targeted and the connection stays usable.
    Statement,
}

/// Result of [`CancelWatch::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchOutcome {
    /// The operation claimed the race; nothing was sent.
    Completed,
    /// The watcher claimed the race and ran the cancel protocol.
    Cancelled,
}

/// Shared reusability flag of a connection.
///
/// Monotonic: once bad, never good again.
#[derive(Debug, Default)]
pub(crate) struct ConnectionState {
    bad: AtomicBool,
}

impl ConnectionState {
    pub(crate) fn is_bad(&self) -> bool {
        self.bad.load(Ordering::Acquire)
    }

    /// Mark the connection bad. Returns `true` for the call that flipped it.
    pub(crate) fn mark_bad(&self) -> bool {
        !self.bad.swap(true, Ordering::AcqRel)
    }
}

#[derive(Debug, Default)]
struct Race {
    claimed: AtomicBool,
    finished: Notify,
}

impl Race {
    fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// An armed watcher for one in-flight operation.
#[derive(Debug)]
pub(crate) struct CancelWatch {
    race: Arc<Race>,
    scope: WatchScope,
    task: Option<JoinHandle<()>>,
    outcome: Option<WatchOutcome>,
}

impl CancelWatch {
    /// Arm a watcher, or return `None` without spawning anything when the
    /// context cannot be cancelled.
    pub(crate) fn start(
        ctx: &Context,
        scope: WatchScope,
        state: &Arc<ConnectionState>,
        target: &CancelTarget,
        key: BackendKey,
    ) -> Option<Self> {
        let signal = ctx.done_signal()?;
        let race = Arc::new(Race::default());
        let task = tokio::spawn(supervise(
            Arc::clone(&race),
            signal,
            scope,
            Arc::clone(state),
            target.clone(),
            key,
        ));
        tracing::trace!(process_id = key.process_id, ?scope, "cancellation watcher armed");

        Some(Self {
            race,
            scope,
            task: Some(task),
            outcome: None,
        })
    }

    /// Resolve the race from the operation side.
    ///
    /// Idempotent: later calls return the first outcome. A statement-scoped
    /// watcher that already fired is awaited so its cancel attempt (bounded
    /// by the cancel timeout) finishes before the operation returns.
    pub(crate) async fn stop(&mut self) -> WatchOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }

        let outcome = if self.race.try_claim() {
            self.race.finished.notify_one();
            WatchOutcome::Completed
        } else {
            if self.scope == WatchScope::Statement {
                if let Some(task) = self.task.take() {
                    let _ = task.await;
                }
            }
            WatchOutcome::Cancelled
        };

        self.outcome = Some(outcome);
        outcome
    }
}

impl Drop for CancelWatch {
    fn drop(&mut self) {
        // Operation future dropped before stop(): release the task.
        if self.outcome.is_none() && self.race.try_claim() {
            self.race.finished.notify_one();
        }
    }
}

async fn supervise(
    race: Arc<Race>,
    signal: DoneSignal,
    scope: WatchScope,
    state: Arc<ConnectionState>,
    target: CancelTarget,
    key: BackendKey,
) {
    tokio::select! {
        biased;
        () = race.finished.notified() => return,
        () = signal.wait() => {}
    }

    if !race.try_claim() {
        // The operation finished concurrently and owns the outcome.
        return;
    }

    if scope == WatchScope::Connection {
        state.mark_bad();
    }
    tracing::debug!(
        process_id = key.process_id,
        ?scope,
        "context done before operation finished; sending cancel request"
    );

    if let Err(e) = target.cancel(key).await {
        tracing::error!(process_id = key.process_id, ?scope, error = %e, "cancel request failed");
    }
}
