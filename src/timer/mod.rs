//! Cancellable, restartable timers.
//!
//! A [`CancellableTimer`] owns at most one live [`TimerHandle`] at a time.
//! Arming is cancel-and-restart: the previous handle (live or not) is
//! cancelled under the same lock that installs the new one, so there is no
//! window in which two timers drive the same resource. Cancellation is
//! cooperative — a scheduled action that wakes after cancellation exits
//! without side effects.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

// ============================================================================
// TimerHandle
// ============================================================================

const STATE_ARMED: u8 = 0;
const STATE_CANCELLED: u8 = 1;
const STATE_COMPLETED: u8 = 2;

/// Observable state of a timer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Scheduled and waiting (repeating timers stay armed between fires).
    Armed,
    /// Cancelled before completing. Terminal.
    Cancelled,
    /// One-shot action ran to completion. Terminal.
    Completed,
}

/// Handle to one scheduled or looping action.
///
/// Cloning shares the underlying state; cancelling any clone cancels the
/// scheduled action.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
    state: Arc<AtomicU8>,
}

impl TimerHandle {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            state: Arc::new(AtomicU8::new(STATE_ARMED)),
        }
    }

    /// Current state of the handle.
    #[must_use]
    pub fn state(&self) -> TimerState {
        match self.state.load(Ordering::SeqCst) {
            STATE_CANCELLED => TimerState::Cancelled,
            STATE_COMPLETED => TimerState::Completed,
            _ => TimerState::Armed,
        }
    }

    /// Whether the handle is still armed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state() == TimerState::Armed
    }

    /// Cancels the scheduled action.
    ///
    /// Cancelling an already-cancelled or already-completed handle is a
    /// no-op.
    pub fn cancel(&self) {
        let transitioned = self
            .state
            .compare_exchange(
                STATE_ARMED,
                STATE_CANCELLED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        self.token.cancel();
        if transitioned {
            trace!("timer handle cancelled");
        }
    }

    fn complete(&self) {
        let _ = self.state.compare_exchange(
            STATE_ARMED,
            STATE_COMPLETED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ============================================================================
// CancellableTimer
// ============================================================================

/// Owner of a single live timer.
///
/// Used wherever the application needs a restartable delayed or recurring
/// action: the spawn loop and the shield cooldown each own one.
pub struct CancellableTimer {
    parent: CancellationToken,
    // std Mutex: held only to swap the live handle, never across an await.
    live: Mutex<Option<TimerHandle>>,
}

impl CancellableTimer {
    /// Creates a timer with its own root cancellation scope.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parent(CancellationToken::new())
    }

    /// Creates a timer whose handles are children of `parent`; cancelling
    /// `parent` cancels whatever handle is live.
    #[must_use]
    pub const fn with_parent(parent: CancellationToken) -> Self {
        Self {
            parent,
            live: Mutex::new(None),
        }
    }

    /// Schedules `action` to run once after `delay`, cancelling any
    /// previously live handle first.
    ///
    /// The swap is atomic with respect to this timer's live-handle slot.
    pub fn arm<F, Fut>(&self, delay: Duration, action: F) -> TimerHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handle = self.install();
        let task = handle.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = task.token.cancelled() => {
                    trace!("one-shot timer cancelled while waiting");
                    task.cancel();
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
            // The sleep may win the race against a cancel issued in the
            // same instant; a cancelled handle must not fire.
            if task.cancelled() {
                trace!("one-shot timer cancelled at fire point");
                task.cancel();
                return;
            }
            action().await;
            task.complete();
        });

        handle
    }

    /// Schedules `action` to run every `interval` until cancelled, cancelling
    /// any previously live handle first.
    ///
    /// The first run happens one full interval after arming. A repeating
    /// handle stays [`TimerState::Armed`] between fires and only leaves that
    /// state through cancellation.
    pub fn arm_repeating<F, Fut>(&self, interval: Duration, action: F) -> TimerHandle
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handle = self.install();
        let task = handle.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = task.token.cancelled() => {
                        trace!("repeating timer cancelled");
                        break;
                    }
                    () = tokio::time::sleep(interval) => {}
                }
                if task.cancelled() {
                    trace!("repeating timer cancelled at fire point");
                    break;
                }
                action().await;
            }
            task.cancel();
        });

        handle
    }

    /// Cancels the live handle, if any.
    pub fn cancel(&self) {
        let live = self.live.lock().expect("timer lock poisoned");
        if let Some(handle) = live.as_ref() {
            handle.cancel();
        }
    }

    /// Whether a handle is currently armed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live
            .lock()
            .expect("timer lock poisoned")
            .as_ref()
            .is_some_and(TimerHandle::is_live)
    }

    /// Cancels the previous handle and installs a fresh one, atomically.
    fn install(&self) -> TimerHandle {
        let handle = TimerHandle::new(self.parent.child_token());
        let mut live = self.live.lock().expect("timer lock poisoned");
        if let Some(previous) = live.replace(handle.clone()) {
            previous.cancel();
            debug!("previous timer handle cancelled by restart");
        }
        handle
    }
}

impl Default for CancellableTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellableTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellableTimer")
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
