//! Application phases and the state machine that drives them.
//!
//! A phase is one mutually-exclusive mode of the session (loading, menu,
//! active play). Phases are registered once at startup and entered/exited
//! arbitrarily many times; the [`StateMachine`] guarantees at most one is
//! active at any instant and that an exit fully completes, scope disposal
//! included, before the next enter starts.

mod loading;
mod machine;
mod menu;
mod play;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::assets::ResourceScope;

pub use loading::{LOADING, LoadingPhase};
pub use machine::StateMachine;
pub use menu::{BestScoreLoaded, MENU, MenuPhase};
pub use play::{PLAY, PlayPhase};

// ============================================================================
// PhaseId
// ============================================================================

/// Stable identity tag of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhaseId(pub &'static str);

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// PhasePayload
// ============================================================================

/// Opaque bundle passed from the transition initiator into the next phase's
/// enter routine. Constructed by the caller, consumed once.
///
/// Carries the cancellation scope for the transition: callers needing
/// bounded latency cancel this token and the enter routine unwinds at its
/// next suspension point.
pub struct PhasePayload {
    cancel: CancellationToken,
    data: Option<Box<dyn Any + Send>>,
}

impl PhasePayload {
    /// Creates an empty payload with a fresh cancellation scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            data: None,
        }
    }

    /// Creates a payload bound to an existing cancellation scope.
    #[must_use]
    pub const fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel, data: None }
    }

    /// Attaches a typed value for the target phase to consume.
    #[must_use]
    pub fn with_data<T: Any + Send>(mut self, data: T) -> Self {
        self.data = Some(Box::new(data));
        self
    }

    /// The cancellation scope of this transition.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Takes the attached value, if it exists and has the requested type.
    pub fn take_data<T: Any + Send>(&mut self) -> Option<T> {
        match self.data.take() {
            Some(boxed) => match boxed.downcast::<T>() {
                Ok(data) => Some(*data),
                Err(other) => {
                    // Wrong type requested: keep the value for a later taker.
                    self.data = Some(other);
                    None
                }
            },
            None => None,
        }
    }
}

impl Default for PhasePayload {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PhasePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhasePayload")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

// ============================================================================
// Transition requests
// ============================================================================

pub(crate) struct TransitionRequest {
    pub(crate) target: PhaseId,
    pub(crate) payload: PhasePayload,
}

/// Handle through which phases request follow-up transitions.
///
/// Requests are queued and performed after the transition currently in
/// flight completes; they never interleave with it. This is the only
/// intentionally-unawaited path in the crate — the requester does not
/// observe the outcome, the caller that drains the queue does.
#[derive(Clone)]
pub struct TransitionSender {
    tx: mpsc::UnboundedSender<TransitionRequest>,
}

impl TransitionSender {
    pub(crate) const fn new(tx: mpsc::UnboundedSender<TransitionRequest>) -> Self {
        Self { tx }
    }

    /// Queues a transition to `target`.
    pub fn request(&self, target: PhaseId, payload: PhasePayload) {
        if self
            .tx
            .send(TransitionRequest { target, payload })
            .is_err()
        {
            warn!(%target, "transition requested after the state machine was dropped");
        }
    }
}

impl std::fmt::Debug for TransitionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionSender").finish_non_exhaustive()
    }
}

// ============================================================================
// PhaseContext
// ============================================================================

/// Everything a phase receives when it is entered.
pub struct PhaseContext {
    /// The fresh resource scope of this activation. The machine disposes it
    /// when the activation ends; the phase may keep a clone for work done
    /// between enter and exit.
    pub scope: Arc<ResourceScope>,
    /// The payload handed to `change_state` by the transition initiator.
    pub payload: PhasePayload,
    /// Queue for follow-up transition requests.
    pub transitions: TransitionSender,
}

// ============================================================================
// Phase trait
// ============================================================================

/// One mutually-exclusive mode of the application session.
///
/// `enter` and `exit` may await resource loads, sub-transitions or timers;
/// the machine imposes no timeout. A phase that fails mid-`enter` must
/// leave itself re-enterable — the machine disposes the partial scope, but
/// any state the phase mutated outside the scope is its own to clean up.
#[async_trait]
pub trait Phase: Send {
    /// The registered identity of this phase.
    fn id(&self) -> PhaseId;

    /// Activates the phase.
    async fn enter(&mut self, ctx: PhaseContext) -> crate::Result<()>;

    /// Per-frame update, forwarded only while this phase is current.
    fn tick(&mut self, dt: Duration) {
        let _ = dt;
    }

    /// Deactivates the phase. The machine disposes the activation's scope
    /// right after this returns, on both the success and failure path.
    async fn exit(&mut self) -> crate::Result<()> {
        Ok(())
    }
}

// ============================================================================
// MachineStatus
// ============================================================================

/// Observable state of the [`StateMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineStatus {
    /// No phase has been entered yet (also the state after a failed enter
    /// left no phase current).
    Uninitialized,
    /// A phase is active and receiving ticks.
    Idle(PhaseId),
    /// A transition is in flight.
    Transitioning {
        /// The phase being exited, if any.
        from: Option<PhaseId>,
        /// The phase being entered.
        to: PhaseId,
    },
}
