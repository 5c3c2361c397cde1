//! The phase state machine.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, trace, warn};

use crate::assets::{AssetProvider, ResourceScope};
use crate::error::{ConfigError, PhaseError, StagehandError};

use super::{
    MachineStatus, Phase, PhaseContext, PhaseId, PhasePayload, TransitionRequest, TransitionSender,
};

struct PhaseEntry {
    phase: Box<dyn Phase>,
    initialized: bool,
}

struct MachineInner {
    /// Registered phases, in registration order.
    phases: IndexMap<PhaseId, PhaseEntry>,
    registered: bool,
    current: Option<PhaseId>,
    /// Scope of the current activation; disposed on every exit path.
    scope: Option<Arc<ResourceScope>>,
}

/// Drives the registered phases: single active phase, strictly ordered
/// async enter/exit, one fresh [`ResourceScope`] per activation.
///
/// Overlapping `change_state` calls serialize on an internal mutex — a
/// request made while a transition is in flight waits for it and runs next,
/// never interleaved. Requests a phase makes from inside `enter`/`exit` (via
/// [`TransitionSender`]) are queued and drained by the same call after its
/// own transition completes.
pub struct StateMachine {
    provider: Arc<dyn AssetProvider>,
    inner: Mutex<MachineInner>,
    status: StdMutex<MachineStatus>,
    pending_tx: mpsc::UnboundedSender<TransitionRequest>,
    pending_rx: Mutex<mpsc::UnboundedReceiver<TransitionRequest>>,
}

impl StateMachine {
    /// Creates a machine with no registered phases.
    #[must_use]
    pub fn new(provider: Arc<dyn AssetProvider>) -> Self {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        Self {
            provider,
            inner: Mutex::new(MachineInner {
                phases: IndexMap::new(),
                registered: false,
                current: None,
                scope: None,
            }),
            status: StdMutex::new(MachineStatus::Uninitialized),
            pending_tx,
            pending_rx: Mutex::new(pending_rx),
        }
    }

    /// Registers the phase set. One-time setup.
    ///
    /// # Errors
    ///
    /// [`ConfigError::PhasesAlreadyRegistered`] on a second call,
    /// [`ConfigError::DuplicatePhase`] when two phases share an identity.
    /// Both are fatal at startup.
    pub async fn register_phases(&self, phases: Vec<Box<dyn Phase>>) -> crate::Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.registered {
            return Err(ConfigError::PhasesAlreadyRegistered.into());
        }
        for phase in phases {
            let id = phase.id();
            if inner
                .phases
                .insert(
                    id,
                    PhaseEntry {
                        phase,
                        initialized: false,
                    },
                )
                .is_some()
            {
                return Err(ConfigError::DuplicatePhase { id: id.to_string() }.into());
            }
            debug!(phase = %id, "phase registered");
        }
        inner.registered = true;
        Ok(())
    }

    /// Transitions to `target`.
    ///
    /// Sequence: exit the current phase (its scope is disposed
    /// unconditionally), open a fresh scope, enter the target, mark it
    /// current and initialized. A request made while another transition is
    /// in flight waits for it; transitions never interleave. After its own
    /// transition this call also drains any follow-up requests phases queued
    /// meanwhile, in order.
    ///
    /// # Errors
    ///
    /// [`PhaseError::Unknown`] when `target` was never registered (the
    /// current phase is left untouched). Enter/exit failures propagate to
    /// the caller, which decides whether to retry, fall back or terminate;
    /// a failed enter leaves no phase current. Cancellation surfaces as
    /// [`StagehandError::Cancelled`].
    pub async fn change_state(&self, target: PhaseId, payload: PhasePayload) -> crate::Result<()> {
        let mut inner = self.inner.lock().await;
        self.perform_transition(&mut inner, target, payload).await?;
        self.drain_pending(&mut inner).await
    }

    /// Drains transition requests queued outside any `change_state` call.
    ///
    /// Hosts that let timers or background logic request transitions call
    /// this from their main loop.
    ///
    /// # Errors
    ///
    /// Propagates the first failing queued transition.
    pub async fn pump(&self) -> crate::Result<()> {
        let mut inner = self.inner.lock().await;
        self.drain_pending(&mut inner).await
    }

    /// Forwards one frame tick to the current phase.
    ///
    /// No-op when no phase is active. Never blocks: while a transition holds
    /// the machine the frame is dropped, keeping the host loop responsive.
    pub fn tick(&self, dt: Duration) {
        let Ok(mut inner) = self.inner.try_lock() else {
            trace!("tick dropped: transition in flight");
            return;
        };
        let Some(current) = inner.current else {
            return;
        };
        if let Some(entry) = inner.phases.get_mut(&current) {
            entry.phase.tick(dt);
        }
    }

    /// Observable machine status.
    #[must_use]
    pub fn status(&self) -> MachineStatus {
        *self.status.lock().expect("status lock poisoned")
    }

    /// The currently active phase, if any.
    #[must_use]
    pub fn current_phase(&self) -> Option<PhaseId> {
        match self.status() {
            MachineStatus::Idle(id) => Some(id),
            MachineStatus::Uninitialized | MachineStatus::Transitioning { .. } => None,
        }
    }

    /// Whether `id` has completed `enter` at least once.
    pub async fn is_initialized(&self, id: PhaseId) -> bool {
        self.inner
            .lock()
            .await
            .phases
            .get(&id)
            .is_some_and(|entry| entry.initialized)
    }

    /// A queue handle phases and collaborators use to request transitions.
    #[must_use]
    pub fn transition_sender(&self) -> TransitionSender {
        TransitionSender::new(self.pending_tx.clone())
    }

    fn set_status(&self, status: MachineStatus) {
        *self.status.lock().expect("status lock poisoned") = status;
    }

    async fn perform_transition(
        &self,
        inner: &mut MachineInner,
        target: PhaseId,
        payload: PhasePayload,
    ) -> crate::Result<()> {
        // Resolve the target before touching the current phase so an
        // unknown target leaves the application in its last good phase.
        if !inner.phases.contains_key(&target) {
            warn!(%target, "transition to unregistered phase rejected");
            return Err(PhaseError::Unknown(target.to_string()).into());
        }

        let from = inner.current;
        self.set_status(MachineStatus::Transitioning { from, to: target });
        info!(from = ?from.map(|id| id.0), to = %target, "phase transition");

        if let Some(current) = inner.current {
            let exit_result = match inner.phases.get_mut(&current) {
                Some(entry) => entry.phase.exit().await,
                None => Ok(()),
            };

            // The scope is released on success and failure alike.
            if let Some(scope) = inner.scope.take() {
                scope.dispose().await;
            }

            if let Err(error) = exit_result {
                // The old phase stays current; it is responsible for being
                // exitable again after a partial exit.
                self.set_status(MachineStatus::Idle(current));
                warn!(phase = %current, %error, "phase exit failed");
                return Err(error);
            }
            inner.current = None;
        }

        if payload.cancellation().is_cancelled() {
            debug!(%target, "transition cancelled before enter");
            self.set_status(match inner.current {
                Some(id) => MachineStatus::Idle(id),
                None => MachineStatus::Uninitialized,
            });
            return Err(StagehandError::Cancelled);
        }

        let scope = Arc::new(ResourceScope::new(Arc::clone(&self.provider), target));
        let ctx = PhaseContext {
            scope: Arc::clone(&scope),
            payload,
            transitions: self.transition_sender(),
        };

        let entry = inner
            .phases
            .get_mut(&target)
            .expect("target presence checked above");
        match entry.phase.enter(ctx).await {
            Ok(()) => {
                entry.initialized = true;
                inner.current = Some(target);
                inner.scope = Some(scope);
                self.set_status(MachineStatus::Idle(target));
                debug!(phase = %target, "phase entered");
                Ok(())
            }
            Err(error) => {
                // No rollback: the partial scope is disposed and no phase is
                // current. The caller picks the recovery path.
                scope.dispose().await;
                self.set_status(MachineStatus::Uninitialized);
                if error.is_cancelled() {
                    debug!(phase = %target, "enter cancelled; partial scope disposed");
                } else {
                    warn!(phase = %target, %error, "phase enter failed; partial scope disposed");
                }
                Err(error)
            }
        }
    }

    async fn drain_pending(&self, inner: &mut MachineInner) -> crate::Result<()> {
        let mut rx = self.pending_rx.lock().await;
        while let Ok(request) = rx.try_recv() {
            self.perform_transition(inner, request.target, request.payload)
                .await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;

    use crate::assets::{AssetHandle, InstanceId};
    use crate::error::ResourceError;

    use super::*;

    const ALPHA: PhaseId = PhaseId("alpha");
    const BETA: PhaseId = PhaseId("beta");

    #[derive(Default)]
    struct NullProvider {
        next_id: AtomicU64,
    }

    #[async_trait]
    impl AssetProvider for NullProvider {
        async fn load(&self, key: &str) -> Result<AssetHandle, ResourceError> {
            Ok(AssetHandle::new(
                key,
                self.next_id.fetch_add(1, Ordering::SeqCst),
            ))
        }

        async fn instantiate(&self, _handle: &AssetHandle) -> Result<InstanceId, ResourceError> {
            Ok(InstanceId(self.next_id.fetch_add(1, Ordering::SeqCst)))
        }

        async fn destroy_instance(&self, _instance: InstanceId) -> Result<(), ResourceError> {
            Ok(())
        }

        async fn unload(&self, _handle: &AssetHandle) -> Result<(), ResourceError> {
            Ok(())
        }
    }

    /// Phase that journals its lifecycle into a shared log.
    struct JournalPhase {
        id: PhaseId,
        journal: Arc<Mutex<Vec<String>>>,
        fail_enter: bool,
        chain_to: Option<PhaseId>,
    }

    impl JournalPhase {
        fn new(id: PhaseId, journal: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                id,
                journal: Arc::clone(journal),
                fail_enter: false,
                chain_to: None,
            })
        }
    }

    #[async_trait]
    impl Phase for JournalPhase {
        fn id(&self) -> PhaseId {
            self.id
        }

        async fn enter(&mut self, ctx: PhaseContext) -> crate::Result<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("enter:{}", self.id));
            if self.fail_enter {
                ctx.scope.acquire("partial").await?;
                return Err(PhaseError::Lifecycle {
                    phase: self.id.to_string(),
                    stage: "enter",
                    message: "synthetic".to_string(),
                }
                .into());
            }
            if let Some(next) = self.chain_to {
                ctx.transitions.request(next, PhasePayload::new());
            }
            Ok(())
        }

        fn tick(&mut self, _dt: Duration) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("tick:{}", self.id));
        }

        async fn exit(&mut self) -> crate::Result<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("exit:{}", self.id));
            Ok(())
        }
    }

    fn machine() -> (StateMachine, Arc<Mutex<Vec<String>>>) {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let machine = StateMachine::new(Arc::new(NullProvider::default()));
        (machine, journal)
    }

    #[tokio::test]
    async fn starts_uninitialized() {
        let (machine, _journal) = machine();
        assert_eq!(machine.status(), MachineStatus::Uninitialized);
        assert_eq!(machine.current_phase(), None);
    }

    #[tokio::test]
    async fn register_twice_is_a_configuration_error() {
        let (machine, journal) = machine();
        machine
            .register_phases(vec![JournalPhase::new(ALPHA, &journal)])
            .await
            .unwrap();
        let err = machine
            .register_phases(vec![JournalPhase::new(BETA, &journal)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StagehandError::Config(ConfigError::PhasesAlreadyRegistered)
        ));
    }

    #[tokio::test]
    async fn duplicate_ids_are_a_configuration_error() {
        let (machine, journal) = machine();
        let err = machine
            .register_phases(vec![
                JournalPhase::new(ALPHA, &journal),
                JournalPhase::new(ALPHA, &journal),
            ])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StagehandError::Config(ConfigError::DuplicatePhase { .. })
        ));
    }

    #[tokio::test]
    async fn exit_completes_before_enter_starts() {
        let (machine, journal) = machine();
        machine
            .register_phases(vec![
                JournalPhase::new(ALPHA, &journal),
                JournalPhase::new(BETA, &journal),
            ])
            .await
            .unwrap();

        machine.change_state(ALPHA, PhasePayload::new()).await.unwrap();
        machine.change_state(BETA, PhasePayload::new()).await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["enter:alpha", "exit:alpha", "enter:beta"]
        );
        assert_eq!(machine.current_phase(), Some(BETA));
        assert!(machine.is_initialized(ALPHA).await);
    }

    #[tokio::test]
    async fn unknown_phase_leaves_current_untouched() {
        let (machine, journal) = machine();
        machine
            .register_phases(vec![JournalPhase::new(ALPHA, &journal)])
            .await
            .unwrap();
        machine.change_state(ALPHA, PhasePayload::new()).await.unwrap();

        let err = machine
            .change_state(PhaseId("nowhere"), PhasePayload::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StagehandError::Phase(PhaseError::Unknown(_))
        ));
        assert_eq!(machine.current_phase(), Some(ALPHA));
        // No exit was journalled for the rejected transition.
        assert_eq!(*journal.lock().unwrap(), vec!["enter:alpha"]);
    }

    #[tokio::test]
    async fn chained_request_runs_after_the_triggering_transition() {
        let (machine, journal) = machine();
        let mut alpha = JournalPhase::new(ALPHA, &journal);
        alpha.chain_to = Some(BETA);
        machine
            .register_phases(vec![alpha, JournalPhase::new(BETA, &journal)])
            .await
            .unwrap();

        machine.change_state(ALPHA, PhasePayload::new()).await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["enter:alpha", "exit:alpha", "enter:beta"]
        );
        assert_eq!(machine.current_phase(), Some(BETA));
    }

    #[tokio::test]
    async fn failed_enter_leaves_no_phase_current() {
        let (machine, journal) = machine();
        let mut beta = JournalPhase::new(BETA, &journal);
        beta.fail_enter = true;
        machine
            .register_phases(vec![JournalPhase::new(ALPHA, &journal), beta])
            .await
            .unwrap();

        machine.change_state(ALPHA, PhasePayload::new()).await.unwrap();
        let err = machine
            .change_state(BETA, PhasePayload::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StagehandError::Phase(_)));
        assert_eq!(machine.status(), MachineStatus::Uninitialized);
        assert!(!machine.is_initialized(BETA).await);
    }

    #[tokio::test]
    async fn cancelled_payload_aborts_before_enter() {
        let (machine, journal) = machine();
        machine
            .register_phases(vec![JournalPhase::new(ALPHA, &journal)])
            .await
            .unwrap();

        let payload = PhasePayload::new();
        payload.cancellation().cancel();
        let err = machine.change_state(ALPHA, payload).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tick_reaches_only_the_current_phase() {
        let (machine, journal) = machine();
        machine
            .register_phases(vec![
                JournalPhase::new(ALPHA, &journal),
                JournalPhase::new(BETA, &journal),
            ])
            .await
            .unwrap();

        machine.tick(Duration::from_millis(16)); // no-op before first enter
        machine.change_state(ALPHA, PhasePayload::new()).await.unwrap();
        machine.tick(Duration::from_millis(16));

        assert_eq!(*journal.lock().unwrap(), vec!["enter:alpha", "tick:alpha"]);
    }

    #[tokio::test]
    async fn payload_data_reaches_the_target_phase() {
        struct Receiving {
            seen: Arc<Mutex<Option<u32>>>,
        }

        #[async_trait]
        impl Phase for Receiving {
            fn id(&self) -> PhaseId {
                PhaseId("receiving")
            }

            async fn enter(&mut self, mut ctx: PhaseContext) -> crate::Result<()> {
                *self.seen.lock().unwrap() = ctx.payload.take_data::<u32>();
                Ok(())
            }
        }

        let seen = Arc::new(Mutex::new(None));
        let machine = StateMachine::new(Arc::new(NullProvider::default()));
        machine
            .register_phases(vec![Box::new(Receiving {
                seen: Arc::clone(&seen),
            })])
            .await
            .unwrap();

        machine
            .change_state(PhaseId("receiving"), PhasePayload::new().with_data(7u32))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(7));
    }
}
