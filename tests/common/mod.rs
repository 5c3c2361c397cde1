//! Shared test harness: journaling collaborators and scripted phases.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use stagehand::assets::{AssetHandle, AssetProvider, InstanceId};
use stagehand::error::{PersistError, PhaseError, ResourceError};
use stagehand::phase::{Phase, PhaseContext, PhaseId};
use stagehand::session::{RecordStore, SessionRecord};

/// Shared, ordered journal of observable actions.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

// ============================================================================
// JournalingProvider
// ============================================================================

/// Asset provider that counts operations and journals teardown.
#[derive(Default)]
pub struct JournalingProvider {
    pub next_id: AtomicU64,
    pub loads: AtomicU64,
    pub unloads: AtomicU64,
    pub instantiated: AtomicU64,
    pub destroyed: AtomicU64,
    /// Keys that fail to load.
    pub fail_keys: Vec<String>,
    /// Artificial latency per load, to widen race windows.
    pub load_delay: Duration,
}

impl JournalingProvider {
    pub fn failing_on(key: &str) -> Self {
        Self {
            fail_keys: vec![key.to_string()],
            ..Self::default()
        }
    }

    pub fn outstanding(&self) -> i64 {
        let acquired = self.loads.load(Ordering::SeqCst) + self.instantiated.load(Ordering::SeqCst);
        let released =
            self.unloads.load(Ordering::SeqCst) + self.destroyed.load(Ordering::SeqCst);
        i64::try_from(acquired).unwrap() - i64::try_from(released).unwrap()
    }
}

#[async_trait]
impl AssetProvider for JournalingProvider {
    async fn load(&self, key: &str) -> Result<AssetHandle, ResourceError> {
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if self.fail_keys.iter().any(|k| k == key) {
            return Err(ResourceError::Load {
                key: key.to_string(),
                message: "scripted failure".to_string(),
            });
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(AssetHandle::new(
            key,
            self.next_id.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn instantiate(&self, _handle: &AssetHandle) -> Result<InstanceId, ResourceError> {
        self.instantiated.fetch_add(1, Ordering::SeqCst);
        Ok(InstanceId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn destroy_instance(&self, _instance: InstanceId) -> Result<(), ResourceError> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unload(&self, _handle: &AssetHandle) -> Result<(), ResourceError> {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory record store.
#[derive(Default)]
pub struct MemoryStore {
    pub record: Mutex<SessionRecord>,
}

impl MemoryStore {
    pub fn with_best(best_score: u32) -> Self {
        Self {
            record: Mutex::new(SessionRecord {
                best_score,
                updated_at: None,
            }),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self) -> Result<SessionRecord, PersistError> {
        Ok(self.record.lock().unwrap().clone())
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), PersistError> {
        *self.record.lock().unwrap() = record.clone();
        Ok(())
    }
}

// ============================================================================
// ScriptedPhase
// ============================================================================

/// Phase that journals its lifecycle with configurable delays, failures,
/// acquisitions and chained transitions.
pub struct ScriptedPhase {
    pub id: PhaseId,
    pub journal: Journal,
    pub enter_delay: Duration,
    pub exit_delay: Duration,
    pub acquire_on_enter: Vec<String>,
    pub fail_enter: bool,
    pub chain_to: Option<PhaseId>,
}

impl ScriptedPhase {
    pub fn new(id: PhaseId, journal: &Journal) -> Self {
        Self {
            id,
            journal: Arc::clone(journal),
            enter_delay: Duration::ZERO,
            exit_delay: Duration::ZERO,
            acquire_on_enter: Vec::new(),
            fail_enter: false,
            chain_to: None,
        }
    }

    pub fn boxed(self) -> Box<dyn Phase> {
        Box::new(self)
    }

    fn log(&self, action: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{action}:{}", self.id));
    }
}

#[async_trait]
impl Phase for ScriptedPhase {
    fn id(&self) -> PhaseId {
        self.id
    }

    async fn enter(&mut self, mut ctx: PhaseContext) -> stagehand::Result<()> {
        self.log("enter-start");
        if let Some(marker) = ctx.payload.take_data::<u32>() {
            self.journal
                .lock()
                .unwrap()
                .push(format!("payload:{}:{marker}", self.id));
        }
        if !self.enter_delay.is_zero() {
            tokio::time::sleep(self.enter_delay).await;
        }
        for key in &self.acquire_on_enter {
            ctx.scope.acquire_and_instantiate(key).await?;
        }
        if self.fail_enter {
            self.log("enter-failed");
            return Err(PhaseError::Lifecycle {
                phase: self.id.to_string(),
                stage: "enter",
                message: "scripted failure".to_string(),
            }
            .into());
        }
        if let Some(next) = self.chain_to {
            ctx.transitions
                .request(next, stagehand::phase::PhasePayload::new());
        }
        self.log("enter-done");
        Ok(())
    }

    fn tick(&mut self, _dt: Duration) {
        self.log("tick");
    }

    async fn exit(&mut self) -> stagehand::Result<()> {
        self.log("exit-start");
        if !self.exit_delay.is_zero() {
            tokio::time::sleep(self.exit_delay).await;
        }
        self.log("exit-done");
        Ok(())
    }
}
