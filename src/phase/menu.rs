//! Main menu phase.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::AssetKeys;
use crate::events::{Event, EventBus};
use crate::session::RecordStore;

use super::{Phase, PhaseContext, PhaseId};

/// Identity of the menu phase.
pub const MENU: PhaseId = PhaseId("menu");

/// Published once per menu activation so views can show the best score.
#[derive(Debug, Default)]
pub struct BestScoreLoaded {
    /// Best score from the persisted record.
    pub best_score: u32,
}

impl Event for BestScoreLoaded {
    fn reset(&mut self) {
        self.best_score = 0;
    }
}

/// The main menu: loads its panels into the activation scope and announces
/// the persisted best score.
pub struct MenuPhase {
    store: Arc<dyn RecordStore>,
    bus: Arc<EventBus>,
    assets: AssetKeys,
    initialized: bool,
}

impl MenuPhase {
    /// Creates the menu phase.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, bus: Arc<EventBus>, assets: AssetKeys) -> Self {
        Self {
            store,
            bus,
            assets,
            initialized: false,
        }
    }

    /// Whether the menu has completed at least one enter.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[async_trait]
impl Phase for MenuPhase {
    fn id(&self) -> PhaseId {
        MENU
    }

    async fn enter(&mut self, ctx: PhaseContext) -> crate::Result<()> {
        ctx.scope
            .acquire_and_instantiate(&self.assets.main_menu)
            .await?;
        ctx.scope
            .acquire_and_instantiate(&self.assets.menu_stage)
            .await?;

        // Best-effort: the menu still works without a record.
        match self.store.load().await {
            Ok(record) => {
                let mut event = self.bus.get::<BestScoreLoaded>();
                event.best_score = record.best_score;
                self.bus.publish(event).await;
            }
            Err(error) => warn!(%error, "session record unavailable; best score not shown"),
        }

        self.initialized = true;
        Ok(())
    }
}
