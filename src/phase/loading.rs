//! Startup loading phase.

use async_trait::async_trait;
use tracing::info;

use super::{Phase, PhaseContext, PhaseId, PhasePayload};

/// Identity of the loading phase.
pub const LOADING: PhaseId = PhaseId("loading");

/// First phase after boot: performs no work of its own and immediately
/// chains into the menu. Kept as a phase so boot-time work (warm-up loads,
/// migrations) has an obvious home later.
pub struct LoadingPhase {
    next: PhaseId,
}

impl LoadingPhase {
    /// Creates a loading phase that chains into `next`.
    #[must_use]
    pub const fn new(next: PhaseId) -> Self {
        Self { next }
    }
}

impl Default for LoadingPhase {
    fn default() -> Self {
        Self::new(super::MENU)
    }
}

#[async_trait]
impl Phase for LoadingPhase {
    fn id(&self) -> PhaseId {
        LOADING
    }

    async fn enter(&mut self, ctx: PhaseContext) -> crate::Result<()> {
        info!("loading phase entered");
        ctx.transitions.request(self.next, PhasePayload::new());
        Ok(())
    }
}
