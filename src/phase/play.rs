//! Active play phase.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::AssetKeys;
use crate::session::SessionService;
use crate::spawn::Spawner;

use super::{Phase, PhaseContext, PhaseId};

/// Identity of the active-play phase.
pub const PLAY: PhaseId = PhaseId("play");

/// Active play: loads the HUD and stage, starts the round and the spawn
/// loop. Exiting stops spawning and settles the round's score, whatever
/// triggered the exit (menu button, loss condition).
pub struct PlayPhase {
    session: Arc<SessionService>,
    spawner: Arc<Spawner>,
    assets: AssetKeys,
}

impl PlayPhase {
    /// Creates the play phase.
    #[must_use]
    pub const fn new(
        session: Arc<SessionService>,
        spawner: Arc<Spawner>,
        assets: AssetKeys,
    ) -> Self {
        Self {
            session,
            spawner,
            assets,
        }
    }
}

#[async_trait]
impl Phase for PlayPhase {
    fn id(&self) -> PhaseId {
        PLAY
    }

    async fn enter(&mut self, ctx: PhaseContext) -> crate::Result<()> {
        ctx.scope
            .acquire_and_instantiate(&self.assets.game_hud)
            .await?;
        ctx.scope
            .acquire_and_instantiate(&self.assets.play_stage)
            .await?;

        self.session.begin_round();
        self.spawner.start();
        Ok(())
    }

    async fn exit(&mut self) -> crate::Result<()> {
        self.spawner.stop();
        let score = self.session.finish_round().await;
        info!(score, "round finished");
        Ok(())
    }
}
