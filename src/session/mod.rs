//! Session scoring and persistence.
//!
//! [`SessionService`] tracks the running round: whether play is active and
//! the current score. Score changes fan out through the event bus as pooled
//! [`ScoreChanged`] events; finishing a round persists a new best score
//! through the [`RecordStore`] collaborator, best-effort.

mod record;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::events::{Event, EventBus};

pub use record::{JsonRecordStore, RecordStore, SessionRecord};

// ============================================================================
// Events
// ============================================================================

/// Published every time the running score changes.
#[derive(Debug, Default)]
pub struct ScoreChanged {
    /// The new total score.
    pub score: u32,
}

impl Event for ScoreChanged {
    fn reset(&mut self) {
        self.score = 0;
    }
}

// ============================================================================
// SessionService
// ============================================================================

/// In-process state of the current play session.
pub struct SessionService {
    started: AtomicBool,
    score: AtomicU32,
    store: Arc<dyn RecordStore>,
    bus: Arc<EventBus>,
}

impl SessionService {
    /// Creates a service with no round in progress.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, bus: Arc<EventBus>) -> Self {
        Self {
            started: AtomicBool::new(false),
            score: AtomicU32::new(0),
            store,
            bus,
        }
    }

    /// Whether a round is currently active.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// The running score of the current round.
    #[must_use]
    pub fn score(&self) -> u32 {
        self.score.load(Ordering::SeqCst)
    }

    /// Marks a round as active. The score carries over from the last reset,
    /// which [`SessionService::finish_round`] performs.
    pub fn begin_round(&self) {
        self.started.store(true, Ordering::SeqCst);
        debug!("round started");
    }

    /// Adds points to the running score and publishes [`ScoreChanged`].
    pub async fn add_score(&self, points: u32) {
        let total = self
            .score
            .fetch_add(points, Ordering::SeqCst)
            .saturating_add(points);

        let mut event = self.bus.get::<ScoreChanged>();
        event.score = total;
        self.bus.publish(event).await;
    }

    /// Ends the round: clears the active flag, persists a new best score
    /// when the round beat it, and resets the running score to zero.
    ///
    /// Persistence is best-effort — a store failure is logged, never fatal.
    /// Returns the final score of the round.
    pub async fn finish_round(&self) -> u32 {
        self.started.store(false, Ordering::SeqCst);
        let score = self.score.swap(0, Ordering::SeqCst);

        match self.store.load().await {
            Ok(mut record) => {
                if score > record.best_score {
                    info!(score, previous = record.best_score, "new best score");
                    record.best_score = score;
                    record.updated_at = Some(Utc::now());
                    if let Err(error) = self.store.save(&record).await {
                        warn!(%error, "failed to save session record");
                    }
                }
            }
            Err(error) => {
                warn!(%error, "session record unavailable; best score not updated");
            }
        }

        score
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("started", &self.is_started())
            .field("score", &self.score())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
