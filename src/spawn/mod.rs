//! Periodic adversary spawning.
//!
//! The spawner owns one repeating [`CancellableTimer`]. Each firing, while
//! a round is active, it rolls a point in the arena until the point clears
//! the minimum distance from the player, picks a kind with equal
//! probability, and hands off to the host's [`SpawnHost`]. Stopping the
//! spawner cancels the timer; a loop awakening after cancellation never
//! spawns.

use std::sync::Arc;
use std::sync::Mutex;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::SpawnSettings;
use crate::session::SessionService;
use crate::timer::CancellableTimer;

// ============================================================================
// Geometry
// ============================================================================

/// A point on the play plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    /// Lateral coordinate.
    pub x: f32,
    /// Depth coordinate.
    pub z: f32,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self.x - other.x).hypot(self.z - other.z)
    }
}

/// Where the player currently is.
///
/// The host updates this from its movement system; the spawner only reads.
pub trait PositionSource: Send + Sync {
    /// Current player position.
    fn position(&self) -> Position;
}

/// A [`PositionSource`] over a shared, host-updated value.
#[derive(Debug, Default)]
pub struct SharedPosition(Mutex<Position>);

impl SharedPosition {
    /// Creates a source at the given position.
    #[must_use]
    pub fn new(position: Position) -> Self {
        Self(Mutex::new(position))
    }

    /// Updates the tracked position.
    pub fn set(&self, position: Position) {
        *self.0.lock().expect("position lock poisoned") = position;
    }
}

impl PositionSource for SharedPosition {
    fn position(&self) -> Position {
        *self.0.lock().expect("position lock poisoned")
    }
}

// ============================================================================
// SpawnHost
// ============================================================================

/// Kind of adversary to spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnKind {
    /// Slow, high-value target.
    Heavy,
    /// Quick, low-value target.
    Fast,
}

/// The host-side factory that actually builds spawned objects.
pub trait SpawnHost: Send + Sync {
    /// Instantiates one adversary of `kind` at `position`.
    fn spawn(&self, kind: SpawnKind, position: Position);
}

// ============================================================================
// Spawner
// ============================================================================

/// Attempts before giving up on the distance constraint and taking the last
/// roll anyway. Keeps a cramped arena from stalling the loop.
const MAX_PLACEMENT_ROLLS: u32 = 32;

/// Periodic spawn loop.
pub struct Spawner {
    session: Arc<SessionService>,
    host: Arc<dyn SpawnHost>,
    player: Arc<dyn PositionSource>,
    settings: SpawnSettings,
    timer: CancellableTimer,
}

impl Spawner {
    /// Creates a stopped spawner.
    #[must_use]
    pub fn new(
        session: Arc<SessionService>,
        host: Arc<dyn SpawnHost>,
        player: Arc<dyn PositionSource>,
        settings: SpawnSettings,
    ) -> Self {
        Self {
            session,
            host,
            player,
            settings,
            timer: CancellableTimer::new(),
        }
    }

    /// Starts the spawn loop, restarting it if it was already running.
    ///
    /// The first spawn happens one full interval after the call.
    pub fn start(&self) {
        let session = Arc::clone(&self.session);
        let host = Arc::clone(&self.host);
        let player = Arc::clone(&self.player);
        let settings = self.settings.clone();

        debug!(interval_ms = self.settings.interval_ms, "spawner started");
        self.timer.arm_repeating(self.settings.interval(), move || {
            // Everything here is synchronous; the roll never spans a
            // suspension point.
            if session.is_started() {
                let position = roll_spawn_point(&settings, player.position());
                let kind = if rand::rng().random_bool(0.5) {
                    SpawnKind::Heavy
                } else {
                    SpawnKind::Fast
                };
                debug!(?kind, x = %position.x, z = %position.z, "spawning adversary");
                host.spawn(kind, position);
            }
            std::future::ready(())
        });
    }

    /// Stops the spawn loop. Idempotent.
    pub fn stop(&self) {
        self.timer.cancel();
        debug!("spawner stopped");
    }

    /// Whether the loop is currently armed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer.is_live()
    }
}

impl std::fmt::Debug for Spawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spawner")
            .field("running", &self.is_running())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Rolls a point in the arena that clears the minimum player distance.
fn roll_spawn_point(settings: &SpawnSettings, player: Position) -> Position {
    let mut rng = rand::rng();
    let extent = settings.arena_half_extent;
    let mut point = Position::default();

    for attempt in 0..MAX_PLACEMENT_ROLLS {
        point = Position::new(
            rng.random_range(-extent..extent),
            rng.random_range(-extent..extent),
        );
        if point.distance(player) >= settings.min_player_distance {
            return point;
        }
        if attempt == MAX_PLACEMENT_ROLLS - 1 {
            warn!(
                min_distance = %settings.min_player_distance,
                "no spawn point cleared the player distance; using last roll"
            );
        }
    }
    point
}

// ============================================================================
// Tests
// ============================================================================
