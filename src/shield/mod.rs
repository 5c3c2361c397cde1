//! Shield cooldown gate.
//!
//! The shield absorbs one hit, goes down, and comes back up after a
//! cooldown. Every absorbed hit cancel-and-restarts the cooldown timer, so
//! only the newest cooldown can restore the shield; a cancelled cooldown
//! (phase teardown, restart) never brings it back up on its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::events::{Event, EventBus};
use crate::timer::CancellableTimer;

// ============================================================================
// Events
// ============================================================================

/// Published when the shield absorbs a hit and goes down.
#[derive(Debug, Default)]
pub struct ShieldDown;

impl Event for ShieldDown {
    fn reset(&mut self) {}
}

/// Published when the cooldown completes and the shield is back up.
#[derive(Debug, Default)]
pub struct ShieldRestored;

impl Event for ShieldRestored {
    fn reset(&mut self) {}
}

// ============================================================================
// ShieldGate
// ============================================================================

/// Absorb-and-cooldown gate for the player shield.
pub struct ShieldGate {
    active: Arc<AtomicBool>,
    bus: Arc<EventBus>,
    cooldown: Duration,
    timer: CancellableTimer,
}

impl ShieldGate {
    /// Creates a gate with the shield up.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, cooldown: Duration) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
            bus,
            cooldown,
            timer: CancellableTimer::new(),
        }
    }

    /// Whether the shield is currently up.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Absorbs a hit if the shield is up.
    ///
    /// Returns `true` when the hit was absorbed: the shield goes down,
    /// [`ShieldDown`] is published, and the cooldown timer is
    /// cancel-and-restarted. Returns `false` when the shield was already
    /// down — the hit passes through and the running cooldown is untouched.
    pub async fn try_absorb(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }

        debug!(cooldown = ?self.cooldown, "shield down");
        self.bus.publish(self.bus.get::<ShieldDown>()).await;

        let active = Arc::clone(&self.active);
        let bus = Arc::clone(&self.bus);
        self.timer.arm(self.cooldown, move || async move {
            active.store(true, Ordering::SeqCst);
            debug!("shield restored");
            bus.publish(bus.get::<ShieldRestored>()).await;
        });

        true
    }

    /// Cancels a pending cooldown, leaving the shield in its current state.
    ///
    /// Used on teardown; a cancelled cooldown never restores the shield.
    pub fn cancel(&self) {
        self.timer.cancel();
    }

    /// Puts the shield back up immediately, cancelling any pending cooldown.
    pub fn reset(&self) {
        self.timer.cancel();
        self.active.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ShieldGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShieldGate")
            .field("active", &self.is_active())
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
