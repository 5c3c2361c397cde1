//! Typed event bus.
//!
//! A process-wide publish/subscribe hub keyed by event type identity.
//! Each event type has one pooled, reusable instance: publishers take it
//! with [`EventBus::get`], overwrite its fields, and hand it back through
//! [`EventBus::publish`], which resets it and returns it to the pool after
//! delivery. Subscriptions are keyed by `(listener, event type)` —
//! re-subscribing replaces the callback in place.
//!
//! Delivery is sequential in subscription order, so a single listener never
//! sees two concurrent invocations for the same published event. A listener
//! error is reported and delivery continues.

use std::any::{Any, TypeId, type_name};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{trace, warn};

use crate::error::EventError;

// ============================================================================
// Event trait
// ============================================================================

/// A declared, poolable event shape.
///
/// Types implement `Default` for lazy pool construction and [`Event::reset`]
/// so no field carries identity from one dispatch into the next.
pub trait Event: Default + Send + Sync + Any {
    /// Clears any state that must not leak into the next dispatch.
    fn reset(&mut self);
}

/// Future returned by a listener callback.
pub type ListenerFuture = Pin<Box<dyn Future<Output = Result<(), EventError>> + Send + 'static>>;

/// Identity of a subscriber, used to replace and remove subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(String);

impl ListenerId {
    /// Creates a listener identity from any string-like value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ListenerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ============================================================================
// EventBus
// ============================================================================

type ErasedCallback = Arc<dyn Fn(&dyn Any) -> ListenerFuture + Send + Sync>;

struct Subscription {
    listener: ListenerId,
    callback: ErasedCallback,
}

#[derive(Default)]
struct EventSlot {
    /// Subscribers in subscription order. Replacement keeps the original
    /// position.
    subscribers: Vec<Subscription>,
    /// The one reusable instance of this event type, absent while a caller
    /// holds it between `get` and `publish`.
    pool: Option<Box<dyn Any + Send + Sync>>,
}

/// Typed publish/subscribe hub.
///
/// Lifecycle is process start to process shutdown; the subscriber table is
/// mutated only through [`EventBus::subscribe`] and
/// [`EventBus::unsubscribe`].
#[derive(Default)]
pub struct EventBus {
    slots: DashMap<TypeId, EventSlot>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for event type `E` under `listener`.
    ///
    /// At most one subscription exists per `(listener, E)` pair: subscribing
    /// again replaces the callback in place, keeping the original position
    /// in delivery order. A replacement made while a dispatch of `E` is in
    /// flight receives that in-flight event if the listener's turn has not
    /// come up yet.
    pub fn subscribe<E, L, F>(&self, listener: L, callback: F)
    where
        E: Event,
        L: Into<ListenerId>,
        F: Fn(&E) -> ListenerFuture + Send + Sync + 'static,
    {
        let listener = listener.into();
        let erased: ErasedCallback = Arc::new(move |any: &dyn Any| {
            let event = any
                .downcast_ref::<E>()
                .expect("event type mismatch in bus slot");
            callback(event)
        });

        let mut slot = self.slots.entry(TypeId::of::<E>()).or_default();
        if let Some(existing) = slot
            .subscribers
            .iter_mut()
            .find(|sub| sub.listener == listener)
        {
            trace!(%listener, event = type_name::<E>(), "subscription replaced");
            existing.callback = erased;
        } else {
            trace!(%listener, event = type_name::<E>(), "subscribed");
            slot.subscribers.push(Subscription {
                listener,
                callback: erased,
            });
        }
    }

    /// Removes the subscription of `listener` for event type `E`.
    ///
    /// A no-op when the listener was never subscribed.
    pub fn unsubscribe<E, L>(&self, listener: L)
    where
        E: Event,
        L: Into<ListenerId>,
    {
        let listener = listener.into();
        if let Some(mut slot) = self.slots.get_mut(&TypeId::of::<E>()) {
            slot.subscribers.retain(|sub| sub.listener != listener);
        }
    }

    /// Whether `listener` currently has a subscription for `E`.
    #[must_use]
    pub fn is_subscribed<E: Event>(&self, listener: &ListenerId) -> bool {
        self.slots
            .get(&TypeId::of::<E>())
            .is_some_and(|slot| slot.subscribers.iter().any(|sub| &sub.listener == listener))
    }

    /// Number of current subscribers for event type `E`.
    #[must_use]
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.slots
            .get(&TypeId::of::<E>())
            .map_or(0, |slot| slot.subscribers.len())
    }

    /// Takes the pooled instance of `E`, lazily constructing it on first use.
    ///
    /// The caller is expected to overwrite its fields and hand it to
    /// [`EventBus::publish`]. Taking twice without publishing in between
    /// yields a fresh default instance for the second call.
    #[must_use]
    pub fn get<E: Event>(&self) -> E {
        let mut slot = self.slots.entry(TypeId::of::<E>()).or_default();
        slot.pool
            .take()
            .and_then(|boxed| boxed.downcast::<E>().map(|e| *e).ok())
            .unwrap_or_default()
    }

    /// Delivers `event` to every current subscriber of `E`, in subscription
    /// order, then resets it and returns it to the pool.
    ///
    /// The subscriber list is snapshotted before dispatch, and each entry is
    /// re-resolved just before its delivery: a listener that unsubscribed
    /// itself (or was unsubscribed by an earlier listener) mid-dispatch is
    /// skipped, and subscribers added mid-dispatch wait for the next
    /// publish. A callback error is reported and does not stop delivery to
    /// the remaining subscribers.
    pub async fn publish<E: Event>(&self, mut event: E) {
        let type_id = TypeId::of::<E>();

        // Snapshot order only; guards must not be held across awaits.
        let order: Vec<ListenerId> = self.slots.get(&type_id).map_or_else(Vec::new, |slot| {
            slot.subscribers
                .iter()
                .map(|sub| sub.listener.clone())
                .collect()
        });

        for listener in order {
            let callback = self.slots.get(&type_id).and_then(|slot| {
                slot.subscribers
                    .iter()
                    .find(|sub| sub.listener == listener)
                    .map(|sub| Arc::clone(&sub.callback))
            });

            let Some(callback) = callback else {
                trace!(%listener, event = type_name::<E>(), "unsubscribed mid-dispatch; skipped");
                continue;
            };

            if let Err(error) = callback(&event).await {
                warn!(%listener, event = type_name::<E>(), %error, "event listener failed");
            }
        }

        event.reset();
        self.slots.entry(type_id).or_default().pool = Some(Box::new(event));
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.slots.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
