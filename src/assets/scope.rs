//! Per-activation resource tracking.

use std::sync::Arc;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::ResourceError;
use crate::phase::PhaseId;

use super::provider::{AssetHandle, AssetProvider, InstanceId};

#[derive(Default)]
struct ScopeInner {
    handles: Vec<AssetHandle>,
    instances: Vec<InstanceId>,
    disposed: bool,
}

/// The set of resources and instances owned by one phase activation.
///
/// Everything acquired through the scope is registered before it is exposed
/// to the caller, so a caller cancelled between acquisition and use cannot
/// leak the resource. [`ResourceScope::dispose`] releases instances first
/// (reverse attach order), then handles, and is idempotent; the state
/// machine calls it unconditionally when the owning activation ends,
/// including when `enter` failed after partially populating the scope.
pub struct ResourceScope {
    provider: Arc<dyn AssetProvider>,
    owner: PhaseId,
    // std Mutex: held only to mutate the sets, never across an await.
    inner: Mutex<ScopeInner>,
}

impl ResourceScope {
    /// Creates an empty scope owned by the given phase activation.
    #[must_use]
    pub fn new(provider: Arc<dyn AssetProvider>, owner: PhaseId) -> Self {
        Self {
            provider,
            owner,
            inner: Mutex::new(ScopeInner::default()),
        }
    }

    /// The phase this scope belongs to.
    #[must_use]
    pub const fn owner(&self) -> PhaseId {
        self.owner
    }

    /// Resolves a named resource and registers the handle into the scope.
    ///
    /// Registration happens before the handle is returned. If the scope was
    /// disposed while the load was in flight, the fresh handle is released
    /// immediately and the call fails.
    ///
    /// # Errors
    ///
    /// [`ResourceError::ScopeDisposed`] when called on a disposed scope;
    /// otherwise whatever the provider reports.
    pub async fn acquire(&self, key: &str) -> Result<AssetHandle, ResourceError> {
        if self.is_disposed() {
            return Err(ResourceError::ScopeDisposed);
        }

        let handle = self.provider.load(key).await?;

        let raced_disposal = {
            let mut inner = self.inner.lock().expect("scope lock poisoned");
            if inner.disposed {
                true
            } else {
                inner.handles.push(handle.clone());
                false
            }
        };

        if raced_disposal {
            if let Err(error) = self.provider.unload(&handle).await {
                warn!(phase = %self.owner, %handle, %error, "failed to release handle loaded into a disposed scope");
            }
            return Err(ResourceError::ScopeDisposed);
        }

        debug!(phase = %self.owner, %handle, "resource acquired");
        Ok(handle)
    }

    /// Registers a derived, externally-constructed instance for teardown.
    ///
    /// # Errors
    ///
    /// [`ResourceError::ScopeDisposed`] when called on a disposed scope.
    pub fn attach_instance(&self, instance: InstanceId) -> Result<(), ResourceError> {
        let mut inner = self.inner.lock().expect("scope lock poisoned");
        if inner.disposed {
            return Err(ResourceError::ScopeDisposed);
        }
        inner.instances.push(instance);
        Ok(())
    }

    /// Acquires a resource and builds one instance from it, tracking both.
    ///
    /// This is the path the built-in phases use for their panels.
    ///
    /// # Errors
    ///
    /// Propagates provider load and instantiate failures; the handle stays
    /// tracked even when instantiation fails.
    pub async fn acquire_and_instantiate(
        &self,
        key: &str,
    ) -> Result<(AssetHandle, InstanceId), ResourceError> {
        let handle = self.acquire(key).await?;
        let instance = self.provider.instantiate(&handle).await?;
        self.attach_instance(instance)?;
        Ok((handle, instance))
    }

    /// Releases every tracked instance (reverse attach order), then every
    /// tracked handle, then clears both sets.
    ///
    /// Idempotent: a second call is a no-op. Safe on a partially-populated
    /// scope. Provider release failures are reported and do not stop the
    /// sweep.
    pub async fn dispose(&self) {
        let (handles, instances) = {
            let mut inner = self.inner.lock().expect("scope lock poisoned");
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            (
                std::mem::take(&mut inner.handles),
                std::mem::take(&mut inner.instances),
            )
        };

        debug!(
            phase = %self.owner,
            instances = instances.len(),
            handles = handles.len(),
            "disposing resource scope"
        );

        for instance in instances.into_iter().rev() {
            if let Err(error) = self.provider.destroy_instance(instance).await {
                warn!(phase = %self.owner, %instance, %error, "instance teardown failed");
            }
        }
        for handle in handles.into_iter().rev() {
            if let Err(error) = self.provider.unload(&handle).await {
                warn!(phase = %self.owner, %handle, %error, "resource release failed");
            }
        }
    }

    /// Whether the scope has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.lock().expect("scope lock poisoned").disposed
    }

    /// Number of currently tracked handles.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.inner.lock().expect("scope lock poisoned").handles.len()
    }

    /// Number of currently tracked instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.inner.lock().expect("scope lock poisoned").instances.len()
    }
}

impl std::fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().expect("scope lock poisoned");
        f.debug_struct("ResourceScope")
            .field("owner", &self.owner)
            .field("handles", &inner.handles.len())
            .field("instances", &inner.instances.len())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Provider that counts loads/unloads and records teardown order.
    #[derive(Default)]
    struct CountingProvider {
        next_id: AtomicU64,
        loads: AtomicU64,
        unloads: AtomicU64,
        instantiated: AtomicU64,
        destroyed: AtomicU64,
        teardown_order: Mutex<Vec<InstanceId>>,
        fail_key: Option<String>,
    }

    impl CountingProvider {
        fn failing_on(key: &str) -> Self {
            Self {
                fail_key: Some(key.to_string()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl AssetProvider for CountingProvider {
        async fn load(&self, key: &str) -> Result<AssetHandle, ResourceError> {
            if self.fail_key.as_deref() == Some(key) {
                return Err(ResourceError::Load {
                    key: key.to_string(),
                    message: "synthetic failure".to_string(),
                });
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(AssetHandle::new(
                key,
                self.next_id.fetch_add(1, Ordering::SeqCst),
            ))
        }

        async fn instantiate(&self, handle: &AssetHandle) -> Result<InstanceId, ResourceError> {
            let _ = handle;
            self.instantiated.fetch_add(1, Ordering::SeqCst);
            Ok(InstanceId(self.next_id.fetch_add(1, Ordering::SeqCst)))
        }

        async fn destroy_instance(&self, instance: InstanceId) -> Result<(), ResourceError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            self.teardown_order.lock().unwrap().push(instance);
            Ok(())
        }

        async fn unload(&self, _handle: &AssetHandle) -> Result<(), ResourceError> {
            self.unloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    const OWNER: PhaseId = PhaseId("test");

    #[tokio::test]
    async fn acquire_registers_before_returning() {
        let provider = Arc::new(CountingProvider::default());
        let scope = ResourceScope::new(provider, OWNER);

        let handle = scope.acquire("panel").await.unwrap();
        assert_eq!(handle.key(), "panel");
        assert_eq!(scope.handle_count(), 1);
    }

    #[tokio::test]
    async fn dispose_releases_everything_exactly_once() {
        let provider = Arc::new(CountingProvider::default());
        let scope = ResourceScope::new(Arc::clone(&provider) as Arc<dyn AssetProvider>, OWNER);

        scope.acquire_and_instantiate("panel").await.unwrap();
        scope.acquire("backdrop").await.unwrap();

        scope.dispose().await;
        scope.dispose().await; // idempotent

        assert_eq!(provider.loads.load(Ordering::SeqCst), 2);
        assert_eq!(provider.unloads.load(Ordering::SeqCst), 2);
        assert_eq!(provider.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(scope.handle_count(), 0);
        assert_eq!(scope.instance_count(), 0);
        assert!(scope.is_disposed());
    }

    #[tokio::test]
    async fn instances_torn_down_in_reverse_attach_order() {
        let provider = Arc::new(CountingProvider::default());
        let scope = ResourceScope::new(Arc::clone(&provider) as Arc<dyn AssetProvider>, OWNER);

        scope.attach_instance(InstanceId(1)).unwrap();
        scope.attach_instance(InstanceId(2)).unwrap();
        scope.attach_instance(InstanceId(3)).unwrap();
        scope.dispose().await;

        assert_eq!(
            *provider.teardown_order.lock().unwrap(),
            vec![InstanceId(3), InstanceId(2), InstanceId(1)]
        );
    }

    #[tokio::test]
    async fn acquire_after_dispose_fails() {
        let provider = Arc::new(CountingProvider::default());
        let scope = ResourceScope::new(provider, OWNER);

        scope.dispose().await;
        let err = scope.acquire("panel").await.unwrap_err();
        assert!(matches!(err, ResourceError::ScopeDisposed));
        assert!(matches!(
            scope.attach_instance(InstanceId(9)),
            Err(ResourceError::ScopeDisposed)
        ));
    }

    #[tokio::test]
    async fn load_failure_propagates_and_tracks_nothing() {
        let provider = Arc::new(CountingProvider::failing_on("broken"));
        let scope = ResourceScope::new(provider, OWNER);

        let err = scope.acquire("broken").await.unwrap_err();
        assert!(matches!(err, ResourceError::Load { .. }));
        assert_eq!(scope.handle_count(), 0);
    }

    #[tokio::test]
    async fn dispose_on_partially_populated_scope_is_safe() {
        let provider = Arc::new(CountingProvider::failing_on("broken"));
        let scope = ResourceScope::new(Arc::clone(&provider) as Arc<dyn AssetProvider>, OWNER);

        scope.acquire("ok").await.unwrap();
        assert!(scope.acquire("broken").await.is_err());

        scope.dispose().await;
        assert_eq!(provider.unloads.load(Ordering::SeqCst), 1);
    }
}
