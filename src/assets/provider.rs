//! The resource provider collaborator.
//!
//! The host application implements [`AssetProvider`] over whatever resource
//! system it uses (bundles, an addressable catalog, a pack file). The core
//! never constructs instances itself; it only asks the provider to and
//! tracks the results for teardown.

use async_trait::async_trait;

use crate::error::ResourceError;

/// Opaque reference to a loaded external resource.
///
/// Carries the key it was resolved from and a provider-assigned id so the
/// provider can find its own bookkeeping on release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetHandle {
    key: String,
    id: u64,
}

impl AssetHandle {
    /// Creates a handle. Called by provider implementations only.
    #[must_use]
    pub fn new(key: impl Into<String>, id: u64) -> Self {
        Self {
            key: key.into(),
            id,
        }
    }

    /// The key this handle was resolved from.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Provider-assigned id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.key, self.id)
    }
}

/// Opaque reference to a live object built from a loaded resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u64);

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

/// Asynchronous resource provider.
///
/// Errors from [`AssetProvider::load`] and [`AssetProvider::instantiate`]
/// propagate to the caller; errors from the release methods are reported by
/// the scope and do not stop its teardown sweep.
#[async_trait]
pub trait AssetProvider: Send + Sync {
    /// Resolves a named resource.
    async fn load(&self, key: &str) -> Result<AssetHandle, ResourceError>;

    /// Builds a live instance from a loaded resource.
    async fn instantiate(&self, handle: &AssetHandle) -> Result<InstanceId, ResourceError>;

    /// Tears down a live instance.
    async fn destroy_instance(&self, instance: InstanceId) -> Result<(), ResourceError>;

    /// Releases a loaded resource.
    async fn unload(&self, handle: &AssetHandle) -> Result<(), ResourceError>;
}
