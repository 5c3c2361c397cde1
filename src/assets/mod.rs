//! Externally-loaded resources and their per-activation lifecycle.
//!
//! [`AssetProvider`] is the narrow interface to the host's resource system;
//! [`ResourceScope`] ties everything acquired through it to one phase
//! activation and releases it exactly once.

mod provider;
mod scope;

pub use provider::{AssetHandle, AssetProvider, InstanceId};
pub use scope::ResourceScope;
