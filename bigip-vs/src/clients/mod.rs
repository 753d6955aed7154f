//! Device API clients.
//!
//! - bigip: iControl REST client for a BIG-IP management interface
//! - memory: in-memory device used by unit tests

pub mod bigip;
#[cfg(test)]
pub mod memory;

pub use bigip::BigIpClient;

use async_trait::async_trait;

use crate::diff::Changes;
use crate::error::Result;
use crate::model::{FullName, ObservedState};

/// Operations the reconciler needs from a device.
///
/// Each call is one request against the device and either applies fully or
/// not at all.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Read the current state. `Ok(None)` when the resource does not exist.
    async fn fetch(&self, name: &FullName) -> Result<Option<ObservedState>>;

    /// Create the resource with the given attributes.
    async fn create(&self, name: &FullName, changes: &Changes) -> Result<()>;

    /// Apply the given attributes to an existing resource.
    async fn update(&self, name: &FullName, changes: &Changes) -> Result<()>;

    /// Delete the resource. Fails with `NotFound` if it does not exist.
    async fn delete(&self, name: &FullName) -> Result<()>;
}

#[async_trait]
impl<T: DeviceApi + ?Sized> DeviceApi for &T {
    async fn fetch(&self, name: &FullName) -> Result<Option<ObservedState>> {
        (**self).fetch(name).await
    }

    async fn create(&self, name: &FullName, changes: &Changes) -> Result<()> {
        (**self).create(name, changes).await
    }

    async fn update(&self, name: &FullName, changes: &Changes) -> Result<()> {
        (**self).update(name, changes).await
    }

    async fn delete(&self, name: &FullName) -> Result<()> {
        (**self).delete(name).await
    }
}
