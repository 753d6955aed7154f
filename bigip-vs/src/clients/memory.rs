//! In-memory device for reconciler tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::DeviceApi;
use crate::diff::Changes;
use crate::error::{Error, Result};
use crate::model::{FullName, ObservedState, Profile, ProfileContext};

/// Profile the device attaches to a virtual server created without any.
pub const DEFAULT_PROFILE: &str = "/Common/tcp";

/// Device holding virtual servers in a map.
#[derive(Default)]
pub struct MemoryDevice {
    resources: Mutex<HashMap<FullName, ObservedState>>,
    writes: AtomicUsize,
    delay: Option<Duration>,
    reject_writes: bool,
    ignore_deletes: bool,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject every write with a device error.
    pub fn rejecting_writes(mut self) -> Self {
        self.reject_writes = true;
        self
    }

    /// Accept deletes without removing anything.
    pub fn ignoring_deletes(mut self) -> Self {
        self.ignore_deletes = true;
        self
    }

    /// Number of create/update/delete calls that reached the device.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn get(&self, name: &FullName) -> Option<ObservedState> {
        self.resources.lock().unwrap().get(name).cloned()
    }

    async fn enter(&self, write: bool) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if write {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.reject_writes {
                return Err(Error::Device {
                    status: 400,
                    message: "01070734:3: Configuration error".into(),
                });
            }
        }
        Ok(())
    }
}

fn apply(have: &mut ObservedState, changes: &Changes) {
    if let Some(description) = &changes.description {
        have.description = Some(description.clone()).filter(|d| !d.is_empty());
    }
    if let Some(destination) = &changes.destination {
        have.destination = Some(destination.clone());
    }
    if let Some(profiles) = &changes.profiles {
        have.profiles = profiles.clone();
    }
    if let Some(snat) = &changes.snat {
        have.snat = snat.clone();
    }
    if let Some(vlans) = &changes.enabled_vlans {
        have.enabled_vlans = vlans.clone();
    }
    if let Some(policies) = &changes.policies {
        have.policies = policies.clone();
    }
    if let Some(pool) = &changes.pool {
        have.pool = Some(pool.clone()).filter(|p| !p.is_empty());
    }
    if let Some(irules) = &changes.irules {
        have.irules = irules.clone();
    }
    if let Some(enabled) = changes.enabled {
        have.enabled = enabled;
    }
}

#[async_trait]
impl DeviceApi for MemoryDevice {
    async fn fetch(&self, name: &FullName) -> Result<Option<ObservedState>> {
        self.enter(false).await?;
        Ok(self.get(name))
    }

    async fn create(&self, name: &FullName, changes: &Changes) -> Result<()> {
        self.enter(true).await?;
        let mut resources = self.resources.lock().unwrap();
        if resources.contains_key(name) {
            return Err(Error::Device {
                status: 409,
                message: format!("The requested Virtual Server ({}) already exists", name),
            });
        }
        let mut state = ObservedState::empty(name);
        apply(&mut state, changes);
        if state.profiles.is_empty() {
            state
                .profiles
                .push(Profile::new(DEFAULT_PROFILE, ProfileContext::All));
        }
        resources.insert(name.clone(), state);
        Ok(())
    }

    async fn update(&self, name: &FullName, changes: &Changes) -> Result<()> {
        self.enter(true).await?;
        let mut resources = self.resources.lock().unwrap();
        let state = resources
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        apply(state, changes);
        Ok(())
    }

    async fn delete(&self, name: &FullName) -> Result<()> {
        self.enter(true).await?;
        if self.ignore_deletes {
            return Ok(());
        }
        self.resources
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }
}
