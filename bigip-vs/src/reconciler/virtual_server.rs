//! Virtual server reconciler.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{Action, OperationResult, Outcome, Reconciler};
use crate::clients::DeviceApi;
use crate::config::DEFAULT_TIMEOUT;
use crate::diff::{self, Changes};
use crate::error::{Error, Result};
use crate::model::{DesiredState, FullName};

/// Converges one virtual server per call against a [`DeviceApi`].
///
/// Every device call is bounded by `timeout`. In check mode the reconciler
/// reads from the device and reports what it would do, but never writes.
pub struct VirtualServerReconciler<D> {
    device: D,
    timeout: Duration,
    check_mode: bool,
}

impl<D: DeviceApi> VirtualServerReconciler<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            timeout: DEFAULT_TIMEOUT,
            check_mode: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Reconcile and fold any error into the result.
    pub async fn apply(&self, desired: &DesiredState) -> OperationResult {
        let name = desired.full_name();
        match self.reconcile(desired).await {
            Ok(outcome) => {
                if outcome.changed() {
                    info!("Virtual server {} converged ({:?})", name, outcome.action);
                }
                OperationResult::success(&name, outcome)
            }
            Err(e) => {
                warn!("Reconciling virtual server {} failed: {}", name, e);
                OperationResult::failure(&name, &e)
            }
        }
    }

    async fn call<T, F>(&self, op: &'static str, name: &FullName, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Device {} of {} timed out after {:?}", op, name, self.timeout);
                Err(Error::Timeout(self.timeout))
            }
        }
    }

    async fn present(&self, want: &DesiredState) -> Result<Outcome> {
        let name = want.full_name();
        let observed = self.call("fetch", &name, self.device.fetch(&name)).await?;

        let Some(have) = observed else {
            let changes = diff::for_create(want)?;
            if self.check_mode {
                info!("Check mode: would create virtual server {}", name);
            } else {
                self.call("create", &name, self.device.create(&name, &changes))
                    .await?;
            }
            return Ok(Outcome::new(Action::Create, changes));
        };

        if want.all_profiles.is_some() && want.profiles.is_none() {
            debug!("all_profiles only applies at creation, ignoring for {}", name);
        }

        let changes = diff::for_update(want, &have)?;
        if changes.is_empty() {
            debug!("Virtual server {} is up to date", name);
            return Ok(Outcome::unchanged());
        }

        if self.check_mode {
            info!(
                "Check mode: would update virtual server {}: {}",
                name,
                changes.attributes().join(", ")
            );
        } else {
            match self
                .call("update", &name, self.device.update(&name, &changes))
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!("Virtual server {} disappeared before update", name);
                    return Ok(Outcome::unchanged());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Outcome::new(Action::Update, changes))
    }

    async fn absent(&self, name: &FullName) -> Result<Outcome> {
        let observed = self.call("fetch", name, self.device.fetch(name)).await?;
        if observed.is_none() {
            debug!("Virtual server {} already absent", name);
            return Ok(Outcome::unchanged());
        }

        if self.check_mode {
            info!("Check mode: would delete virtual server {}", name);
            return Ok(Outcome::new(Action::Delete, Changes::default()));
        }

        match self.call("delete", name, self.device.delete(name)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("Virtual server {} was removed concurrently", name);
                return Ok(Outcome::unchanged());
            }
            Err(e) => return Err(e),
        }

        if self
            .call("fetch", name, self.device.fetch(name))
            .await?
            .is_some()
        {
            return Err(Error::Device {
                status: 0,
                message: format!("failed to delete the resource {}", name),
            });
        }
        Ok(Outcome::new(Action::Delete, Changes::default()))
    }
}

#[async_trait]
impl<D: DeviceApi> Reconciler for VirtualServerReconciler<D> {
    type Spec = DesiredState;
    type Status = Outcome;

    async fn reconcile(&self, spec: &Self::Spec) -> Result<Self::Status> {
        debug!("Reconciling virtual server {} ({:?})", spec.full_name(), spec.state);
        if spec.state.wants_resource() {
            self.present(spec).await
        } else {
            self.absent(&spec.full_name()).await
        }
    }

    async fn finalize(&self, name: &FullName) -> Result<Self::Status> {
        self.absent(name).await
    }
}
