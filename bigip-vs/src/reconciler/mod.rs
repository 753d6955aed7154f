//! Reconcilers for device resources.
//!
//! A reconciler compares desired state with what the device reports and
//! applies the minimal change to converge.

pub mod virtual_server;

pub use virtual_server::VirtualServerReconciler;

use async_trait::async_trait;
use serde::Serialize;

use crate::diff::Changes;
use crate::error::{Error, ErrorKind, Result};
use crate::model::FullName;

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Desired state type.
    type Spec: Sync;
    /// Result of a successful reconcile.
    type Status: Send;

    /// Compare desired vs actual state and take action.
    async fn reconcile(&self, spec: &Self::Spec) -> Result<Self::Status>;

    /// Ensure the resource is gone.
    async fn finalize(&self, name: &FullName) -> Result<Self::Status>;
}

/// What a reconcile did to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    None,
    Create,
    Update,
    Delete,
}

/// Successful reconcile result.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub action: Action,
    /// Attributes applied (or, in check mode, that would be applied).
    pub changes: Changes,
}

impl Outcome {
    pub fn new(action: Action, changes: Changes) -> Self {
        Self { action, changes }
    }

    pub fn unchanged() -> Self {
        Self::new(Action::None, Changes::default())
    }

    pub fn changed(&self) -> bool {
        self.action != Action::None
    }
}

/// Report of one reconcile, printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub name: String,
    pub changed: bool,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Changes::is_empty")]
    pub changes: Changes,
}

impl OperationResult {
    pub fn success(name: &FullName, outcome: Outcome) -> Self {
        Self {
            name: name.to_string(),
            changed: outcome.changed(),
            failed: false,
            action: Some(outcome.action),
            error: None,
            msg: None,
            changes: outcome.changes,
        }
    }

    pub fn failure(name: impl ToString, error: &Error) -> Self {
        Self {
            name: name.to_string(),
            changed: false,
            failed: true,
            action: None,
            error: Some(error.kind()),
            msg: Some(error.to_string()),
            changes: Changes::default(),
        }
    }
}
