//! bigip-vs: idempotent reconciler for BIG-IP LTM virtual servers.
//!
//! Reads the declared state of a virtual server, compares it with what the
//! device reports and applies only the attributes that differ. Applying
//! the same declaration twice changes nothing the second time.

pub mod clients;
pub mod config;
pub mod diff;
pub mod error;
pub mod model;
pub mod reconciler;
pub mod validation;

pub use clients::{BigIpClient, DeviceApi};
pub use config::{ConnectionArgs, ConnectionConfig};
pub use diff::Changes;
pub use error::{Error, ErrorKind, Result, ValidationError};
pub use model::{DesiredState, FullName, ObservedState, State};
pub use reconciler::{Action, OperationResult, Outcome, Reconciler, VirtualServerReconciler};
pub use validation::{parse_tasks, validate, VirtualServerParams};
