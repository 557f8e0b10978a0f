//! nodeplane provisioning client
//!
//! Drives the remote provisioning endpoint that creates, inspects and
//! destroys compute instances and attaches block storage to them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │               cluster coordinator                │
//! └─────────────────┬───────────────────────────────┘
//!                   │ spawn(count, credentials, roles, disks)
//! ┌─────────────────▼───────────────────────────────┐
//! │              InstanceProvisioner                 │
//! │        create → poll describe → records          │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │              ProvisioningClient                  │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │ RemoteCallGuard (budget, retry, cancel)  │   │
//! │  └──────────────────────────────────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │ trait ProvisioningTransport
//! ┌─────────────────▼───────────────────────────────┐
//! │     HttpsTransport → endpoint :17444             │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod credentials;
pub mod error;
pub mod guard;
pub mod provisioner;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use client::{InstanceIds, ProvisioningClient};
pub use credentials::{Credentials, DEFAULT_CLOUD, ProvisionRequest, mask};
pub use error::{CloudError, RemoteCallError, Result};
pub use guard::{CallBudget, CallFailure, DEFAULT_BACKOFF, NO_TIMEOUT, RemoteCallGuard, RetryPolicy};
pub use provisioner::{DEFAULT_POLL_INTERVAL, InstanceProvisioner, InstanceRecord, RoleAssignment};
pub use state::{ProvisionState, ReservationHandle, ReservationStatus, VmInfo};
pub use transport::{HttpsTransport, ProvisioningTransport, SERVER_PORT};
