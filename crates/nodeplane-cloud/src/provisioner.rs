//! Spawn instances and wait until they are addressable

use crate::client::ProvisioningClient;
use crate::credentials::{Credentials, DEFAULT_CLOUD, ProvisionRequest};
use crate::error::{CloudError, RemoteCallError, Result};
use crate::guard::cancelled;
use crate::state::{ProvisionState, ReservationHandle, VmInfo};
use crate::transport::ProvisioningTransport;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delay between two describe polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Roles for the spawned instances: one for all, or one per instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleAssignment {
    Broadcast(String),
    PerInstance(Vec<String>),
}

impl From<&str> for RoleAssignment {
    fn from(role: &str) -> Self {
        RoleAssignment::Broadcast(role.to_string())
    }
}

impl From<String> for RoleAssignment {
    fn from(role: String) -> Self {
        RoleAssignment::Broadcast(role)
    }
}

impl From<Vec<String>> for RoleAssignment {
    fn from(roles: Vec<String>) -> Self {
        RoleAssignment::PerInstance(roles)
    }
}

/// A ready, addressable instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub public_ip: String,
    pub private_ip: String,
    pub instance_id: String,
    pub role: String,
    pub disk: Option<String>,
}

/// Turns "create N instances" into a list of [`InstanceRecord`]s
pub struct InstanceProvisioner<T> {
    client: ProvisioningClient<T>,
    poll_interval: Duration,
}

impl<T: ProvisioningTransport> InstanceProvisioner<T> {
    pub fn new(client: ProvisioningClient<T>) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn client(&self) -> &ProvisioningClient<T> {
        &self.client
    }

    /// Spawn `count` instances and wait until they are running.
    ///
    /// `disks` is matched to the returned instances by position, as is
    /// `roles` when it is a list. A failed reservation is reported as
    /// [`CloudError::ProvisioningFailed`] and never retried here.
    pub async fn spawn(
        &self,
        count: usize,
        credentials: &Credentials,
        roles: impl Into<RoleAssignment>,
        disks: &[Option<String>],
    ) -> Result<Vec<InstanceRecord>> {
        let request = ProvisionRequest::from_credentials(credentials)
            .with_instance_count(count)
            .with_cloud(DEFAULT_CLOUD)
            .with_zone(credentials.get("zone"))
            .with_region(credentials.get("region"));

        let handle = self.client.create_instances(&request).await?;
        info!(reservation = %handle, count, "Reservation created, waiting for instances");

        let vm_info = self.wait_until_running(&handle).await?;
        let records = self.build_records(vm_info, roles.into(), disks)?;

        if records.len() != count {
            warn!(
                reservation = %handle,
                requested = count,
                received = records.len(),
                "Endpoint returned a different number of instances than requested"
            );
        }
        info!(reservation = %handle, instances = records.len(), "Instances are running");

        Ok(records)
    }

    async fn wait_until_running(&self, handle: &ReservationHandle) -> Result<VmInfo> {
        loop {
            let status = self.client.describe_instances(handle).await?;
            debug!(reservation = %handle, state = %status.state, "Describe instances");

            match status.state {
                ProvisionState::Running => {
                    return status.vm_info.ok_or_else(|| {
                        self.client
                            .invalid(format!("reservation {} is running without addresses", handle))
                    });
                }
                ProvisionState::Failed => {
                    let reason = status.reason.unwrap_or_else(|| "no reason given".to_string());
                    warn!(reservation = %handle, "Provisioning failed: {}", reason);
                    return Err(CloudError::ProvisioningFailed {
                        endpoint: self.client.endpoint().to_string(),
                        reason,
                    });
                }
                ProvisionState::Pending => {}
            }

            self.pause().await?;
        }
    }

    /// Sleep one poll interval, or stop early on shutdown
    async fn pause(&self) -> Result<()> {
        let Some(shutdown) = self.client.guard().shutdown() else {
            tokio::time::sleep(self.poll_interval).await;
            return Ok(());
        };

        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => Ok(()),
            _ = cancelled(shutdown) => Err(RemoteCallError::Cancelled {
                label: "spawn".to_string(),
                endpoint: self.client.endpoint().to_string(),
            }
            .into()),
        }
    }

    fn build_records(
        &self,
        vm_info: VmInfo,
        roles: RoleAssignment,
        disks: &[Option<String>],
    ) -> Result<Vec<InstanceRecord>> {
        let count = vm_info.consistent_len().ok_or_else(|| {
            self.client.invalid(format!(
                "address lists are empty or differ in length ({} public, {} private, {} ids)",
                vm_info.public_ips.len(),
                vm_info.private_ips.len(),
                vm_info.instance_ids.len()
            ))
        })?;

        let roles = match roles {
            RoleAssignment::Broadcast(role) => vec![role; count],
            RoleAssignment::PerInstance(roles) if roles.len() == count => roles,
            RoleAssignment::PerInstance(roles) => {
                return Err(self.client.invalid(format!(
                    "{} roles given for {} instances",
                    roles.len(),
                    count
                )));
            }
        };

        if disks.len() != count {
            return Err(self.client.invalid(format!(
                "{} disks given for {} instances",
                disks.len(),
                count
            )));
        }

        let records = vm_info
            .public_ips
            .into_iter()
            .zip(vm_info.private_ips)
            .zip(vm_info.instance_ids)
            .zip(roles)
            .zip(disks.iter().cloned())
            .map(
                |((((public_ip, private_ip), instance_id), role), disk)| InstanceRecord {
                    public_ip,
                    private_ip,
                    instance_id,
                    role,
                    disk,
                },
            )
            .collect();

        Ok(records)
    }
}
