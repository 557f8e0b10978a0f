//! Provisioning endpoint client

use crate::credentials::{Credentials, ProvisionRequest};
use crate::error::{CloudError, Result};
use crate::guard::{CallBudget, NO_TIMEOUT, RemoteCallGuard, RetryPolicy};
use crate::state::{ReservationHandle, ReservationStatus};
use crate::transport::ProvisioningTransport;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Instance ids accepted by [`ProvisioningClient::terminate_instances`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceIds {
    One(String),
    Many(Vec<String>),
}

impl InstanceIds {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            InstanceIds::One(id) => vec![id],
            InstanceIds::Many(ids) => ids,
        }
    }
}

impl From<&str> for InstanceIds {
    fn from(id: &str) -> Self {
        InstanceIds::One(id.to_string())
    }
}

impl From<String> for InstanceIds {
    fn from(id: String) -> Self {
        InstanceIds::One(id)
    }
}

impl From<Vec<String>> for InstanceIds {
    fn from(ids: Vec<String>) -> Self {
        InstanceIds::Many(ids)
    }
}

impl From<&[&str]> for InstanceIds {
    fn from(ids: &[&str]) -> Self {
        InstanceIds::Many(ids.iter().map(|id| id.to_string()).collect())
    }
}

/// Session bound to one provisioning endpoint and one shared secret
pub struct ProvisioningClient<T> {
    transport: T,
    secret: String,
    guard: RemoteCallGuard,
    budget: CallBudget,
}

impl<T: ProvisioningTransport> ProvisioningClient<T> {
    pub fn new(transport: T, secret: impl Into<String>) -> Self {
        let guard = RemoteCallGuard::new(transport.endpoint());
        Self {
            transport,
            secret: secret.into(),
            guard,
            budget: NO_TIMEOUT,
        }
    }

    /// Per-call budget; [`NO_TIMEOUT`] unless set
    pub fn with_budget(mut self, budget: impl Into<CallBudget>) -> Self {
        self.budget = budget.into();
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.guard = self.guard.with_backoff(backoff);
        self
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.guard = self.guard.with_shutdown(shutdown);
        self
    }

    pub fn endpoint(&self) -> &str {
        self.guard.endpoint()
    }

    pub(crate) fn guard(&self) -> &RemoteCallGuard {
        &self.guard
    }

    /// Provisioning parameters for `credentials`
    pub fn derive_parameters(credentials: &Credentials) -> ProvisionRequest {
        ProvisionRequest::from_credentials(credentials)
    }

    /// Start a reservation for the instances described by `request`
    pub async fn create_instances(&self, request: &ProvisionRequest) -> Result<ReservationHandle> {
        debug!("Calling run_instances with parameters {}", request.masked());

        let result = self
            .call("run_instances", RetryPolicy::Retry, vec![request.to_json()])
            .await?;
        debug!("run_instances returned {}", result);

        result
            .get("reservation_id")
            .and_then(Value::as_str)
            .map(ReservationHandle::new)
            .ok_or_else(|| self.invalid(format!("run_instances returned no reservation id: {}", result)))
    }

    /// Current state of a reservation. Safe to call any number of times.
    pub async fn describe_instances(&self, handle: &ReservationHandle) -> Result<ReservationStatus> {
        debug!(reservation = %handle, "Calling describe_instances");

        let result = self
            .call(
                "describe_instances",
                RetryPolicy::Retry,
                vec![json!({ "reservation_id": handle })],
            )
            .await?;

        serde_json::from_value(result.clone())
            .map_err(|e| self.invalid(format!("describe_instances returned {}: {}", result, e)))
    }

    /// Terminate one or more instances; retried until the budget runs out
    pub async fn terminate_instances(
        &self,
        credentials: &Credentials,
        instance_ids: impl Into<InstanceIds>,
    ) -> Result<Value> {
        let request = ProvisionRequest::from_credentials(credentials)
            .with_instance_ids(instance_ids.into().into_vec())
            .with_region(credentials.get("region"));
        info!(instances = ?request.instance_ids(), "Terminating instances");

        let result = self
            .call("terminate_instances", RetryPolicy::Retry, vec![request.to_json()])
            .await?;
        debug!("Terminate instances says [{}]", result);
        Ok(result)
    }

    /// Attach a persistent disk and return where it was mounted
    pub async fn attach_disk(
        &self,
        credentials: &Credentials,
        disk_name: &str,
        instance_id: &str,
    ) -> Result<String> {
        let request = ProvisionRequest::from_credentials(credentials)
            .with_zone(credentials.get("zone"))
            .with_region(credentials.get("region"));
        debug!(
            disk = disk_name,
            instance = instance_id,
            "Calling attach_disk with parameters {}",
            request.masked()
        );

        let result = self
            .call(
                "attach_disk",
                RetryPolicy::Retry,
                vec![request.to_json(), json!(disk_name), json!(instance_id)],
            )
            .await?;
        debug!("Attach disk returned {}", result);

        result
            .get("location")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| self.invalid(format!("attach_disk returned no location: {}", result)))
    }

    /// Queues currently in use on the endpoint
    pub async fn queues_in_use(&self) -> Result<Value> {
        self.call("get_queues_in_use", RetryPolicy::Retry, Vec::new())
            .await
    }

    /// One guarded call with the secret appended as the last parameter
    async fn call(&self, method: &str, policy: RetryPolicy, mut params: Vec<Value>) -> Result<Value> {
        params.push(Value::String(self.secret.clone()));

        let transport = &self.transport;
        let params = &params;
        let result = self
            .guard
            .execute(self.budget, policy, method, move || transport.invoke(method, params))
            .await?;

        self.check_logical_failure(result)
    }

    /// Endpoint-side failures come back as `{"success": false, "reason": ...}`
    fn check_logical_failure(&self, result: Value) -> Result<Value> {
        if result.get("success").and_then(Value::as_bool) == Some(false) {
            let reason = result
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("no reason given")
                .to_string();
            return Err(CloudError::ProvisioningFailed {
                endpoint: self.endpoint().to_string(),
                reason,
            });
        }
        Ok(result)
    }

    pub(crate) fn invalid(&self, message: impl Into<String>) -> CloudError {
        CloudError::InvalidProvisionResult {
            endpoint: self.endpoint().to_string(),
            message: message.into(),
        }
    }
}
