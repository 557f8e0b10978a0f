//! Guarded remote calls
//!
//! Every outbound call to the provisioning endpoint goes through
//! [`RemoteCallGuard::execute`], which enforces an overall time budget,
//! retries transport faults with a fixed backoff and turns whatever is left
//! into a typed [`RemoteCallError`].

use crate::error::RemoteCallError;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Fixed sleep between two attempts of a retried call
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Budget that disables the outer deadline
pub const NO_TIMEOUT: CallBudget = CallBudget::Unbounded;

/// Overall time allowed for one guarded call, retries included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallBudget {
    Limited(Duration),
    Unbounded,
}

impl From<Duration> for CallBudget {
    fn from(duration: Duration) -> Self {
        CallBudget::Limited(duration)
    }
}

impl From<Option<Duration>> for CallBudget {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(CallBudget::Unbounded, CallBudget::Limited)
    }
}

/// What to do when an attempt fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry transport faults until the budget runs out
    Retry,
    /// Give up on the first failure
    Abort,
}

/// Classified failure of a single attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    ConnectionRefused(String),
    HostUnreachable(String),
    Tls(String),
    ConnectionReset(String),
    BrokenPipe(String),
    EmptyResponse,
    /// Any other transport-level fault (timeouts on the socket, 5xx from a proxy...)
    Transport(String),
    /// The endpoint answered, but not with something we can use
    Rejected(String),
}

impl CallFailure {
    /// Transport faults are worth retrying; a rejected call is not
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CallFailure::Rejected(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            CallFailure::ConnectionRefused(_) => "connection refused",
            CallFailure::HostUnreachable(_) => "host unreachable",
            CallFailure::Tls(_) => "tls error",
            CallFailure::ConnectionReset(_) => "connection reset",
            CallFailure::BrokenPipe(_) => "broken pipe",
            CallFailure::EmptyResponse => "empty response",
            CallFailure::Transport(_) => "transport error",
            CallFailure::Rejected(_) => "rejected",
        }
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallFailure::EmptyResponse => f.write_str(self.kind()),
            CallFailure::ConnectionRefused(detail)
            | CallFailure::HostUnreachable(detail)
            | CallFailure::Tls(detail)
            | CallFailure::ConnectionReset(detail)
            | CallFailure::BrokenPipe(detail)
            | CallFailure::Transport(detail)
            | CallFailure::Rejected(detail) => write!(f, "{}: {}", self.kind(), detail),
        }
    }
}

/// Wraps calls to one endpoint with timeout, retry and cancellation
#[derive(Debug, Clone)]
pub struct RemoteCallGuard {
    endpoint: String,
    backoff: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl RemoteCallGuard {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            backoff: DEFAULT_BACKOFF,
            shutdown: None,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Abort in-flight calls once `true` is sent on the channel
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn shutdown(&self) -> Option<watch::Receiver<bool>> {
        self.shutdown.clone()
    }

    /// Run `call` under the given budget and retry policy.
    ///
    /// `call` is invoked once per attempt. Its arguments are never logged
    /// here; callers mask credentials before tracing them.
    pub async fn execute<T, F, Fut>(
        &self,
        budget: impl Into<CallBudget>,
        policy: RetryPolicy,
        label: &str,
        mut call: F,
    ) -> Result<T, RemoteCallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallFailure>>,
    {
        let budget = budget.into();
        let attempts = self.attempts(policy, label, &mut call);

        let bounded = async {
            match budget {
                CallBudget::Limited(limit) => match tokio::time::timeout(limit, attempts).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(label, endpoint = %self.endpoint, "Call timed out after {:?}", limit);
                        Err(RemoteCallError::Timeout {
                            label: label.to_string(),
                            endpoint: self.endpoint.clone(),
                            budget: limit,
                        })
                    }
                },
                CallBudget::Unbounded => attempts.await,
            }
        };

        match self.shutdown.clone() {
            Some(shutdown) => {
                tokio::select! {
                    result = bounded => result,
                    _ = cancelled(shutdown) => {
                        warn!(label, endpoint = %self.endpoint, "Call cancelled");
                        Err(RemoteCallError::Cancelled {
                            label: label.to_string(),
                            endpoint: self.endpoint.clone(),
                        })
                    }
                }
            }
            None => bounded.await,
        }
    }

    async fn attempts<T, F, Fut>(
        &self,
        policy: RetryPolicy,
        label: &str,
        call: &mut F,
    ) -> Result<T, RemoteCallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallFailure>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let failure = match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, endpoint = %self.endpoint, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            warn!(
                label,
                endpoint = %self.endpoint,
                attempt,
                retryable = failure.is_retryable(),
                "Remote call failed: {}",
                failure
            );

            match policy {
                RetryPolicy::Abort => {
                    return Err(RemoteCallError::NodeUnreachable {
                        label: label.to_string(),
                        endpoint: self.endpoint.clone(),
                        cause: failure.to_string(),
                    });
                }
                RetryPolicy::Retry if failure.is_retryable() => {
                    tokio::time::sleep(self.backoff).await;
                }
                RetryPolicy::Retry => {
                    return Err(RemoteCallError::TransportFailure {
                        label: label.to_string(),
                        endpoint: self.endpoint.clone(),
                        cause: failure.to_string(),
                    });
                }
            }
        }
    }
}

/// Resolves once the shutdown flag is raised. A dropped sender never cancels.
pub(crate) async fn cancelled(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
