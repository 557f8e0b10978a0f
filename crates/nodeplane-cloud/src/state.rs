//! Reservation state as reported by the provisioning endpoint

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle returned by a create-instances call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationHandle(String);

impl ReservationHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReservationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionState {
    /// Instances are still being created
    Pending,
    /// Instances are up and addressable
    Running,
    /// Provisioning gave up
    Failed,
}

impl ProvisionState {
    /// Running and Failed end the poll loop
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProvisionState::Pending)
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionState::Pending => write!(f, "pending"),
            ProvisionState::Running => write!(f, "running"),
            ProvisionState::Failed => write!(f, "failed"),
        }
    }
}

/// Addresses of the instances in a running reservation, index-aligned
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInfo {
    #[serde(default)]
    pub public_ips: Vec<String>,

    #[serde(default)]
    pub private_ips: Vec<String>,

    #[serde(default)]
    pub instance_ids: Vec<String>,
}

impl VmInfo {
    /// Number of instances, if all three lists agree and are non-empty
    pub fn consistent_len(&self) -> Option<usize> {
        let len = self.public_ips.len();
        if len == 0 || self.private_ips.len() != len || self.instance_ids.len() != len {
            return None;
        }
        Some(len)
    }
}

/// One describe-instances answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationStatus {
    pub state: ProvisionState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_info: Option<VmInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_running_status() {
        let status: ReservationStatus = serde_json::from_value(json!({
            "state": "running",
            "vm_info": {
                "public_ips": ["1.1.1.1", "1.1.1.2"],
                "private_ips": ["10.0.0.1", "10.0.0.2"],
                "instance_ids": ["i-1", "i-2"]
            }
        }))
        .unwrap();

        assert_eq!(status.state, ProvisionState::Running);
        assert_eq!(status.vm_info.unwrap().consistent_len(), Some(2));
    }

    #[test]
    fn test_parse_failed_status() {
        let status: ReservationStatus =
            serde_json::from_value(json!({ "state": "failed", "reason": "quota exceeded" }))
                .unwrap();

        assert!(status.state.is_terminal());
        assert_eq!(status.reason.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_mismatched_vm_info() {
        let info = VmInfo {
            public_ips: vec!["1.1.1.1".into()],
            private_ips: vec![],
            instance_ids: vec!["i-1".into()],
        };
        assert_eq!(info.consistent_len(), None);
        assert_eq!(VmInfo::default().consistent_len(), None);
    }
}
