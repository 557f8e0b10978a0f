//! Credentials and the provisioning parameters derived from them

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;

/// Logical cloud name every spawn request is tagged with
pub const DEFAULT_CLOUD: &str = "cloud1";

/// Keys whose values must never reach a log line in clear text
const SENSITIVE_KEYS: &[&str] = &[
    "ec2_access_key",
    "ec2_secret_key",
    "EC2_ACCESS_KEY",
    "EC2_SECRET_KEY",
    "secret",
    "password",
];

/// Number of trailing characters left readable by [`mask`]
const VISIBLE_SUFFIX: usize = 4;

/// Replace all but the last four characters with `*`
pub fn mask(value: &str) -> String {
    let count = value.chars().count();
    if count <= VISIBLE_SUFFIX {
        return "*".repeat(count);
    }
    let hidden = count - VISIBLE_SUFFIX;
    value
        .chars()
        .enumerate()
        .map(|(i, c)| if i < hidden { '*' } else { c })
        .collect()
}

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.contains(&key)
}

/// Provider-specific options passed between agents
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Copy with sensitive values masked, safe to log
    pub fn masked(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| {
                let shown = if is_sensitive(k) { mask(v) } else { v.clone() };
                (k.clone(), shown)
            })
            .collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credentials").field(&self.masked()).finish()
    }
}

impl FromIterator<(String, String)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Cloud access keys, nested under `credentials` on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudKeys {
    #[serde(rename = "EC2_ACCESS_KEY", skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,

    #[serde(rename = "EC2_SECRET_KEY", skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,

    #[serde(rename = "EC2_URL", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Provider-agnostic parameter set for one provisioning call.
///
/// Built from [`Credentials`] with [`ProvisionRequest::from_credentials`]
/// and the `with_*` builders; the client only ever borrows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    credentials: CloudKeys,

    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    image_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    infrastructure: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    instance_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    keyname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    use_spot_instances: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    max_spot_price: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    num_vms: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    cloud: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    zone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    instance_ids: Option<Vec<String>>,
}

impl ProvisionRequest {
    /// Map generic credentials onto provisioning parameters.
    ///
    /// Absent keys stay absent; this never fails.
    pub fn from_credentials(credentials: &Credentials) -> Self {
        let get = |key: &str| credentials.get(key).map(str::to_string);
        Self {
            credentials: CloudKeys {
                access_key: get("ec2_access_key"),
                secret_key: get("ec2_secret_key"),
                url: get("ec2_url"),
            },
            project: get("project"),
            group: get("group"),
            image_id: get("machine"),
            infrastructure: get("infrastructure"),
            instance_type: get("instance_type"),
            keyname: get("keyname"),
            use_spot_instances: get("use_spot_instances"),
            max_spot_price: get("max_spot_price"),
            ..Default::default()
        }
    }

    pub fn with_instance_count(mut self, count: usize) -> Self {
        self.num_vms = Some(count.to_string());
        self
    }

    pub fn with_cloud(mut self, cloud: impl Into<String>) -> Self {
        self.cloud = Some(cloud.into());
        self
    }

    pub fn with_zone(mut self, zone: Option<&str>) -> Self {
        self.zone = zone.map(str::to_string);
        self
    }

    pub fn with_region(mut self, region: Option<&str>) -> Self {
        self.region = region.map(str::to_string);
        self
    }

    pub fn with_instance_ids(mut self, ids: Vec<String>) -> Self {
        self.instance_ids = Some(ids);
        self
    }

    pub fn instance_count(&self) -> Option<usize> {
        self.num_vms.as_deref().and_then(|n| n.parse().ok())
    }

    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn instance_ids(&self) -> &[String] {
        self.instance_ids.as_deref().unwrap_or_default()
    }

    pub fn to_json(&self) -> Value {
        json!(self)
    }

    /// JSON form with the cloud keys masked, for diagnostics
    pub fn masked(&self) -> Value {
        let mut masked = self.clone();
        masked.credentials.access_key = masked.credentials.access_key.as_deref().map(mask);
        masked.credentials.secret_key = masked.credentials.secret_key.as_deref().map(mask);
        json!(masked)
    }
}
