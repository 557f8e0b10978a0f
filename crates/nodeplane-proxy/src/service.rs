//! Route tables of platform services
//!
//! A service file is never parsed back. The `{path -> backend}` table is
//! persisted as JSON and the proxy file is re-rendered from it.

use crate::error::{ProxyError, Result};
use crate::files::{ensure_dir, read_optional, write_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Current route table format
pub const ROUTE_TABLE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRouteTable {
    pub version: u32,
    pub service: String,
    /// Immutable once the table exists
    pub listen_port: u16,
    /// Path prefix to `host:port`, kept sorted for stable rendering
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
}

impl ServiceRouteTable {
    pub fn new(service: impl Into<String>, listen_port: u16) -> Self {
        Self {
            version: ROUTE_TABLE_VERSION,
            service: service.into(),
            listen_port,
            routes: BTreeMap::new(),
        }
    }

    /// Insert or overwrite the route for `path`, returning the old backend
    pub fn insert(&mut self, path: impl Into<String>, host: &str, port: u16) -> Option<String> {
        self.routes.insert(path.into(), format!("{}:{}", host, port))
    }

    pub fn backend(&self, path: &str) -> Option<&str> {
        self.routes.get(path).map(String::as_str)
    }

    /// Load a table, `None` when the service has no table yet
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let Some(content) = read_optional(path).await? else {
            debug!(path = %path.display(), "Route table not found");
            return Ok(None);
        };

        let table: ServiceRouteTable = serde_json::from_str(&content)?;
        if table.version > ROUTE_TABLE_VERSION {
            return Err(ProxyError::UnsupportedTableVersion {
                path: path.to_path_buf(),
                found: table.version,
                supported: ROUTE_TABLE_VERSION,
            });
        }

        debug!(service = %table.service, routes = table.routes.len(), "Loaded route table");
        Ok(Some(table))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path, &content).await?;

        debug!(service = %self.service, routes = self.routes.len(), "Saved route table");
        Ok(())
    }
}
