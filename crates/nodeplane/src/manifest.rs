//! Routing manifest for one application

use anyhow::Context;
use nodeplane_config::ProxySettings;
use nodeplane_proxy::{Handler, Language, NetworkEndpoints, app_listen_port};
use serde::Deserialize;
use std::path::Path;

/// Addresses as written in a manifest; ports fall back to the agent config
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEndpoints {
    pub public_ip: String,
    pub private_ip: String,
    /// Public HTTP port; derived from `app_number` when absent
    pub http_port: Option<u16>,
    pub app_number: Option<u16>,
    pub backend_port: u16,
    pub messaging_host: String,
    pub messaging_port: Option<u16>,
    pub upload_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingManifest {
    pub endpoints: ManifestEndpoints,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub handlers: Vec<Handler>,
}

impl RoutingManifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }

    pub fn network_endpoints(&self, proxy: &ProxySettings) -> anyhow::Result<NetworkEndpoints> {
        let endpoints = &self.endpoints;
        let http_port = match (endpoints.http_port, endpoints.app_number) {
            (Some(port), _) => port,
            (None, Some(app_number)) => app_listen_port(app_number)?,
            (None, None) => anyhow::bail!("manifest endpoints need http_port or app_number"),
        };

        Ok(NetworkEndpoints {
            public_ip: endpoints.public_ip.clone(),
            private_ip: endpoints.private_ip.clone(),
            http_port,
            backend_port: endpoints.backend_port,
            upload_port: endpoints.upload_port.unwrap_or(proxy.upload_port),
            messaging_host: endpoints.messaging_host.clone(),
            messaging_port: endpoints.messaging_port.unwrap_or(proxy.messaging_port),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeplane_proxy::{HandlerKind, SecurePolicy};

    const MANIFEST: &str = r#"
endpoints:
  public_ip: 54.0.0.1
  private_ip: 10.0.0.1
  app_number: 2
  backend_port: 20000
  messaging_host: 10.0.0.2
language: java
handlers:
  - url: /admin
    kind: application
    secure: always
  - url: /static
    kind: static
    dir: static
    expiration: 7d
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest: RoutingManifest = serde_yaml::from_str(MANIFEST).unwrap();

        assert_eq!(manifest.language, Language::Java);
        assert_eq!(manifest.handlers.len(), 2);
        assert_eq!(manifest.handlers[0].policy(), SecurePolicy::Always);
        assert!(matches!(manifest.handlers[1].kind, HandlerKind::Static { .. }));
    }

    #[test]
    fn test_endpoints_fall_back_to_config() {
        let manifest: RoutingManifest = serde_yaml::from_str(MANIFEST).unwrap();
        let endpoints = manifest
            .network_endpoints(&ProxySettings::default())
            .unwrap();

        assert_eq!(endpoints.http_port, 8082);
        assert_eq!(endpoints.messaging_port, 5280);
        assert_eq!(endpoints.upload_port, 6106);
    }

    #[test]
    fn test_endpoints_need_a_port() {
        let mut manifest: RoutingManifest = serde_yaml::from_str(MANIFEST).unwrap();
        manifest.endpoints.app_number = None;

        assert!(manifest.network_endpoints(&ProxySettings::default()).is_err());
    }
}
