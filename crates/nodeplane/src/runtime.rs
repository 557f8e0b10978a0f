//! Wiring from the agent config to the library clients

use anyhow::Context;
use nodeplane_cloud::{Credentials, HttpsTransport, InstanceProvisioner, ProvisioningClient};
use nodeplane_config::AgentConfig;
use nodeplane_proxy::{NginxDaemon, ProxyConfigBuilder, ProxyReconciler, SiteLayout};
use std::path::Path;
use tokio::sync::watch;
use tracing::debug;

pub struct Runtime {
    pub config: AgentConfig,
}

impl Runtime {
    pub fn load() -> anyhow::Result<Self> {
        let (config, config_path) = AgentConfig::discover()?;
        match &config_path {
            Some(path) => debug!(path = %path.display(), "Using agent config"),
            None => debug!("Using default agent config"),
        }
        Ok(Self { config })
    }

    pub fn client(
        &self,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> anyhow::Result<ProvisioningClient<HttpsTransport>> {
        let settings = &self.config.provisioning;
        let secret = settings.resolve_secret()?;
        let transport = HttpsTransport::new(&settings.host, settings.port)?;

        let mut client = ProvisioningClient::new(transport, secret)
            .with_budget(settings.call_timeout())
            .with_backoff(settings.backoff());
        if let Some(shutdown) = shutdown {
            client = client.with_shutdown(shutdown);
        }
        Ok(client)
    }

    pub fn provisioner(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<InstanceProvisioner<HttpsTransport>> {
        Ok(InstanceProvisioner::new(self.client(Some(shutdown))?)
            .with_poll_interval(self.config.provisioning.poll_interval()))
    }

    pub fn site_layout(&self) -> SiteLayout {
        let proxy = &self.config.proxy;
        SiteLayout {
            root: proxy.root.clone(),
            sites_enabled: proxy.sites_enabled(),
            state_dir: proxy.state_dir.clone(),
            log_dir: proxy.log_dir.clone(),
            apps_dir: proxy.apps_dir.clone(),
            certs_source: proxy.certs_source.clone(),
        }
    }

    pub fn builder(&self) -> anyhow::Result<ProxyConfigBuilder> {
        Ok(ProxyConfigBuilder::new(self.site_layout())?)
    }

    pub fn reconciler(&self) -> anyhow::Result<ProxyReconciler<NginxDaemon>> {
        let layout = self.site_layout();
        let daemon = NginxDaemon::new(&self.config.proxy.binary, layout.main_config());
        Ok(ProxyReconciler::new(ProxyConfigBuilder::new(layout)?, daemon))
    }
}

/// Read a credentials mapping; JSON is accepted since it is valid YAML
pub fn load_credentials(path: &Path) -> anyhow::Result<Credentials> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials {}", path.display()))?;
    let credentials: Credentials = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse credentials {}", path.display()))?;
    debug!(credentials = ?credentials, "Loaded credentials");
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_load_credentials_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("creds.yaml");
        let json = dir.path().join("creds.json");
        std::fs::write(&yaml, "infrastructure: ec2\nec2_access_key: AKIA1234\n").unwrap();
        std::fs::write(&json, r#"{"infrastructure": "ec2", "zone": "us-east-1a"}"#).unwrap();

        assert_eq!(load_credentials(&yaml).unwrap().get("ec2_access_key"), Some("AKIA1234"));
        assert_eq!(load_credentials(&json).unwrap().get("zone"), Some("us-east-1a"));
    }

    #[test]
    fn test_site_layout_follows_config() {
        let mut config = AgentConfig::default();
        config.proxy.root = PathBuf::from("/opt/nginx");
        let runtime = Runtime { config };

        let layout = runtime.site_layout();
        assert_eq!(layout.sites_enabled, PathBuf::from("/opt/nginx/sites-enabled"));
        assert_eq!(layout.main_config(), PathBuf::from("/opt/nginx/nginx.conf"));
    }
}
