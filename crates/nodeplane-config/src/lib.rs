pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Env var naming a config file directly
pub const CONFIG_PATH_ENV: &str = "NODEPLANE_CONFIG_PATH";

const CANDIDATES: [&str; 2] = ["nodeplane.local.yaml", "nodeplane.yaml"];

/// Agent configuration, every field defaulted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub provisioning: ProvisioningSettings,
    pub proxy: ProxySettings,
}

/// Where and how to reach the provisioning endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningSettings {
    pub host: String,
    pub port: u16,
    /// Shared secret appended to every call
    pub secret: Option<String>,
    /// File holding the shared secret, used when `secret` is unset
    pub secret_file: Option<PathBuf>,
    pub backoff_secs: u64,
    pub poll_interval_secs: u64,
    /// Per-call budget; unset means calls may take as long as they need
    pub call_timeout_secs: Option<u64>,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 17444,
            secret: None,
            secret_file: None,
            backoff_secs: 1,
            poll_interval_secs: 10,
            call_timeout_secs: None,
        }
    }
}

impl ProvisioningSettings {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    /// The shared secret, inline or read from `secret_file`
    pub fn resolve_secret(&self) -> Result<String> {
        if let Some(secret) = &self.secret {
            return Ok(secret.clone());
        }

        let path = self.secret_file.as_ref().ok_or_else(|| {
            ConfigError::InvalidConfig(
                "provisioning.secret or provisioning.secret_file is required".to_string(),
            )
        })?;
        let secret = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        let secret = secret.trim();
        if secret.is_empty() {
            return Err(ConfigError::InvalidConfig(format!(
                "secret file {} is empty",
                path.display()
            )));
        }
        Ok(secret.to_string())
    }
}

/// Filesystem layout and ports of the local proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub root: PathBuf,
    /// Defaults to `<root>/sites-enabled`
    pub sites_enabled: Option<PathBuf>,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    pub apps_dir: PathBuf,
    pub certs_source: PathBuf,
    pub binary: PathBuf,
    pub messaging_port: u16,
    pub upload_port: u16,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/etc/nginx"),
            sites_enabled: None,
            state_dir: PathBuf::from("/var/lib/nodeplane/routes"),
            log_dir: PathBuf::from("/var/log/nginx"),
            apps_dir: PathBuf::from("/var/apps"),
            certs_source: PathBuf::from("/etc/nodeplane/certs"),
            binary: PathBuf::from("/usr/sbin/nginx"),
            messaging_port: 5280,
            upload_port: 6106,
        }
    }
}

impl ProxySettings {
    pub fn sites_enabled(&self) -> PathBuf {
        self.sites_enabled
            .clone()
            .unwrap_or_else(|| self.root.join("sites-enabled"))
    }
}

impl AgentConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        debug!(path = %path.display(), "Loaded agent config");
        Ok(config)
    }

    fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // An empty file is a valid, all-default config
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Load the discovered config file, or defaults when there is none
    pub fn discover() -> Result<(Self, Option<PathBuf>)> {
        match find_config_file() {
            Ok(path) => Ok((Self::load(&path)?, Some(path))),
            Err(ConfigError::ConfigFileNotFound) => {
                debug!("No config file found, using defaults");
                Ok((Self::default(), None))
            }
            Err(e) => Err(e),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.provisioning.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "provisioning.host must not be empty".to_string(),
            ));
        }
        if self.provisioning.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "provisioning.port must not be 0".to_string(),
            ));
        }
        if self.provisioning.call_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "provisioning.call_timeout_secs must be positive; omit it for no timeout"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Locate the agent config file.
///
/// Search order:
/// 1. `NODEPLANE_CONFIG_PATH` (direct path)
/// 2. current directory: `nodeplane.local.yaml`, `nodeplane.yaml`
/// 3. `<config dir>/nodeplane/nodeplane.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        debug!(path = %path.display(), "{} points at a missing file", CONFIG_PATH_ENV);
    }

    let current_dir = std::env::current_dir().map_err(|source| ConfigError::Io {
        path: PathBuf::from("."),
        source,
    })?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("nodeplane").join("nodeplane.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn in_dir<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = f();
        std::env::set_current_dir(original_dir).unwrap();
        result
    }

    #[test]
    #[serial]
    fn test_find_config_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("nodeplane.yaml"), "{}").unwrap();

        let found = temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            in_dir(temp_dir.path(), find_config_file)
        })
        .unwrap();
        assert!(found.ends_with("nodeplane.yaml"));
    }

    #[test]
    #[serial]
    fn test_local_file_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("nodeplane.yaml"), "{}").unwrap();
        fs::write(temp_dir.path().join("nodeplane.local.yaml"), "{}").unwrap();

        let found = temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            in_dir(temp_dir.path(), find_config_file)
        })
        .unwrap();
        assert!(found.ends_with("nodeplane.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_env_var_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "{}").unwrap();

        let found = temp_env::with_var(CONFIG_PATH_ENV, Some(&config_path), find_config_file);
        assert_eq!(found.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, None),
                ("XDG_CONFIG_HOME", Some(temp_dir.path())),
            ],
            || in_dir(temp_dir.path(), find_config_file),
        );

        // A global config on the host running the tests would be found instead
        if let Err(e) = result {
            assert!(matches!(e, ConfigError::ConfigFileNotFound));
        }
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.provisioning.port, 17444);
        assert_eq!(config.provisioning.call_timeout(), None);
        assert_eq!(config.provisioning.poll_interval(), Duration::from_secs(10));
        assert_eq!(
            config.proxy.sites_enabled(),
            PathBuf::from("/etc/nginx/sites-enabled")
        );
        assert_eq!(config.proxy.messaging_port, 5280);
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nodeplane.yaml");
        fs::write(
            &path,
            "provisioning:\n  host: 10.0.0.9\n  secret: s3cret\n  call_timeout_secs: 30\nproxy:\n  root: /opt/nginx\n",
        )
        .unwrap();

        let config = AgentConfig::load(&path).unwrap();

        assert_eq!(config.provisioning.host, "10.0.0.9");
        assert_eq!(config.provisioning.port, 17444);
        assert_eq!(config.provisioning.call_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.provisioning.resolve_secret().unwrap(), "s3cret");
        assert_eq!(
            config.proxy.sites_enabled(),
            PathBuf::from("/opt/nginx/sites-enabled")
        );
    }

    #[test]
    fn test_empty_file_is_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nodeplane.yaml");
        fs::write(&path, "").unwrap();

        assert_eq!(AgentConfig::load(&path).unwrap(), AgentConfig::default());
    }

    #[test]
    fn test_invalid_yaml_names_the_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nodeplane.yaml");
        fs::write(&path, "provisioning: [").unwrap();

        let err = AgentConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { path: ref p, .. } if p == &path));
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nodeplane.yaml");
        fs::write(&path, "provisioning:\n  call_timeout_secs: 0\n").unwrap();

        assert!(matches!(
            AgentConfig::load(&path),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_secret_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let secret_path = temp_dir.path().join("secret.key");
        fs::write(&secret_path, "from-file\n").unwrap();

        let settings = ProvisioningSettings {
            secret_file: Some(secret_path),
            ..Default::default()
        };
        assert_eq!(settings.resolve_secret().unwrap(), "from-file");
    }

    #[test]
    fn test_missing_secret() {
        assert!(matches!(
            ProvisioningSettings::default().resolve_secret(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }
}
