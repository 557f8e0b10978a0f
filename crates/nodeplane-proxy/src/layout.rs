//! On-disk layout of the proxy configuration and port assignment

use crate::error::{ProxyError, Result};
use std::path::{Path, PathBuf};

/// Extension of every generated site file
pub const CONFIG_EXTENSION: &str = "conf";

/// Prefix of per-application site files
pub const APP_CONFIG_PREFIX: &str = "nodeplane-";

/// First public port handed to an application
pub const START_PORT: u16 = 8080;

/// Last public port handed to an application
pub const END_PORT: u16 = 8100;

/// Distance between an application's HTTP port and its HTTPS port
pub const SSL_PORT_OFFSET: u16 = 3700;

const CERT_FILE: &str = "mycert.pem";
const KEY_FILE: &str = "mykey.pem";

/// HTTP port for the `app_number`-th application
pub fn app_listen_port(app_number: u16) -> Result<u16> {
    START_PORT
        .checked_add(app_number)
        .filter(|port| *port <= END_PORT)
        .ok_or_else(|| {
            ProxyError::InvalidPort(format!(
                "application number {} is outside {}..={}",
                app_number, START_PORT, END_PORT
            ))
        })
}

/// HTTPS port paired with `http_port`
pub fn https_port_for(http_port: u16) -> Result<u16> {
    http_port.checked_sub(SSL_PORT_OFFSET).ok_or_else(|| {
        ProxyError::InvalidPort(format!(
            "HTTP port {} is below the SSL offset {}",
            http_port, SSL_PORT_OFFSET
        ))
    })
}

/// Where the proxy configuration lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    /// Proxy configuration root, holding the main config and certificates
    pub root: PathBuf,
    /// Directory included by the main config; one file per site
    pub sites_enabled: PathBuf,
    /// Route tables of platform services, outside the included directory
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Deployed applications, `<apps_dir>/<app>/app`
    pub apps_dir: PathBuf,
    /// Where the certificate pair is copied from on initialization
    pub certs_source: PathBuf,
}

impl Default for SiteLayout {
    fn default() -> Self {
        let root = PathBuf::from("/etc/nginx");
        Self {
            sites_enabled: root.join("sites-enabled"),
            root,
            state_dir: PathBuf::from("/var/lib/nodeplane/routes"),
            log_dir: PathBuf::from("/var/log/nginx"),
            apps_dir: PathBuf::from("/var/apps"),
            certs_source: PathBuf::from("/etc/nodeplane/certs"),
        }
    }
}

impl SiteLayout {
    /// Everything below `base`, mirroring the default tree
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        let root = base.join("nginx");
        Self {
            sites_enabled: root.join("sites-enabled"),
            root,
            state_dir: base.join("routes"),
            log_dir: base.join("log"),
            apps_dir: base.join("apps"),
            certs_source: base.join("certs"),
        }
    }

    pub fn main_config(&self) -> PathBuf {
        self.root.join(format!("nginx.{}", CONFIG_EXTENSION))
    }

    pub fn cert_path(&self) -> PathBuf {
        self.root.join(CERT_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.root.join(KEY_FILE)
    }

    /// Certificate pair as `(source, installed)` paths
    pub fn cert_files(&self) -> [(PathBuf, PathBuf); 2] {
        [
            (self.certs_source.join(KEY_FILE), self.key_path()),
            (self.certs_source.join(CERT_FILE), self.cert_path()),
        ]
    }

    pub fn app_config_path(&self, app: &str) -> PathBuf {
        self.sites_enabled
            .join(format!("{}{}.{}", APP_CONFIG_PREFIX, app, CONFIG_EXTENSION))
    }

    pub fn service_config_path(&self, service: &str) -> PathBuf {
        self.sites_enabled
            .join(format!("{}.{}", service, CONFIG_EXTENSION))
    }

    pub fn service_table_path(&self, service: &str) -> PathBuf {
        self.state_dir.join(format!("{}.routes.json", service))
    }

    /// Check an application or service identity before it becomes part of
    /// a file name or a server block
    pub fn validate_name(kind: &'static str, name: &str) -> Result<()> {
        let invalid = |reason: &str| ProxyError::InvalidName {
            kind,
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if name.contains("..") {
            return Err(invalid("must not contain '..'"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(invalid("only letters, digits, '-', '_' and '.' are allowed"));
        }
        Ok(())
    }

    /// Whether `file_name` is a per-application site file
    pub fn is_app_config(file_name: &str) -> bool {
        file_name.starts_with(APP_CONFIG_PREFIX)
            && file_name.ends_with(&format!(".{}", CONFIG_EXTENSION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_listen_port_range() {
        assert_eq!(app_listen_port(0).unwrap(), 8080);
        assert_eq!(app_listen_port(20).unwrap(), 8100);
        assert!(app_listen_port(21).is_err());
    }

    #[test]
    fn test_https_port_pairing() {
        assert_eq!(https_port_for(8080).unwrap(), 4380);
        assert!(matches!(https_port_for(80), Err(ProxyError::InvalidPort(_))));
    }

    #[test]
    fn test_file_naming() {
        let layout = SiteLayout::default();
        assert_eq!(
            layout.app_config_path("guestbook"),
            PathBuf::from("/etc/nginx/sites-enabled/nodeplane-guestbook.conf")
        );
        assert_eq!(
            layout.service_config_path("datastore"),
            PathBuf::from("/etc/nginx/sites-enabled/datastore.conf")
        );
        assert_eq!(
            layout.service_table_path("datastore"),
            PathBuf::from("/var/lib/nodeplane/routes/datastore.routes.json")
        );
        assert_eq!(layout.main_config(), PathBuf::from("/etc/nginx/nginx.conf"));
    }

    #[test]
    fn test_is_app_config() {
        assert!(SiteLayout::is_app_config("nodeplane-guestbook.conf"));
        assert!(!SiteLayout::is_app_config("datastore.conf"));
        assert!(!SiteLayout::is_app_config("nodeplane-guestbook.conf.bak"));
    }

    #[test]
    fn test_validate_name() {
        assert!(SiteLayout::validate_name("application", "guestbook").is_ok());
        assert!(SiteLayout::validate_name("service", "blob_store-2.v1").is_ok());

        for name in ["", "../../escaped", "a/b", "..", "app name", "app;", "app{"] {
            assert!(
                matches!(
                    SiteLayout::validate_name("service", name),
                    Err(ProxyError::InvalidName { kind: "service", .. })
                ),
                "{name:?} should be rejected"
            );
        }
    }
}
