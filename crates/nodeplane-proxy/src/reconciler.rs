//! Bring on-disk proxy configuration in line with the desired state
//!
//! The files under the sites directory are the only source of truth; a
//! restarted process picks up where the last one stopped by reading them.

use crate::builder::{ProxyConfig, ProxyConfigBuilder};
use crate::daemon::ProxyDaemon;
use crate::error::{ProxyError, Result};
use crate::files::{ensure_dir, read_optional, remove_optional, write_atomic};
use crate::layout::SiteLayout;
use crate::rules::location_path_error;
use crate::service::ServiceRouteTable;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, error, info};

pub struct ProxyReconciler<D> {
    builder: ProxyConfigBuilder,
    daemon: D,
}

impl<D: ProxyDaemon> ProxyReconciler<D> {
    pub fn new(builder: ProxyConfigBuilder, daemon: D) -> Self {
        Self { builder, daemon }
    }

    pub fn builder(&self) -> &ProxyConfigBuilder {
        &self.builder
    }

    pub fn daemon(&self) -> &D {
        &self.daemon
    }

    fn layout(&self) -> &SiteLayout {
        self.builder.layout()
    }

    /// Write `config_text` for `app` unless it is already in place.
    ///
    /// Returns `false` when nothing changed. A config the daemon rejects
    /// is rolled back to the previous file (or removed when there was
    /// none) and reported as [`ProxyError::InvalidProxyConfig`]. The same
    /// rollback happens when the check or the reload itself fails, so a
    /// file on disk has always been accepted by the daemon.
    pub async fn apply(&self, app: &str, config_text: &str) -> Result<bool> {
        SiteLayout::validate_name("application", app)?;
        let path = self.layout().app_config_path(app);
        let previous = read_optional(&path).await?;

        if previous.as_deref().unwrap_or_default() == config_text {
            debug!(app, "Proxy config unchanged");
            return Ok(false);
        }

        ensure_dir(&self.layout().sites_enabled).await?;
        write_atomic(&path, config_text).await?;

        if let Err(e) = self.check_and_reload(app, &path).await {
            error!(app, path = %path.display(), error = %e, "Proxy config not applied, rolling back");
            roll_back(&path, previous.as_deref()).await?;
            return Err(e);
        }

        info!(app, path = %path.display(), "Applied proxy config");
        Ok(true)
    }

    async fn check_and_reload(&self, app: &str, path: &Path) -> Result<()> {
        if !self.daemon.check_config().await? {
            return Err(ProxyError::InvalidProxyConfig {
                app: app.to_string(),
                path: path.to_path_buf(),
            });
        }
        self.daemon.reload().await
    }

    pub async fn apply_config(&self, config: &ProxyConfig) -> Result<bool> {
        self.apply(&config.app, &config.text).await
    }

    /// Delete the config of `app` and reload; a missing file is fine
    pub async fn remove_application(&self, app: &str) -> Result<bool> {
        SiteLayout::validate_name("application", app)?;
        let path = self.layout().app_config_path(app);
        let removed = remove_optional(&path).await?;
        if removed {
            info!(app, "Removed proxy config");
        } else {
            debug!(app, "No proxy config to remove");
        }

        self.daemon.reload().await?;
        Ok(removed)
    }

    /// Route `path` of `service` to `host:port` and reload.
    ///
    /// The listen port is fixed by the first registration; a different
    /// one fails with [`ProxyError::ServicePortConflict`].
    pub async fn register_service_route(
        &self,
        service: &str,
        host: &str,
        port: u16,
        listen_port: u16,
        path: &str,
    ) -> Result<ServiceRouteTable> {
        SiteLayout::validate_name("service", service)?;
        validate_service_route(service, host, path)?;
        let table_path = self.layout().service_table_path(service);

        let mut table = match ServiceRouteTable::load(&table_path).await? {
            Some(table) if table.listen_port != listen_port => {
                return Err(ProxyError::ServicePortConflict {
                    service: service.to_string(),
                    existing: table.listen_port,
                    requested: listen_port,
                });
            }
            Some(table) => table,
            None => ServiceRouteTable::new(service, listen_port),
        };

        if let Some(previous) = table.insert(path, host, port) {
            debug!(service, path, previous = %previous, "Replacing service route");
        }

        let text = self.builder.build_service(&table)?;
        table.save(&table_path).await?;
        ensure_dir(&self.layout().sites_enabled).await?;
        write_atomic(&self.layout().service_config_path(service), &text).await?;

        self.daemon.reload().await?;
        info!(service, path, backend = %format!("{}:{}", host, port), listen_port, "Registered service route");
        Ok(table)
    }

    /// Current route table of `service`
    pub async fn service_routes(&self, service: &str) -> Result<Option<ServiceRouteTable>> {
        SiteLayout::validate_name("service", service)?;
        ServiceRouteTable::load(&self.layout().service_table_path(service)).await
    }

    /// Remove every application config, keeping service files, and reload
    pub async fn clear_sites_enabled(&self) -> Result<usize> {
        let dir = &self.layout().sites_enabled;
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Sites directory does not exist");
                return Ok(0);
            }
            Err(e) => return Err(ProxyError::io(dir, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ProxyError::io(dir, e))?
        {
            let name = entry.file_name();
            if SiteLayout::is_app_config(&name.to_string_lossy()) && remove_optional(&entry.path()).await? {
                removed += 1;
            }
        }

        self.daemon.reload().await?;
        info!(removed, "Cleared application proxy configs");
        Ok(removed)
    }

    /// Prepare directories, certificates and the main config, then restart
    pub async fn initialize(&self) -> Result<()> {
        let layout = self.layout();
        for dir in [&layout.sites_enabled, &layout.log_dir, &layout.state_dir] {
            ensure_dir(dir).await?;
        }

        for (source, target) in layout.cert_files() {
            let installed = match fs::metadata(&target).await {
                Ok(meta) => meta.len() > 0,
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => return Err(ProxyError::io(&target, e)),
            };
            if installed {
                debug!(path = %target.display(), "Certificate already installed");
                continue;
            }
            fs::copy(&source, &target)
                .await
                .map_err(|e| ProxyError::io(&source, e))?;
            info!(path = %target.display(), "Installed certificate");
        }

        let main = self.builder.build_main()?;
        write_atomic(&layout.main_config(), &main).await?;

        self.daemon.restart().await?;
        info!(root = %layout.root.display(), "Proxy initialized");
        Ok(())
    }
}

/// Put back the file that was in place before a failed apply
async fn roll_back(path: &Path, previous: Option<&str>) -> Result<()> {
    match previous {
        Some(previous) => write_atomic(path, previous).await,
        None => remove_optional(path).await.map(|_| ()),
    }
}

fn validate_service_route(service: &str, host: &str, path: &str) -> Result<()> {
    let reason = location_path_error(path)
        .map(|reason| format!("path {}", reason))
        .or_else(|| host_error(host).map(|reason| format!("host {}", reason)));

    match reason {
        Some(reason) => Err(ProxyError::InvalidServiceRoute {
            service: service.to_string(),
            path: path.to_string(),
            host: host.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn host_error(host: &str) -> Option<&'static str> {
    if host.is_empty() {
        return Some("must not be empty");
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
    {
        return Some("must be an IP address or a hostname");
    }
    None
}
