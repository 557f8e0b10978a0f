//! Control surface of the proxy daemon

use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default location of the nginx binary
pub const DEFAULT_NGINX_BINARY: &str = "/usr/sbin/nginx";

/// Operations the reconciler needs from the proxy daemon
#[async_trait]
pub trait ProxyDaemon: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn restart(&self) -> Result<()>;

    /// Pick up changed site files without dropping connections
    async fn reload(&self) -> Result<()>;

    /// Syntax-check the full configuration; `Ok(false)` means rejected
    async fn check_config(&self) -> Result<bool>;

    async fn is_running(&self) -> Result<bool>;
}

#[async_trait]
impl<D: ProxyDaemon + ?Sized> ProxyDaemon for Arc<D> {
    async fn start(&self) -> Result<()> {
        (**self).start().await
    }

    async fn stop(&self) -> Result<()> {
        (**self).stop().await
    }

    async fn restart(&self) -> Result<()> {
        (**self).restart().await
    }

    async fn reload(&self) -> Result<()> {
        (**self).reload().await
    }

    async fn check_config(&self) -> Result<bool> {
        (**self).check_config().await
    }

    async fn is_running(&self) -> Result<bool> {
        (**self).is_running().await
    }
}

/// nginx driven through the system service manager
#[derive(Debug, Clone)]
pub struct NginxDaemon {
    binary: PathBuf,
    main_config: PathBuf,
}

impl NginxDaemon {
    pub fn new(binary: impl Into<PathBuf>, main_config: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            main_config: main_config.into(),
        }
    }

    async fn service(&self, action: &str) -> Result<()> {
        run_command("service", &["nginx", action]).await.map(|_| ())
    }

    /// Kill worker processes left behind by a failed reload
    async fn cleanup_failed(&self) {
        warn!("Cleaning up stray nginx workers after a failed reload");
        if let Err(e) = run_command("pkill", &["-9", "-f", "nginx: worker"]).await {
            debug!("No workers killed: {}", e);
        }
    }
}

#[async_trait]
impl ProxyDaemon for NginxDaemon {
    async fn start(&self) -> Result<()> {
        self.service("start").await?;
        info!("Started nginx");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.service("stop").await?;
        info!("Stopped nginx");
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.service("restart").await?;
        info!("Restarted nginx");
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        match self.service("reload").await {
            Ok(()) => {
                info!("Reloaded nginx");
                Ok(())
            }
            Err(e) => {
                self.cleanup_failed().await;
                Err(e)
            }
        }
    }

    async fn check_config(&self) -> Result<bool> {
        let binary = self.binary.display().to_string();
        let main_config = self.main_config.display().to_string();

        match run_command(&binary, &["-t", "-c", &main_config]).await {
            Ok(_) => Ok(true),
            Err(ProxyError::CommandFailed(stderr)) => {
                warn!("nginx rejected the configuration: {}", stderr.trim());
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn is_running(&self) -> Result<bool> {
        let output = Command::new("pgrep")
            .args(["-x", "nginx"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ProxyError::io("pgrep", e))?;
        Ok(output.success())
    }
}

/// Run a command and return stdout, failing on a non-zero exit
async fn run_command(program: &str, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    debug!("Running: {} {}", program, args.join(" "));

    let output = cmd
        .output()
        .await
        .map_err(|e| ProxyError::io(program, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProxyError::CommandFailed(format!(
            "{} {}: {}",
            program,
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
