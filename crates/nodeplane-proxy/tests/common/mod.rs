use async_trait::async_trait;
use nodeplane_proxy::{
    ProxyConfigBuilder, ProxyDaemon, ProxyError, ProxyReconciler, Result, SiteLayout,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

/// Daemon double that counts calls and accepts, rejects or fails on demand
#[derive(Default)]
pub struct RecordingDaemon {
    pub reloads: AtomicUsize,
    pub checks: AtomicUsize,
    pub restarts: AtomicUsize,
    reject: AtomicBool,
    fail_checks: AtomicBool,
    fail_reloads: AtomicBool,
}

impl RecordingDaemon {
    pub fn reject_configs(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Make `check_config` error out instead of answering
    #[allow(dead_code)]
    pub fn fail_checks(&self, fail: bool) {
        self.fail_checks.store(fail, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn fail_reloads(&self, fail: bool) {
        self.fail_reloads.store(fail, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyDaemon for RecordingDaemon {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        if self.fail_reloads.load(Ordering::SeqCst) {
            return Err(ProxyError::CommandFailed("reload failed".to_string()));
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn check_config(&self) -> Result<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_checks.load(Ordering::SeqCst) {
            return Err(ProxyError::CommandFailed("nginx could not be started".to_string()));
        }
        Ok(!self.reject.load(Ordering::SeqCst))
    }

    async fn is_running(&self) -> Result<bool> {
        Ok(true)
    }
}

pub struct TestSite {
    pub root: TempDir,
    pub daemon: Arc<RecordingDaemon>,
    pub reconciler: ProxyReconciler<Arc<RecordingDaemon>>,
}

impl TestSite {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let layout = SiteLayout::under(root.path());
        let daemon = Arc::new(RecordingDaemon::default());
        let reconciler =
            ProxyReconciler::new(ProxyConfigBuilder::new(layout).unwrap(), daemon.clone());
        Self {
            root,
            daemon,
            reconciler,
        }
    }

    pub fn layout(&self) -> &SiteLayout {
        self.reconciler.builder().layout()
    }

    #[allow(dead_code)]
    pub fn sites(&self) -> Vec<String> {
        let dir = &self.layout().sites_enabled;
        let mut names: Vec<String> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    #[allow(dead_code)]
    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }
}
