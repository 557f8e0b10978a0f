//! Proxy configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Proxy rejected the configuration for {app} (rolled back {path})")]
    InvalidProxyConfig { app: String, path: PathBuf },

    #[error(
        "Can't update proxy config for {service} (listen port {existing}, requested {requested})"
    )]
    ServicePortConflict {
        service: String,
        existing: u16,
        requested: u16,
    },

    #[error("Invalid handler {url} for {app}: {reason}")]
    InvalidHandler {
        app: String,
        url: String,
        reason: String,
    },

    #[error("Invalid service route {path} -> {host} for {service}: {reason}")]
    InvalidServiceRoute {
        service: String,
        path: String,
        host: String,
        reason: String,
    },

    #[error("Invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Route table {path} has version {found}, newer than supported {supported}")]
    UnsupportedTableVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("IO error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Proxy command failed: {0}")]
    CommandFailed(String),
}

impl ProxyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProxyError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
