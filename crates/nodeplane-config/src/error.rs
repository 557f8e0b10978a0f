use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Config file not found. Looked for:\n\
        - ./nodeplane.local.yaml, ./nodeplane.yaml\n\
        - <config dir>/nodeplane/nodeplane.yaml\n\
        Set NODEPLANE_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("IO error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
