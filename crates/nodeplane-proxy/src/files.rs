//! Small filesystem helpers shared by the reconciler and route tables

use crate::error::{ProxyError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Read `path`, treating a missing file as `None`
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ProxyError::io(path, e)),
    }
}

/// Remove `path`; returns whether a file was there
pub(crate) async fn remove_optional(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ProxyError::io(path, e)),
    }
}

/// Replace `path` with `contents` so readers never see a partial file.
///
/// The temporary file lives next to the target and starts with a dot,
/// so it never matches the `*.conf` naming of site files.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = temp_path(path);
    fs::write(&tmp, contents)
        .await
        .map_err(|e| ProxyError::io(&tmp, e))?;

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(ProxyError::io(path, e));
    }
    Ok(())
}

pub(crate) async fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| ProxyError::io(path, e))
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
