//! JSON snapshot files for the in-memory tiers
//!
//! Snapshots are written to a sibling temp file and renamed into place so a
//! crash mid-write leaves the previous snapshot intact.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, StrataError};

/// Load a snapshot, returning `None` when the file does not exist yet
pub async fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StrataError::Storage(format!(
                "Failed to read snapshot {}: {e}",
                path.display()
            )));
        }
    };

    let value = serde_json::from_slice(&bytes).map_err(|e| {
        StrataError::Serialization(format!("Corrupt snapshot {}: {e}", path.display()))
    })?;
    Ok(Some(value))
}

/// Atomically replace the snapshot at `path`
pub async fn save<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let bytes = serde_json::to_vec(value)?;
    let tmp = temp_path(path);

    tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
        StrataError::Storage(format!("Failed to write snapshot {}: {e}", tmp.display()))
    })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        StrataError::Storage(format!("Failed to replace snapshot {}: {e}", path.display()))
    })?;

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
