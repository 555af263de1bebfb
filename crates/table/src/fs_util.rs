//! Small durable-write helpers shared by the commit log and checkpoints.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::TableError;

/// Write `value` as pretty JSON to a sibling temp file, fsync it, then
/// rename over `path`. Readers see either the old file or the new one.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), TableError> {
    let json = serde_json::to_vec_pretty(value).map_err(TableError::serialize)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a JSON file, returning `None` when it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, TableError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| TableError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}
