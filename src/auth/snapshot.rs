//! JSON snapshots of in-memory tables.
//!
//! A snapshot is written next to its target and renamed over it, so a crash
//! mid-write leaves the previous file intact.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// Read a snapshot. A missing file is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(Some(serde_json::from_reader(reader)?))
}

/// Replace the snapshot at `path` with `value`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let staging = staging_path(path);

    let result = (|| -> Result<(), StoreError> {
        let mut writer = BufWriter::new(File::create(&staging)?);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            fs::rename(&staging, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&staging);
            Err(e)
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
