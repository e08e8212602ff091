//! On-disk store of the latest scan record per MAC.
//!
//! One `<MAC>.json` file per host, with `:` written as `-` in the file name.
//! Writes go to a temp file in the same directory and are renamed into place,
//! so readers see either the old or the new record, never a partial one.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{normalize_mac, ScanRecord};

const EXT: &str = "json";

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Open (creating if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| Error::CacheIo {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Replace the record stored for `mac`.
    pub fn put(&self, mac: &str, record: &ScanRecord) -> Result<()> {
        let path = self.path_for(mac)?;
        let body = serde_json::to_vec_pretty(record)?;
        let io_err = |source| Error::CacheIo {
            path: path.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(&body).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        debug!(mac, path = %path.display(), ports = record.count, "cache entry written");
        Ok(())
    }

    /// The record for `mac`, or `None` if it was never scanned.
    pub fn get(&self, mac: &str) -> Result<Option<ScanRecord>> {
        let path = self.path_for(mac)?;
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(Error::CacheIo { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| Error::CacheCorrupt { path, source })
    }

    /// Every MAC with a cache entry, sorted.
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|source| Error::CacheIo {
            path: self.dir.clone(),
            source,
        })?;
        let mut macs: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != EXT {
                    return None;
                }
                normalize_mac(path.file_stem()?.to_str()?).ok()
            })
            .collect();
        macs.sort();
        Ok(macs)
    }

    /// Time elapsed since the record for `mac` was taken.
    pub fn age(&self, mac: &str) -> Result<Option<Duration>> {
        Ok(self.get(mac)?.as_ref().map(record_age))
    }

    fn path_for(&self, mac: &str) -> Result<PathBuf> {
        let mac = normalize_mac(mac)?;
        Ok(self.dir.join(format!("{}.{EXT}", mac.replace(':', "-"))))
    }
}

/// Time elapsed since `record` was taken; zero for future timestamps.
pub fn record_age(record: &ScanRecord) -> Duration {
    let elapsed = OffsetDateTime::now_utc() - record.timestamps.utc;
    Duration::try_from(elapsed).unwrap_or(Duration::ZERO)
}
