//! Counts derived from the downloader's append-only logs and partial files.
//!
//! Every read starts from the beginning of the file. Nothing is cached between
//! calls, so rotation or truncation of a log is picked up on the next tick.

use crate::error::ProgressError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressCounts {
    pub downloaded: u64,
    pub failed: u64,
}

impl ProgressCounts {
    pub fn finished(&self) -> u64 {
        self.downloaded + self.failed
    }
}

#[derive(Clone, Debug)]
pub struct ProgressReader {
    success_log: PathBuf,
    failure_log: PathBuf,
    success_marker: String,
}

impl ProgressReader {
    pub fn new(success_log: PathBuf, failure_log: PathBuf, success_marker: String) -> Self {
        Self {
            success_log,
            failure_log,
            success_marker,
        }
    }

    pub async fn read(&self) -> Result<ProgressCounts, ProgressError> {
        let downloaded = count_successes(&self.success_log, &self.success_marker).await?;
        let failed = count_lines(&self.failure_log).await?;
        Ok(ProgressCounts { downloaded, failed })
    }
}

/// Reads a log, treating a missing file as empty (the job has not started yet).
async fn read_log(path: &Path) -> Result<Option<String>, ProgressError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ProgressError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub async fn count_successes(path: &Path, marker: &str) -> Result<u64, ProgressError> {
    let content = read_log(path).await?.unwrap_or_default();
    Ok(content.lines().filter(|line| line.contains(marker)).count() as u64)
}

pub async fn count_lines(path: &Path) -> Result<u64, ProgressError> {
    let content = read_log(path).await?.unwrap_or_default();
    Ok(content.lines().count() as u64)
}

pub fn partial_file_path(download_dir: &Path, item_id: &str, extension: &str) -> PathBuf {
    download_dir.join(format!("{}.{}.part", item_id, extension))
}

/// Bytes written so far for an item, or 0 when no partial file exists.
pub async fn partial_progress(download_dir: &Path, item_id: &str, extension: &str) -> u64 {
    tokio::fs::metadata(partial_file_path(download_dir, item_id, extension))
        .await
        .map(|m| m.len())
        .unwrap_or(0)
}
