//! Start/stop control over the external downloader job.
//!
//! The controller records intent only. It spawns or signals processes and flips
//! its state without waiting for them; the next scan shows what actually runs.

use crate::error::{ControlError, MetadataError};
use crate::metadata::{ItemMetadata, MetadataStore};
use crate::scanner::Scanner;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Active,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: Option<u32> },
    AlreadyActive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { signalled: usize },
    AlreadyIdle,
}

pub struct JobController {
    downloader_command: PathBuf,
    scanner: Arc<Scanner>,
    metadata: MetadataStore,
    active: AtomicBool,
    // Serializes transitions so concurrent starts spawn at most once.
    transition: Mutex<()>,
}

impl JobController {
    pub fn new(downloader_command: PathBuf, scanner: Arc<Scanner>, metadata: MetadataStore) -> Self {
        Self {
            downloader_command,
            scanner,
            metadata,
            active: AtomicBool::new(false),
            transition: Mutex::new(()),
        }
    }

    pub fn state(&self) -> JobState {
        if self.is_active() {
            JobState::Active
        } else {
            JobState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Blocks start and stop until the guard is dropped, so the state read
    /// under it holds for as long as the guard lives.
    pub async fn lock_transitions(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().await
    }

    pub async fn start(&self) -> Result<StartOutcome, ControlError> {
        let _guard = self.transition.lock().await;
        if self.is_active() {
            return Ok(StartOutcome::AlreadyActive);
        }

        let mut child = Command::new(&self.downloader_command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ControlError::Spawn {
                command: self.downloader_command.clone(),
                source,
            })?;

        let pid = child.id();
        info!("Started downloader {:?} (pid {:?})", self.downloader_command, pid);

        // Reap the child when it exits; nobody waits on it otherwise.
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!("Downloader (pid {:?}) exited with {}", pid, status),
                Err(e) => warn!("Failed to wait for downloader (pid {:?}): {}", pid, e),
            }
        });

        self.active.store(true, Ordering::Release);
        Ok(StartOutcome::Started { pid })
    }

    pub async fn stop(&self) -> StopOutcome {
        let _guard = self.transition.lock().await;
        if !self.is_active() {
            return StopOutcome::AlreadyIdle;
        }

        self.active.store(false, Ordering::Release);
        let signalled = self.scanner.terminate_matching().await;
        info!("Stopped download job, signalled {} worker processes", signalled);
        StopOutcome::Stopped { signalled }
    }

    pub async fn item_metadata(&self, item_id: &str) -> Result<Option<ItemMetadata>, MetadataError> {
        self.metadata.lookup(item_id).await.inspect_err(|e| {
            error!("Metadata lookup for {} failed: {}", item_id, e);
        })
    }
}
