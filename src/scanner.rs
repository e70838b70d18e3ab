use crate::config::Settings;
use crate::process::{ProcessInfo, ProcessSource};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One matched worker process and its read rate over the last sample interval.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub item_id: String,
    pub speed_kbs: f64,
}

/// Decides which processes belong to the download job.
#[derive(Clone, Debug)]
pub struct JobMatcher {
    worker_binary: String,
    download_dir: String,
    extension: String,
}

impl JobMatcher {
    pub fn new(worker_binary: &str, download_dir: &Path, extension: &str) -> Self {
        Self {
            worker_binary: worker_binary.to_string(),
            download_dir: download_dir.to_string_lossy().to_string(),
            extension: extension.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.worker_binary,
            &settings.download_dir,
            &settings.output_extension,
        )
    }

    /// The binary rule is a substring match, so `wget2` or `wget.exe` count
    /// as workers too.
    pub fn matches(&self, process: &ProcessInfo) -> bool {
        process.name.contains(&self.worker_binary)
            && process.cmd.iter().any(|arg| arg.contains(&self.download_dir))
    }

    /// Item id for a matched process, if its arguments name an output file.
    pub fn item_id(&self, process: &ProcessInfo) -> Option<String> {
        extract_item_id(&process.cmd, &self.extension)
    }
}

/// Takes the first argument naming an output file (`<id>.<ext>` or
/// `<id>.<ext>.part`) and returns its file name without directory or suffixes.
pub fn extract_item_id(cmd: &[String], extension: &str) -> Option<String> {
    let final_suffix = format!(".{}", extension);
    let partial_suffix = format!(".{}.part", extension);

    cmd.iter().find_map(|arg| {
        let file_name = Path::new(arg).file_name()?.to_str()?;
        let stem = file_name
            .strip_suffix(&partial_suffix)
            .or_else(|| file_name.strip_suffix(&final_suffix))?;
        (!stem.is_empty()).then(|| stem.to_string())
    })
}

pub struct Scanner {
    source: Arc<dyn ProcessSource>,
    matcher: JobMatcher,
    sample_interval: Duration,
}

impl Scanner {
    pub fn new(source: Arc<dyn ProcessSource>, matcher: JobMatcher, sample_interval: Duration) -> Self {
        Self {
            source,
            matcher,
            sample_interval,
        }
    }

    /// Matched processes that carry an item id, as `(pid, item_id)`.
    pub async fn list_matching_processes(&self) -> Vec<(u32, String)> {
        let source = self.source.clone();
        let matcher = self.matcher.clone();
        let listed = tokio::task::spawn_blocking(move || {
            source
                .list_processes()
                .into_iter()
                .filter(|p| matcher.matches(p))
                .filter_map(|p| {
                    let id = matcher.item_id(&p);
                    if id.is_none() {
                        debug!("Ignoring worker {} with no output file argument", p.pid);
                    }
                    id.map(|id| (p.pid, id))
                })
                .collect::<Vec<_>>()
        })
        .await;

        match listed {
            Ok(list) => list,
            Err(e) => {
                warn!("Process listing task failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Samples every matched process once, waits one interval, samples again.
    ///
    /// The wait is shared by all processes, so a scan costs one interval no matter
    /// how many workers are running. Processes absent from either sample are dropped.
    pub async fn scan(&self) -> Vec<ProcessSample> {
        let matched = self.list_matching_processes().await;
        if matched.is_empty() {
            return Vec::new();
        }

        let pids: Vec<u32> = matched.iter().map(|(pid, _)| *pid).collect();
        let before = self.sample(pids.clone()).await;
        tokio::time::sleep(self.sample_interval).await;
        let after = self.sample(pids).await;

        let secs = self.sample_interval.as_secs_f64();
        matched
            .into_iter()
            .filter_map(|(pid, item_id)| {
                let (Some(first), Some(second)) = (before.get(&pid), after.get(&pid)) else {
                    debug!("Worker {} for item {} vanished during sampling", pid, item_id);
                    return None;
                };
                let delta = second.saturating_sub(*first);
                Some(ProcessSample {
                    pid,
                    item_id,
                    speed_kbs: delta as f64 / secs / 1024.0,
                })
            })
            .collect()
    }

    /// Terminates every matched process, including ones without an item id.
    pub async fn terminate_matching(&self) -> usize {
        let source = self.source.clone();
        let matcher = self.matcher.clone();
        tokio::task::spawn_blocking(move || {
            source
                .list_processes()
                .into_iter()
                .filter(|p| matcher.matches(p))
                .filter(|p| source.terminate(p.pid))
                .count()
        })
        .await
        .unwrap_or_else(|e| {
            warn!("Terminate task failed: {}", e);
            0
        })
    }

    async fn sample(&self, pids: Vec<u32>) -> std::collections::HashMap<u32, u64> {
        let source = self.source.clone();
        tokio::task::spawn_blocking(move || source.sample_io(&pids))
            .await
            .unwrap_or_default()
    }
}
