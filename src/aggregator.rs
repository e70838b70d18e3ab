//! Builds one [`FleetStatus`] per tick from log counts and process samples.

use crate::progress::{ProgressCounts, partial_progress};
use crate::scanner::ProcessSample;
use crate::status::{ActiveDownload, FleetStatus};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::time::Instant;

/// Completion-rate ETA measured from the moment the job was last started.
#[derive(Debug)]
struct EtaBaseline {
    started_at: Instant,
    finished_at_start: u64,
}

pub struct Aggregator {
    download_dir: PathBuf,
    extension: String,
    configured_total: u64,
    baseline: Option<EtaBaseline>,
}

impl Aggregator {
    pub fn new(download_dir: PathBuf, extension: String, configured_total: u64) -> Self {
        Self {
            download_dir,
            extension,
            configured_total,
            baseline: None,
        }
    }

    /// Marks the start of an active run. Items already finished before this
    /// point do not count towards the completion rate.
    pub fn begin_run(&mut self, counts: ProgressCounts) {
        self.baseline = Some(EtaBaseline {
            started_at: Instant::now(),
            finished_at_start: counts.finished(),
        });
    }

    pub async fn build(&self, counts: ProgressCounts, samples: Vec<ProcessSample>) -> FleetStatus {
        let mut by_item: BTreeMap<String, (f64, Vec<u32>)> = BTreeMap::new();
        for sample in samples {
            let entry = by_item.entry(sample.item_id).or_default();
            entry.0 += sample.speed_kbs;
            if !entry.1.contains(&sample.pid) {
                entry.1.push(sample.pid);
            }
        }

        let mut active_downloads = Vec::with_capacity(by_item.len());
        for (item_id, (speed_kbs, pids)) in by_item {
            let progress_bytes =
                partial_progress(&self.download_dir, &item_id, &self.extension).await;
            active_downloads.push(ActiveDownload {
                item_id,
                speed_kbs,
                progress_bytes,
                pids,
            });
        }

        let current_speed_kbs = active_downloads.iter().map(|d| d.speed_kbs).sum();
        let total_items = self.configured_total.max(counts.finished());

        FleetStatus {
            active: true,
            total_items,
            downloaded: counts.downloaded,
            failed: counts.failed,
            current_speed_kbs,
            eta_secs: self.estimate_eta(counts, total_items),
            active_downloads,
            updated_at: Utc::now(),
        }
    }

    fn estimate_eta(&self, counts: ProgressCounts, total_items: u64) -> Option<u64> {
        if self.configured_total == 0 {
            return None;
        }
        let remaining = total_items.saturating_sub(counts.finished());
        if remaining == 0 {
            return Some(0);
        }

        let baseline = self.baseline.as_ref()?;
        let done = counts.finished().checked_sub(baseline.finished_at_start)?;
        let elapsed = baseline.started_at.elapsed().as_secs_f64();
        if done == 0 || elapsed <= 0.0 {
            return None;
        }

        let per_sec = done as f64 / elapsed;
        Some((remaining as f64 / per_sec).ceil() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn sample(pid: u32, item_id: &str, speed_kbs: f64) -> ProcessSample {
        ProcessSample {
            pid,
            item_id: item_id.to_string(),
            speed_kbs,
        }
    }

    #[tokio::test]
    async fn test_counts_respect_total() {
        let tmp = tempdir().unwrap();
        let aggregator = Aggregator::new(tmp.path().to_path_buf(), "txt".to_string(), 10);
        let counts = ProgressCounts {
            downloaded: 3,
            failed: 1,
        };

        let status = aggregator.build(counts, vec![]).await;
        assert!(status.active);
        assert_eq!(status.downloaded, 3);
        assert_eq!(status.failed, 1);
        assert_eq!(status.total_items, 10);
        assert!(status.downloaded + status.failed <= status.total_items);
    }

    #[tokio::test]
    async fn test_total_never_below_finished() {
        let tmp = tempdir().unwrap();
        let counts = ProgressCounts {
            downloaded: 8,
            failed: 4,
        };

        let unknown = Aggregator::new(tmp.path().to_path_buf(), "txt".to_string(), 0);
        assert_eq!(unknown.build(counts, vec![]).await.total_items, 12);

        let stale = Aggregator::new(tmp.path().to_path_buf(), "txt".to_string(), 10);
        assert_eq!(stale.build(counts, vec![]).await.total_items, 12);
    }

    #[tokio::test]
    async fn test_one_entry_per_item() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("7.txt.part"), vec![0u8; 512]).unwrap();
        let aggregator = Aggregator::new(tmp.path().to_path_buf(), "txt".to_string(), 0);

        let status = aggregator
            .build(
                ProgressCounts::default(),
                vec![
                    sample(1, "7", 10.0),
                    sample(2, "3", 1.0),
                    sample(3, "7", 5.0),
                ],
            )
            .await;

        let ids: Vec<&str> = status
            .active_downloads
            .iter()
            .map(|d| d.item_id.as_str())
            .collect();
        assert_eq!(ids, vec!["3", "7"]);

        let seven = &status.active_downloads[1];
        assert_eq!(seven.speed_kbs, 15.0);
        assert_eq!(seven.pids, vec![1, 3]);
        assert_eq!(seven.progress_bytes, 512);
        assert_eq!(status.active_downloads[0].progress_bytes, 0);
        assert_eq!(status.current_speed_kbs, 16.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eta_from_completion_rate() {
        let tmp = tempdir().unwrap();
        let mut aggregator = Aggregator::new(tmp.path().to_path_buf(), "txt".to_string(), 100);
        aggregator.begin_run(ProgressCounts {
            downloaded: 20,
            failed: 0,
        });

        let status = aggregator
            .build(
                ProgressCounts {
                    downloaded: 20,
                    failed: 0,
                },
                vec![],
            )
            .await;
        assert_eq!(status.eta_secs, None);

        tokio::time::advance(Duration::from_secs(10)).await;
        // 10 items in 10s, 70 left.
        let status = aggregator
            .build(
                ProgressCounts {
                    downloaded: 28,
                    failed: 2,
                },
                vec![],
            )
            .await;
        assert_eq!(status.eta_secs, Some(70));
    }

    #[tokio::test]
    async fn test_eta_unknown_without_total_and_zero_when_done() {
        let tmp = tempdir().unwrap();
        let mut unknown = Aggregator::new(tmp.path().to_path_buf(), "txt".to_string(), 0);
        unknown.begin_run(ProgressCounts::default());
        let counts = ProgressCounts {
            downloaded: 5,
            failed: 0,
        };
        assert_eq!(unknown.build(counts, vec![]).await.eta_secs, None);

        let done = Aggregator::new(tmp.path().to_path_buf(), "txt".to_string(), 5);
        assert_eq!(done.build(counts, vec![]).await.eta_secs, Some(0));
    }
}
