use crate::aggregator::Aggregator;
use crate::progress::{ProgressCounts, ProgressReader};
use crate::state::AppState;
use crate::status::FleetStatus;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub fn start_background_tasks(state: AppState) {
    tokio::spawn(async move {
        let mut poller = Poller::new(state.clone());
        let mut interval = tokio::time::interval(state.settings.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Status poller started (every {:?}), watching {:?}",
            state.settings.poll_interval(),
            state.settings.download_dir
        );

        loop {
            interval.tick().await;
            poller.tick().await;
        }
    });
}

/// One iteration of the status loop. The poller is the only writer of the
/// canonical snapshot.
pub struct Poller {
    state: AppState,
    reader: ProgressReader,
    aggregator: Aggregator,
    was_active: bool,
}

impl Poller {
    pub fn new(state: AppState) -> Self {
        let settings = &state.settings;
        let reader = ProgressReader::new(
            settings.success_log.clone(),
            settings.failure_log.clone(),
            settings.success_marker.clone(),
        );
        let aggregator = Aggregator::new(
            settings.download_dir.clone(),
            settings.output_extension.clone(),
            settings.total_items,
        );

        Self {
            state,
            reader,
            aggregator,
            was_active: false,
        }
    }

    /// Returns the snapshot published by this tick, if any.
    pub async fn tick(&mut self) -> Option<Arc<FleetStatus>> {
        if !self.state.controller.is_active() {
            self.was_active = false;
            return None;
        }

        let counts = self.read_counts().await;
        if !self.was_active {
            self.aggregator.begin_run(counts);
            self.was_active = true;
        }

        let samples = self.state.scanner.scan().await;
        let snapshot = self.aggregator.build(counts, samples).await;

        // The job may have been stopped while we were sampling. Holding the
        // transition lock keeps a stop from landing between check and publish.
        let _transition = self.state.controller.lock_transitions().await;
        if !self.state.controller.is_active() {
            debug!("Job stopped during scan, discarding snapshot");
            self.was_active = false;
            return None;
        }

        let published = self.state.status.publish(snapshot);
        let observers = self.state.broadcaster.publish(&published);
        debug!(
            "Published status: {} downloaded, {} failed, {} active, {} observers",
            published.downloaded,
            published.failed,
            published.active_downloads.len(),
            observers
        );
        Some(published)
    }

    /// Falls back to the last published counts when a log cannot be read.
    async fn read_counts(&self) -> ProgressCounts {
        match self.reader.read().await {
            Ok(counts) => counts,
            Err(e) => {
                warn!("Failed to read progress logs: {}", e);
                let last = self.state.status.current();
                ProgressCounts {
                    downloaded: last.downloaded,
                    failed: last.failed,
                }
            }
        }
    }
}
