use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// One in-flight item, present only while a matching worker process is seen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDownload {
    pub item_id: String,
    #[serde(rename = "speedKBs")]
    pub speed_kbs: f64,
    pub progress_bytes: u64,
    pub pids: Vec<u32>,
}

/// Snapshot of the whole fleet. A new value replaces the previous one every tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStatus {
    pub active: bool,
    pub total_items: u64,
    pub downloaded: u64,
    pub failed: u64,
    #[serde(rename = "currentSpeedKBs")]
    pub current_speed_kbs: f64,
    /// Seconds until the job is expected to finish.
    #[serde(rename = "eta")]
    pub eta_secs: Option<u64>,
    pub active_downloads: Vec<ActiveDownload>,
    pub updated_at: DateTime<Utc>,
}

impl FleetStatus {
    pub fn idle(total_items: u64) -> Self {
        Self {
            active: false,
            total_items,
            downloaded: 0,
            failed: 0,
            current_speed_kbs: 0.0,
            eta_secs: None,
            active_downloads: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn to_event(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "status_update",
            "data": self,
        })
    }
}

/// Holder of the canonical snapshot.
///
/// The aggregator is the only writer; every publish swaps the whole `Arc`, so
/// readers see either the previous snapshot or the new one and nothing in between.
#[derive(Clone)]
pub struct StatusStore {
    tx: Arc<watch::Sender<Arc<FleetStatus>>>,
}

impl StatusStore {
    pub fn new(initial: FleetStatus) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, status: FleetStatus) -> Arc<FleetStatus> {
        let status = Arc::new(status);
        self.tx.send_replace(status.clone());
        status
    }

    pub fn current(&self) -> Arc<FleetStatus> {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_replaces_whole_snapshot() {
        let store = StatusStore::new(FleetStatus::idle(10));
        let before = store.current();

        let mut next = FleetStatus::idle(10);
        next.active = true;
        next.downloaded = 3;
        store.publish(next);

        let after = store.current();
        assert!(!before.active);
        assert_eq!(before.downloaded, 0);
        assert!(after.active);
        assert_eq!(after.downloaded, 3);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let mut status = FleetStatus::idle(5);
        status.active_downloads.push(ActiveDownload {
            item_id: "42".to_string(),
            speed_kbs: 1.5,
            progress_bytes: 100,
            pids: vec![7],
        });
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["totalItems"], 5);
        assert_eq!(json["currentSpeedKBs"], 0.0);
        assert!(json["eta"].is_null());
        assert_eq!(json["activeDownloads"][0]["itemId"], "42");
        assert_eq!(json["activeDownloads"][0]["speedKBs"], 1.5);
        assert_eq!(json["activeDownloads"][0]["progressBytes"], 100);
    }
}
