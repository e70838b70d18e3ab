use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server_port: u16,
    pub download_dir: PathBuf,
    pub success_log: PathBuf,
    pub failure_log: PathBuf,
    pub metadata_dir: PathBuf,
    pub downloader_command: PathBuf,
    pub worker_binary: String,
    pub output_extension: String,
    pub success_marker: String,
    pub total_items: u64,
    pub poll_interval_ms: u64,
    pub sample_interval_ms: u64,
    pub broadcast_capacity: usize,
    pub log_level: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let root = std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "/storage".to_string());

        Self::defaults(&root)?
            // Config file (optional)
            .add_source(File::with_name("config").required(false))
            // Environment variables (e.g. FLEETWATCH_SERVER_PORT=8080)
            .add_source(Environment::with_prefix("FLEETWATCH"))
            .build()?
            .try_deserialize()
    }

    /// Built-in values, with every path laid out under `root`.
    fn defaults(root: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let library = format!("{}/library", root.trim_end_matches('/'));

        Config::builder()
            .set_default("server_port", 5000)?
            .set_default("download_dir", format!("{}/gutenberg", library))?
            .set_default("success_log", format!("{}/download_progress.log", library))?
            .set_default("failure_log", format!("{}/failed_downloads.log", library))?
            .set_default("metadata_dir", format!("{}/.metadata", library))?
            .set_default("downloader_command", "/usr/local/bin/gutenberg_downloader.sh")?
            .set_default("worker_binary", "wget")?
            .set_default("output_extension", "txt")?
            .set_default("success_marker", ":SUCCESS")?
            .set_default("total_items", 0)?
            .set_default("poll_interval_ms", 1000)?
            .set_default("sample_interval_ms", 1000)?
            .set_default("broadcast_capacity", 16)?
            .set_default("log_level", "info")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    #[cfg(test)]
    pub fn for_root(root: &std::path::Path) -> Self {
        let library = root.join("library");
        Self {
            server_port: 0,
            download_dir: library.join("gutenberg"),
            success_log: library.join("download_progress.log"),
            failure_log: library.join("failed_downloads.log"),
            metadata_dir: library.join(".metadata"),
            downloader_command: PathBuf::from("true"),
            worker_binary: "wget".to_string(),
            output_extension: "txt".to_string(),
            success_marker: ":SUCCESS".to_string(),
            total_items: 0,
            poll_interval_ms: 10,
            sample_interval_ms: 10,
            broadcast_capacity: 16,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_storage_layout() {
        let settings: Settings = Settings::defaults("/storage/")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.server_port, 5000);
        assert_eq!(
            settings.download_dir,
            PathBuf::from("/storage/library/gutenberg")
        );
        assert_eq!(
            settings.success_log,
            PathBuf::from("/storage/library/download_progress.log")
        );
        assert_eq!(
            settings.failure_log,
            PathBuf::from("/storage/library/failed_downloads.log")
        );
        assert_eq!(settings.metadata_dir, PathBuf::from("/storage/library/.metadata"));
        assert_eq!(settings.worker_binary, "wget");
        assert_eq!(settings.success_marker, ":SUCCESS");
        assert_eq!(settings.total_items, 0);
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_defaults_follow_custom_root() {
        let settings: Settings = Settings::defaults("/mnt/data")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.download_dir, PathBuf::from("/mnt/data/library/gutenberg"));
        assert_eq!(settings.metadata_dir, PathBuf::from("/mnt/data/library/.metadata"));
    }
}
