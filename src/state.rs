use crate::broadcast::Broadcaster;
use crate::config::Settings;
use crate::controller::JobController;
use crate::metadata::MetadataStore;
use crate::process::ProcessSource;
use crate::scanner::{JobMatcher, Scanner};
use crate::status::{FleetStatus, StatusStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub status: StatusStore,
    pub broadcaster: Broadcaster,
    pub scanner: Arc<Scanner>,
    pub controller: Arc<JobController>,
}

impl AppState {
    pub fn new(settings: Settings, source: Arc<dyn ProcessSource>) -> Self {
        let scanner = Arc::new(Scanner::new(
            source,
            JobMatcher::from_settings(&settings),
            settings.sample_interval(),
        ));
        let controller = Arc::new(JobController::new(
            settings.downloader_command.clone(),
            scanner.clone(),
            MetadataStore::new(settings.metadata_dir.clone()),
        ));

        Self {
            status: StatusStore::new(FleetStatus::idle(settings.total_items)),
            broadcaster: Broadcaster::new(settings.broadcast_capacity),
            scanner,
            controller,
            settings,
        }
    }
}
