//! Access to the OS process table.
//!
//! Everything platform specific sits behind [`ProcessSource`] so the scanner and
//! the job controller can be exercised against a scripted process table.

use std::collections::HashMap;
use std::sync::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System, UpdateKind};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cmd: Vec<String>,
}

pub trait ProcessSource: Send + Sync {
    /// Every process currently visible to us.
    fn list_processes(&self) -> Vec<ProcessInfo>;

    /// Cumulative bytes read by each of `pids`.
    ///
    /// A pid that has exited or cannot be inspected is absent from the result.
    fn sample_io(&self, pids: &[u32]) -> HashMap<u32, u64>;

    /// Asks a process to terminate. Returns whether the signal was delivered.
    fn terminate(&self, pid: u32) -> bool;
}

pub struct SysinfoSource {
    system: Mutex<System>,
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SysinfoSource {
    fn list_processes(&self) -> Vec<ProcessInfo> {
        let Ok(mut system) = self.system.lock() else {
            return Vec::new();
        };
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::OnlyIfNotSet),
        );

        system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().to_string(),
                cmd: process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().to_string())
                    .collect(),
            })
            .collect()
    }

    fn sample_io(&self, pids: &[u32]) -> HashMap<u32, u64> {
        let Ok(mut system) = self.system.lock() else {
            return HashMap::new();
        };
        let targets: Vec<Pid> = pids.iter().map(|pid| Pid::from_u32(*pid)).collect();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&targets),
            true,
            ProcessRefreshKind::nothing().with_disk_usage(),
        );

        targets
            .iter()
            .filter_map(|pid| {
                let process = system.process(*pid)?;
                Some((pid.as_u32(), process.disk_usage().total_read_bytes))
            })
            .collect()
    }

    fn terminate(&self, pid: u32) -> bool {
        let Ok(system) = self.system.lock() else {
            return false;
        };
        match system.process(Pid::from_u32(pid)) {
            Some(process) => process
                .kill_with(Signal::Term)
                .unwrap_or_else(|| process.kill()),
            None => {
                debug!("Process {} is gone, nothing to terminate", pid);
                false
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysinfo_source_sees_own_process() {
        let source = SysinfoSource::new();
        let own = std::process::id();
        let processes = source.list_processes();
        assert!(processes.iter().any(|p| p.pid == own));
    }

    #[test]
    fn test_sysinfo_source_skips_unknown_pid() {
        let source = SysinfoSource::new();
        let samples = source.sample_io(&[u32::MAX - 1]);
        assert!(samples.is_empty());
        assert!(!source.terminate(u32::MAX - 1));
    }
}
