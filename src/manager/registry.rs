//! Per-job lifecycle state.
//!
//! A live handle exists for an id exactly while its status is `running`; every
//! status change goes through the transition methods below.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::error::ManagerError;
use crate::manager::stop::DeadlineToken;
use crate::models::job::JobConfig;
use crate::models::process::{ProcessInfo, ProcessStatus};

pub struct LiveHandle {
    pub pid: u32,
    deadline: Option<DeadlineToken>,
}

#[derive(Default)]
pub struct ProcessRegistry {
    processes: BTreeMap<String, ProcessInfo>,
    live: HashMap<String, LiveHandle>,
    pending_stop: HashSet<String>,
}

/// Outcome of an observed exit.
pub fn classify(exit_code: Option<i32>, manual_stop: bool) -> ProcessStatus {
    if manual_stop {
        ProcessStatus::Stopped
    } else if exit_code == Some(0) {
        ProcessStatus::Completed
    } else {
        ProcessStatus::Crashed
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Brings the table in line with the configured jobs. Running jobs that
    /// left the configuration are kept until they finish.
    pub fn sync(&mut self, configs: &[JobConfig]) {
        let live = &self.live;
        self.processes.retain(|id, _| {
            let keep = configs.iter().any(|config| &config.id == id) || live.contains_key(id);
            if !keep {
                info!("Removed process '{}' (no longer configured)", id);
            }
            keep
        });

        for config in configs {
            match self.processes.get_mut(&config.id) {
                Some(info) => {
                    info.name = config.display_name().to_string();
                    info.description = config.description.clone();
                }
                None => {
                    self.processes.insert(
                        config.id.clone(),
                        ProcessInfo::new(
                            config.id.clone(),
                            config.display_name().to_string(),
                            config.description.clone(),
                        ),
                    );
                }
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ProcessInfo> {
        self.processes.get(id)
    }

    pub fn all(&self) -> Vec<ProcessInfo> {
        self.processes.values().cloned().collect()
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.live.contains_key(id)
    }

    pub fn is_stop_pending(&self, id: &str) -> bool {
        self.pending_stop.contains(id)
    }

    pub fn live_pid(&self, id: &str) -> Option<u32> {
        self.live.get(id).map(|handle| handle.pid)
    }

    pub fn running_ids(&self) -> Vec<String> {
        self.live.keys().cloned().collect()
    }

    pub fn ensure_startable(&self, id: &str) -> Result<(), ManagerError> {
        if !self.processes.contains_key(id) {
            return Err(ManagerError::NotFound(id.to_string()));
        }
        if self.live.contains_key(id) {
            return Err(ManagerError::AlreadyRunning(id.to_string()));
        }
        Ok(())
    }

    /// `* -> running`. Clears what the previous run left behind.
    pub fn begin_run(
        &mut self,
        id: &str,
        pid: u32,
        started_at: DateTime<Utc>,
    ) -> Result<&ProcessInfo, ManagerError> {
        self.ensure_startable(id)?;
        let info = self
            .processes
            .get_mut(id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;

        info.status = ProcessStatus::Running;
        info.pid = Some(pid);
        info.start_time = Some(started_at);
        info.end_time = None;
        info.exit_code = None;
        info.output.clear();
        self.pending_stop.remove(id);
        self.live.insert(id.to_string(), LiveHandle { pid, deadline: None });
        info!("Process '{}' running with PID {}", id, pid);
        Ok(info)
    }

    /// `* -> crashed` without ever holding a live handle.
    pub fn fail_spawn(
        &mut self,
        id: &str,
        line: String,
        at: DateTime<Utc>,
    ) -> Option<ProcessInfo> {
        if self.live.contains_key(id) {
            return None;
        }
        let info = self.processes.get_mut(id)?;
        info.status = ProcessStatus::Crashed;
        info.pid = None;
        info.start_time = Some(at);
        info.end_time = Some(at);
        info.exit_code = None;
        info.output.clear();
        info.output.push(line);
        Some(info.clone())
    }

    /// `running -> completed | crashed | stopped`. Returns the terminal
    /// snapshot, or `None` when the id has no live handle.
    pub fn finish_run(
        &mut self,
        id: &str,
        exit_code: Option<i32>,
        ended_at: DateTime<Utc>,
    ) -> Option<ProcessInfo> {
        let Some(handle) = self.live.remove(id) else {
            warn!("Exit reported for '{}' which has no live process", id);
            return None;
        };
        if handle.deadline.is_some() {
            debug!("Cancelling forced stop of '{}'", id);
        }
        drop(handle);

        let manual = self.pending_stop.remove(id);
        let status = classify(exit_code, manual);
        let info = self.processes.get_mut(id)?;
        info.status = status;
        info.end_time = Some(ended_at);
        info.exit_code = exit_code;
        info!("Process '{}' {} (exit code {:?})", id, status, exit_code);
        Some(info.clone())
    }

    /// Marks an operator stop and returns the pid to signal.
    pub fn mark_stop(&mut self, id: &str) -> Result<u32, ManagerError> {
        let pid = self
            .live_pid(id)
            .ok_or_else(|| ManagerError::NotRunning(id.to_string()))?;
        self.pending_stop.insert(id.to_string());
        Ok(pid)
    }

    pub fn unmark_stop(&mut self, id: &str) {
        self.pending_stop.remove(id);
    }

    /// Stores the forced-kill deadline with the live handle. Returns `false`
    /// (dropping and thereby cancelling the token) when one is already armed
    /// or the process is gone.
    pub fn arm_deadline(&mut self, id: &str, token: DeadlineToken) -> bool {
        match self.live.get_mut(id) {
            Some(handle) if handle.deadline.is_none() => {
                handle.deadline = Some(token);
                true
            }
            _ => false,
        }
    }

    pub fn has_deadline(&self, id: &str) -> bool {
        self.live
            .get(id)
            .is_some_and(|handle| handle.deadline.is_some())
    }

    /// Returns `true` if the line was recorded.
    pub fn append_output(&mut self, id: &str, line: String) -> bool {
        match self.processes.get_mut(id) {
            Some(info) => {
                info.output.push(line);
                true
            }
            None => false,
        }
    }

    pub fn clear_output(&mut self, id: &str) -> Result<(), ManagerError> {
        let info = self
            .processes
            .get_mut(id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;
        info.output.clear();
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<ProcessInfo, ManagerError> {
        if self.live.contains_key(id) {
            return Err(ManagerError::DeleteRejected(id.to_string()));
        }
        self.processes
            .remove(id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))
    }
}
