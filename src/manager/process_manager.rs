use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::archive::log_archive::LogArchive;
use crate::config::options::ManagerOptions;
use crate::config::store::{ConfigStore, Validation};
use crate::error::ManagerError;
use crate::manager::events::EventBus;
use crate::manager::registry::ProcessRegistry;
use crate::manager::spawner::{self, Invocation, SpawnedProcess};
use crate::manager::stop;
use crate::models::event::ProcessEvent;
use crate::models::job::JobConfig;
use crate::models::log_entry::LogEntry;
use crate::models::message::ProcessMessage;
use crate::models::process::ProcessInfo;
use crate::worker::output::{self, ERROR_PREFIX};
use crate::worker::worker::spawn_worker_thread;

/// Everything the manager mutates, behind one lock.
pub struct ManagerState {
    pub(crate) registry: ProcessRegistry,
    pub(crate) archive: LogArchive,
    pub(crate) store: ConfigStore,
}

impl ManagerState {
    /// Archives a terminal snapshot, then announces it.
    pub(crate) fn settle(&mut self, snapshot: &ProcessInfo, events: &EventBus) {
        self.archive.append(snapshot);
        events.publish(ProcessEvent::status_of(snapshot));
    }
}

pub struct ProcessManager {
    state: Arc<Mutex<ManagerState>>,
    events: EventBus,
    sender: Sender<ProcessMessage>,
    options: ManagerOptions,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessManager {
    /// Loads history and job configuration, then starts the event loop.
    pub fn new(options: ManagerOptions) -> Self {
        let archive = LogArchive::open(&options.logs_dir);
        let mut store = ConfigStore::new(&options.root, &options.config_file);
        store.load();
        let mut registry = ProcessRegistry::new();
        registry.sync(store.all());

        let (sender, receiver) = unbounded();
        let events = EventBus::new();
        let state = Arc::new(Mutex::new(ManagerState {
            registry,
            archive,
            store,
        }));
        let worker = spawn_worker_thread(receiver, Arc::clone(&state), events.clone());

        ProcessManager {
            state,
            events,
            sender,
            options,
            worker: Mutex::new(Some(worker)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn subscribe(&self) -> Receiver<ProcessEvent> {
        self.events.subscribe()
    }

    /// Launches the job and returns its pid. A spawn failure still counts as
    /// a run: the job ends up `crashed` and the attempt is archived.
    pub fn start(&self, id: &str) -> Result<u32, ManagerError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        state.registry.ensure_startable(id)?;
        let config = state
            .store
            .get(id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;
        let invocation = Invocation::resolve(config, state.store.root())?;

        match spawner::spawn(id, &invocation) {
            Ok(SpawnedProcess {
                mut child,
                pid,
                started_at,
            }) => {
                let info = match state.registry.begin_run(id, pid, started_at) {
                    Ok(info) => info,
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(e);
                    }
                };
                self.events.publish(ProcessEvent::status_of(info));
                output::collect(id, child, &self.sender);
                Ok(pid)
            }
            Err(source) => {
                error!("Failed to start process '{}': {}", id, source);
                let line = format!("{}PROCESS ERROR: {}", ERROR_PREFIX, source);
                if let Some(snapshot) = state.registry.fail_spawn(id, line.clone(), Utc::now()) {
                    self.events.publish(ProcessEvent::Output {
                        process_id: id.to_string(),
                        line,
                    });
                    state.settle(&snapshot, &self.events);
                }
                Err(ManagerError::Spawn {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }

    /// Requests termination. The outcome arrives later as a `stopped` status.
    pub fn stop(&self, id: &str) -> Result<(), ManagerError> {
        let mut state = self.lock();
        let already_pending = state.registry.is_stop_pending(id);
        let pid = state.registry.mark_stop(id)?;
        info!("Stopping process '{}' with PID {}", id, pid);

        if let Err(source) = stop::terminate(pid) {
            if source.raw_os_error() != Some(libc::ESRCH) {
                if !already_pending {
                    state.registry.unmark_stop(id);
                }
                return Err(ManagerError::Signal {
                    id: id.to_string(),
                    source,
                });
            }
            debug!("Process '{}' is already exiting", id);
        }

        if !state.registry.has_deadline(id) {
            let token = stop::arm_deadline(id, pid, self.options.stop_grace);
            state.registry.arm_deadline(id, token);
        }
        Ok(())
    }

    pub fn clear_output(&self, id: &str) -> Result<(), ManagerError> {
        self.lock().registry.clear_output(id)
    }

    pub fn delete_job(&self, id: &str) -> Result<(), ManagerError> {
        let mut state = self.lock();
        state.registry.remove(id)?;
        state.store.remove(id);
        info!("Deleted process '{}'", id);
        self.events.publish(ProcessEvent::JobDeleted {
            process_id: id.to_string(),
        });
        Ok(())
    }

    pub fn get_all(&self) -> Vec<ProcessInfo> {
        self.lock().registry.all()
    }

    pub fn get(&self, id: &str) -> Option<ProcessInfo> {
        self.lock().registry.get(id).cloned()
    }

    pub fn list_logs(&self, id: &str) -> Vec<LogEntry> {
        self.lock().archive.list_for(id).to_vec()
    }

    pub fn get_log(&self, id: &str, log_id: &str) -> Option<LogEntry> {
        self.lock().archive.get(id, log_id).cloned()
    }

    pub fn latest_log(&self, id: &str) -> Option<LogEntry> {
        self.lock().archive.latest_for(id).cloned()
    }

    pub fn validate(&self, id: &str) -> Validation {
        self.lock().store.validate(id)
    }

    pub fn job_configs(&self) -> Vec<JobConfig> {
        self.lock().store.all().to_vec()
    }

    pub fn job_config(&self, id: &str) -> Option<JobConfig> {
        self.lock().store.get(id).cloned()
    }

    /// Re-reads the configuration file and reconciles the process table.
    pub fn reload_configs(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.store.load();
        state.registry.sync(state.store.all());
    }

    pub fn is_stop_pending(&self, id: &str) -> bool {
        self.lock().registry.is_stop_pending(id)
    }

    pub fn running_count(&self) -> usize {
        self.lock().registry.running_ids().len()
    }

    pub fn stop_all(&self) {
        let running = self.lock().registry.running_ids();
        for id in running {
            if let Err(e) = self.stop(&id) {
                warn!("{}", e);
            }
        }
    }

    /// Stops every job, waits up to `timeout` for their exits to be
    /// archived, then ends the event loop.
    pub fn shutdown(&self, timeout: Duration) {
        let events = self.subscribe();
        self.stop_all();

        let deadline = Instant::now() + timeout;
        while self.running_count() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("{} processes still running at shutdown", self.running_count());
                break;
            }
            let _ = events.recv_timeout(remaining.min(Duration::from_millis(100)));
        }

        let _ = self.sender.send(ProcessMessage::Shutdown);
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("Event loop panicked");
            }
        }
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        let _ = self.sender.send(ProcessMessage::Shutdown);
    }
}
