use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use crossbeam_channel::Receiver;
use log::{debug, error, info};

use crate::manager::events::EventBus;
use crate::manager::process_manager::ManagerState;
use crate::models::event::ProcessEvent;
use crate::models::message::ProcessMessage;
use crate::worker::output::ERROR_PREFIX;

/// Runs the manager's event loop: the single place where output and exits of
/// running jobs are applied to the registry.
pub fn spawn_worker_thread(
    receiver: Receiver<ProcessMessage>,
    state: Arc<Mutex<ManagerState>>,
    events: EventBus,
) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            match receiver.recv() {
                Ok(message) => match message {
                    ProcessMessage::WriteOutput(id, line) => {
                        handle_output_write(&id, line, &state, &events)
                    }
                    ProcessMessage::Exited(id, code) => handle_exit(&id, code, &state, &events),
                    ProcessMessage::WaitFailed(id, reason) => {
                        handle_wait_failure(&id, &reason, &state, &events)
                    }
                    ProcessMessage::Shutdown => {
                        info!("Event loop shutting down");
                        break;
                    }
                },
                Err(e) => {
                    error!("Failed to receive message: {}", e);
                    break;
                }
            }
        }
    })
}

fn handle_output_write(
    id: &str,
    line: String,
    state: &Arc<Mutex<ManagerState>>,
    events: &EventBus,
) {
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    if state.registry.append_output(id, line.clone()) {
        events.publish(ProcessEvent::Output {
            process_id: id.to_string(),
            line,
        });
    } else {
        debug!("Dropping output for unknown process '{}'", id);
    }
}

fn handle_exit(
    id: &str,
    exit_code: Option<i32>,
    state: &Arc<Mutex<ManagerState>>,
    events: &EventBus,
) {
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(snapshot) = state.registry.finish_run(id, exit_code, Utc::now()) {
        state.settle(&snapshot, events);
    }
}

fn handle_wait_failure(
    id: &str,
    reason: &str,
    state: &Arc<Mutex<ManagerState>>,
    events: &EventBus,
) {
    let line = format!("{}PROCESS ERROR: {}", ERROR_PREFIX, reason);
    handle_output_write(id, line, state, events);
    handle_exit(id, None, state, events);
}
