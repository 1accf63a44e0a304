use chrono::{DateTime, Utc};
use serde::Serialize;

use super::process::{ProcessInfo, ProcessStatus};

/// Notifications published to every subscriber of the manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum ProcessEvent {
    #[serde(rename = "process-output", rename_all = "camelCase")]
    Output { process_id: String, line: String },
    #[serde(rename = "process-status", rename_all = "camelCase")]
    StatusChanged {
        process_id: String,
        status: ProcessStatus,
        pid: Option<u32>,
        exit_code: Option<i32>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    },
    #[serde(rename = "script-deleted", rename_all = "camelCase")]
    JobDeleted { process_id: String },
}

impl ProcessEvent {
    pub fn status_of(info: &ProcessInfo) -> Self {
        ProcessEvent::StatusChanged {
            process_id: info.id.clone(),
            status: info.status,
            pid: info.pid,
            exit_code: info.exit_code,
            start_time: info.start_time,
            end_time: info.end_time,
        }
    }

    pub fn process_id(&self) -> &str {
        match self {
            ProcessEvent::Output { process_id, .. }
            | ProcessEvent::StatusChanged { process_id, .. }
            | ProcessEvent::JobDeleted { process_id } => process_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_event_serializes_with_tag() {
        let event = ProcessEvent::Output {
            process_id: "job1".into(),
            line: "hello".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "process-output");
        assert_eq!(json["processId"], "job1");
        assert_eq!(json["line"], "hello");
    }

    #[test]
    fn status_event_mirrors_process_info() {
        let mut info = ProcessInfo::new("job1".into(), "job1".into(), String::new());
        info.status = ProcessStatus::Running;
        info.pid = Some(42);
        let event = ProcessEvent::status_of(&info);
        assert_eq!(event.process_id(), "job1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "process-status");
        assert_eq!(json["status"], "running");
        assert_eq!(json["pid"], 42);
    }
}
