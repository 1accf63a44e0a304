use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::process::{ProcessInfo, ProcessStatus};

/// Snapshot of one finished run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub log_id: String,
    pub process_id: String,
    pub process_name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub status: ProcessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub output: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl LogEntry {
    pub fn from_snapshot(log_id: String, info: &ProcessInfo, created_at: DateTime<Utc>) -> Self {
        let duration_ms = match (info.start_time, info.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        };
        Self {
            log_id,
            process_id: info.id.clone(),
            process_name: info.name.clone(),
            start_time: info.start_time.unwrap_or(created_at),
            end_time: info.end_time,
            duration_ms,
            status: info.status,
            exit_code: info.exit_code,
            output: info.output.clone(),
            pid: info.pid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn duration_is_end_minus_start() {
        let start = Utc::now();
        let mut info = ProcessInfo::new("job1".into(), "Job".into(), String::new());
        info.status = ProcessStatus::Completed;
        info.start_time = Some(start);
        info.end_time = Some(start + Duration::milliseconds(1500));
        info.exit_code = Some(0);
        info.output = vec!["done".into()];

        let entry = LogEntry::from_snapshot("job1_1".into(), &info, start);
        assert_eq!(entry.duration_ms, Some(1500));
        assert_eq!(entry.process_name, "Job");
        assert_eq!(entry.output, vec!["done".to_string()]);
    }

    #[test]
    fn missing_start_falls_back_to_creation_time() {
        let now = Utc::now();
        let info = ProcessInfo::new("job1".into(), "job1".into(), String::new());
        let entry = LogEntry::from_snapshot("job1_2".into(), &info, now);
        assert_eq!(entry.start_time, now);
        assert!(entry.duration_ms.is_none());
    }
}
