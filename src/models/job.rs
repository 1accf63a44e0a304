//! Declarative job descriptions as they appear in `scripts-config.json`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub kind: JobKind,
    /// Stored for the calendar editor. Nothing in the manager reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

pub const DEFAULT_INTERPRETER: &str = "python";

impl JobConfig {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Program and arguments of a `simple` job, falling back to `python -u <id>.py`.
    pub fn simple_command(&self) -> Option<(String, Vec<String>)> {
        match &self.kind {
            JobKind::Simple { command, args, .. } => {
                let program = command
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string());
                let args = args
                    .clone()
                    .unwrap_or_else(|| vec!["-u".to_string(), format!("{}.py", self.id)]);
                Some((program, args))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobKind {
    Simple {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },
    Shell {
        #[serde(default)]
        shell: ShellDialect,
        #[serde(alias = "command")]
        script: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },
    Complex {
        #[serde(default)]
        steps: Vec<Step>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellDialect {
    #[default]
    Sh,
    Bash,
    #[serde(alias = "pwsh")]
    Powershell,
    Cmd,
}

impl ShellDialect {
    /// Interpreter and the flags that precede the script text.
    pub fn interpreter(self) -> (&'static str, &'static [&'static str]) {
        match self {
            ShellDialect::Sh => ("sh", &["-c"]),
            ShellDialect::Bash => ("bash", &["-c"]),
            ShellDialect::Powershell => ("pwsh", &["-NoProfile", "-Command"]),
            ShellDialect::Cmd => ("cmd", &["/C"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default)]
    pub description: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_cwd")]
    pub cwd: String,
}

impl Step {
    /// The step as one shell command line; `command` may itself carry
    /// arguments or shell syntax.
    pub fn shell_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn default_cwd() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    #[serde(default)]
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_month: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_dates: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_dates: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_day_of_month: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_day_of_month: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdays_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colombia_holidays: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Daily,
    Weekly,
    Monthly,
    Custom,
    Workdays,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_job_with_defaults() {
        let job: JobConfig =
            serde_json::from_str(r#"{"id":"job1","type":"simple","command":"true","args":[]}"#)
                .unwrap();
        assert_eq!(job.display_name(), "job1");
        assert_eq!(
            job.kind,
            JobKind::Simple {
                command: Some("true".into()),
                args: Some(vec![]),
                cwd: None,
            }
        );
        assert!(job.schedule.is_none());
    }

    #[test]
    fn simple_job_without_command_runs_python_script_named_after_id() {
        let job: JobConfig = serde_json::from_str(r#"{"id":"report","type":"simple"}"#).unwrap();
        let (program, args) = job.simple_command().unwrap();
        assert_eq!(program, "python");
        assert_eq!(args, vec!["-u".to_string(), "report.py".to_string()]);
    }

    #[test]
    fn parses_shell_job_and_dialect() {
        let job: JobConfig = serde_json::from_str(
            r#"{"id":"etl","name":"ETL","type":"shell","shell":"powershell",
                "script":"echo hi","cwd":"etl"}"#,
        )
        .unwrap();
        assert_eq!(job.display_name(), "ETL");
        match job.kind {
            JobKind::Shell { shell, script, cwd } => {
                assert_eq!(shell, ShellDialect::Powershell);
                assert_eq!(script, "echo hi");
                assert_eq!(cwd.as_deref(), Some("etl"));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn shell_dialect_defaults_to_sh() {
        let job: JobConfig =
            serde_json::from_str(r#"{"id":"s","type":"shell","command":"ls | wc -l"}"#).unwrap();
        assert!(matches!(
            job.kind,
            JobKind::Shell { shell: ShellDialect::Sh, .. }
        ));
    }

    #[test]
    fn parses_complex_steps_in_order() {
        let job: JobConfig = serde_json::from_str(
            r#"{"id":"multi","type":"complex","steps":[
                {"description":"fetch","command":"curl","args":["-O","x"]},
                {"description":"load","command":"python","args":["load.py"],"cwd":"db"}
            ]}"#,
        )
        .unwrap();
        let JobKind::Complex { steps } = job.kind else {
            panic!("expected complex job");
        };
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].cwd, ".");
        assert_eq!(steps[1].command, "python");
        assert_eq!(steps[1].cwd, "db");
        assert_eq!(steps[1].shell_line(), "python load.py");
    }

    #[test]
    fn step_command_may_carry_its_own_arguments() {
        let step: Step =
            serde_json::from_str(r#"{"command":"python -u main.py","args":["--fast"]}"#).unwrap();
        assert_eq!(step.shell_line(), "python -u main.py --fast");
    }

    #[test]
    fn keeps_schedule_as_plain_data() {
        let job: JobConfig = serde_json::from_str(
            r#"{"id":"nightly","type":"simple","schedule":{
                "enabled":true,"type":"weekly","time":"02:30",
                "daysOfWeek":[1,3,5],"workdaysOnly":true
            }}"#,
        )
        .unwrap();
        let schedule = job.schedule.unwrap();
        assert!(schedule.enabled);
        assert_eq!(schedule.kind, ScheduleKind::Weekly);
        assert_eq!(schedule.days_of_week, Some(vec![1, 3, 5]));
        assert_eq!(schedule.workdays_only, Some(true));
    }

    #[test]
    fn rejects_unknown_type_tag() {
        let parsed = serde_json::from_str::<JobConfig>(r#"{"id":"x","type":"cron"}"#);
        assert!(parsed.is_err());
    }
}
