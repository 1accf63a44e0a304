use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::config::store::job_dir;
use crate::error::ManagerError;
use crate::models::job::{JobConfig, JobKind, ShellDialect};

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

pub struct SpawnedProcess {
    pub child: Child,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl Invocation {
    pub fn resolve(config: &JobConfig, root: &Path) -> Result<Self, ManagerError> {
        match &config.kind {
            JobKind::Simple { cwd, .. } => {
                let (program, args) = config.simple_command().ok_or_else(|| {
                    ManagerError::InvalidConfig {
                        id: config.id.clone(),
                        reason: "simple job without command".to_string(),
                    }
                })?;
                Ok(Self {
                    program,
                    args,
                    cwd: job_dir(root, cwd.as_deref()),
                })
            }
            JobKind::Shell { shell, script, cwd } => Ok(Self::through_shell(
                *shell,
                script.clone(),
                job_dir(root, cwd.as_deref()),
            )),
            JobKind::Complex { steps } => {
                let step = steps.first().ok_or_else(|| ManagerError::InvalidConfig {
                    id: config.id.clone(),
                    reason: "complex job has no steps".to_string(),
                })?;
                if steps.len() > 1 {
                    warn!(
                        "Job '{}' defines {} steps; only the first one is executed",
                        config.id,
                        steps.len()
                    );
                }
                Ok(Self::through_shell(
                    ShellDialect::Sh,
                    step.shell_line(),
                    job_dir(root, Some(step.cwd.as_str())),
                ))
            }
        }
    }

    fn through_shell(shell: ShellDialect, script: String, cwd: PathBuf) -> Self {
        let (interpreter, flags) = shell.interpreter();
        let mut args: Vec<String> = flags.iter().map(|flag| flag.to_string()).collect();
        args.push(script);
        Self {
            program: interpreter.to_string(),
            args,
            cwd,
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Starts the process in its own process group with piped output.
pub fn spawn(id: &str, invocation: &Invocation) -> io::Result<SpawnedProcess> {
    info!("Starting process '{}': {}", id, invocation.command_line());
    info!("Working directory: {}", invocation.cwd.display());

    let child = Command::new(&invocation.program)
        .args(&invocation.args)
        .current_dir(&invocation.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()?;
    let pid = child.id();
    Ok(SpawnedProcess {
        child,
        pid,
        started_at: Utc::now(),
    })
}
