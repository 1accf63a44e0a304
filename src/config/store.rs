use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{error, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::job::{JobConfig, JobKind};

const SCRIPT_EXTENSIONS: &[&str] = &["py", "sh", "ps1"];

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    scripts: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Validation {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

pub struct ConfigStore {
    root: PathBuf,
    path: PathBuf,
    configs: Vec<JobConfig>,
}

impl ConfigStore {
    pub fn new(root: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            path: path.into(),
            configs: Vec::new(),
        }
    }

    /// Replaces the loaded jobs with the file contents. Never fails: an
    /// unreadable or malformed file leaves the store empty.
    pub fn load(&mut self) -> &[JobConfig] {
        self.configs = match read_file(&self.path) {
            Ok(Some(configs)) => {
                info!("Loaded {} job configurations from {}", configs.len(), self.path.display());
                configs
            }
            Ok(None) => {
                info!("No job configuration at {}, starting without jobs", self.path.display());
                Vec::new()
            }
            Err(e) => {
                error!("Failed to load job configuration: {}", e);
                Vec::new()
            }
        };
        &self.configs
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, id: &str) -> Option<&JobConfig> {
        self.configs.iter().find(|config| config.id == id)
    }

    pub fn all(&self) -> &[JobConfig] {
        &self.configs
    }

    pub fn remove(&mut self, id: &str) -> Option<JobConfig> {
        let index = self.configs.iter().position(|config| config.id == id)?;
        Some(self.configs.remove(index))
    }

    pub fn resolve_dir(&self, cwd: Option<&str>) -> PathBuf {
        job_dir(&self.root, cwd)
    }

    pub fn validate(&self, id: &str) -> Validation {
        let Some(config) = self.get(id) else {
            return Validation::from_errors(vec!["Script configuration not found".to_string()]);
        };

        let mut errors = Vec::new();
        match &config.kind {
            JobKind::Simple { cwd, .. } => {
                let dir = self.check_dir(cwd.as_deref(), &mut errors);
                if let Some((program, args)) = config.simple_command() {
                    check_command(&dir, &program, &args, &mut errors);
                }
            }
            JobKind::Shell { script, cwd, .. } => {
                let dir = self.check_dir(cwd.as_deref(), &mut errors);
                check_virtualenvs(&dir, script, &mut errors);
            }
            JobKind::Complex { steps } => {
                if steps.is_empty() {
                    errors.push("Complex job has no steps".to_string());
                }
                for step in steps {
                    let dir = self.check_dir(Some(step.cwd.as_str()), &mut errors);
                    let line = step.shell_line();
                    let mut words = line.split_whitespace();
                    if let Some(program) = words.next() {
                        let args: Vec<String> = words.map(str::to_string).collect();
                        check_command(&dir, program, &args, &mut errors);
                    }
                }
            }
        }
        Validation::from_errors(errors)
    }

    fn check_dir(&self, cwd: Option<&str>, errors: &mut Vec<String>) -> PathBuf {
        let dir = self.resolve_dir(cwd);
        if !dir.is_dir() {
            errors.push(format!(
                "Working directory does not exist: {}",
                cwd.unwrap_or(".")
            ));
        }
        dir
    }
}

/// Working directory of a job or step; relative paths hang off `root`.
pub fn job_dir(root: &Path, cwd: Option<&str>) -> PathBuf {
    root.join(cwd.unwrap_or("."))
}

/// `Ok(None)` when the file does not exist.
pub fn read_file(path: &Path) -> Result<Option<Vec<JobConfig>>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let file: ConfigFile = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut configs: Vec<JobConfig> = Vec::with_capacity(file.scripts.len());
    for (index, raw) in file.scripts.into_iter().enumerate() {
        let config: JobConfig = match serde_json::from_value(raw) {
            Ok(config) => config,
            Err(e) => {
                warn!("Skipping job #{} in {}: {}", index, path.display(), e);
                continue;
            }
        };
        if !is_safe_id(&config.id) {
            warn!("Skipping job with unusable id {:?}", config.id);
            continue;
        }
        if configs.iter().any(|existing| existing.id == config.id) {
            warn!("Duplicate job id '{}', keeping the first definition", config.id);
            continue;
        }
        configs.push(config);
    }
    Ok(Some(configs))
}

/// Ids double as archive file names.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\', '\0'])
}

fn check_command(dir: &Path, program: &str, args: &[String], errors: &mut Vec<String>) {
    if program.contains(['/', '\\']) && !dir.join(program).exists() {
        errors.push(format!("Interpreter not found: {}", program));
    }
    for arg in args {
        let is_script = Path::new(arg)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext));
        if is_script && !dir.join(arg).is_file() {
            errors.push(format!("Script file not found: {}", arg));
        }
    }
}

fn unix_activation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:^|[\s;&|(])(?:source|\.)\s+["']?([^\s"';&|]+?)/bin/activate\b"#)
            .expect("valid activation pattern")
    })
}

fn windows_activation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\.\\)?([\w.\-]+)\\Scripts\\Activate\.ps1")
            .expect("valid activation pattern")
    })
}

fn check_virtualenvs(dir: &Path, script: &str, errors: &mut Vec<String>) {
    for caps in unix_activation().captures_iter(script) {
        check_virtualenv(dir, &caps[1], &["bin", "python"], errors);
    }
    for caps in windows_activation().captures_iter(script) {
        check_virtualenv(dir, &caps[1], &["Scripts", "python.exe"], errors);
    }
}

fn check_virtualenv(dir: &Path, name: &str, interpreter: &[&str], errors: &mut Vec<String>) {
    let venv = dir.join(name);
    if !venv.is_dir() {
        errors.push(format!("Virtual environment not found: {}", name));
        return;
    }
    let python = interpreter.iter().fold(venv, |path, part| path.join(part));
    if !python.exists() {
        errors.push(format!(
            "Python executable not found in venv: {}/{}",
            name,
            interpreter.join("/")
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(config: &str) -> (TempDir, ConfigStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scripts-config.json");
        fs::write(&path, config).unwrap();
        let mut store = ConfigStore::new(dir.path(), path);
        store.load();
        (dir, store)
    }

    #[test]
    fn missing_file_yields_no_jobs() {
        let dir = TempDir::new().unwrap();
        let mut store = ConfigStore::new(dir.path(), dir.path().join("absent.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn malformed_file_yields_no_jobs() {
        let (_dir, store) = store_with("{ not json");
        assert!(store.all().is_empty());
    }

    #[test]
    fn bad_entries_are_skipped_individually() {
        let (_dir, store) = store_with(
            r#"{"scripts":[
                {"id":"ok","type":"simple","command":"true"},
                {"id":"broken","type":"teleport"},
                {"id":"../escape","type":"simple"},
                {"id":"ok","type":"shell","script":"echo dup"}
            ]}"#,
        );
        let ids: Vec<&str> = store.all().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["ok"]);
        assert!(matches!(store.get("ok").unwrap().kind, JobKind::Simple { .. }));
    }

    #[test]
    fn unknown_id_fails_validation() {
        let (_dir, store) = store_with(r#"{"scripts":[]}"#);
        let result = store.validate("ghost");
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["Script configuration not found".to_string()]);
    }

    #[test]
    fn validation_reports_every_violation() {
        let (_dir, store) = store_with(
            r#"{"scripts":[
                {"id":"job","type":"simple","command":"./env/bin/python",
                 "args":["-u","main.py"],"cwd":"missing"}
            ]}"#,
        );
        let result = store.validate("job");
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![
                "Working directory does not exist: missing".to_string(),
                "Interpreter not found: ./env/bin/python".to_string(),
                "Script file not found: main.py".to_string(),
            ]
        );
    }

    #[test]
    fn valid_simple_job_passes() {
        let (dir, store) = store_with(
            r#"{"scripts":[
                {"id":"job","type":"simple","command":"python","args":["-u","job.py"]}
            ]}"#,
        );
        fs::write(dir.path().join("job.py"), "print('hi')").unwrap();
        let result = store.validate("job");
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn shell_job_checks_referenced_virtualenv() {
        let (dir, store) = store_with(
            r#"{"scripts":[
                {"id":"etl","type":"shell","script":"source venv/bin/activate && python etl.py"},
                {"id":"win","type":"shell","shell":"powershell",
                 "script":".\\env\\Scripts\\Activate.ps1; python x.py"}
            ]}"#,
        );
        let etl = store.validate("etl");
        assert_eq!(etl.errors, vec!["Virtual environment not found: venv".to_string()]);

        fs::create_dir_all(dir.path().join("venv/bin")).unwrap();
        let etl = store.validate("etl");
        assert_eq!(
            etl.errors,
            vec!["Python executable not found in venv: venv/bin/python".to_string()]
        );

        fs::write(dir.path().join("venv/bin/python"), "").unwrap();
        assert!(store.validate("etl").valid);

        let win = store.validate("win");
        assert_eq!(win.errors, vec!["Virtual environment not found: env".to_string()]);
    }

    #[test]
    fn complex_job_checks_every_step() {
        let (dir, store) = store_with(
            r#"{"scripts":[
                {"id":"empty","type":"complex","steps":[]},
                {"id":"multi","type":"complex","steps":[
                    {"command":"true","cwd":"."},
                    {"command":"sh","args":["load.sh"],"cwd":"stage"}
                ]},
                {"id":"inline","type":"complex","steps":[
                    {"command":"./tools/run report.py --fast","cwd":"."}
                ]}
            ]}"#,
        );
        assert_eq!(
            store.validate("empty").errors,
            vec!["Complex job has no steps".to_string()]
        );
        assert_eq!(
            store.validate("multi").errors,
            vec![
                "Working directory does not exist: stage".to_string(),
                "Script file not found: load.sh".to_string(),
            ]
        );
        fs::create_dir(dir.path().join("stage")).unwrap();
        fs::write(dir.path().join("stage/load.sh"), "exit 0").unwrap();
        assert!(store.validate("multi").valid);

        assert_eq!(
            store.validate("inline").errors,
            vec![
                "Interpreter not found: ./tools/run".to_string(),
                "Script file not found: report.py".to_string(),
            ]
        );
    }

    #[test]
    fn remove_drops_only_the_named_job() {
        let (_dir, mut store) = store_with(
            r#"{"scripts":[{"id":"a","type":"simple"},{"id":"b","type":"simple"}]}"#,
        );
        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert_eq!(store.all().len(), 1);
        assert!(store.get("b").is_some());
    }
}
