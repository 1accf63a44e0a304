use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "scripts-config.json";
pub const LOGS_DIR_NAME: &str = "logs";
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Where the manager finds its jobs and keeps its history.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub logs_dir: PathBuf,
    pub stop_grace: Duration,
}

impl ManagerOptions {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            config_file: root.join(CONFIG_FILE_NAME),
            logs_dir: root.join(LOGS_DIR_NAME),
            stop_grace: DEFAULT_STOP_GRACE,
            root,
        }
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = path.into();
        self
    }

    pub fn with_logs_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.logs_dir = path.into();
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}
