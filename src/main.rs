mod app;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;

use procmon::{ManagerOptions, ProcessManager};

#[derive(Debug, Parser)]
#[command(name = "procmon", about = "Launch, stop and inspect configured worker processes")]
struct Args {
    /// Directory holding the job configuration, scripts and run history.
    #[arg(long, env = "PROCMON_ROOT", default_value = ".")]
    root: PathBuf,

    /// Job configuration file (defaults to <root>/scripts-config.json).
    #[arg(long, env = "PROCMON_CONFIG")]
    config: Option<PathBuf>,

    /// Run history directory (defaults to <root>/logs).
    #[arg(long, env = "PROCMON_LOGS_DIR")]
    logs_dir: Option<PathBuf>,

    /// Seconds between SIGTERM and SIGKILL when stopping a job.
    #[arg(long, env = "PROCMON_STOP_GRACE_SECS", default_value_t = 5)]
    stop_grace_secs: u64,
}

impl Args {
    fn into_options(self) -> ManagerOptions {
        let mut options = ManagerOptions::new(&self.root)
            .with_stop_grace(Duration::from_secs(self.stop_grace_secs));
        if let Some(config) = self.config {
            options = options.with_config_file(config);
        }
        if let Some(logs_dir) = self.logs_dir {
            options = options.with_logs_dir(logs_dir);
        }
        options
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(buf, "\r[{} {}] {}", record.level(), record.target(), record.args())
        })
        .init();

    let options = Args::parse().into_options();
    let manager = ProcessManager::new(options);

    app::cli::run_cli(&manager);

    let grace = manager.options().stop_grace;
    manager.shutdown(grace + Duration::from_secs(1));
}
