//! Supervises a configured set of worker processes: starts them, streams
//! their output, tells operator stops apart from crashes and keeps a
//! persistent history of every run.

pub mod archive;
pub mod config;
pub mod error;
pub mod manager;
pub mod models;
pub mod worker;

pub use config::options::ManagerOptions;
pub use error::ManagerError;
pub use manager::process_manager::ProcessManager;
pub use models::event::ProcessEvent;
pub use models::process::{ProcessInfo, ProcessStatus};
