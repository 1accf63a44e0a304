/// Messages delivered to the manager's event loop by reader and watcher threads.
#[derive(Debug)]
pub enum ProcessMessage {
    WriteOutput(String, String),
    Exited(String, Option<i32>),
    WaitFailed(String, String),
    Shutdown,
}
