pub mod event;
pub mod job;
pub mod log_entry;
pub mod message;
pub mod process;
