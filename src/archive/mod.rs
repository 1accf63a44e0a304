pub mod log_archive;
