pub mod options;
pub mod store;
