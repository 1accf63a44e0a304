pub mod output;
pub mod worker;
