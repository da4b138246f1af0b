pub mod coordinator;
pub mod error;
