pub mod common;
pub mod config;
pub mod outbox;
pub mod queue;
pub mod status;
pub mod sync;
