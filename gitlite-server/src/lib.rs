//! # gitlite-server
//!
//! Async task orchestration for gitlite and a local HTTP control API that
//! exposes repository operations to front-ends.

pub mod api;
pub mod orchestrator;
pub mod server;

pub use orchestrator::{
    Operation, Orchestrator, SharedRepository, TaskEvent, TaskEventKind, TaskEvents, TaskHandle,
    TaskOutcome, TaskOutput,
};
pub use server::GitliteServer;
