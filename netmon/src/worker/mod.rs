//! Per-worker pipeline (spec.md §4.3 "Worker") and the orchestration that
//! spawns, pins and joins one such pipeline per configured worker thread
//! (spec.md §5 "Concurrency & resource model").

pub mod worker;
pub mod workers;

pub use worker::{Worker, WriterError};
