//! # Worker crate
//! Runs the tasks of a chunked transcode job and gets jobs onto the farm.
//!
//! The `transcode-worker` binary is what the farm launches for every task.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod executor;
pub mod farm;
pub mod ffmpeg_runner;
pub mod logging;
pub mod retry;
pub mod staging;

pub use error::WorkerError;
