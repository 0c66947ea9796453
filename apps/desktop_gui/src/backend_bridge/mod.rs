//! Backend worker thread: owns the tokio runtime and every async collaborator.

pub mod commands;
pub mod runtime;
