//! Core data models for the paper pipeline.
//!
//! These records map to database tables via `sqlx::FromRow` and serialize
//! naturally as JSON via `serde`.

pub mod blob;
pub mod paper;
pub mod recognition;
pub mod task;
pub mod upload;
