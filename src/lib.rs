//! Distributed paper pipeline: chunked upload, page-level text
//! recognition, rate-limited translation and the saga that chains them.
//!
//! Instances coordinate only through the shared SQLite database, so any
//! number of them can serve the same uploads, tasks and papers.

pub mod backends;
pub mod config;
pub mod coordination;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod state;
pub mod text;
