//! matchday-ai library interface
//!
//! Turns scraped match statistics into structured predictions by driving a
//! rate-limited, chunked conversation with the Gemini API, and records the
//! outcome of every match in the shared SQLite database.
//!
//! Exposes public APIs for the CLI and for integration testing.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::AnalysisError;
