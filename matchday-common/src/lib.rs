//! # Matchday Common Library
//!
//! Shared code for the matchday services:
//! - Error and result types
//! - Configuration loading (TOML file, environment, root folder resolution)
//! - Clock abstraction used by rate limiting and batch pacing
//! - SQLite pool initialization

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
