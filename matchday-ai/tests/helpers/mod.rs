//! Test Helper Utilities
//!
//! Shared utilities for testing matchday-ai

#![allow(dead_code)]

pub mod db_utils;
pub mod fakes;
pub mod mock_server;

// Re-export commonly used items
pub use db_utils::{create_test_db, get_table_columns, has_column, seed_analysis_settings};
pub use fakes::{
    build_orchestrator, fixture, test_clock, FakeMatchSource, Reply, ScriptedAi, SentMessage,
};
pub use mock_server::spawn_server;
