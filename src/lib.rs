// ABOUTME: Library root for strata - exposes the orchestration engine for the CLI and tests.
// ABOUTME: The main binary is in main.rs.

pub mod assets;
pub mod build_info;
pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod error;
pub mod output;
pub mod plugin;
pub mod provision;
pub mod render;
pub mod rollout;
pub mod types;
