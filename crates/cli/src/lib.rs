//! RenderGrid CLI
//!
//! Dry-run tooling for the RenderGrid orchestrator: runs manifests against
//! the in-memory grid and manages grid configuration files.

pub mod commands;
pub mod output;
