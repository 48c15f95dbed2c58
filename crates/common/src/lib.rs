//! RenderGrid Common Library
//!
//! Shared data model, configuration and error types for the RenderGrid
//! render-job orchestrator.

pub mod config;
pub mod error;
pub mod resource;
pub mod types;

// Re-export commonly used types
pub use config::GridConfig;
pub use error::{Error, Result};
pub use resource::{CacheEntry, Resource, ResourceDescriptor, ResourceKind};
pub use types::*;

/// RenderGrid version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
