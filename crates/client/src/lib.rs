//! RenderGrid Client
//!
//! Orchestrates visual-regression render jobs against a remote rendering
//! grid:
//! - Deduplicates resource uploads by content digest, batching existence
//!   checks behind a debounce window
//! - Builds one render request per (checkpoint, browser) pair
//! - Runs each browser's checkpoints concurrently while comparing them in
//!   submission order
//! - Propagates per-browser and run-wide failures through a shared controller
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  VisualGridClient (one per run)                             │
//! │    ├── ResourceUploadCache    digest dedup, debounce        │
//! │    ├── render throttle        Semaphore                     │
//! │    └── open_eyes() -> TestSession                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestSession (one per test)                                 │
//! │    ├── TestController         stop / error slots            │
//! │    ├── step chains            one per browser               │
//! │    ├── check_window()  -> BrowserJob per browser            │
//! │    │     build → submit → render → poll → order → compare   │
//! │    └── close() -> TestSummary | Error::Fatal                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod controller;
pub mod grid;
pub mod job;
pub mod regions;
pub mod request;
pub mod services;
pub mod session;
pub mod sim;
pub mod upload;

pub use controller::{JobState, StopToken, TestController};
pub use grid::{GridServices, GridState, OpenEyesRequest, VisualGridClient};
pub use job::JobPhase;
pub use regions::{calculate_match_regions, CheckOptions, MatchRegionSpecs, ResolvedRegions};
pub use request::RenderRequestBuilder;
pub use services::{
    ComparisonClient, DomResolveInput, DomResolver, RenderService, ResolvedDom, ResourceStore,
};
pub use session::{BrowserSummary, CheckWindowRequest, Snapshots, TestSession, TestSummary};
pub use upload::ResourceUploadCache;
