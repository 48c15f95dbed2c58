//! Collaborator interfaces
//!
//! The orchestrator never talks to the network itself. Everything that
//! crosses a process boundary is injected through these traits.

use async_trait::async_trait;
use rendergrid_common::{
    CheckWindowArgs, DomSnapshot, MatchResult, ProxySettings, RectangleSize, RenderRequest,
    RenderStatusResult, Resource, Result,
};
use std::collections::{BTreeMap, HashMap};

use crate::controller::StopToken;

/// Remote content store that render jobs reference resources from
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Report, in input order, which resources already exist remotely
    async fn check_resources(&self, resources: &[Resource]) -> Result<Vec<bool>>;

    /// Upload a single resource
    async fn put_resource(&self, resource: &Resource) -> Result<()>;
}

/// Remote rendering service
#[async_trait]
pub trait RenderService: Send + Sync {
    /// Submit render requests, returning one render id per request
    async fn render_batch(&self, requests: Vec<RenderRequest>) -> Result<Vec<String>>;

    /// Poll until the render settles
    ///
    /// Implementations should consult `stop` between polls and give up
    /// early once it reports stopped.
    async fn wait_for_rendered_status(
        &self,
        render_id: &str,
        stop: StopToken,
    ) -> Result<RenderStatusResult>;

    /// User agent strings keyed by browser name
    async fn user_agents(&self) -> Result<HashMap<String, String>>;
}

/// Input of DOM resolution for one snapshot
#[derive(Debug, Clone)]
pub struct DomResolveInput {
    pub snapshot: DomSnapshot,
    pub user_agent: Option<String>,
    pub referer: String,
    pub proxy: Option<ProxySettings>,
}

/// A snapshot with every resource it references materialized
#[derive(Debug, Clone)]
pub struct ResolvedDom {
    /// All resources keyed by URL
    pub all_resources: BTreeMap<String, Resource>,
    /// The serialized DOM itself, ready to upload
    pub dom: Resource,
}

/// Turns a captured snapshot into uploadable resources
#[async_trait]
pub trait DomResolver: Send + Sync {
    async fn resolve(&self, input: DomResolveInput) -> Result<ResolvedDom>;
}

/// Comparison client bound to one (test, browser) session
#[async_trait]
pub trait ComparisonClient: Send + Sync {
    /// Wait until the comparison session is open
    async fn ensure_running_session(&self) -> Result<()>;

    /// Compare a checkpoint within a multi-step test
    async fn check_window(&self, args: CheckWindowArgs) -> Result<MatchResult>;

    /// Compare a checkpoint of a single-window test
    async fn test_window(&self, args: CheckWindowArgs) -> Result<MatchResult>;

    fn set_inferred_environment(&self, inferred: String);

    fn set_viewport_size(&self, size: RectangleSize);

    fn proxy(&self) -> Option<ProxySettings> {
        None
    }
}
