//! Process-wide grid client
//!
//! Owns everything shared across the tests of a run: the upload cache, the
//! render submission limiter and the injected services.

use rendergrid_common::{
    BrowserConfig, Error, GridConfig, MatchLevel, RenderEndpoints, Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

use crate::services::{ComparisonClient, DomResolver, RenderService, ResourceStore};
use crate::session::TestSession;
use crate::upload::ResourceUploadCache;

/// Injected network collaborators
#[derive(Clone)]
pub struct GridServices {
    pub store: Arc<dyn ResourceStore>,
    pub renderer: Arc<dyn RenderService>,
    pub resolver: Arc<dyn DomResolver>,
}

/// Run-wide gauges
#[derive(Debug, Default)]
pub struct GridState {
    queued_renders: AtomicUsize,
}

impl GridState {
    pub fn queued_renders(&self) -> usize {
        self.queued_renders.load(Ordering::SeqCst)
    }

    pub(crate) fn render_queued(&self) {
        self.queued_renders.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn render_dequeued(&self) {
        self.queued_renders.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Parameters for opening one test
pub struct OpenEyesRequest {
    pub test_name: String,
    pub browsers: Vec<BrowserConfig>,
    /// One comparison client per browser, in the same order
    pub clients: Vec<Arc<dyn ComparisonClient>>,
    pub user_agent: Option<String>,
    pub match_level: Option<MatchLevel>,
    pub is_single_window: Option<bool>,
}

/// Entry point shared by every test of a run
#[derive(Clone)]
pub struct VisualGridClient {
    config: GridConfig,
    services: GridServices,
    endpoints: RenderEndpoints,
    uploads: ResourceUploadCache,
    render_throttle: Arc<Semaphore>,
    state: Arc<GridState>,
}

impl VisualGridClient {
    pub fn new(config: GridConfig, services: GridServices, endpoints: RenderEndpoints) -> Result<Self> {
        config.validate()?;
        info!(
            "Grid client ready (render concurrency {}, upload concurrency {}, debounce {}ms)",
            config.render_concurrency, config.upload_concurrency, config.upload_debounce_ms
        );

        Ok(Self {
            uploads: ResourceUploadCache::new(services.store.clone(), &config),
            render_throttle: Arc::new(Semaphore::new(config.render_concurrency)),
            state: Arc::new(GridState::default()),
            config,
            services,
            endpoints,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn uploads(&self) -> &ResourceUploadCache {
        &self.uploads
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    /// Start a test on a browser matrix
    pub fn open_eyes(&self, request: OpenEyesRequest) -> Result<TestSession> {
        if request.browsers.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "test {} has no browsers",
                request.test_name
            )));
        }
        if request.browsers.len() != request.clients.len() {
            return Err(Error::InvalidConfig(format!(
                "test {} has {} browsers but {} comparison clients",
                request.test_name,
                request.browsers.len(),
                request.clients.len()
            )));
        }

        info!(
            "Opening test {} on {} browser(s)",
            request.test_name,
            request.browsers.len()
        );

        Ok(TestSession::new(
            request,
            self.services.clone(),
            self.endpoints.clone(),
            self.uploads.clone(),
            self.render_throttle.clone(),
            self.state.clone(),
            &self.config,
        ))
    }
}
