//! Test sessions
//!
//! A session schedules every checkpoint of one test across its browser
//! matrix. Checkpoints for one browser compare in submission order: each
//! browser keeps a step chain, the future of everything scheduled for it so
//! far, and every new job waits on it before comparing.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use rendergrid_common::{
    BrowserConfig, DomSnapshot, Error, GridConfig, MatchLevel, MatchResult, Region,
    RenderEndpoints, Result, Target,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::controller::TestController;
use crate::grid::{GridServices, GridState, OpenEyesRequest};
use crate::job::{BrowserJob, Checkpoint};
use crate::regions::{CheckOptions, MatchRegionSpecs};
use crate::request::{selectors_to_find_regions_for, size_mode, RenderRequestBuilder};
use crate::services::ComparisonClient;
use crate::upload::ResourceUploadCache;

/// Completion of every job scheduled so far for one browser
pub(crate) type StepChain = Shared<BoxFuture<'static, ()>>;

fn settled_chain() -> StepChain {
    futures::future::ready(()).boxed().shared()
}

/// Snapshot(s) of a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Snapshots {
    /// One snapshot rendered on every browser
    Shared(DomSnapshot),
    /// One snapshot per browser, in browser order
    PerBrowser(Vec<DomSnapshot>),
}

impl Snapshots {
    fn for_browsers(self, count: usize) -> Result<Vec<DomSnapshot>> {
        match self {
            Snapshots::Shared(snapshot) => Ok(vec![snapshot; count]),
            Snapshots::PerBrowser(snapshots) if snapshots.len() == count => Ok(snapshots),
            Snapshots::PerBrowser(snapshots) => Err(Error::InvalidConfig(format!(
                "{} snapshots for {} browsers",
                snapshots.len(),
                count
            ))),
        }
    }
}

fn default_true() -> bool {
    true
}

/// One visual checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckWindowRequest {
    pub snapshot: Snapshots,
    pub url: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub target: Target,
    #[serde(default = "default_true")]
    pub fully: bool,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub script_hooks: Option<serde_json::Value>,
    #[serde(default)]
    pub regions: MatchRegionSpecs,
    #[serde(default)]
    pub send_dom: Option<bool>,
    #[serde(default)]
    pub match_level: Option<MatchLevel>,
    #[serde(default)]
    pub options: CheckOptions,
    #[serde(default)]
    pub visual_grid_options: Option<serde_json::Value>,
}

impl CheckWindowRequest {
    /// Full-page window checkpoint of a snapshot
    pub fn window(url: impl Into<String>, snapshot: DomSnapshot) -> Self {
        Self {
            snapshot: Snapshots::Shared(snapshot),
            url: url.into(),
            tag: None,
            target: Target::Window,
            fully: true,
            selector: None,
            region: None,
            script_hooks: None,
            regions: MatchRegionSpecs::default(),
            send_dom: None,
            match_level: None,
            options: CheckOptions::default(),
            visual_grid_options: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Outcome for one browser of a closed test
#[derive(Debug, Clone)]
pub struct BrowserSummary {
    pub browser: BrowserConfig,
    pub render_ids: Vec<String>,
    pub results: Vec<MatchResult>,
    pub error: Option<Error>,
}

impl BrowserSummary {
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.results.iter().all(|r| r.as_expected)
    }
}

/// Outcome of a closed test
#[derive(Debug, Clone)]
pub struct TestSummary {
    pub test_name: String,
    pub browsers: Vec<BrowserSummary>,
}

impl TestSummary {
    pub fn passed(&self) -> bool {
        self.browsers.iter().all(BrowserSummary::passed)
    }
}

/// State every job of a session reads
pub(crate) struct SessionContext {
    pub test_name: String,
    pub browsers: Vec<BrowserConfig>,
    pub clients: Vec<Arc<dyn ComparisonClient>>,
    pub controller: TestController,
    pub services: GridServices,
    pub uploads: ResourceUploadCache,
    pub render_throttle: Arc<Semaphore>,
    pub grid_state: Arc<GridState>,
    pub user_agent: Option<String>,
    pub is_single_window: bool,
    results: Mutex<Vec<Vec<MatchResult>>>,
}

impl SessionContext {
    fn record_result(&self, index: usize, result: MatchResult) {
        if let Some(results) = self.results.lock().get_mut(index) {
            results.push(result);
        }
    }
}

/// One open test
pub struct TestSession {
    ctx: Arc<SessionContext>,
    endpoints: RenderEndpoints,
    default_send_dom: bool,
    default_match_level: MatchLevel,
    step_counter: AtomicUsize,
    chains: Mutex<Vec<StepChain>>,
}

impl TestSession {
    pub(crate) fn new(
        request: OpenEyesRequest,
        services: GridServices,
        endpoints: RenderEndpoints,
        uploads: ResourceUploadCache,
        render_throttle: Arc<Semaphore>,
        grid_state: Arc<GridState>,
        config: &GridConfig,
    ) -> Self {
        let count = request.browsers.len();
        Self {
            ctx: Arc::new(SessionContext {
                controller: TestController::new(request.test_name.clone(), count),
                test_name: request.test_name,
                browsers: request.browsers,
                clients: request.clients,
                services,
                uploads,
                render_throttle,
                grid_state,
                user_agent: request.user_agent,
                is_single_window: request.is_single_window.unwrap_or(config.is_single_window),
                results: Mutex::new(vec![Vec::new(); count]),
            }),
            endpoints,
            default_send_dom: config.send_dom,
            default_match_level: request.match_level.unwrap_or(config.match_level),
            step_counter: AtomicUsize::new(0),
            chains: Mutex::new(vec![settled_chain(); count]),
        }
    }

    pub fn test_name(&self) -> &str {
        &self.ctx.test_name
    }

    pub fn controller(&self) -> &TestController {
        &self.ctx.controller
    }

    pub fn browsers(&self) -> &[BrowserConfig] {
        &self.ctx.browsers
    }

    /// Stop one browser's remaining work; the others continue
    pub fn stop_browser(&self, index: usize) {
        info!("Stopping test {} browser #{}", self.ctx.test_name, index);
        self.ctx.controller.stop_test(index);
    }

    /// Schedule a checkpoint on every browser
    ///
    /// Returns once the jobs are scheduled. Failures inside the jobs are
    /// reported by [`TestSession::close`]. Must be called from within a
    /// Tokio runtime.
    pub fn check_window(&self, request: CheckWindowRequest) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("check_window outside a runtime: {}", e)))?;
        let controller = &self.ctx.controller;
        let snapshots = request.snapshot.for_browsers(self.ctx.browsers.len())?;

        if let Err(e) = request.regions.validate_accessibility() {
            controller.set_fatal_error(e);
            return Ok(());
        }

        let step = self.step_counter.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Running checkWindow for test {} step #{}", self.ctx.test_name, step);

        if controller.should_stop_all_tests() {
            info!("Aborting checkWindow synchronously for test {}", self.ctx.test_name);
            return Ok(());
        }

        let size_mode = size_mode(
            request.target,
            request.fully,
            request.selector.as_deref(),
            request.region.as_ref(),
        );
        let checkpoint = Arc::new(Checkpoint {
            step,
            tag: request.tag,
            target: request.target,
            fully: request.fully,
            size_mode,
            region: request.region,
            match_level: request.match_level.unwrap_or(self.default_match_level),
            options: request.options,
            builder: RenderRequestBuilder {
                url: request.url,
                endpoints: self.endpoints.clone(),
                size_mode,
                selector: request.selector.clone(),
                region: request.region,
                script_hooks: request.script_hooks,
                selectors_to_find_regions_for: selectors_to_find_regions_for(
                    size_mode,
                    request.selector.as_deref(),
                    &request.regions,
                ),
                send_dom: request.send_dom.unwrap_or(self.default_send_dom),
                options: request.visual_grid_options,
            },
            regions: request.regions,
        });

        let mut chains = self.chains.lock();
        for (index, snapshot) in snapshots.into_iter().enumerate() {
            let job = BrowserJob::new(self.ctx.clone(), checkpoint.clone(), index, snapshot);
            let prev = chains[index].clone();
            let ctx = self.ctx.clone();

            let chained = async move {
                match job.run(prev).await {
                    Ok(Some(result)) => ctx.record_result(index, result),
                    Ok(None) => {}
                    Err(e) => ctx.controller.set_error(index, e),
                }
            }
            .boxed()
            .shared();

            chains[index] = chained.clone();
            runtime.spawn(chained);
        }
        debug!(
            "Scheduled step #{} of test {} on {} browser(s)",
            step,
            self.ctx.test_name,
            chains.len()
        );

        Ok(())
    }

    /// Wait for every scheduled checkpoint and report the test outcome
    ///
    /// A run-wide fatal error is returned once, as a single error, after all
    /// browsers have settled.
    pub async fn close(self) -> Result<TestSummary> {
        let chains: Vec<StepChain> = self.chains.lock().clone();
        futures::future::join_all(chains).await;

        let controller = &self.ctx.controller;
        if let Some(fatal) = controller.fatal_error() {
            return Err(Error::Fatal {
                test_name: self.ctx.test_name.clone(),
                source: Box::new(fatal),
            });
        }

        let results = self.ctx.results.lock().clone();
        let browsers = self
            .ctx
            .browsers
            .iter()
            .cloned()
            .zip(results)
            .enumerate()
            .map(|(index, (browser, results))| BrowserSummary {
                browser,
                render_ids: controller.render_ids(index),
                results,
                error: controller.error(index),
            })
            .collect();

        info!("Closed test {}", self.ctx.test_name);
        Ok(TestSummary {
            test_name: self.ctx.test_name.clone(),
            browsers,
        })
    }
}
