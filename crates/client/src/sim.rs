//! In-memory grid
//!
//! Implements every collaborator trait without a network so that the
//! orchestrator can be driven end to end: by the dry-run CLI and by tests.
//! Latencies use tokio's clock, so paused-time tests stay deterministic.
//!
//! A render is good when either its DOM or its resource list matches the
//! configured expectation. Good renders get a screenshot under
//! [`GOOD_SCREENSHOT_PREFIX`], and [`SimulatedEyes`] reports a match only for
//! those.

use async_trait::async_trait;
use parking_lot::Mutex;
use rendergrid_common::{
    CheckWindowArgs, DomSnapshot, EmulationInfo, Error, MatchResult, RectangleSize, Region,
    RenderRequest, RenderStatus, RenderStatusResult, Resource, Result,
};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::controller::StopToken;
use crate::grid::GridServices;
use crate::services::{
    ComparisonClient, DomResolveInput, DomResolver, RenderService, ResolvedDom, ResourceStore,
};

pub const GOOD_SCREENSHOT_PREFIX: &str = "sim://screenshots/good/";
pub const BAD_SCREENSHOT_PREFIX: &str = "sim://screenshots/bad/";

const DEFAULT_RENDER_LATENCY: Duration = Duration::from_millis(50);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What a good render looks like
#[derive(Debug, Clone, Default)]
pub struct RenderExpectation {
    pub cdt: Option<serde_json::Value>,
    /// Resource URL to content digest
    pub resources: Option<BTreeMap<String, String>>,
}

/// Network call counters
#[derive(Debug, Default)]
pub struct SimCounters {
    pub check_calls: AtomicUsize,
    pub put_calls: AtomicUsize,
    pub render_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub resolve_calls: AtomicUsize,
    pub puts_in_flight: AtomicUsize,
    /// Most uploads ever in flight at once
    pub peak_puts: AtomicUsize,
    pub renders_in_flight: AtomicUsize,
    /// Most render submissions ever in flight at once
    pub peak_renders: AtomicUsize,
}

impl SimCounters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Tracks one in-flight call against a gauge and its high-water mark
struct InFlight<'a> {
    gauge: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(gauge: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { gauge }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct Failures {
    render_browsers: HashSet<String>,
    status_browsers: HashSet<String>,
    resolve_urls: HashSet<String>,
    upload_urls: HashSet<String>,
}

struct SubmittedRender {
    request: RenderRequest,
    ready_at: Instant,
    good: bool,
}

#[derive(Default)]
struct SimState {
    /// Remote store contents by digest
    stored: HashMap<String, Resource>,
    /// Every uploaded URL, in upload order
    upload_log: Vec<String>,
    /// Origin server for URLs the snapshot references without content
    origin: HashMap<String, Resource>,
    renders: HashMap<String, SubmittedRender>,
    browser_latencies: HashMap<String, Duration>,
    url_latencies: HashMap<String, Duration>,
    /// Time a render submission takes to be answered, per browser
    submit_latencies: HashMap<String, Duration>,
    upload_latency: Duration,
    selector_regions: HashMap<String, Vec<Region>>,
    device_sizes: HashMap<String, RectangleSize>,
    expectation: Option<RenderExpectation>,
    failures: Failures,
}

/// Resource store, renderer and DOM resolver in one process
pub struct SimulatedGrid {
    state: Mutex<SimState>,
    user_agents: HashMap<String, String>,
    default_latency: Duration,
    poll_interval: Duration,
    pub counters: SimCounters,
}

impl Default for SimulatedGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGrid {
    pub fn new() -> Self {
        let user_agents = [
            ("chrome", "Mozilla/5.0 (X11; Linux x86_64) Chrome/120.0"),
            ("firefox", "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Firefox/121.0"),
            ("safari", "Mozilla/5.0 (Macintosh) Version/17.0 Safari/605.1.15"),
            ("edge", "Mozilla/5.0 (Windows NT 10.0) Edg/120.0"),
        ]
        .into_iter()
        .map(|(name, ua)| (name.to_string(), ua.to_string()))
        .collect();

        Self {
            state: Mutex::new(SimState::default()),
            user_agents,
            default_latency: DEFAULT_RENDER_LATENCY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            counters: SimCounters::default(),
        }
    }

    pub fn with_default_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    /// Collaborators for [`crate::VisualGridClient::new`]
    pub fn services(self: &Arc<Self>) -> GridServices {
        GridServices {
            store: self.clone(),
            renderer: self.clone(),
            resolver: self.clone(),
        }
    }

    /// Render latency for one browser
    pub fn set_browser_latency(&self, browser: impl Into<String>, latency: Duration) {
        self.state.lock().browser_latencies.insert(browser.into(), latency);
    }

    /// Render latency for one page URL, taking precedence over browser latency
    pub fn set_url_latency(&self, url: impl Into<String>, latency: Duration) {
        self.state.lock().url_latencies.insert(url.into(), latency);
    }

    /// Delay before a render submission for this browser is answered
    pub fn set_submit_latency(&self, browser: impl Into<String>, latency: Duration) {
        self.state.lock().submit_latencies.insert(browser.into(), latency);
    }

    /// Delay of every resource upload
    pub fn set_upload_latency(&self, latency: Duration) {
        self.state.lock().upload_latency = latency;
    }

    pub fn set_selector_regions(&self, selector: impl Into<String>, regions: Vec<Region>) {
        self.state.lock().selector_regions.insert(selector.into(), regions);
    }

    pub fn set_device_size(&self, device_name: impl Into<String>, size: RectangleSize) {
        self.state.lock().device_sizes.insert(device_name.into(), size);
    }

    pub fn set_expectation(&self, expectation: RenderExpectation) {
        self.state.lock().expectation = Some(expectation);
    }

    /// Serve a resource to the DOM resolver
    pub fn serve(&self, resource: Resource) {
        self.state.lock().origin.insert(resource.url().to_string(), resource);
    }

    /// Mark a digest as already present remotely
    pub fn preload(&self, resource: Resource) {
        if let Some(hash) = resource.hash() {
            self.state.lock().stored.insert(hash.to_string(), resource);
        }
    }

    pub fn fail_render_for(&self, browser: impl Into<String>) {
        self.state.lock().failures.render_browsers.insert(browser.into());
    }

    pub fn fail_status_for(&self, browser: impl Into<String>) {
        self.state.lock().failures.status_browsers.insert(browser.into());
    }

    pub fn fail_resolve_for(&self, url: impl Into<String>) {
        self.state.lock().failures.resolve_urls.insert(url.into());
    }

    pub fn fail_upload_for(&self, url: impl Into<String>) {
        self.state.lock().failures.upload_urls.insert(url.into());
    }

    pub fn upload_log(&self) -> Vec<String> {
        self.state.lock().upload_log.clone()
    }

    pub fn is_stored(&self, hash: &str) -> bool {
        self.state.lock().stored.contains_key(hash)
    }

    /// Requests submitted so far, keyed by render id
    pub fn submitted(&self) -> HashMap<String, RenderRequest> {
        self.state
            .lock()
            .renders
            .iter()
            .map(|(id, r)| (id.clone(), r.request.clone()))
            .collect()
    }

    fn is_good(state: &SimState, request: &RenderRequest) -> bool {
        let Some(expectation) = &state.expectation else {
            return true;
        };

        // A part with no expectation never vouches for a render; a render
        // missing the part entirely passes it
        let dom_good = expectation.cdt.as_ref().map_or(false, |expected| {
            match request.dom.hash.as_ref().and_then(|h| state.stored.get(h)) {
                Some(dom) => dom
                    .content()
                    .and_then(|c| serde_json::from_slice::<serde_json::Value>(c).ok())
                    .map_or(false, |dom| dom.get("cdt") == Some(expected)),
                None => true,
            }
        });

        let resources_good = expectation.resources.as_ref().map_or(false, |expected| {
            if request.resources.is_empty() {
                return true;
            }
            let actual: BTreeMap<String, String> = request
                .resources
                .iter()
                .filter_map(|(url, d)| d.hash.clone().map(|h| (url.clone(), h)))
                .collect();
            &actual == expected
        });

        dom_good || resources_good
    }

    fn render_latency(&self, state: &SimState, request: &RenderRequest) -> Duration {
        state
            .url_latencies
            .get(&request.url)
            .or_else(|| state.browser_latencies.get(&request.browser_name))
            .copied()
            .unwrap_or(self.default_latency)
    }

    fn settled_status(&self, state: &SimState, render_id: &str, render: &SubmittedRender) -> RenderStatusResult {
        let request = &render.request;
        let selector_regions = request
            .selectors_to_find_regions_for
            .iter()
            .map(|s| state.selector_regions.get(s).cloned().unwrap_or_default())
            .collect();

        let device_size = match &request.render_info.emulation_info {
            Some(EmulationInfo::Device { device_name, .. }) => {
                state.device_sizes.get(device_name).copied()
            }
            _ => match (request.render_info.width, request.render_info.height) {
                (Some(w), Some(h)) => Some(RectangleSize::new(w, h)),
                _ => None,
            },
        };

        let prefix = if render.good {
            GOOD_SCREENSHOT_PREFIX
        } else {
            BAD_SCREENSHOT_PREFIX
        };

        RenderStatusResult {
            status: RenderStatus::Rendered,
            image_location: Some(format!("{}{}.png", prefix, render_id)),
            dom_location: request
                .send_dom
                .then(|| format!("sim://dom/{}.json", render_id)),
            user_agent: self.user_agents.get(&request.browser_name).cloned(),
            device_size,
            selector_regions,
            error: None,
        }
    }

    fn resolve_snapshot(
        &self,
        snapshot: &DomSnapshot,
        all_resources: &mut BTreeMap<String, Resource>,
    ) -> Result<Resource> {
        let state = self.state.lock();
        if state.failures.resolve_urls.contains(&snapshot.url) {
            return Err(Error::DomResolution(format!("could not resolve {}", snapshot.url)));
        }

        let mut own = BTreeMap::new();
        for (url, inline) in &snapshot.resource_contents {
            own.insert(
                url.clone(),
                Resource::new(url.clone(), inline.content_type.clone(), inline.value.clone().into_bytes()),
            );
        }
        for url in &snapshot.resource_urls {
            if own.contains_key(url) {
                continue;
            }
            let resource = state
                .origin
                .get(url)
                .cloned()
                .unwrap_or_else(|| Resource::remote(url.clone()));
            own.insert(url.clone(), resource);
        }
        drop(state);

        for frame in &snapshot.frames {
            let frame_dom = self.resolve_snapshot(frame, all_resources)?;
            own.insert(frame.url.clone(), frame_dom);
        }

        let hashes: BTreeMap<&String, Option<&str>> =
            own.iter().map(|(url, r)| (url, r.hash())).collect();
        let dom = Resource::from_dom(
            snapshot.url.clone(),
            &json!({ "cdt": snapshot.cdt, "resources": hashes }),
        )?;

        all_resources.extend(own);
        Ok(dom)
    }
}

#[async_trait]
impl ResourceStore for SimulatedGrid {
    async fn check_resources(&self, resources: &[Resource]) -> Result<Vec<bool>> {
        self.counters.check_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        Ok(resources
            .iter()
            .map(|r| r.hash().map_or(true, |h| state.stored.contains_key(h)))
            .collect())
    }

    async fn put_resource(&self, resource: &Resource) -> Result<()> {
        self.counters.put_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.counters.puts_in_flight, &self.counters.peak_puts);

        let latency = self.state.lock().upload_latency;
        if !latency.is_zero() {
            sleep(latency).await;
        }

        let mut state = self.state.lock();
        if state.failures.upload_urls.contains(resource.url()) {
            return Err(Error::Resource(format!("store rejected {}", resource.url())));
        }
        state.upload_log.push(resource.url().to_string());
        if let Some(hash) = resource.hash() {
            state.stored.insert(hash.to_string(), resource.clone());
        }
        trace!("Stored {}", resource.url());
        Ok(())
    }
}

#[async_trait]
impl RenderService for SimulatedGrid {
    async fn render_batch(&self, requests: Vec<RenderRequest>) -> Result<Vec<String>> {
        self.counters.render_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight =
            InFlight::enter(&self.counters.renders_in_flight, &self.counters.peak_renders);

        let latency = {
            let state = self.state.lock();
            requests
                .iter()
                .filter_map(|r| state.submit_latencies.get(&r.browser_name))
                .max()
                .copied()
        };
        if let Some(latency) = latency {
            sleep(latency).await;
        }

        let mut state = self.state.lock();

        if let Some(request) = requests
            .iter()
            .find(|r| state.failures.render_browsers.contains(&r.browser_name))
        {
            return Err(Error::Render(format!(
                "renderer unavailable for {}",
                request.browser_name
            )));
        }

        let now = Instant::now();
        let mut ids = Vec::with_capacity(requests.len());
        for request in requests {
            let render_id = uuid::Uuid::new_v4().to_string();
            let good = Self::is_good(&state, &request);
            let ready_at = now + self.render_latency(&state, &request);
            debug!(
                "Render {} for {} on {} ({})",
                render_id,
                request.url,
                request.browser_name,
                if good { "good" } else { "bad" }
            );
            state.renders.insert(
                render_id.clone(),
                SubmittedRender {
                    request,
                    ready_at,
                    good,
                },
            );
            ids.push(render_id);
        }
        Ok(ids)
    }

    async fn wait_for_rendered_status(
        &self,
        render_id: &str,
        stop: StopToken,
    ) -> Result<RenderStatusResult> {
        loop {
            self.counters.status_calls.fetch_add(1, Ordering::SeqCst);
            {
                let state = self.state.lock();
                let render = state.renders.get(render_id).ok_or_else(|| Error::RenderStatus {
                    render_id: render_id.to_string(),
                    reason: "unknown render id".to_string(),
                })?;

                if Instant::now() >= render.ready_at {
                    if state
                        .failures
                        .status_browsers
                        .contains(&render.request.browser_name)
                    {
                        return Ok(RenderStatusResult {
                            status: RenderStatus::Error,
                            image_location: None,
                            dom_location: None,
                            user_agent: None,
                            device_size: None,
                            selector_regions: Vec::new(),
                            error: Some(format!(
                                "{} crashed while rendering",
                                render.request.browser_name
                            )),
                        });
                    }
                    return Ok(self.settled_status(&state, render_id, render));
                }
            }

            if stop.is_stopped() {
                debug!("Stopped waiting for render {}", render_id);
                return Ok(RenderStatusResult {
                    status: RenderStatus::Rendering,
                    image_location: None,
                    dom_location: None,
                    user_agent: None,
                    device_size: None,
                    selector_regions: Vec::new(),
                    error: None,
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn user_agents(&self) -> Result<HashMap<String, String>> {
        Ok(self.user_agents.clone())
    }
}

#[async_trait]
impl DomResolver for SimulatedGrid {
    async fn resolve(&self, input: DomResolveInput) -> Result<ResolvedDom> {
        self.counters.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let mut all_resources = BTreeMap::new();
        let dom = self.resolve_snapshot(&input.snapshot, &mut all_resources)?;
        Ok(ResolvedDom { all_resources, dom })
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// Environment hints a comparison client received
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EyesEnvironment {
    pub inferred: Option<String>,
    pub viewport: Option<RectangleSize>,
}

/// Recording comparison client for one browser
///
/// Matches exactly the screenshots of good renders.
pub struct SimulatedEyes {
    calls: Mutex<Vec<CheckWindowArgs>>,
    environment: Mutex<EyesEnvironment>,
    compare_latency: Duration,
    fail_tags: Mutex<HashSet<String>>,
}

impl Default for SimulatedEyes {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEyes {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            environment: Mutex::new(EyesEnvironment::default()),
            compare_latency: Duration::ZERO,
            fail_tags: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_compare_latency(mut self, latency: Duration) -> Self {
        self.compare_latency = latency;
        self
    }

    /// Fail comparisons of checkpoints with this tag
    pub fn fail_tag(&self, tag: impl Into<String>) {
        self.fail_tags.lock().insert(tag.into());
    }

    /// Comparison calls in the order they started
    pub fn calls(&self) -> Vec<CheckWindowArgs> {
        self.calls.lock().clone()
    }

    pub fn tags(&self) -> Vec<Option<String>> {
        self.calls.lock().iter().map(|c| c.tag.clone()).collect()
    }

    pub fn environment(&self) -> EyesEnvironment {
        self.environment.lock().clone()
    }

    async fn compare(&self, args: CheckWindowArgs) -> Result<MatchResult> {
        let tag = args.tag.clone();
        let as_expected = args
            .screenshot_url
            .as_deref()
            .map_or(false, |url| url.starts_with(GOOD_SCREENSHOT_PREFIX));
        let window_id = {
            let mut calls = self.calls.lock();
            calls.push(args);
            calls.len() as u32
        };

        if !self.compare_latency.is_zero() {
            sleep(self.compare_latency).await;
        }
        if let Some(tag) = tag {
            if self.fail_tags.lock().contains(&tag) {
                return Err(Error::Comparison(format!("comparison of '{}' rejected", tag)));
            }
        }

        Ok(MatchResult {
            as_expected,
            window_id: Some(window_id),
        })
    }
}

#[async_trait]
impl ComparisonClient for SimulatedEyes {
    async fn ensure_running_session(&self) -> Result<()> {
        Ok(())
    }

    async fn check_window(&self, args: CheckWindowArgs) -> Result<MatchResult> {
        self.compare(args).await
    }

    async fn test_window(&self, args: CheckWindowArgs) -> Result<MatchResult> {
        self.compare(args).await
    }

    fn set_inferred_environment(&self, inferred: String) {
        self.environment.lock().inferred = Some(inferred);
    }

    fn set_viewport_size(&self, size: RectangleSize) {
        self.environment.lock().viewport = Some(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::TestController;
    use rendergrid_common::{RenderInfo, SizeMode};

    fn request(browser: &str, dom: &Resource, resources: &[Resource]) -> RenderRequest {
        RenderRequest {
            webhook: None,
            stitching_service: None,
            url: "https://shop.test/".into(),
            dom: dom.descriptor(),
            resources: resources
                .iter()
                .map(|r| (r.url().to_string(), r.descriptor()))
                .collect(),
            render_info: RenderInfo {
                width: Some(1024),
                height: Some(768),
                size_mode: SizeMode::FullPage,
                selector: None,
                region: None,
                emulation_info: None,
                ios_device_info: None,
            },
            browser_name: browser.into(),
            platform: None,
            script_hooks: None,
            selectors_to_find_regions_for: vec![],
            send_dom: true,
            options: None,
        }
    }

    fn dom_with_cdt(cdt: serde_json::Value) -> Resource {
        Resource::from_dom("https://shop.test/", &json!({ "cdt": cdt })).unwrap()
    }

    #[test]
    fn test_good_when_either_dom_or_resources_match() {
        let grid = SimulatedGrid::new();
        let css = Resource::new("https://shop.test/a.css", "text/css", &b"body{}"[..]);
        let good_dom = dom_with_cdt(json!([{"nodeName": "HTML"}]));
        let bad_dom = dom_with_cdt(json!([{"nodeName": "BODY"}]));
        grid.preload(good_dom.clone());
        grid.preload(bad_dom.clone());
        grid.set_expectation(RenderExpectation {
            cdt: Some(json!([{"nodeName": "HTML"}])),
            resources: Some(
                [(css.url().to_string(), css.hash().unwrap().to_string())]
                    .into_iter()
                    .collect(),
            ),
        });

        let other_css = Resource::new("https://shop.test/a.css", "text/css", &b"p{}"[..]);
        let state = grid.state.lock();
        // DOM matches, resources differ
        assert!(SimulatedGrid::is_good(&state, &request("chrome", &good_dom, &[other_css.clone()])));
        // DOM differs, resources match
        assert!(SimulatedGrid::is_good(&state, &request("chrome", &bad_dom, &[css])));
        // Neither matches
        assert!(!SimulatedGrid::is_good(&state, &request("chrome", &bad_dom, &[other_css])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_honours_latency_and_stop() {
        let grid = SimulatedGrid::new();
        grid.set_browser_latency("firefox", Duration::from_secs(5));
        let dom = dom_with_cdt(json!([]));

        let ids = grid
            .render_batch(vec![request("chrome", &dom, &[]), request("firefox", &dom, &[])])
            .await
            .unwrap();

        let controller = TestController::new("t", 2);
        let fast = grid
            .wait_for_rendered_status(&ids[0], controller.stop_token(0))
            .await
            .unwrap();
        assert_eq!(fast.status, RenderStatus::Rendered);
        assert!(fast.image_location.unwrap().starts_with(GOOD_SCREENSHOT_PREFIX));
        assert_eq!(fast.device_size, Some(RectangleSize::new(1024, 768)));

        controller.stop_test(1);
        let slow = grid
            .wait_for_rendered_status(&ids[1], controller.stop_token(1))
            .await
            .unwrap();
        assert_eq!(slow.status, RenderStatus::Rendering);
    }

    #[tokio::test]
    async fn test_resolver_collects_inline_origin_and_frames() {
        let grid = SimulatedGrid::new();
        grid.serve(Resource::new("https://shop.test/logo.svg", "image/svg+xml", &b"<svg/>"[..]));

        let mut snapshot = DomSnapshot {
            url: "https://shop.test/".into(),
            cdt: json!([]),
            resource_urls: vec![
                "https://shop.test/logo.svg".into(),
                "https://cdn.test/font.woff".into(),
            ],
            ..Default::default()
        };
        snapshot.frames.push(DomSnapshot {
            url: "https://shop.test/frame".into(),
            cdt: json!([{"nodeName": "IFRAME-BODY"}]),
            ..Default::default()
        });

        let resolved = grid
            .resolve(DomResolveInput {
                snapshot,
                user_agent: None,
                referer: "https://shop.test/".into(),
                proxy: None,
            })
            .await
            .unwrap();

        assert_eq!(resolved.all_resources.len(), 3);
        assert!(resolved.all_resources["https://shop.test/logo.svg"].has_content());
        assert!(!resolved.all_resources["https://cdn.test/font.woff"].has_content());
        assert!(resolved.all_resources["https://shop.test/frame"].hash().is_some());
        assert!(resolved.dom.hash().is_some());
    }

    #[tokio::test]
    async fn test_eyes_match_only_good_screenshots() {
        let eyes = SimulatedEyes::new();
        let mut args = CheckWindowArgs {
            screenshot_url: Some(format!("{}r1.png", GOOD_SCREENSHOT_PREFIX)),
            tag: Some("home".into()),
            dom_url: None,
            check_settings: Default::default(),
            image_location: None,
            url: "https://shop.test/".into(),
        };
        assert!(eyes.check_window(args.clone()).await.unwrap().as_expected);

        args.screenshot_url = Some(format!("{}r2.png", BAD_SCREENSHOT_PREFIX));
        assert!(!eyes.check_window(args).await.unwrap().as_expected);
        assert_eq!(eyes.calls().len(), 2);
    }
}
