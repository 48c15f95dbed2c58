//! Render job for one (checkpoint, browser) pair
//!
//! A job walks build → submit → render → poll → await order → compare. The
//! controller is consulted before every await, so a job that was stopped
//! while suspended makes no further submissions or comparison calls.

use rendergrid_common::{
    BrowserConfig, CheckWindowArgs, DomSnapshot, Error, MatchLevel, MatchResult, Region,
    RenderRequest, RenderStatus, RenderStatusResult, Resource, Result, SizeMode, Target,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::regions::{
    calculate_match_regions, image_location, image_location_region, CheckOptions,
    MatchRegionSpecs,
};
use crate::request::RenderRequestBuilder;
use crate::services::{ComparisonClient, DomResolveInput};
use crate::session::{SessionContext, StepChain};

/// Where a job was when it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Building,
    Submitting,
    Rendering,
    Polling,
    AwaitingOrder,
    Comparing,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Building => write!(f, "building"),
            JobPhase::Submitting => write!(f, "submitting"),
            JobPhase::Rendering => write!(f, "rendering"),
            JobPhase::Polling => write!(f, "polling"),
            JobPhase::AwaitingOrder => write!(f, "awaiting order"),
            JobPhase::Comparing => write!(f, "comparing"),
        }
    }
}

/// Checkpoint parameters shared by every browser's job
pub(crate) struct Checkpoint {
    pub step: usize,
    pub tag: Option<String>,
    pub target: Target,
    pub fully: bool,
    pub size_mode: SizeMode,
    pub region: Option<Region>,
    pub match_level: MatchLevel,
    pub options: CheckOptions,
    pub builder: RenderRequestBuilder,
    pub regions: MatchRegionSpecs,
}

pub(crate) struct BrowserJob {
    ctx: Arc<SessionContext>,
    checkpoint: Arc<Checkpoint>,
    index: usize,
    snapshot: DomSnapshot,
}

impl BrowserJob {
    pub fn new(
        ctx: Arc<SessionContext>,
        checkpoint: Arc<Checkpoint>,
        index: usize,
        snapshot: DomSnapshot,
    ) -> Self {
        Self {
            ctx,
            checkpoint,
            index,
            snapshot,
        }
    }

    fn browser(&self) -> &BrowserConfig {
        &self.ctx.browsers[self.index]
    }

    fn client(&self) -> &Arc<dyn ComparisonClient> {
        &self.ctx.clients[self.index]
    }

    /// Stop-check at a suspension boundary
    fn stopped(&self, phase: JobPhase) -> bool {
        if self.ctx.controller.should_stop_test(self.index) {
            info!(
                "Aborting step #{} of test {} browser #{} while {}",
                self.checkpoint.step, self.ctx.test_name, self.index, phase
            );
            true
        } else {
            false
        }
    }

    /// Run the job to completion
    ///
    /// `Ok(None)` means the job stopped or handed its failure to the
    /// run-wide fatal slot. `Err` is local to this browser.
    pub async fn run(self, prev: StepChain) -> Result<Option<MatchResult>> {
        if self.stopped(JobPhase::Building) {
            return Ok(None);
        }
        let request = self.build().await?;

        if self.stopped(JobPhase::Submitting) {
            return Ok(None);
        }
        self.client().ensure_running_session().await?;

        let submitted = self.submit(request).await;
        if matches!(submitted, Ok(None)) {
            return Ok(None);
        }

        // A browser stopped while its submission was in flight records nothing
        if self.stopped(JobPhase::Rendering) {
            self.infer_environment_from_table().await;
            return Ok(None);
        }
        let render_id = match submitted {
            Ok(Some(render_id)) => render_id,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.infer_environment_from_table().await;
                self.ctx.controller.set_fatal_error(e);
                return Ok(None);
            }
        };
        self.ctx.controller.add_render_id(self.index, render_id.clone());
        debug!(
            "Test {} browser #{} step #{} rendering as {}",
            self.ctx.test_name, self.index, self.checkpoint.step, render_id
        );

        let status = match self.poll(&render_id).await {
            Ok(Some(status)) => status,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.infer_environment_from_table().await;
                self.ctx.controller.set_fatal_error(e);
                return Ok(None);
            }
        };
        self.apply_render_environment(&status);

        prev.await;
        if self.stopped(JobPhase::AwaitingOrder) {
            return Ok(None);
        }

        self.compare(&render_id, status).await
    }

    /// Resolve the snapshot, upload what it references and build the request
    async fn build(&self) -> Result<RenderRequest> {
        let resolved = self
            .ctx
            .services
            .resolver
            .resolve(DomResolveInput {
                snapshot: self.snapshot.clone(),
                user_agent: self.ctx.user_agent.clone(),
                referer: self.checkpoint.builder.url.clone(),
                proxy: self.client().proxy(),
            })
            .await
            .map_err(|e| match e {
                Error::DomResolution(_) => e,
                other => Error::DomResolution(other.to_string()),
            })?;

        let mut to_upload: Vec<Resource> = resolved.all_resources.values().cloned().collect();
        to_upload.push(resolved.dom.clone());
        self.ctx.uploads.put_resources(&to_upload).await?;

        self.checkpoint
            .builder
            .build(&resolved.dom, &resolved.all_resources, self.browser())
    }

    /// Pass the request through the render throttle
    async fn submit(&self, request: RenderRequest) -> Result<Option<String>> {
        let controller = &self.ctx.controller;
        if controller.should_stop_all_tests() || controller.should_stop_test(self.index) {
            info!(
                "Render for test {} browser #{} not submitted, test stopped",
                self.ctx.test_name, self.index
            );
            return Ok(None);
        }

        self.ctx.grid_state.render_queued();
        let outcome = async {
            let _permit = self
                .ctx
                .render_throttle
                .acquire()
                .await
                .map_err(|_| Error::Internal("render throttle closed".to_string()))?;
            if self.stopped(JobPhase::Submitting) {
                return Ok(None);
            }

            let render_ids = self
                .ctx
                .services
                .renderer
                .render_batch(vec![request])
                .await
                .map_err(|e| match e {
                    Error::Render(_) => e,
                    other => Error::Render(other.to_string()),
                })?;

            render_ids
                .into_iter()
                .next()
                .map(Some)
                .ok_or_else(|| Error::Render("renderer returned no render id".to_string()))
        }
        .await;
        self.ctx.grid_state.render_dequeued();

        outcome
    }

    /// Wait for the render to settle
    async fn poll(&self, render_id: &str) -> Result<Option<RenderStatusResult>> {
        let stop = self.ctx.controller.stop_token(self.index);
        let outcome = self
            .ctx
            .services
            .renderer
            .wait_for_rendered_status(render_id, stop)
            .await;

        // A waiter that gave up because the job stopped is not a pipeline failure
        if self.stopped(JobPhase::Polling) {
            return Ok(None);
        }

        let status = outcome.map_err(|e| match e {
            Error::RenderStatus { .. } => e,
            other => Error::RenderStatus {
                render_id: render_id.to_string(),
                reason: other.to_string(),
            },
        })?;

        match status.status {
            RenderStatus::Rendered => Ok(Some(status)),
            RenderStatus::Error => Err(Error::RenderStatus {
                render_id: render_id.to_string(),
                reason: status
                    .error
                    .unwrap_or_else(|| "render reported an error".to_string()),
            }),
            RenderStatus::Rendering => Err(Error::RenderStatus {
                render_id: render_id.to_string(),
                reason: "waiter returned before the render settled".to_string(),
            }),
        }
    }

    /// Hand the rendered environment to the comparison client
    fn apply_render_environment(&self, status: &RenderStatusResult) {
        let client = self.client();
        if let Some(user_agent) = &status.user_agent {
            client.set_inferred_environment(format!("useragent:{}", user_agent));
        }
        if let Some(device_size) = status.device_size {
            if self.browser().viewport() != Some(device_size) {
                debug!(
                    "Browser #{} rendered at {}x{}",
                    self.index, device_size.width, device_size.height
                );
                client.set_viewport_size(device_size);
            }
        }
    }

    /// Best-effort user agent lookup when no status result is available
    async fn infer_environment_from_table(&self) {
        match self.ctx.services.renderer.user_agents().await {
            Ok(user_agents) => {
                if let Some(user_agent) = user_agents.get(&self.browser().name) {
                    self.client()
                        .set_inferred_environment(format!("useragent:{}", user_agent));
                }
            }
            Err(e) => warn!("Could not fetch user agents: {}", e),
        }
    }

    async fn compare(
        &self,
        render_id: &str,
        status: RenderStatusResult,
    ) -> Result<Option<MatchResult>> {
        let checkpoint = &self.checkpoint;
        let offset_region = image_location_region(checkpoint.size_mode, &status.selector_regions);
        let regions = calculate_match_regions(
            &checkpoint.regions,
            checkpoint.size_mode,
            &status.selector_regions,
            offset_region,
        )?;

        let args = CheckWindowArgs {
            screenshot_url: status.image_location,
            tag: checkpoint.tag.clone(),
            dom_url: status.dom_location,
            check_settings: regions.into_check_settings(
                render_id,
                checkpoint.match_level,
                &checkpoint.options,
            ),
            image_location: image_location(
                checkpoint.size_mode,
                &status.selector_regions,
                checkpoint.region,
            ),
            url: checkpoint.builder.url.clone(),
        };

        if self.stopped(JobPhase::Comparing) {
            return Ok(None);
        }

        debug!(
            "Comparing step #{} of test {} browser #{} ({} {}, fully={})",
            checkpoint.step,
            self.ctx.test_name,
            self.index,
            match checkpoint.target {
                Target::Window => "window",
                Target::Region => "region",
            },
            checkpoint.size_mode,
            checkpoint.fully
        );

        let client = self.client();
        let result = if self.ctx.is_single_window {
            client.test_window(args).await
        } else {
            client.check_window(args).await
        };

        result.map(Some).map_err(|e| match e {
            Error::Comparison(_) => e,
            other => Error::Comparison(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(JobPhase::AwaitingOrder.to_string(), "awaiting order");
        assert_eq!(JobPhase::Polling.to_string(), "polling");
    }
}
