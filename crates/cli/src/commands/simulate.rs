//! Simulate Commands
//!
//! Drives a run manifest through the orchestrator against the in-memory
//! grid and reports what every browser would have compared.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use rendergrid_client::sim::{RenderExpectation, SimulatedEyes, SimulatedGrid};
use rendergrid_client::{
    CheckWindowRequest, ComparisonClient, OpenEyesRequest, TestSummary, VisualGridClient,
};
use rendergrid_common::{
    BrowserConfig, GridConfig, MatchLevel, Region, RenderEndpoints, Resource,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::output::{
    print_status, render_plain, render_table, status_line, OutputFormat, Status, TableDisplay,
};

#[derive(Args)]
pub struct SimulateArgs {
    /// Run manifest (JSON)
    #[arg(short, long)]
    pub manifest: PathBuf,
}

/// Resource served by the simulated origin
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServedResource {
    pub url: String,
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectationManifest {
    #[serde(default)]
    pub cdt: Option<serde_json::Value>,
    /// URLs whose served content a good render must reference
    #[serde(default)]
    pub resource_urls: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestManifest {
    pub test_name: String,
    pub browsers: Vec<BrowserConfig>,
    pub checkpoints: Vec<CheckWindowRequest>,
    #[serde(default)]
    pub match_level: Option<MatchLevel>,
    #[serde(default)]
    pub is_single_window: Option<bool>,
}

/// Everything a dry run needs
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunManifest {
    pub tests: Vec<TestManifest>,
    /// Render latency per browser name
    #[serde(default)]
    pub latencies_ms: HashMap<String, u64>,
    #[serde(default)]
    pub resources: Vec<ServedResource>,
    #[serde(default)]
    pub selector_regions: HashMap<String, Vec<Region>>,
    #[serde(default)]
    pub expectation: Option<ExpectationManifest>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl RunManifest {
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid manifest {}", path.display()))
    }
}

/// One row per (test, browser)
#[derive(Debug, Clone, Serialize)]
pub struct BrowserRow {
    pub test_name: String,
    pub browser: String,
    pub steps: usize,
    pub matched: usize,
    pub render_ids: Vec<String>,
    pub error: Option<String>,
}

impl TableDisplay for BrowserRow {
    fn headers() -> Vec<&'static str> {
        vec!["Test", "Browser", "Steps", "Matched", "Renders", "Status"]
    }

    fn row(&self) -> Vec<String> {
        let status = match &self.error {
            Some(e) => format!("✗ {}", e).red().to_string(),
            None if self.matched == self.steps => "✓ Passed".green().to_string(),
            None => "✗ Diffs".yellow().to_string(),
        };
        vec![
            self.test_name.clone(),
            self.browser.clone(),
            self.steps.to_string(),
            self.matched.to_string(),
            self.render_ids.len().to_string(),
            status,
        ]
    }
}

/// Network traffic of the whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub tests: usize,
    pub aborted: usize,
    pub existence_checks: usize,
    pub uploads: usize,
    pub renders: usize,
    pub elapsed_ms: u128,
}

impl TableDisplay for RunStats {
    fn headers() -> Vec<&'static str> {
        vec!["Tests", "Aborted", "Checks", "Uploads", "Renders", "Elapsed"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.tests.to_string(),
            self.aborted.to_string(),
            self.existence_checks.to_string(),
            self.uploads.to_string(),
            self.renders.to_string(),
            format!("{}ms", self.elapsed_ms),
        ]
    }
}

/// Outcome of a dry run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub rows: Vec<BrowserRow>,
    /// Tests that ended on a run-wide error, with that error
    pub aborted: Vec<(String, String)>,
    pub stats: RunStats,
}

impl RunReport {
    /// Bottom line of the browser table
    fn totals(&self) -> Vec<String> {
        let steps: usize = self.rows.iter().map(|r| r.steps).sum();
        let matched: usize = self.rows.iter().map(|r| r.matched).sum();
        let renders: usize = self.rows.iter().map(|r| r.render_ids.len()).sum();
        let failed = self
            .rows
            .iter()
            .filter(|r| r.error.is_some() || r.matched != r.steps)
            .count();
        vec![
            "Total".to_string(),
            format!("{} browser(s)", self.rows.len()),
            steps.to_string(),
            matched.to_string(),
            renders.to_string(),
            format!("{} failed, {} aborted", failed, self.aborted.len()),
        ]
    }

    /// Render the whole report in one piece
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        let mut out = match format {
            OutputFormat::Json => return Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Table => vec![
                render_table(&self.rows, Some(self.totals())),
                render_table(std::slice::from_ref(&self.stats), None),
            ],
            OutputFormat::Plain => vec![
                render_plain(&self.rows),
                render_plain(std::slice::from_ref(&self.stats)),
            ],
        };
        // Tests that ended on a run-wide error have no browser rows
        out.extend(self.aborted.iter().map(|(test_name, error)| {
            status_line(Status::Failure, &format!("{} aborted: {}", test_name, error))
        }));
        Ok(out.join("\n"))
    }

    pub fn passed(&self) -> bool {
        self.aborted.is_empty()
            && self
                .rows
                .iter()
                .all(|r| r.error.is_none() && r.matched == r.steps)
    }
}

fn rows_for(summary: &TestSummary) -> Vec<BrowserRow> {
    summary
        .browsers
        .iter()
        .map(|b| BrowserRow {
            test_name: summary.test_name.clone(),
            browser: b
                .browser
                .device_name
                .clone()
                .unwrap_or_else(|| match b.browser.viewport() {
                    Some(v) => format!("{} {}x{}", b.browser.name, v.width, v.height),
                    None => b.browser.name.clone(),
                }),
            steps: b.results.len(),
            matched: b.results.iter().filter(|r| r.as_expected).count(),
            render_ids: b.render_ids.clone(),
            error: b.error.as_ref().map(|e| e.to_string()),
        })
        .collect()
}

fn build_grid(manifest: &RunManifest) -> Arc<SimulatedGrid> {
    let grid = Arc::new(SimulatedGrid::new());
    for (browser, ms) in &manifest.latencies_ms {
        grid.set_browser_latency(browser.clone(), Duration::from_millis(*ms));
    }
    for (selector, regions) in &manifest.selector_regions {
        grid.set_selector_regions(selector.clone(), regions.clone());
    }

    let mut served = BTreeMap::new();
    for r in &manifest.resources {
        let resource = Resource::new(
            r.url.clone(),
            r.content_type.clone(),
            r.content.clone().into_bytes(),
        );
        served.insert(r.url.clone(), resource.clone());
        grid.serve(resource);
    }

    if let Some(expectation) = &manifest.expectation {
        grid.set_expectation(RenderExpectation {
            cdt: expectation.cdt.clone(),
            resources: expectation.resource_urls.as_ref().map(|urls| {
                urls.iter()
                    .filter_map(|url| served.get(url))
                    .filter_map(|r| r.hash().map(|h| (r.url().to_string(), h.to_string())))
                    .collect()
            }),
        });
    }
    grid
}

async fn run_test(
    client: &VisualGridClient,
    test: TestManifest,
    user_agent: Option<String>,
) -> rendergrid_common::Result<TestSummary> {
    let clients: Vec<Arc<dyn ComparisonClient>> = test
        .browsers
        .iter()
        .map(|_| Arc::new(SimulatedEyes::new()) as Arc<dyn ComparisonClient>)
        .collect();

    let session = client.open_eyes(OpenEyesRequest {
        test_name: test.test_name,
        browsers: test.browsers,
        clients,
        user_agent,
        match_level: test.match_level,
        is_single_window: test.is_single_window,
    })?;

    for checkpoint in test.checkpoints {
        session.check_window(checkpoint)?;
    }
    session.close().await
}

/// Run every test of a manifest concurrently on one grid client
pub async fn run_manifest(config: GridConfig, manifest: RunManifest) -> Result<RunReport> {
    let started = Instant::now();
    let grid = build_grid(&manifest);
    let client = VisualGridClient::new(config, grid.services(), RenderEndpoints::default())?;

    let test_count = manifest.tests.len();
    let user_agent = manifest.user_agent;
    let outcomes = futures::future::join_all(manifest.tests.into_iter().map(|test| {
        let name = test.test_name.clone();
        let client = &client;
        let user_agent = user_agent.clone();
        async move { (name, run_test(client, test, user_agent).await) }
    }))
    .await;

    let mut rows = Vec::new();
    let mut aborted = Vec::new();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(summary) => rows.extend(rows_for(&summary)),
            Err(e) => aborted.push((name, e.to_string())),
        }
    }

    let stats = RunStats {
        tests: test_count,
        aborted: aborted.len(),
        existence_checks: grid.counters.check_calls.load(Ordering::SeqCst),
        uploads: grid.counters.put_calls.load(Ordering::SeqCst),
        renders: grid.counters.render_calls.load(Ordering::SeqCst),
        elapsed_ms: started.elapsed().as_millis(),
    };
    info!(
        "Simulated {} test(s): {} upload(s), {} render(s)",
        stats.tests, stats.uploads, stats.renders
    );

    Ok(RunReport {
        rows,
        aborted,
        stats,
    })
}

pub async fn execute(args: SimulateArgs, config: GridConfig, format: OutputFormat) -> Result<()> {
    let manifest = RunManifest::from_path(&args.manifest)?;
    let report = run_manifest(config, manifest).await?;

    println!("{}", report.render(format)?);
    if report.passed() {
        print_status(Status::Success, "All checkpoints matched");
    } else {
        print_status(Status::Warning, "Some checkpoints did not match");
        std::process::exit(1);
    }
    Ok(())
}
