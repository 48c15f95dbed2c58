//! Per-test stop/error bookkeeping shared by every browser job of a test

use parking_lot::Mutex;
use rendergrid_common::Error;
use std::sync::Arc;
use tracing::{info, warn};

/// Bookkeeping for one browser-config index
#[derive(Debug, Clone, Default)]
pub struct JobState {
    pub stopped: bool,
    pub render_ids: Vec<String>,
    pub error: Option<Error>,
}

#[derive(Debug, Default)]
struct ControllerState {
    jobs: Vec<JobState>,
    fatal_error: Option<Error>,
}

/// Shared cancellation and error context for one test
///
/// Clones share state. Every read and write happens under one lock, so the
/// first-fatal-error-wins rule holds across threads.
#[derive(Debug, Clone)]
pub struct TestController {
    test_name: Arc<str>,
    state: Arc<Mutex<ControllerState>>,
}

impl TestController {
    /// Create a controller for a test rendered on `num_browsers` configurations
    pub fn new(test_name: impl Into<String>, num_browsers: usize) -> Self {
        let test_name: String = test_name.into();
        Self {
            test_name: test_name.into(),
            state: Arc::new(Mutex::new(ControllerState {
                jobs: vec![JobState::default(); num_browsers],
                fatal_error: None,
            })),
        }
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn num_browsers(&self) -> usize {
        self.state.lock().jobs.len()
    }

    /// Whether work for `index` must stop
    pub fn should_stop_test(&self, index: usize) -> bool {
        let state = self.state.lock();
        state.fatal_error.is_some() || state.jobs.get(index).map_or(true, |j| j.stopped)
    }

    /// Whether a run-wide fatal error has been recorded
    pub fn should_stop_all_tests(&self) -> bool {
        self.state.lock().fatal_error.is_some()
    }

    /// Stop one index without recording an error
    pub fn stop_test(&self, index: usize) {
        if let Some(job) = self.state.lock().jobs.get_mut(index) {
            job.stopped = true;
        }
    }

    /// Record an index-scoped error; that index stops, the others continue
    pub fn set_error(&self, index: usize, error: Error) {
        warn!(
            "Test {} browser #{} failed: {}",
            self.test_name, index, error
        );
        if let Some(job) = self.state.lock().jobs.get_mut(index) {
            job.stopped = true;
            job.error = Some(error);
        }
    }

    /// Record a run-wide error; the first one wins
    pub fn set_fatal_error(&self, error: Error) {
        let mut state = self.state.lock();
        if let Some(existing) = &state.fatal_error {
            info!(
                "Ignoring fatal error for test {} (already failed with: {}): {}",
                self.test_name, existing, error
            );
            return;
        }
        warn!("Fatal error in test {}: {}", self.test_name, error);
        state.fatal_error = Some(error);
    }

    pub fn fatal_error(&self) -> Option<Error> {
        self.state.lock().fatal_error.clone()
    }

    pub fn error(&self, index: usize) -> Option<Error> {
        self.state.lock().jobs.get(index).and_then(|j| j.error.clone())
    }

    /// All index-scoped errors, in index order
    pub fn errors(&self) -> Vec<(usize, Error)> {
        self.state
            .lock()
            .jobs
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.error.clone().map(|e| (i, e)))
            .collect()
    }

    pub fn add_render_id(&self, index: usize, render_id: impl Into<String>) {
        if let Some(job) = self.state.lock().jobs.get_mut(index) {
            job.render_ids.push(render_id.into());
        }
    }

    pub fn render_ids(&self, index: usize) -> Vec<String> {
        self.state
            .lock()
            .jobs
            .get(index)
            .map(|j| j.render_ids.clone())
            .unwrap_or_default()
    }

    /// Snapshot of one index's state
    pub fn job_state(&self, index: usize) -> Option<JobState> {
        self.state.lock().jobs.get(index).cloned()
    }

    /// Stop predicate bound to one index
    pub fn stop_token(&self, index: usize) -> StopToken {
        StopToken {
            controller: self.clone(),
            index,
        }
    }
}

/// Advisory cancellation handle for a single browser job
#[derive(Debug, Clone)]
pub struct StopToken {
    controller: TestController,
    index: usize,
}

impl StopToken {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_stopped(&self) -> bool {
        self.controller.should_stop_test(self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_error_is_local() {
        let controller = TestController::new("login", 3);
        controller.set_error(1, Error::DomResolution("broken cdt".into()));

        assert!(controller.should_stop_test(1));
        assert!(!controller.should_stop_test(0));
        assert!(!controller.should_stop_test(2));
        assert!(!controller.should_stop_all_tests());
        assert_eq!(controller.errors().len(), 1);
    }

    #[test]
    fn test_first_fatal_error_wins() {
        let controller = TestController::new("login", 2);
        controller.set_fatal_error(Error::Render("first".into()));
        controller.set_fatal_error(Error::Render("second".into()));

        assert_eq!(controller.fatal_error(), Some(Error::Render("first".into())));
        assert!(controller.should_stop_all_tests());
        assert!(controller.should_stop_test(0));
        assert!(controller.should_stop_test(1));
    }

    #[test]
    fn test_stop_without_error() {
        let controller = TestController::new("login", 2);
        let token = controller.stop_token(0);
        assert!(!token.is_stopped());

        controller.stop_test(0);
        assert!(token.is_stopped());
        assert!(controller.error(0).is_none());
        assert!(!controller.should_stop_test(1));
    }

    #[test]
    fn test_render_ids_append() {
        let controller = TestController::new("login", 2);
        controller.add_render_id(0, "r-1");
        controller.add_render_id(0, "r-2");
        controller.add_render_id(1, "r-3");

        assert_eq!(controller.render_ids(0), vec!["r-1", "r-2"]);
        assert_eq!(controller.render_ids(1), vec!["r-3"]);
        assert!(controller.render_ids(7).is_empty());
    }

    #[test]
    fn test_unknown_index_is_stopped() {
        let controller = TestController::new("login", 1);
        assert!(controller.should_stop_test(5));
    }
}
