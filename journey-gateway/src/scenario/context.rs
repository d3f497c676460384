//! State shared by every task of one request.

use std::sync::Arc;
use std::time::Duration;

use crate::providers::{Coverage, PtPlanner};
use crate::request::JourneyRequest;

use super::future_manager::FutureManager;

/// The request being answered, the collaborators answering it and the
/// manager running its tasks.
///
/// Immutable once built; tasks hold it through an `Arc`.
pub struct RequestContext {
    /// The request, with defaults applied.
    pub request: JourneyRequest,
    pub coverage: Coverage,
    pub fm: FutureManager,
    /// How long to wait for the best of several direct-path candidates.
    pub direct_path_timeout: Option<Duration>,
}

impl RequestContext {
    pub fn new(request: JourneyRequest, coverage: Coverage, fm: FutureManager) -> Self {
        Self {
            request,
            coverage,
            fm,
            direct_path_timeout: None,
        }
    }

    pub fn with_direct_path_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.direct_path_timeout = timeout;
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request.request_id
    }

    pub fn planner(&self) -> Arc<dyn PtPlanner> {
        self.coverage.planner()
    }
}
