//! Follow-up expansion
//!
//! A [`FollowUpDetector`] looks at a completed response and proposes
//! follow-up query texts. The [`FollowUpExpander`] owns the scheduling
//! policy: every proposal becomes a recursive child one level deeper than its
//! parent and goes onto the scheduler's stack, subject to the depth guard and
//! an optional per-root budget.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::QueryError;
use crate::scheduler::Scheduler;
use crate::transport::AgentResponse;
use crate::types::{normalize_query, QueryId, QueryRequest};

/// Proposes follow-up queries for a response.
///
/// Implementations must be pure: the same response always yields the same
/// proposals and nothing is mutated.
#[cfg_attr(test, mockall::automock)]
pub trait FollowUpDetector: Send + Sync {
    /// Follow-up query texts, in the order they were found
    fn analyze(&self, response: &AgentResponse) -> Vec<String>;
}

/// Detector that never proposes anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFollowUps;

impl FollowUpDetector for NoFollowUps {
    fn analyze(&self, _response: &AgentResponse) -> Vec<String> {
        Vec::new()
    }
}

/// Detector driven by markers in the response payload:
///
/// - `{"pagination": {"next_page": 2}}` or `{"next_page": 2}`
/// - `{"pagination": {"page": 1, "has_more": true}}`
/// - `{"follow_ups": ["query", ...]}`
///
/// A page marker proposes `"<query> page <n>"`, where any existing
/// `page <n>` suffix of the answered query is replaced.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkerDetector;

impl MarkerDetector {
    fn next_page(payload: &serde_json::Value) -> Option<u64> {
        let pagination = payload.get("pagination").unwrap_or(payload);
        if let Some(next) = pagination.get("next_page").and_then(serde_json::Value::as_u64) {
            return Some(next);
        }
        let has_more = pagination
            .get("has_more")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        let page = pagination.get("page").and_then(serde_json::Value::as_u64)?;
        has_more.then_some(page + 1)
    }

    fn strip_page_suffix(query: &str) -> &str {
        let trimmed = query.trim_end();
        let mut words = trimmed.rsplitn(3, char::is_whitespace);
        match (words.next(), words.next(), words.next()) {
            (Some(number), Some(keyword), Some(rest))
                if number.chars().all(|c| c.is_ascii_digit())
                    && keyword.eq_ignore_ascii_case("page") =>
            {
                rest.trim_end()
            }
            _ => trimmed,
        }
    }
}

impl FollowUpDetector for MarkerDetector {
    fn analyze(&self, response: &AgentResponse) -> Vec<String> {
        let mut proposals = Vec::new();

        if let Some(page) = Self::next_page(&response.payload) {
            proposals.push(format!(
                "{} page {}",
                Self::strip_page_suffix(&response.query),
                page
            ));
        }

        if let Some(items) = response
            .payload
            .get("follow_ups")
            .and_then(serde_json::Value::as_array)
        {
            proposals.extend(
                items
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(str::to_string),
            );
        }

        proposals
    }
}

/// Outcome of expanding one response
#[derive(Debug, Default)]
pub struct ExpansionOutcome {
    /// Follow-ups pushed onto the stack, in push order
    pub scheduled: Vec<QueryId>,
    /// Proposals refused by the depth guard or the per-root budget
    pub rejected: Vec<(QueryRequest, QueryError)>,
}

#[derive(Debug, Default)]
struct RootBudget {
    derived: usize,
    outstanding: usize,
}

/// Applies the follow-up scheduling policy
pub struct FollowUpExpander {
    detector: Arc<dyn FollowUpDetector>,
    max_derived_per_root: Option<usize>,
    roots: Mutex<HashMap<QueryId, RootBudget>>,
}

impl FollowUpExpander {
    /// Create a new expander
    #[must_use]
    pub fn new(detector: Arc<dyn FollowUpDetector>, max_derived_per_root: Option<usize>) -> Self {
        Self {
            detector,
            max_derived_per_root,
            roots: Mutex::new(HashMap::new()),
        }
    }

    fn roots(&self) -> MutexGuard<'_, HashMap<QueryId, RootBudget>> {
        self.roots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a new root request
    pub fn track_root(&self, root_id: QueryId) {
        self.roots().entry(root_id).or_default().outstanding += 1;
    }

    /// Record that a request of a tracked tree will not run again.
    ///
    /// The root's budget is forgotten once nothing of its tree is outstanding.
    pub fn settle(&self, request: &QueryRequest) {
        let mut roots = self.roots();
        if let Some(budget) = roots.get_mut(&request.root_id) {
            budget.outstanding = budget.outstanding.saturating_sub(1);
            if budget.outstanding == 0 {
                roots.remove(&request.root_id);
            }
        }
    }

    /// Follow-ups derived so far for a root that is still being tracked
    #[must_use]
    pub fn derived_count(&self, root_id: QueryId) -> usize {
        self.roots().get(&root_id).map_or(0, |b| b.derived)
    }

    /// Number of roots with outstanding work
    #[must_use]
    pub fn tracked_roots(&self) -> usize {
        self.roots().len()
    }

    /// Ask the detector for follow-ups of `parent` and schedule them.
    ///
    /// Proposals are pushed in the order the detector returned them, so the
    /// last proposal runs first. Empty proposals, repeats of the parent's own
    /// query and duplicates within one response are dropped.
    pub fn expand(
        &self,
        parent: &QueryRequest,
        response: &AgentResponse,
        scheduler: &mut Scheduler,
    ) -> ExpansionOutcome {
        let mut outcome = ExpansionOutcome::default();
        let parent_key = normalize_query(&parent.text);
        let mut seen = HashSet::new();

        let proposals: Vec<String> = self
            .detector
            .analyze(response)
            .into_iter()
            .filter(|text| {
                let key = normalize_query(text);
                !key.is_empty() && key != parent_key && seen.insert(key)
            })
            .collect();

        if proposals.is_empty() {
            return outcome;
        }

        let mut roots = self.roots();
        let budget = roots.entry(parent.root_id).or_default();

        for text in proposals {
            let child = parent.derive(text);

            if let Some(limit) = self.max_derived_per_root {
                if budget.derived >= limit {
                    debug!(
                        root_id = %parent.root_id,
                        limit = limit,
                        query = %child.text,
                        "Follow-up suppressed, root budget spent"
                    );
                    outcome.rejected.push((
                        child,
                        QueryError::ExpansionLimitExceeded {
                            root_id: parent.root_id,
                            limit,
                        },
                    ));
                    continue;
                }
            }

            let child_id = child.id;
            match scheduler.push_recursive(child.clone()) {
                Ok(()) => {
                    budget.derived += 1;
                    budget.outstanding += 1;
                    outcome.scheduled.push(child_id);
                }
                Err(err) => {
                    warn!(
                        query_id = %child_id,
                        parent_id = %parent.id,
                        depth = child.depth,
                        "Follow-up rejected: {}", err
                    );
                    outcome.rejected.push((child, err));
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests;
