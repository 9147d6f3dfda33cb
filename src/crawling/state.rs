//! Run state and reporting types shared across the crawl loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a search term's batch ended before its candidate queue was empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermAbort {
    LoginRequired,
    Blocked,
    Cancelled,
}

/// Per-search-term accounting, surfaced in the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermReport {
    pub term: String,
    /// Unique candidates discovered on the results feed.
    pub discovered: usize,
    /// Candidates that passed the freshness gate.
    pub eligible: usize,
    /// Candidates where an item page was actually reached.
    pub visited: usize,
    /// Listings whose record group was persisted.
    pub persisted: usize,
    pub navigation_failures: usize,
    pub extraction_failures: usize,
    pub persistence_failures: usize,
    pub aborted: Option<TermAbort>,
}

impl TermReport {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            discovered: 0,
            eligible: 0,
            visited: 0,
            persisted: 0,
            navigation_failures: 0,
            extraction_failures: 0,
            persistence_failures: 0,
            aborted: None,
        }
    }
}

/// Whole-run report returned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub terms: Vec<TermReport>,
}

impl HarvestReport {
    pub fn total_persisted(&self) -> usize {
        self.terms.iter().map(|t| t.persisted).sum()
    }

    pub fn total_visited(&self) -> usize {
        self.terms.iter().map(|t| t.visited).sum()
    }

    /// True when any term hit a wall; callers surface this to the operator.
    pub fn hit_wall(&self) -> bool {
        self.terms.iter().any(|t| {
            matches!(t.aborted, Some(TermAbort::LoginRequired) | Some(TermAbort::Blocked))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_aggregates_terms() {
        let mut a = TermReport::new("a");
        a.persisted = 2;
        a.visited = 3;
        let mut b = TermReport::new("b");
        b.persisted = 1;
        b.visited = 1;
        b.aborted = Some(TermAbort::Blocked);

        let report = HarvestReport {
            batch_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            terms: vec![a, b],
        };
        assert_eq!(report.total_persisted(), 3);
        assert_eq!(report.total_visited(), 4);
        assert!(report.hit_wall());
    }
}
