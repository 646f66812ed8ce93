//! Client-side statistics over tracker issues.
//!
//! The tracker's REST API has no aggregation endpoints, so both reports
//! page up to [`STATS_PAGE_SIZE`] issues through the gateway and reduce
//! them locally: grouped counts over one dimension, and per-handler
//! assignment roll-ups.

mod assignment;
mod group;
mod period;

pub use assignment::assignment_statistics;
pub use group::group_statistics;
pub use period::{period_start, Period};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Both reports fetch at most this many issues, in a single page.
pub const STATS_PAGE_SIZE: u32 = 1000;

/// Dimension an issue is tallied under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupDimension {
    Status,
    Priority,
    Severity,
    Handler,
    Reporter,
}

/// Parameters for the grouped count report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupFilter {
    #[serde(default)]
    pub project_id: Option<u32>,
    pub group_by: GroupDimension,
    #[serde(default)]
    pub period: Period,
}

/// Grouped counts: how many issues survived the period filter, and the
/// per-key tallies. The map keeps sorted keys so repeated runs serialize
/// identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedStatistic {
    pub total: usize,
    pub group_by: GroupDimension,
    pub period: Period,
    pub counts: BTreeMap<String, usize>,
}

/// Outcome of the grouped report. An empty data set is an expected result,
/// not a failure, and serializes as `{"error": "No issues found"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GroupOutcome {
    Empty { error: String },
    Stats(GroupedStatistic),
}

impl GroupOutcome {
    pub(crate) fn no_issues() -> Self {
        GroupOutcome::Empty {
            error: "No issues found".to_string(),
        }
    }
}

/// Parameters for the assignment roll-up. `status_ids` restricts the
/// input to an allow-list when given.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssignmentFilter {
    pub project_id: Option<u32>,
    pub status_ids: Option<Vec<u32>>,
    pub include_unassigned: bool,
}

/// Per-handler aggregate. The synthetic unassigned bucket uses id 0 and
/// the name "unassigned".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentBucket {
    pub id: u32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub issue_ids: Vec<u32>,
}

impl AssignmentBucket {
    pub(crate) fn empty(id: u32, name: String, email: Option<String>) -> Self {
        Self {
            id,
            name,
            email,
            total: 0,
            open: 0,
            closed: 0,
            issue_ids: Vec::new(),
        }
    }
}
