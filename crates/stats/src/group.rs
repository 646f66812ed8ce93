//! Grouped issue counts over one dimension.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use mantis_client::{Issue, IssueFilter, MantisGateway, Result};

use crate::period::{parse_local, period_start};
use crate::{GroupDimension, GroupFilter, GroupOutcome, GroupedStatistic, STATS_PAGE_SIZE};

/// Fetches one bounded page of issues and tallies them by the requested
/// dimension, after dropping issues created before the period boundary.
///
/// An empty result set is reported through [`GroupOutcome::Empty`], not as
/// an error; only gateway failures propagate.
pub async fn group_statistics(
    gateway: &MantisGateway,
    filter: &GroupFilter,
) -> Result<GroupOutcome> {
    let page = IssueFilter {
        project_id: filter.project_id,
        page_size: Some(STATS_PAGE_SIZE),
        page: Some(1),
        ..Default::default()
    };
    let listing = gateway.list_issues(&page).await?;
    let start = period_start(filter.period);
    let survivors: Vec<&Issue> = listing
        .issues
        .iter()
        .filter(|issue| within_period(issue, start))
        .collect();
    if survivors.is_empty() {
        return Ok(GroupOutcome::no_issues());
    }

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for issue in &survivors {
        *counts.entry(group_key(issue, filter.group_by)).or_insert(0) += 1;
    }
    tracing::debug!(
        target: "mantis::stats",
        total = survivors.len(),
        groups = counts.len(),
        "grouped issue counts computed"
    );
    Ok(GroupOutcome::Stats(GroupedStatistic {
        total: survivors.len(),
        group_by: filter.group_by,
        period: filter.period,
        counts,
    }))
}

/// Issues with no parseable creation timestamp fall outside every bounded
/// window; with no boundary everything passes.
fn within_period(issue: &Issue, start: Option<NaiveDateTime>) -> bool {
    let Some(start) = start else { return true };
    issue
        .created_at
        .as_deref()
        .and_then(parse_local)
        .map(|created| created >= start)
        .unwrap_or(false)
}

/// The tally key for one issue: the dimension's name, `unknown` when the
/// sub-object or its name is missing, `unassigned` for a missing handler.
fn group_key(issue: &Issue, dimension: GroupDimension) -> String {
    let name = match dimension {
        GroupDimension::Status => non_empty(&issue.status.name),
        GroupDimension::Priority => issue.priority.as_ref().and_then(|p| non_empty(&p.name)),
        GroupDimension::Severity => issue.severity.as_ref().and_then(|s| non_empty(&s.name)),
        GroupDimension::Reporter => non_empty(&issue.reporter.name),
        GroupDimension::Handler => {
            return issue
                .handler
                .as_ref()
                .and_then(|h| non_empty(&h.name))
                .unwrap_or_else(|| "unassigned".to_string());
        }
    };
    name.unwrap_or_else(|| "unknown".to_string())
}

fn non_empty(name: &str) -> Option<String> {
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
