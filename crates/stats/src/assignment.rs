//! Per-handler assignment roll-ups.

use mantis_client::{AccountRef, Issue, IssueFilter, MantisGateway, Result};

use crate::{AssignmentBucket, AssignmentFilter, STATS_PAGE_SIZE};

const UNASSIGNED_ID: u32 = 0;

/// Fetches one bounded page of issues and accumulates a bucket per
/// distinct handler, sorted by descending total with first-seen order
/// breaking ties.
///
/// Each distinct handler costs one user lookup through the gateway (its
/// cache absorbs repeats across calls). When the lookup fails, the
/// handler reference embedded in the issue stands in, so a deactivated
/// account cannot sink the whole report.
pub async fn assignment_statistics(
    gateway: &MantisGateway,
    filter: &AssignmentFilter,
) -> Result<Vec<AssignmentBucket>> {
    let page = IssueFilter {
        project_id: filter.project_id,
        page_size: Some(STATS_PAGE_SIZE),
        page: Some(1),
        ..Default::default()
    };
    let listing = gateway.list_issues(&page).await?;
    let issues: Vec<&Issue> = listing
        .issues
        .iter()
        .filter(|issue| passes_status_filter(issue, filter.status_ids.as_deref()))
        .collect();

    let mut buckets: Vec<AssignmentBucket> = Vec::new();
    let mut unassigned =
        AssignmentBucket::empty(UNASSIGNED_ID, "unassigned".to_string(), None);

    for issue in &issues {
        let closed = is_closed(issue);
        // A handler id of 0 is the tracker's own "nobody" marker.
        match issue.handler.as_ref().filter(|h| h.id != 0) {
            Some(handler) => {
                let position = match buckets.iter().position(|b| b.id == handler.id) {
                    Some(existing) => existing,
                    None => {
                        buckets.push(resolve_handler(gateway, handler).await);
                        buckets.len() - 1
                    }
                };
                tally(&mut buckets[position], issue.id, closed);
            }
            None => tally(&mut unassigned, issue.id, closed),
        }
    }

    if filter.include_unassigned && unassigned.total > 0 {
        buckets.push(unassigned);
    }
    buckets.sort_by(|a, b| b.total.cmp(&a.total));
    tracing::debug!(
        target: "mantis::stats",
        issues = issues.len(),
        handlers = buckets.len(),
        "assignment roll-up computed"
    );
    Ok(buckets)
}

/// Starts a bucket for one handler, preferring the full user record and
/// falling back to the reference carried by the issue.
async fn resolve_handler(gateway: &MantisGateway, handler: &AccountRef) -> AssignmentBucket {
    match gateway.get_user(handler.id).await {
        Ok(user) => {
            let name = if user.name.is_empty() {
                handler.name.clone()
            } else {
                user.name
            };
            AssignmentBucket::empty(handler.id, name, user.email)
        }
        Err(err) => {
            tracing::debug!(
                target: "mantis::stats",
                handler_id = handler.id,
                error = %err,
                "handler lookup failed, using the issue's embedded reference"
            );
            AssignmentBucket::empty(handler.id, handler.name.clone(), handler.email.clone())
        }
    }
}

fn tally(bucket: &mut AssignmentBucket, issue_id: u32, closed: bool) {
    bucket.total += 1;
    if closed {
        bucket.closed += 1;
    } else {
        bucket.open += 1;
    }
    bucket.issue_ids.push(issue_id);
}

/// Closed means the status name contains "closed" or "resolved",
/// case-insensitively. Everything else counts as open.
fn is_closed(issue: &Issue) -> bool {
    let name = issue.status.name.to_lowercase();
    name.contains("closed") || name.contains("resolved")
}

/// An absent or empty allow-list admits every status.
fn passes_status_filter(issue: &Issue, allow_list: Option<&[u32]>) -> bool {
    match allow_list {
        Some(ids) if !ids.is_empty() => ids.contains(&issue.status.id),
        _ => true,
    }
}
