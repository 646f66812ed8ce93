//! High-level tracker gateway.
//!
//! One struct owns the REST wrapper, the SOAP search client, and both
//! response caches, and exposes the tracker operations the tool layer
//! calls. Reads go through the general cache; every successful write
//! clears it wholesale. The username lookup keeps its own small cache
//! that mutations never touch.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use mantis_state::MantisConfig;

use crate::cache::{fingerprint, RequestCache};
use crate::error::{MantisError, Result};
use crate::http::RestClient;
use crate::models::{Issue, IssueList, ProjectList, User, UserList};
use crate::soap::{SearchFilter, SoapClient};

/// Page size applied when a listing omits one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Pages are 1-based on this surface.
pub const DEFAULT_PAGE: u32 = 1;

/// Username lookups change rarely; they keep a short fixed-TTL cache that
/// stays on even when general caching is disabled.
const USERNAME_CACHE_TTL: Duration = Duration::from_secs(300);
/// User enumeration stops after this many consecutive missing ids.
const MAX_CONSECUTIVE_MISSES: u32 = 10;

/// Filter for the issue listing endpoint. Field names follow the tool
/// surface (camelCase); [`IssueFilter::to_query`] maps them to the wire's
/// snake_case query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IssueFilter {
    pub project_id: Option<u32>,
    pub status_id: Option<u32>,
    pub handler_id: Option<u32>,
    pub reporter_id: Option<u32>,
    pub priority_id: Option<u32>,
    pub severity_id: Option<u32>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub sort_direction: Option<String>,
    pub filter_id: Option<u32>,
    pub select: Option<Vec<String>>,
    pub page_size: Option<u32>,
    pub page: Option<u32>,
}

impl IssueFilter {
    /// Builds the query string pairs. Optional fields ride along only when
    /// set; page size and page are always present, with defaults applied.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = Vec::new();
        if let Some(project_id) = self.project_id {
            query.push(("project_id".into(), project_id.to_string()));
        }
        if let Some(status_id) = self.status_id {
            query.push(("status_id".into(), status_id.to_string()));
        }
        if let Some(handler_id) = self.handler_id {
            query.push(("handler_id".into(), handler_id.to_string()));
        }
        if let Some(reporter_id) = self.reporter_id {
            query.push(("reporter_id".into(), reporter_id.to_string()));
        }
        if let Some(priority_id) = self.priority_id {
            query.push(("priority_id".into(), priority_id.to_string()));
        }
        if let Some(severity_id) = self.severity_id {
            query.push(("severity_id".into(), severity_id.to_string()));
        }
        if let Some(search) = &self.search {
            query.push(("search".into(), search.clone()));
        }
        if let Some(sort) = &self.sort {
            query.push(("sort".into(), sort.clone()));
        }
        if let Some(direction) = &self.sort_direction {
            query.push(("sort_direction".into(), direction.clone()));
        }
        if let Some(filter_id) = self.filter_id {
            query.push(("filter_id".into(), filter_id.to_string()));
        }
        if let Some(select) = &self.select {
            if !select.is_empty() {
                query.push(("select".into(), select.join(",")));
            }
        }
        query.push((
            "page_size".into(),
            self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).to_string(),
        ));
        query.push(("page".into(), self.page.unwrap_or(DEFAULT_PAGE).to_string()));
        query
    }
}

/// Fields for creating an issue. Summary, description and project are
/// required; the rest are attached only when given.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIssue {
    pub summary: String,
    pub description: String,
    pub project_id: u32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority_id: Option<u32>,
    #[serde(default)]
    pub severity_id: Option<u32>,
    #[serde(default)]
    pub handler_id: Option<u32>,
}

impl NewIssue {
    /// The tracker wants references as wrapped objects: projects, priorities
    /// and handlers by id, categories by name.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "summary": self.summary,
            "description": self.description,
            "project": { "id": self.project_id },
        });
        if let Some(category) = &self.category {
            body["category"] = json!({ "name": category });
        }
        if let Some(priority_id) = self.priority_id {
            body["priority"] = json!({ "id": priority_id });
        }
        if let Some(severity_id) = self.severity_id {
            body["severity"] = json!({ "id": severity_id });
        }
        if let Some(handler_id) = self.handler_id {
            body["handler"] = json!({ "id": handler_id });
        }
        body
    }
}

/// Partial update for an existing issue. Absent fields are left untouched
/// by the tracker.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IssuePatch {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status_id: Option<u32>,
    pub priority_id: Option<u32>,
    pub severity_id: Option<u32>,
    pub handler_id: Option<u32>,
}

impl IssuePatch {
    pub fn to_body(&self) -> Value {
        let mut body = json!({});
        if let Some(summary) = &self.summary {
            body["summary"] = json!(summary);
        }
        if let Some(description) = &self.description {
            body["description"] = json!(description);
        }
        if let Some(category) = &self.category {
            body["category"] = json!({ "name": category });
        }
        if let Some(status_id) = self.status_id {
            body["status"] = json!({ "id": status_id });
        }
        if let Some(priority_id) = self.priority_id {
            body["priority"] = json!({ "id": priority_id });
        }
        if let Some(severity_id) = self.severity_id {
            body["severity"] = json!({ "id": severity_id });
        }
        if let Some(handler_id) = self.handler_id {
            body["handler"] = json!({ "id": handler_id });
        }
        body
    }
}

/// A workflow transition: target status, optional resolution, optional
/// public note explaining the move.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status_id: u32,
    #[serde(default)]
    pub resolution_id: Option<u32>,
    #[serde(default)]
    pub note: Option<String>,
}

/// The tracker gateway. Construct once from config and share behind an
/// `Arc`; all methods take `&self`.
pub struct MantisGateway {
    rest: RestClient,
    soap: SoapClient,
    cache: RequestCache,
    username_cache: RequestCache,
}

impl MantisGateway {
    /// Wires the REST and SOAP clients plus both caches from one config.
    pub fn new(config: &MantisConfig) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(&config.base_url, config.api_token.as_deref())?,
            soap: SoapClient::new(&config.base_url, config.api_token.as_deref())?,
            cache: RequestCache::new(config.cache_enabled, config.cache_ttl),
            username_cache: RequestCache::new(true, USERNAME_CACHE_TTL),
        })
    }

    // ------------------------------------------------------------
    // Issue reads
    // ------------------------------------------------------------

    /// Lists issues matching `filter`, read through the cache.
    pub async fn list_issues(&self, filter: &IssueFilter) -> Result<IssueList> {
        let query = filter.to_query();
        let params: Vec<(&str, String)> =
            query.iter().map(|(n, v)| (n.as_str(), v.clone())).collect();
        let key = fingerprint("list_issues", &params);
        let payload = self
            .cache
            .read_through(&key, || async move { self.rest.get("/issues", &query).await })
            .await?;
        parse_payload(payload)
    }

    /// Fetches one issue by id, unwrapping the single-element list envelope
    /// the tracker answers with.
    pub async fn get_issue(&self, issue_id: u32) -> Result<Issue> {
        let key = fingerprint("get_issue", &[("id", issue_id.to_string())]);
        let payload = self
            .cache
            .read_through(&key, || async move {
                self.rest.get(&format!("/issues/{issue_id}"), &[]).await
            })
            .await?;
        issue_from_payload(payload)
    }

    /// Full-text search through the SOAP adapter, cached like any other
    /// read under the same fingerprint scheme.
    pub async fn search_issues(&self, filter: &SearchFilter) -> Result<Vec<Issue>> {
        if filter.search.trim().is_empty() {
            return Err(MantisError::validation("search text is required"));
        }
        let mut params: Vec<(&str, String)> = vec![("search", filter.search.clone())];
        if let Some(project_id) = filter.project_id {
            params.push(("project_id", project_id.to_string()));
        }
        params.push((
            "page_size",
            filter.page_size.unwrap_or(DEFAULT_PAGE_SIZE).to_string(),
        ));
        params.push(("page", filter.page.unwrap_or(DEFAULT_PAGE).to_string()));
        let key = fingerprint("search_issues", &params);
        let payload = self
            .cache
            .read_through(&key, || async move {
                let issues = self.soap.search_issues(filter).await?;
                serde_json::to_value(issues)
                    .map_err(|e| MantisError::validation(format!("unexpected response shape: {e}")))
            })
            .await?;
        parse_payload(payload)
    }

    // ------------------------------------------------------------
    // Users
    // ------------------------------------------------------------

    /// Fetches one user by id. Id zero is rejected before any request goes
    /// out: the tracker would answer with a confusing permission error.
    pub async fn get_user(&self, user_id: u32) -> Result<User> {
        if user_id == 0 {
            return Err(MantisError::validation("a positive user id is required"));
        }
        let key = fingerprint("get_user", &[("id", user_id.to_string())]);
        let payload = self
            .cache
            .read_through(&key, || async move {
                self.rest.get(&format!("/users/{user_id}"), &[]).await
            })
            .await?;
        user_from_payload(payload)
    }

    /// Looks a user up by login name through the dedicated username cache.
    pub async fn get_user_by_username(&self, username: &str) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(MantisError::validation("a username is required"));
        }
        let key = fingerprint("get_user_by_username", &[("username", username.to_string())]);
        let payload = self
            .username_cache
            .read_through(&key, || async move {
                self.rest
                    .get(&format!("/users/username/{username}"), &[])
                    .await
            })
            .await?;
        user_from_payload(payload)
    }

    /// Returns the account the configured API key belongs to.
    pub async fn get_current_user(&self) -> Result<User> {
        let key = fingerprint("get_current_user", &[]);
        let payload = self
            .cache
            .read_through(&key, || async move { self.rest.get("/users/me", &[]).await })
            .await?;
        user_from_payload(payload)
    }

    /// Brute-force user discovery: probe ids upward from 1 and stop once a
    /// run of consecutive ids is missing. The tracker has no user listing
    /// endpoint, so this is the only way to see everyone.
    ///
    /// Missing ids (404) are skipped; any other failure aborts the walk.
    pub async fn enumerate_users(&self) -> Result<Vec<User>> {
        let mut users = Vec::new();
        let mut misses = 0u32;
        let mut user_id = 1u32;
        while misses < MAX_CONSECUTIVE_MISSES {
            match self.get_user(user_id).await {
                Ok(user) => {
                    misses = 0;
                    users.push(user);
                }
                Err(err) if err.is_not_found() => misses += 1,
                Err(err) => return Err(err),
            }
            user_id += 1;
        }
        tracing::debug!(
            target: "mantis::gateway",
            found = users.len(),
            last_probed = user_id - 1,
            "user enumeration finished"
        );
        Ok(users)
    }

    // ------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------

    /// Lists every project visible to the configured account.
    pub async fn list_projects(&self) -> Result<ProjectList> {
        let key = fingerprint("list_projects", &[]);
        let payload = self
            .cache
            .read_through(&key, || async move { self.rest.get("/projects", &[]).await })
            .await?;
        parse_payload(payload)
    }

    /// Lists the users attached to one project.
    pub async fn list_project_users(&self, project_id: u32) -> Result<Vec<User>> {
        let key = fingerprint("list_project_users", &[("project_id", project_id.to_string())]);
        let payload = self
            .cache
            .read_through(&key, || async move {
                self.rest
                    .get(&format!("/projects/{project_id}/users"), &[])
                    .await
            })
            .await?;
        users_from_payload(payload)
    }

    // ------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------

    /// Creates an issue and returns the tracker's echo of it.
    pub async fn create_issue(&self, new_issue: &NewIssue) -> Result<Issue> {
        let payload = self.rest.post("/issues", &new_issue.to_body()).await?;
        self.invalidate_after_write("issue created");
        issue_from_payload(payload)
    }

    /// Applies a partial update. Failures of the PATCH itself propagate;
    /// only a success whose echo carries no issue body falls back to a
    /// fresh fetch.
    pub async fn update_issue(&self, issue_id: u32, patch: &IssuePatch) -> Result<Issue> {
        let payload = self
            .rest
            .patch(&format!("/issues/{issue_id}"), &patch.to_body())
            .await?;
        self.invalidate_after_write("issue updated");
        match issue_from_payload(payload) {
            Ok(issue) => Ok(issue),
            Err(_) => {
                tracing::debug!(
                    target: "mantis::gateway",
                    issue_id,
                    "update echo carried no issue, refetching"
                );
                self.get_issue(issue_id).await
            }
        }
    }

    /// Moves an issue to a new status. When a note is given it is posted
    /// first as a public note, so the transition shows up in the history
    /// with its explanation already attached.
    pub async fn change_status(&self, issue_id: u32, change: &StatusChange) -> Result<Issue> {
        if let Some(note) = change
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            let body = json!({ "text": note, "view_state": { "name": "public" } });
            self.rest
                .post(&format!("/issues/{issue_id}/notes"), &body)
                .await?;
            self.invalidate_after_write("status note added");
        }
        let mut body = json!({ "status": { "id": change.status_id } });
        if let Some(resolution_id) = change.resolution_id {
            body["resolution"] = json!({ "id": resolution_id });
        }
        let payload = self
            .rest
            .patch(&format!("/issues/{issue_id}"), &body)
            .await?;
        self.invalidate_after_write("status changed");
        match issue_from_payload(payload) {
            Ok(issue) => Ok(issue),
            Err(_) => self.get_issue(issue_id).await,
        }
    }

    /// Appends a note and hands the tracker's response back untouched.
    pub async fn add_note(&self, issue_id: u32, text: &str, private: bool) -> Result<Value> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MantisError::validation("note text is required"));
        }
        let view_state = if private { "private" } else { "public" };
        let payload = self
            .rest
            .post(
                &format!("/issues/{issue_id}/notes"),
                &json!({ "text": text, "view_state": { "name": view_state } }),
            )
            .await?;
        self.invalidate_after_write("note added");
        Ok(payload)
    }

    fn invalidate_after_write(&self, action: &str) {
        tracing::debug!(target: "mantis::gateway", action, "clearing response cache");
        self.cache.clear();
    }
}

fn parse_payload<T: DeserializeOwned>(payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| MantisError::validation(format!("unexpected response shape: {e}")))
}

/// Unwraps the tracker's issue envelopes: `{"issues": [..]}` from reads,
/// `{"issue": {..}}` from writes, or a bare object.
fn issue_from_payload(payload: Value) -> Result<Issue> {
    let candidate = match payload {
        Value::Object(mut map) => {
            if let Some(issues) = map.remove("issues") {
                match issues {
                    Value::Array(mut items) if !items.is_empty() => items.remove(0),
                    _ => {
                        return Err(MantisError::validation(
                            "tracker response contained no issue",
                        ))
                    }
                }
            } else if let Some(issue) = map.remove("issue") {
                issue
            } else {
                Value::Object(map)
            }
        }
        other => other,
    };
    parse_payload(candidate)
}

fn user_from_payload(payload: Value) -> Result<User> {
    let candidate = match payload {
        Value::Object(mut map) => {
            if let Some(users) = map.remove("users") {
                match users {
                    Value::Array(mut items) if !items.is_empty() => items.remove(0),
                    _ => {
                        return Err(MantisError::validation(
                            "tracker response contained no user",
                        ))
                    }
                }
            } else if let Some(user) = map.remove("user") {
                user
            } else {
                Value::Object(map)
            }
        }
        other => other,
    };
    parse_payload(candidate)
}

/// Project membership comes back as `{"users": [..]}` on current trackers
/// and as a bare array on older ones.
fn users_from_payload(payload: Value) -> Result<Vec<User>> {
    match payload {
        Value::Array(_) => parse_payload(payload),
        _ => parse_payload::<UserList>(payload).map(|list| list.users),
    }
}
