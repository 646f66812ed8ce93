//! MCP tool facade over the tracker gateway.
//!
//! This module implements the rmcp `ServerHandler` trait for
//! [`MantisService`]: advertising the tool catalog, decoding camelCase
//! arguments, and folding every outcome into a tool result. Tool errors
//! never surface as protocol errors; they come back as results flagged
//! `is_error`, carrying a message and, when the tracker answered, the HTTP
//! status code.

use anyhow::{anyhow, Result};
use mantis_client::{
    IssueFilter, IssuePatch, MantisError, MantisGateway, NewIssue, SearchFilter, StatusChange,
    DEFAULT_PAGE,
};
use mantis_state::MantisConfig;
use mantis_stats::{AssignmentFilter, GroupFilter};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, InitializeResult, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, Tool, ToolAnnotations,
};
use rmcp::ServerHandler;
use serde::de::DeserializeOwned;
use serde_json::{json, Map as JsonMap, Value};
use std::sync::Arc;

use crate::compress::compress;

/// Page size the tool surface applies when the caller does not set one.
/// Distinct from the gateway's wire default of 50.
const FACADE_PAGE_SIZE: u32 = 20;

/// The MCP-facing service: one tracker gateway behind the tool catalog.
pub struct MantisService {
    gateway: MantisGateway,
}

impl MantisService {
    pub fn new(config: &MantisConfig) -> Result<Self> {
        Ok(Self {
            gateway: MantisGateway::new(config)?,
        })
    }

    /// Runs one tool call, folding every error into a failure-flagged result.
    ///
    /// This is the entire error surface of the server: unknown tool names,
    /// bad arguments, and tracker failures all land here as results, never
    /// as transport-level errors.
    pub async fn dispatch(&self, name: &str, arguments: &JsonMap<String, Value>) -> CallToolResult {
        match self.try_dispatch(name, arguments).await {
            Ok(result) => result,
            Err(error) => {
                tracing::debug!(target: "mantis::tools", tool = name, %error, "tool call failed");
                failure(&error)
            }
        }
    }

    async fn try_dispatch(
        &self,
        name: &str,
        args: &JsonMap<String, Value>,
    ) -> Result<CallToolResult> {
        match name {
            "list-issues" => self.list_issues(args).await,
            "get-issue" => self.get_issue(args).await,
            "search-issues" => self.search_issues(args).await,
            "create-issue" => self.create_issue(args).await,
            "update-issue" => self.update_issue(args).await,
            "change-status" => self.change_status(args).await,
            "add-note" => self.add_note(args).await,
            "get-user" => self.get_user(args).await,
            "get-user-by-username" => self.get_user_by_username(args).await,
            "get-current-user" => self.get_current_user().await,
            "enumerate-users" => self.enumerate_users().await,
            "list-projects" => self.list_projects().await,
            "list-project-users" => self.list_project_users(args).await,
            "group-statistics" => self.group_statistics(args).await,
            "assignment-statistics" => self.assignment_statistics(args).await,
            other => Err(anyhow!("unknown tool {other}")),
        }
    }

    /// The one compressed path: full listings can dwarf every other payload.
    async fn list_issues(&self, args: &JsonMap<String, Value>) -> Result<CallToolResult> {
        let mut filter: IssueFilter = parse_args(args)?;
        filter.page_size = filter.page_size.or(Some(FACADE_PAGE_SIZE));
        filter.page = filter.page.or(Some(DEFAULT_PAGE));
        let listing = self.gateway.list_issues(&filter).await?;
        let (text, payload) = compress(json!({ "issues": listing.issues }))?;
        Ok(success(text, payload))
    }

    async fn get_issue(&self, args: &JsonMap<String, Value>) -> Result<CallToolResult> {
        let issue_id = required_u32(args, "issueId")?;
        let issue = self.gateway.get_issue(issue_id).await?;
        entity_result(&issue)
    }

    async fn search_issues(&self, args: &JsonMap<String, Value>) -> Result<CallToolResult> {
        let mut filter: SearchFilter = parse_args(args)?;
        filter.page_size = filter.page_size.or(Some(FACADE_PAGE_SIZE));
        filter.page = filter.page.or(Some(DEFAULT_PAGE));
        let issues = self.gateway.search_issues(&filter).await?;
        entity_result(&json!({ "issues": issues }))
    }

    async fn create_issue(&self, args: &JsonMap<String, Value>) -> Result<CallToolResult> {
        let new_issue: NewIssue = parse_args(args)?;
        let issue = self.gateway.create_issue(&new_issue).await?;
        entity_result(&issue)
    }

    async fn update_issue(&self, args: &JsonMap<String, Value>) -> Result<CallToolResult> {
        let issue_id = required_u32(args, "issueId")?;
        let patch: IssuePatch = parse_args(args)?;
        let issue = self.gateway.update_issue(issue_id, &patch).await?;
        entity_result(&issue)
    }

    async fn change_status(&self, args: &JsonMap<String, Value>) -> Result<CallToolResult> {
        let issue_id = required_u32(args, "issueId")?;
        let change: StatusChange = parse_args(args)?;
        let issue = self.gateway.change_status(issue_id, &change).await?;
        entity_result(&issue)
    }

    async fn add_note(&self, args: &JsonMap<String, Value>) -> Result<CallToolResult> {
        let issue_id = required_u32(args, "issueId")?;
        let text = required_str(args, "text")?;
        let private = args.get("private").and_then(Value::as_bool).unwrap_or(false);
        let payload = self.gateway.add_note(issue_id, text, private).await?;
        entity_result(&payload)
    }

    async fn get_user(&self, args: &JsonMap<String, Value>) -> Result<CallToolResult> {
        let user_id = required_u32(args, "userId")?;
        let user = self.gateway.get_user(user_id).await?;
        entity_result(&user)
    }

    async fn get_user_by_username(&self, args: &JsonMap<String, Value>) -> Result<CallToolResult> {
        let username = required_str(args, "username")?;
        let user = self.gateway.get_user_by_username(username).await?;
        entity_result(&user)
    }

    async fn get_current_user(&self) -> Result<CallToolResult> {
        let user = self.gateway.get_current_user().await?;
        entity_result(&user)
    }

    async fn enumerate_users(&self) -> Result<CallToolResult> {
        let users = self.gateway.enumerate_users().await?;
        entity_result(&json!({ "users": users }))
    }

    async fn list_projects(&self) -> Result<CallToolResult> {
        let listing = self.gateway.list_projects().await?;
        entity_result(&json!({ "projects": listing.projects }))
    }

    async fn list_project_users(&self, args: &JsonMap<String, Value>) -> Result<CallToolResult> {
        let project_id = required_u32(args, "projectId")?;
        let users = self.gateway.list_project_users(project_id).await?;
        entity_result(&json!({ "users": users }))
    }

    async fn group_statistics(&self, args: &JsonMap<String, Value>) -> Result<CallToolResult> {
        let filter: GroupFilter = parse_args(args)?;
        let outcome = mantis_stats::group_statistics(&self.gateway, &filter).await?;
        entity_result(&outcome)
    }

    async fn assignment_statistics(&self, args: &JsonMap<String, Value>) -> Result<CallToolResult> {
        let filter: AssignmentFilter = parse_args(args)?;
        let buckets = mantis_stats::assignment_statistics(&self.gateway, &filter).await?;
        entity_result(&json!({ "handlers": buckets }))
    }
}

impl ServerHandler for MantisService {
    /// Lists the tracker tools with their input schemas.
    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, rmcp::ErrorData>> + Send + '_
    {
        std::future::ready(Ok(ListToolsResult {
            tools: tool_catalog(),
            next_cursor: None,
        }))
    }

    /// Executes the tool identified by `request.name`.
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, rmcp::ErrorData>> + Send + '_
    {
        Box::pin(async move {
            let arguments = request.arguments.unwrap_or_default();
            Ok(self.dispatch(request.name.as_ref(), &arguments).await)
        })
    }

    /// Returns initialization information for the MCP handshake.
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            capabilities: ServerCapabilities {
                tools: Some(Default::default()),
                ..Default::default()
            },
            instructions: Some("Mantis bug tracker bridge".into()),
            ..Default::default()
        }
    }
}

/// Decodes the camelCase argument object into a typed parameter set.
fn parse_args<T: DeserializeOwned>(args: &JsonMap<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(args.clone()))
        .map_err(|e| anyhow!("invalid arguments: {e}"))
}

fn required_u32(args: &JsonMap<String, Value>, key: &str) -> Result<u32> {
    args.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| anyhow!("a numeric {key} is required"))
}

fn required_str<'a>(args: &'a JsonMap<String, Value>, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("{key} is required"))
}

fn success(text: String, structured: Value) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text)],
        structured_content: Some(structured),
        is_error: Some(false),
        meta: None,
    }
}

/// Pretty-printed text plus the raw value as structured content.
fn entity_result<T: serde::Serialize>(entity: &T) -> Result<CallToolResult> {
    let value = serde_json::to_value(entity)?;
    let text = serde_json::to_string_pretty(&value)?;
    Ok(success(text, value))
}

/// Failure result: human-readable message as content, machine-readable
/// `{error, statusCode?}` as structured content. `statusCode` appears only
/// when the tracker actually answered.
fn failure(error: &anyhow::Error) -> CallToolResult {
    let message = error.to_string();
    let mut details = JsonMap::new();
    details.insert("error".into(), Value::String(message.clone()));
    if let Some(status) = error
        .downcast_ref::<MantisError>()
        .and_then(MantisError::status_code)
    {
        details.insert("statusCode".into(), json!(status));
    }
    CallToolResult {
        content: vec![Content::text(message)],
        structured_content: Some(Value::Object(details)),
        is_error: Some(true),
        meta: None,
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Arc<JsonMap<String, Value>> {
    let mut schema = JsonMap::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), properties);
    if !required.is_empty() {
        schema.insert("required".into(), json!(required));
    }
    schema.insert("additionalProperties".into(), json!(false));
    Arc::new(schema)
}

/// The tracker tool catalog, in the order clients display it.
///
/// Every input schema carries an explicit object `type`; some MCP clients
/// reject a tool whose schema omits it, so parameterless tools still
/// advertise an empty object.
pub fn tool_catalog() -> Vec<Tool> {
    let empty = object_schema(json!({}), &[]);
    vec![
        Tool {
            name: "list-issues".into(),
            title: Some("List issues".into()),
            description: Some("List issues with optional filters and paging".into()),
            input_schema: object_schema(
                json!({
                    "projectId": { "type": "integer" },
                    "statusId": { "type": "integer" },
                    "handlerId": { "type": "integer" },
                    "reporterId": { "type": "integer" },
                    "priorityId": { "type": "integer" },
                    "severityId": { "type": "integer" },
                    "search": { "type": "string" },
                    "sort": { "type": "string" },
                    "sortDirection": { "type": "string" },
                    "filterId": { "type": "integer" },
                    "select": { "type": "array", "items": { "type": "string" } },
                    "pageSize": { "type": "integer" },
                    "page": { "type": "integer" }
                }),
                &[],
            ),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "get-issue".into(),
            title: Some("Get issue".into()),
            description: Some("Fetch a single issue by id".into()),
            input_schema: object_schema(
                json!({ "issueId": { "type": "integer" } }),
                &["issueId"],
            ),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "search-issues".into(),
            title: Some("Search issues".into()),
            description: Some("Full-text search across issues".into()),
            input_schema: object_schema(
                json!({
                    "search": { "type": "string" },
                    "projectId": { "type": "integer" },
                    "pageSize": { "type": "integer" },
                    "page": { "type": "integer" }
                }),
                &["search"],
            ),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "create-issue".into(),
            title: Some("Create issue".into()),
            description: Some("Create a new issue in a project".into()),
            input_schema: object_schema(
                json!({
                    "summary": { "type": "string" },
                    "description": { "type": "string" },
                    "projectId": { "type": "integer" },
                    "category": { "type": "string" },
                    "priorityId": { "type": "integer" },
                    "severityId": { "type": "integer" },
                    "handlerId": { "type": "integer" }
                }),
                &["summary", "description", "projectId"],
            ),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "update-issue".into(),
            title: Some("Update issue".into()),
            description: Some("Update fields on an existing issue".into()),
            input_schema: object_schema(
                json!({
                    "issueId": { "type": "integer" },
                    "summary": { "type": "string" },
                    "description": { "type": "string" },
                    "category": { "type": "string" },
                    "priorityId": { "type": "integer" },
                    "severityId": { "type": "integer" },
                    "handlerId": { "type": "integer" },
                    "statusId": { "type": "integer" }
                }),
                &["issueId"],
            ),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "change-status".into(),
            title: Some("Change issue status".into()),
            description: Some("Move an issue to a new status, optionally with a note".into()),
            input_schema: object_schema(
                json!({
                    "issueId": { "type": "integer" },
                    "statusId": { "type": "integer" },
                    "resolutionId": { "type": "integer" },
                    "note": { "type": "string" }
                }),
                &["issueId", "statusId"],
            ),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "add-note".into(),
            title: Some("Add note".into()),
            description: Some("Append a public or private note to an issue".into()),
            input_schema: object_schema(
                json!({
                    "issueId": { "type": "integer" },
                    "text": { "type": "string" },
                    "private": { "type": "boolean" }
                }),
                &["issueId", "text"],
            ),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "get-user".into(),
            title: Some("Get user".into()),
            description: Some("Fetch a user account by id".into()),
            input_schema: object_schema(json!({ "userId": { "type": "integer" } }), &["userId"]),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "get-user-by-username".into(),
            title: Some("Get user by username".into()),
            description: Some("Fetch a user account by login name".into()),
            input_schema: object_schema(
                json!({ "username": { "type": "string" } }),
                &["username"],
            ),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "get-current-user".into(),
            title: Some("Get current user".into()),
            description: Some("Fetch the account behind the configured API key".into()),
            input_schema: empty.clone(),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "enumerate-users".into(),
            title: Some("Enumerate users".into()),
            description: Some("Probe sequential user ids to list visible accounts".into()),
            input_schema: empty.clone(),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "list-projects".into(),
            title: Some("List projects".into()),
            description: Some("List the projects visible to the API key".into()),
            input_schema: empty,
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "list-project-users".into(),
            title: Some("List project users".into()),
            description: Some("List users with access to a project".into()),
            input_schema: object_schema(
                json!({ "projectId": { "type": "integer" } }),
                &["projectId"],
            ),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "group-statistics".into(),
            title: Some("Group statistics".into()),
            description: Some("Count issues grouped by a dimension over a period".into()),
            input_schema: object_schema(
                json!({
                    "projectId": { "type": "integer" },
                    "groupBy": {
                        "type": "string",
                        "enum": ["status", "priority", "severity", "handler", "reporter"]
                    },
                    "period": {
                        "type": "string",
                        "enum": ["today", "week", "month", "all"]
                    }
                }),
                &["groupBy"],
            ),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
        Tool {
            name: "assignment-statistics".into(),
            title: Some("Assignment statistics".into()),
            description: Some("Per-handler workload roll-up with open/closed splits".into()),
            input_schema: object_schema(
                json!({
                    "projectId": { "type": "integer" },
                    "statusIds": { "type": "array", "items": { "type": "integer" } },
                    "includeUnassigned": { "type": "boolean" }
                }),
                &[],
            ),
            output_schema: None,
            annotations: Some(ToolAnnotations::default()),
            icons: None,
            meta: None,
        },
    ]
}
