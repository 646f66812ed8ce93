use serde::{Deserialize, Serialize};

/// `{id, name}` pair used for status, priority, severity, category, and
/// project references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub name: String,
}

/// Account reference carried on reporter and handler fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
}

/// One custom-field value attached to an issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldValue {
    #[serde(default)]
    pub field: ObjectRef,
    #[serde(default)]
    pub value: String,
}

/// An issue as the tracker reports it.
///
/// `id` is immutable once assigned by the tracker; status and handler are
/// the only fields this system mutates directly. Optional sub-objects stay
/// absent when the tracker omits them - they are never zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ObjectRef,
    #[serde(default)]
    pub project: ObjectRef,
    #[serde(default)]
    pub category: ObjectRef,
    #[serde(default)]
    pub reporter: AccountRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<AccountRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Vec<CustomFieldValue>>,
    /// ISO-8601 creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// ISO-8601 last-update timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A tracker account, fetched by id or by username. Read-only from this
/// system's perspective.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_level: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// A project as the tracker reports it. Read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub status: ObjectRef,
}

/// `{"issues": [...]}` list envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IssueList {
    #[serde(default)]
    pub issues: Vec<Issue>,
}

/// `{"users": [...]}` list envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserList {
    #[serde(default)]
    pub users: Vec<User>,
}

/// `{"projects": [...]}` list envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectList {
    #[serde(default)]
    pub projects: Vec<Project>,
}
