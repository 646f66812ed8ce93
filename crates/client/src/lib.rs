//! Tracker access for the Mantis tool server.
//!
//! The crate layers a typed gateway over the tracker's two wire surfaces:
//! the REST API for everything it covers, and the legacy MantisConnect
//! SOAP script for full-text search, which REST never gained. Reads are
//! served through a fingerprint-keyed response cache; successful writes
//! clear it.

pub mod cache;
pub mod error;
pub mod gateway;
pub mod http;
pub mod models;
pub mod soap;

pub use cache::{fingerprint, RequestCache};
pub use error::{MantisError, Result};
pub use gateway::{
    IssueFilter, IssuePatch, MantisGateway, NewIssue, StatusChange, DEFAULT_PAGE,
    DEFAULT_PAGE_SIZE,
};
pub use models::{
    AccountRef, CustomFieldValue, Issue, IssueList, ObjectRef, Project, ProjectList, User,
    UserList,
};
pub use soap::SearchFilter;
