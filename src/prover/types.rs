//! Request and response bodies for the proving service, plus the credential type.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A non-empty API credential. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for an empty or whitespace-only key.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(***)")
    }
}

/// What the job controller asks the service to prove.
#[derive(Debug, Clone, Copy)]
pub struct ProofTask<'a> {
    pub input: &'a Path,
    pub context: &'a [PathBuf],
    /// Refuse unreadable or empty sources locally instead of submitting them.
    pub validate: bool,
}

/// One source file embedded in a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

/// Body of `POST /projects`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub input: SourceFile,
    pub context: Vec<SourceFile>,
}

/// Response of `POST /projects`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub project_id: String,
}

/// Remote lifecycle of a project as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Queued,
    InProgress,
    Complete,
    Failed,
}

/// Response of `GET /projects/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub project_id: String,
    pub status: ProjectStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Status as seen by the job controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Processing,
    Succeeded,
    Failed(String),
}

impl From<StatusResponse> for TaskStatus {
    fn from(response: StatusResponse) -> Self {
        match response.status {
            ProjectStatus::Queued | ProjectStatus::InProgress => TaskStatus::Processing,
            ProjectStatus::Complete => TaskStatus::Succeeded,
            ProjectStatus::Failed => TaskStatus::Failed(
                response
                    .error
                    .unwrap_or_else(|| format!("project {} failed", response.project_id)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_rejects_blank_and_hides_value() {
        assert!(ApiKey::new("").is_none());
        assert!(ApiKey::new("   ").is_none());

        let key = ApiKey::new("sk-secret").unwrap();
        assert_eq!(key.expose(), "sk-secret");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
    }

    #[test]
    fn status_response_deserialize_from_api_format() {
        let json = r#"{"project_id": "p-1", "status": "IN_PROGRESS"}"#;
        let resp: StatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.status, ProjectStatus::InProgress);
        assert_eq!(resp.error, None);
        assert_eq!(TaskStatus::from(resp), TaskStatus::Processing);
    }

    #[test]
    fn failed_status_carries_service_message() {
        let json = r#"{"project_id": "p-2", "status": "FAILED", "error": "counterexample found"}"#;
        let resp: StatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            TaskStatus::from(resp),
            TaskStatus::Failed("counterexample found".into())
        );
    }

    #[test]
    fn failed_status_without_message_names_project() {
        let resp = StatusResponse {
            project_id: "p-3".into(),
            status: ProjectStatus::Failed,
            error: None,
        };
        assert_eq!(
            TaskStatus::from(resp),
            TaskStatus::Failed("project p-3 failed".into())
        );
    }

    #[test]
    fn submit_request_shape() {
        let req = SubmitRequest {
            input: SourceFile {
                name: "Transfer.lean".into(),
                content: "theorem t : True := trivial".into(),
            },
            context: vec![],
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["input"]["name"], "Transfer.lean");
        assert!(value["context"].as_array().unwrap().is_empty());
    }
}
