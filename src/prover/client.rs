use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use super::error::ProverError;
use super::types::{
    ApiKey, ProofTask, SourceFile, StatusResponse, SubmitRequest, SubmitResponse, TaskStatus,
};

pub const DEFAULT_BASE_URL: &str = "https://aristotle.harmonic.fun/api/v1";

/// The operations the job controller needs from a proving backend.
#[allow(async_fn_in_trait)]
pub trait ProvingService {
    /// Submit a task and return the service's project identifier.
    async fn submit(&self, task: &ProofTask<'_>) -> Result<String, ProverError>;

    /// Fetch the current status of a submitted project.
    async fn status(&self, project_id: &str) -> Result<TaskStatus, ProverError>;

    /// Write the project's solution to `output` and return where it actually landed.
    async fn download(&self, project_id: &str, output: &Path) -> Result<PathBuf, ProverError>;
}

/// HTTP client for the proving service. The credential is fixed at construction.
pub struct ProverClient {
    api_key: ApiKey,
    client: Client,
    base_url: String,
}

impl ProverClient {
    /// Create a client for the service at `base_url` (see [`DEFAULT_BASE_URL`]).
    pub fn with_base_url(api_key: ApiKey, base_url: String) -> Result<Self, ProverError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl ProvingService for ProverClient {
    async fn submit(&self, task: &ProofTask<'_>) -> Result<String, ProverError> {
        let input = read_source(task.input, task.validate).await?;
        let mut context = Vec::with_capacity(task.context.len());
        for path in task.context {
            context.push(read_source(path, task.validate).await?);
        }
        let body = SubmitRequest { input, context };

        let response = self
            .client
            .post(self.url("/projects"))
            .header("x-api-key", self.api_key.expose())
            .json(&body)
            .send()
            .await?;
        let response = check_status(response, ClientErrors::Reject).await?;

        let parsed = response
            .json::<SubmitResponse>()
            .await
            .map_err(|e| ProverError::Parse(e.to_string()))?;
        debug!(project_id = %parsed.project_id, "project created");
        Ok(parsed.project_id)
    }

    async fn status(&self, project_id: &str) -> Result<TaskStatus, ProverError> {
        let response = self
            .client
            .get(self.url(&format!("/projects/{project_id}")))
            .header("x-api-key", self.api_key.expose())
            .send()
            .await?;
        let response = check_status(response, ClientErrors::Fault).await?;

        let parsed = response
            .json::<StatusResponse>()
            .await
            .map_err(|e| ProverError::Parse(e.to_string()))?;
        Ok(parsed.into())
    }

    async fn download(&self, project_id: &str, output: &Path) -> Result<PathBuf, ProverError> {
        let response = self
            .client
            .get(self.url(&format!("/projects/{project_id}/solution")))
            .header("x-api-key", self.api_key.expose())
            .send()
            .await?;
        let solution = check_status(response, ClientErrors::Fault)
            .await?
            .text()
            .await?;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, solution).await?;
        Ok(output.to_path_buf())
    }
}

/// Read one source file, refusing empty content when `validate` is set.
async fn read_source(path: &Path, validate: bool) -> Result<SourceFile, ProverError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if validate => {
            return Err(ProverError::Validation(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    if validate && content.trim().is_empty() {
        return Err(ProverError::Validation(format!("{} is empty", path.display())));
    }

    Ok(SourceFile { name, content })
}

/// How a 4xx other than 401/403/429 is classified.
#[derive(Debug, Clone, Copy)]
enum ClientErrors {
    /// The service refused the job itself.
    Reject,
    /// The job was already accepted, so a 4xx is not a verdict on it.
    Fault,
}

/// Map non-success HTTP statuses onto the error taxonomy.
async fn check_status(response: Response, client_errors: ClientErrors) -> Result<Response, ProverError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_ms = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000))
            .unwrap_or(1000);
        return Err(ProverError::RateLimited { retry_after_ms });
    }

    let code = status.as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProverError::Unauthorized {
            status: code,
            message,
        },
        s if s.is_client_error() => match client_errors {
            ClientErrors::Reject => ProverError::Rejected {
                status: code,
                message,
            },
            ClientErrors::Fault => ProverError::UnexpectedStatus {
                status: code,
                message,
            },
        },
        _ => ProverError::Server {
            status: code,
            message,
        },
    })
}
