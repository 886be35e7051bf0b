//! Cloud batch service backend
//!
//! HTTP client for the managed batch service family: structured submit,
//! bulk describe, terminate, and template registration endpoints speaking
//! JSON. Status codes map into the adapter error taxonomy so the retry
//! wrapper can tell rate limiting from real rejections.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use weft_core::{JobHandle, JobState, StatusRecord};

use crate::backend::{BatchBackend, SubmissionPayload, TemplateHandle, TemplateSpec};
use crate::error::{BatchError, Result};

use async_trait::async_trait;

/// HTTP client for the cloud batch service API
#[derive(Debug, Clone)]
pub struct CloudBatchClient {
    /// Base URL of the service (e.g., "http://batch.internal:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeRequest<'a> {
    jobs: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DescribeResponse {
    #[serde(default)]
    jobs: Vec<JobDetail>,
}

/// One job as the service reports it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobDetail {
    job_id: String,
    status: String,
    /// Milliseconds since the epoch, present once the job has started.
    started_at: Option<i64>,
    /// Milliseconds since the epoch, present once the job has stopped.
    stopped_at: Option<i64>,
    #[serde(default)]
    container: ContainerDetail,
    status_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerDetail {
    exit_code: Option<i32>,
}

#[derive(Debug, Serialize)]
struct TerminateRequest<'a> {
    reason: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterTemplateResponse {
    template_id: String,
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

fn parse_state(status: &str) -> JobState {
    match status {
        "SUBMITTED" | "PENDING" | "RUNNABLE" => JobState::Queued,
        "STARTING" => JobState::Starting,
        "RUNNING" => JobState::Running,
        "SUCCEEDED" => JobState::Succeeded,
        "FAILED" => JobState::Failed,
        _ => JobState::Unknown,
    }
}

impl CloudBatchClient {
    /// Create a new client for the given service endpoint
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Create a client with a custom reqwest client (timeouts, proxies, TLS)
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BatchError::api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| BatchError::Parse(format!("failed to parse JSON response: {e}")))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BatchError::api(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[async_trait]
impl BatchBackend for CloudBatchClient {
    async fn submit_job(&self, payload: &SubmissionPayload) -> Result<JobHandle> {
        let url = format!("{}/v1/jobs", self.base_url);
        let response = self.client.post(&url).json(payload).send().await?;

        let submitted: SubmitResponse = self.handle_response(response).await?;
        Ok(JobHandle::new(submitted.job_id))
    }

    async fn describe_jobs(&self, handles: &[JobHandle]) -> Result<Vec<StatusRecord>> {
        let ids: Vec<String> = handles.iter().map(|h| h.to_string()).collect();
        let request = DescribeRequest {
            jobs: ids.iter().map(String::as_str).collect(),
        };

        let url = format!("{}/v1/jobs/describe", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;

        let described: DescribeResponse = self.handle_response(response).await?;
        Ok(described
            .jobs
            .into_iter()
            .map(|detail| StatusRecord {
                handle: JobHandle::parse(&detail.job_id),
                state: parse_state(&detail.status),
                started_at: detail.started_at.and_then(millis_to_datetime),
                stopped_at: detail.stopped_at.and_then(millis_to_datetime),
                exit_code: detail.container.exit_code,
                status_reason: detail.status_reason,
            })
            .collect())
    }

    async fn cancel_job(&self, handle: &JobHandle, reason: &str) -> Result<()> {
        let url = format!("{}/v1/jobs/{}/terminate", self.base_url, handle);
        let response = self
            .client
            .post(&url)
            .json(&TerminateRequest { reason })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    async fn register_template(&self, spec: &TemplateSpec) -> Result<TemplateHandle> {
        let url = format!("{}/v1/templates", self.base_url);
        let response = self.client.post(&url).json(spec).send().await?;

        let registered: RegisterTemplateResponse = self.handle_response(response).await?;
        Ok(TemplateHandle(registered.template_id))
    }

    async fn deregister_template(&self, handle: &TemplateHandle) -> Result<()> {
        let url = format!("{}/v1/templates/{}", self.base_url, handle);
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = CloudBatchClient::new("http://batch.internal:8080/");
        assert_eq!(client.base_url(), "http://batch.internal:8080");
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(parse_state("RUNNABLE"), JobState::Queued);
        assert_eq!(parse_state("STARTING"), JobState::Starting);
        assert_eq!(parse_state("RUNNING"), JobState::Running);
        assert_eq!(parse_state("SUCCEEDED"), JobState::Succeeded);
        assert_eq!(parse_state("FAILED"), JobState::Failed);
        assert_eq!(parse_state("SOMETHING_NEW"), JobState::Unknown);
    }

    #[test]
    fn test_job_detail_deserializes_without_optional_fields() {
        let detail: JobDetail =
            serde_json::from_str(r#"{"jobId": "j-1", "status": "SUCCEEDED"}"#).unwrap();
        assert_eq!(detail.job_id, "j-1");
        assert!(detail.started_at.is_none());
        assert!(detail.container.exit_code.is_none());
    }
}
