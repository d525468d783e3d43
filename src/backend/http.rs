//! HTTP backend using reqwest
//!
//! Talks to the Flask task backend. Reads decode strictly; mutation replies
//! keep the server's `error`/`output` text even on non-2xx statuses.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{AssignRequest, Backend, LoginRequest, UploadRequest};
use crate::error::BackendError;
use crate::model::{
    BoardResponse, BoardSnapshot, MessageSnapshot, MessagesResponse, MutationResponse,
    RemoteJobStatus, UploadStatusResponse,
};

/// Production backend over HTTP
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// HTTP client
    client: reqwest::Client,
    /// Base URL without trailing slash
    base_url: String,
}

impl HttpBackend {
    /// Create a backend for a base URL, e.g. `http://host:5000`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing client (connection pooling)
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fail on non-2xx, keeping the body for diagnostics
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Decode a successful JSON body
    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(BackendError::decode)
    }

    /// Decode a mutation reply regardless of status when the body is JSON
    async fn parse_mutation(response: reqwest::Response) -> Result<MutationResponse, BackendError> {
        let status = response.status();
        let bytes = response.bytes().await?;
        match serde_json::from_slice::<MutationResponse>(&bytes) {
            Ok(mut reply) => {
                if !status.is_success() {
                    reply.success = false;
                }
                Ok(reply)
            }
            Err(_) if !status.is_success() => Err(BackendError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            Err(e) => Err(BackendError::decode(e)),
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_board(&self, username: &str) -> Result<BoardSnapshot, BackendError> {
        tracing::debug!(username, "GET /check_new_tasks");
        let response = self
            .client
            .get(self.url("/check_new_tasks"))
            .query(&[("username", username)])
            .send()
            .await?;
        let body: BoardResponse = Self::parse_json(response).await?;
        Ok(body.into_snapshot())
    }

    async fn fetch_messages(&self, username: &str) -> Result<MessageSnapshot, BackendError> {
        tracing::debug!(username, "GET /check_task_messages");
        let response = self
            .client
            .get(self.url("/check_task_messages"))
            .query(&[("username", username)])
            .send()
            .await?;
        let body: MessagesResponse = Self::parse_json(response).await?;
        Ok(body.into_snapshot())
    }

    async fn submit_upload(&self, request: UploadRequest) -> Result<MutationResponse, BackendError> {
        tracing::debug!(
            case_number = %request.task_filter,
            file = %request.file_name,
            bytes = request.bytes.len(),
            "POST /playwright_upload"
        );
        let form = Form::new()
            .part("file", Part::bytes(request.bytes).file_name(request.file_name))
            .text("username", request.username)
            .text("password", request.password)
            .text("task_filter", request.task_filter);

        let response = self
            .client
            .post(self.url("/playwright_upload"))
            .multipart(form)
            .send()
            .await?;
        Self::parse_mutation(response).await
    }

    async fn upload_status(&self, case_number: &str) -> Result<RemoteJobStatus, BackendError> {
        tracing::debug!(case_number, "GET /upload_status");
        let response = self
            .client
            .get(self.url("/upload_status"))
            .query(&[("case_number", case_number)])
            .send()
            .await?;
        let body: UploadStatusResponse = Self::parse_json(response).await?;
        Ok(body.into())
    }

    async fn add_technician(
        &self,
        request: &AssignRequest,
    ) -> Result<MutationResponse, BackendError> {
        tracing::debug!(
            case_number = %request.case_number,
            worker = %request.worker_name,
            "POST /add_technician"
        );
        let response = self
            .client
            .post(self.url("/add_technician"))
            .json(request)
            .send()
            .await?;
        Self::parse_mutation(response).await
    }

    async fn list_workers(&self) -> Result<Vec<String>, BackendError> {
        let response = self.client.get(self.url("/api/workers")).send().await?;
        Self::parse_json(response).await
    }

    async fn login(&self, username: &str, password: &str) -> Result<bool, BackendError> {
        #[derive(Deserialize)]
        struct LoginResponse {
            #[serde(default)]
            success: bool,
        }

        tracing::debug!(username, "POST /login");
        let response = self
            .client
            .post(self.url("/login"))
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        // The backend answers 500 with `success: false` on scrape failures
        let bytes = response.bytes().await?;
        let body: LoginResponse = serde_json::from_slice(&bytes).map_err(BackendError::decode)?;
        Ok(body.success)
    }
}
