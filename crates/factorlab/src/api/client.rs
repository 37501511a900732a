//! HTTP client for the research backend.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use super::error::{BackendError, Result};
use super::types::{
    BacktestRequest, BacktestResponse, DatasetsResponse, DocumentUpload, ExtractRequest,
    ExtractResponse, GenerateRequest, GenerateResponse, ModelsResponse, TestModelRequest,
    TestModelResponse, UploadResponse,
};
use crate::config::ClientConfig;

/// Maximum length of a response body quoted in an error message.
const MAX_ERROR_BODY_LENGTH: usize = 200;

const PDF_MIME: &str = "application/pdf";

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... (truncated)", &body[..cut]),
        None => body.to_string(),
    }
}

/// The backend operations the workflow depends on.
///
/// Implementations return the raw response envelope; deciding between
/// success and business failure is left to the caller.
#[async_trait]
pub trait FactorBackend: Send + Sync {
    /// `POST /api/upload_pdf` (multipart).
    async fn upload_pdf(
        &self,
        document: DocumentUpload,
        model_id: Option<&str>,
    ) -> Result<UploadResponse>;

    /// `POST /api/extract_content`
    async fn extract_content(&self, request: ExtractRequest<'_>) -> Result<ExtractResponse>;

    /// `POST /api/generate_factor`
    async fn generate_factor(&self, request: GenerateRequest<'_>) -> Result<GenerateResponse>;

    /// `GET /api/datasets`
    async fn list_datasets(&self) -> Result<DatasetsResponse>;

    /// `POST /api/run_backtest`
    async fn run_backtest(&self, request: BacktestRequest<'_>) -> Result<BacktestResponse>;

    /// `GET /api/models`
    async fn list_models(&self) -> Result<ModelsResponse>;

    /// `POST /api/test_model`
    async fn test_model(&self, model_id: &str) -> Result<TestModelResponse>;
}

impl DocumentUpload {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BackendError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.pdf".to_string());

        Ok(Self { file_name, bytes })
    }
}

/// [`FactorBackend`] over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder =
            Client::builder().connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| BackendError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.trimmed_base_url().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    /// Reads the body as JSON regardless of HTTP status; the server puts its
    /// error message in the body of 4xx/5xx responses too.
    async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        debug!("{} answered HTTP {} ({} bytes)", endpoint, status, body.len());

        serde_json::from_str(&body).map_err(|e| BackendError::InvalidResponse {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            reason: format!("{}: {}", e, truncate_body(&body)),
        })
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        debug!("POST {}", url);
        let response = self.client.post(&url).json(body).send().await?;
        Self::decode(&url, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        Self::decode(&url, response).await
    }
}

#[async_trait]
impl FactorBackend for HttpBackend {
    async fn upload_pdf(
        &self,
        document: DocumentUpload,
        model_id: Option<&str>,
    ) -> Result<UploadResponse> {
        let url = self.endpoint("upload_pdf");
        info!(
            "Uploading {} ({} bytes) to {}",
            document.file_name,
            document.bytes.len(),
            url
        );

        let part = Part::bytes(document.bytes)
            .file_name(document.file_name)
            .mime_str(PDF_MIME)?;
        let mut form = Form::new().part("file", part);
        if let Some(model_id) = model_id {
            form = form.text("model_id", model_id.to_string());
        }

        let response = self.client.post(&url).multipart(form).send().await?;
        Self::decode(&url, response).await
    }

    async fn extract_content(&self, request: ExtractRequest<'_>) -> Result<ExtractResponse> {
        self.post_json("extract_content", &request).await
    }

    async fn generate_factor(&self, request: GenerateRequest<'_>) -> Result<GenerateResponse> {
        self.post_json("generate_factor", &request).await
    }

    async fn list_datasets(&self) -> Result<DatasetsResponse> {
        self.get_json("datasets").await
    }

    async fn run_backtest(&self, request: BacktestRequest<'_>) -> Result<BacktestResponse> {
        self.post_json("run_backtest", &request).await
    }

    async fn list_models(&self) -> Result<ModelsResponse> {
        self.get_json("models").await
    }

    async fn test_model(&self, model_id: &str) -> Result<TestModelResponse> {
        self.post_json("test_model", &TestModelRequest { model_id })
            .await
    }
}
