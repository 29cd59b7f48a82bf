//! Client for the document analysis service.
//!
//! One HTTP service fronts every analysis capability the pipeline needs.
//! Objects are referenced by storage key; the service reads them from the
//! shared bucket itself.
//!
//! | Capability            | Request                                   |
//! |-----------------------|-------------------------------------------|
//! | sync text detection   | `POST /v1/text/detect`                    |
//! | start async text job  | `POST /v1/text/jobs`                      |
//! | poll async text job   | `GET  /v1/text/jobs/{job_id}`             |
//! | label detection       | `POST /v1/labels/detect`                  |
//! | translation           | `POST /v1/translate`                      |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use dam_core::{
    defaults, Error, Label, LabelDetector, Result, TextBlock, TextDetectionJob, TextDetectionJobs,
    TextDetector, Translator,
};

/// Default analysis service endpoint.
pub const DEFAULT_ANALYSIS_URL: &str = "http://localhost:8090";

/// Configuration for [`HttpAnalysisClient`].
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ANALYSIS_URL.to_string(),
            api_key: None,
            timeout_seconds: defaults::ANALYSIS_HTTP_TIMEOUT_SECS,
        }
    }
}

impl AnalysisConfig {
    /// Read `DAM_ANALYSIS_URL` and `DAM_ANALYSIS_API_KEY`.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("DAM_ANALYSIS_URL")
                .unwrap_or_else(|_| DEFAULT_ANALYSIS_URL.to_string()),
            api_key: std::env::var("DAM_ANALYSIS_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct ObjectRequest<'a> {
    storage_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetectTextResponse {
    blocks: Vec<TextBlock>,
}

#[derive(Debug, Deserialize)]
struct StartJobResponse {
    job_id: String,
}

#[derive(Debug, Serialize)]
struct DetectLabelsRequest<'a> {
    storage_key: &'a str,
    max_labels: u32,
    min_confidence: f32,
}

#[derive(Debug, Deserialize)]
struct DetectLabelsResponse {
    labels: Vec<Label>,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    message: String,
}

/// HTTP client for the analysis service.
pub struct HttpAnalysisClient {
    client: Client,
    config: AnalysisConfig,
}

impl HttpAnalysisClient {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "analysis",
            base_url = %config.base_url,
            "Initializing analysis client"
        );
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(AnalysisConfig::from_env())
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.config.api_key {
            Some(ref key) => req.bearer_auth(key),
            None => req,
        }
    }

    /// Send a request and decode a JSON body, tagging failures with `wrap`.
    async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        wrap: fn(String) -> Error,
    ) -> Result<T> {
        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| wrap(format!("Request failed: {}", e)))?;
        let response = Self::check_status(response, wrap).await?;
        response
            .json()
            .await
            .map_err(|e| wrap(format!("Failed to parse response: {}", e)))
    }

    async fn check_status(response: Response, wrap: fn(String) -> Error) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let message = response
            .json::<ServiceError>()
            .await
            .map(|e| e.message)
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(wrap(format!("Service returned {}: {}", status, message)))
    }
}

#[async_trait]
impl TextDetector for HttpAnalysisClient {
    async fn detect_text(&self, storage_key: &str) -> Result<Vec<TextBlock>> {
        debug!(storage_key, "Detecting text");
        let req = self
            .client
            .post(self.url("/v1/text/detect"))
            .json(&ObjectRequest { storage_key });
        let body: DetectTextResponse = self.send_json(req, Error::Ocr).await?;
        Ok(body.blocks)
    }
}

#[async_trait]
impl TextDetectionJobs for HttpAnalysisClient {
    async fn start_job(&self, storage_key: &str) -> Result<String> {
        let req = self
            .client
            .post(self.url("/v1/text/jobs"))
            .json(&ObjectRequest { storage_key });
        let body: StartJobResponse = self.send_json(req, Error::Ocr).await?;
        debug!(storage_key, ocr_job_id = %body.job_id, "Text detection job started");
        Ok(body.job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<TextDetectionJob> {
        let req = self
            .client
            .get(self.url(&format!("/v1/text/jobs/{}", job_id)));
        let job: TextDetectionJob = self.send_json(req, Error::Ocr).await?;
        trace!(ocr_job_id = job_id, status = ?job.status, "Text detection job polled");
        Ok(job)
    }
}

#[async_trait]
impl LabelDetector for HttpAnalysisClient {
    async fn detect_labels(
        &self,
        storage_key: &str,
        max_labels: u32,
        min_confidence: f32,
    ) -> Result<Vec<Label>> {
        let req = self
            .client
            .post(self.url("/v1/labels/detect"))
            .json(&DetectLabelsRequest {
                storage_key,
                max_labels,
                min_confidence,
            });
        let body: DetectLabelsResponse = self.send_json(req, Error::Vision).await?;
        Ok(body.labels)
    }
}

#[async_trait]
impl Translator for HttpAnalysisClient {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        let req = self
            .client
            .post(self.url("/v1/translate"))
            .json(&TranslateRequest {
                text,
                source_lang,
                target_lang,
            });
        let body: TranslateResponse = self.send_json(req, Error::Translation).await?;
        Ok(body.translated_text)
    }
}
