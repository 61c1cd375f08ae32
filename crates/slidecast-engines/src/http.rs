//! HTTP client for the ML engine service.
//!
//! One service hosts transcription, frame analysis and summarization; each
//! is a JSON (or multipart) POST endpoint. Transport-level failures and 503s
//! are retried with exponential backoff before the error reaches the
//! circuit breaker.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use slidecast_models::{AudioSegment, CropAnalysis, NormalizedRect};

use crate::error::{EngineError, EngineResult};
use crate::metrics;
use crate::traits::{FrameAnalysisEngine, SummarizationEngine, SummaryItem, TranscriptionEngine};

/// Configuration for the engine client.
#[derive(Debug, Clone)]
pub struct EngineClientConfig {
    /// Base URL of the engine service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
}

impl Default for EngineClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(300),
            max_retries: 2,
        }
    }
}

impl EngineClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("SLIDECAST_ENGINE_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("SLIDECAST_ENGINE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("SLIDECAST_ENGINE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct AnalyzeFramesRequest<'a> {
    frames: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeFramesResponse {
    crop: NormalizedRect,
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    transcript: &'a str,
}

#[derive(Debug, Deserialize)]
struct SummarizeResponse {
    bullets: Vec<SummaryItem>,
}

/// Client for the ML engine service.
pub struct HttpEngineClient {
    http: Client,
    config: EngineClientConfig,
}

impl HttpEngineClient {
    pub fn new(config: EngineClientConfig) -> EngineResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(EngineError::Network)?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> EngineResult<Self> {
        Self::new(EngineClientConfig::from_env())
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// Check if the engine service is healthy.
    pub async fn health_check(&self) -> EngineResult<bool> {
        match self.http.get(self.url("health")).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Engine health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Engine health check error: {}", e);
                Ok(false)
            }
        }
    }

    async fn post_json<B, R>(&self, endpoint: &str, body: &B) -> EngineResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(endpoint);
        debug!("POST {}", url);
        let response = self
            .with_retry(endpoint, || async {
                let response = self.http.post(&url).json(body).send().await?;
                check_status(response).await
            })
            .await?;
        decode(response).await
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, endpoint: &str, operation: F) -> EngineResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = EngineResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            let started = Instant::now();
            let result = operation().await;
            // 0 marks a request that got no HTTP answer
            let status = match &result {
                Ok(_) => 200,
                Err(e) => e.status_code().unwrap_or(0),
            };
            metrics::record_request(endpoint, status, started.elapsed().as_secs_f64() * 1000.0);

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Engine request to {} failed (attempt {}), retrying in {:?}: {}",
                        endpoint,
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::request_failed("Unknown error")))
    }
}

async fn check_status(response: Response) -> EngineResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(EngineError::ServiceUnavailable(body));
    }
    Err(EngineError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<R: DeserializeOwned>(response: Response) -> EngineResult<R> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| EngineError::invalid_response(e.to_string()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "segment.wav".to_string())
}

#[async_trait]
impl TranscriptionEngine for HttpEngineClient {
    async fn transcribe(&self, segment: &AudioSegment) -> EngineResult<String> {
        let path = Path::new(&segment.path);
        let bytes = tokio::fs::read(path).await?;
        let name = file_name(path);
        let url = self.url("transcribe");

        let response = self
            .with_retry("transcribe", || async {
                let part = Part::bytes(bytes.clone())
                    .file_name(name.clone())
                    .mime_str("audio/wav")?;
                let form = Form::new()
                    .text("index", segment.index.to_string())
                    .text("start", segment.start.to_string())
                    .text("end", segment.end.to_string())
                    .part("file", part);
                let response = self.http.post(&url).multipart(form).send().await?;
                check_status(response).await
            })
            .await?;

        let parsed: TranscribeResponse = decode(response).await?;
        Ok(parsed.text)
    }
}

#[async_trait]
impl FrameAnalysisEngine for HttpEngineClient {
    async fn analyze(&self, frames: &[PathBuf]) -> EngineResult<CropAnalysis> {
        if frames.is_empty() {
            return Err(EngineError::request_failed("no frames to analyze"));
        }
        let paths: Vec<String> = frames
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        let request = AnalyzeFramesRequest {
            frames: paths.iter().map(String::as_str).collect(),
        };
        let response: AnalyzeFramesResponse = self.post_json("analyze-frames", &request).await?;
        if !response.crop.is_valid() {
            return Err(EngineError::invalid_response(format!(
                "crop outside the frame: {:?}",
                response.crop
            )));
        }
        Ok(CropAnalysis::new(response.crop, response.confidence))
    }
}

#[async_trait]
impl SummarizationEngine for HttpEngineClient {
    async fn summarize(&self, transcript: &str) -> EngineResult<Vec<SummaryItem>> {
        let response: SummarizeResponse = self
            .post_json("summarize", &SummarizeRequest { transcript })
            .await?;
        Ok(response.bullets)
    }
}
