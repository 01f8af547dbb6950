use super::Backend;
use crate::error::{extract_detail, ClientError, DOWNLOAD_FAILED, OCR_FALLBACK, VQA_FALLBACK};
use crate::model::{ClientConfig, HealthStatus, OcrRequest, OcrResponse, VqaRequest, VqaResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use serde::{de::DeserializeOwned, Serialize};

/// reqwest-backed implementation of the backend contract.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
}

fn transport(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Transport("Request timed out".into())
    } else if e.is_connect() {
        ClientError::Transport("Could not connect to server".into())
    } else {
        ClientError::Transport(format!("Network error: {e}"))
    }
}

impl HttpBackend {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&cfg.base_url)
            .with_context(|| format!("invalid base URL: {}", cfg.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("base URL cannot carry paths: {}", cfg.base_url);
        }
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base can always carry path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post_json<Req, Resp>(
        &self,
        segments: &[&str],
        body: &Req,
        fallback: &str,
    ) -> Result<Resp, ClientError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(segments);
        tracing::debug!(%url, "POST");
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport)?;
        tracing::debug!(status = status.as_u16(), "response");
        if !status.is_success() {
            return Err(ClientError::Backend {
                status: status.as_u16(),
                message: extract_detail(&text, fallback),
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| ClientError::Transport(format!("Invalid response from server: {e}")))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn ask(&self, req: &VqaRequest) -> Result<VqaResponse, ClientError> {
        self.post_json(&["api", "vqa"], req, VQA_FALLBACK).await
    }

    async fn recognize(&self, req: &OcrRequest) -> Result<OcrResponse, ClientError> {
        self.post_json(&["api", "ocr"], req, OCR_FALLBACK).await
    }

    async fn download_ocr(&self, task_id: &str) -> Result<Bytes, ClientError> {
        let url = self.endpoint(&["api", "download", "ocr", task_id]);
        tracing::debug!(%url, "GET");
        let resp = self.http.get(url).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "download rejected");
            return Err(ClientError::Backend {
                status: status.as_u16(),
                message: DOWNLOAD_FAILED.into(),
            });
        }
        resp.bytes().await.map_err(transport)
    }

    async fn health(&self) -> Result<HealthStatus, ClientError> {
        let url = self.endpoint(&["api", "health"]);
        let resp = self.http.get(url).send().await.map_err(transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(ClientError::Backend {
                status: status.as_u16(),
                message: extract_detail(&text, "Health check failed"),
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| ClientError::Transport(format!("Invalid response from server: {e}")))
    }
}
