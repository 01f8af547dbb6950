//! Backend contract: the only way the client talks to inference.

mod http;

pub use http::HttpBackend;

use crate::error::ClientError;
use crate::model::{HealthStatus, OcrRequest, OcrResponse, VqaRequest, VqaResponse};
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /api/vqa`
    async fn ask(&self, req: &VqaRequest) -> Result<VqaResponse, ClientError>;
    /// `POST /api/ocr`
    async fn recognize(&self, req: &OcrRequest) -> Result<OcrResponse, ClientError>;
    /// `GET /api/download/ocr/{task_id}`
    async fn download_ocr(&self, task_id: &str) -> Result<Bytes, ClientError>;
    /// `GET /api/health`
    async fn health(&self) -> Result<HealthStatus, ClientError>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted in-process backend for controller tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub enum Call {
        Ask(VqaRequest),
        Recognize(OcrRequest),
        Download(String),
        Health,
    }

    #[derive(Default)]
    pub struct FakeBackend {
        pub calls: Mutex<Vec<Call>>,
        pub asks: Mutex<VecDeque<Result<VqaResponse, ClientError>>>,
        pub recognitions: Mutex<VecDeque<Result<OcrResponse, ClientError>>>,
        pub downloads: Mutex<VecDeque<Result<Bytes, ClientError>>>,
    }

    impl FakeBackend {
        pub fn answer(self, session_id: &str, answer: &str) -> Self {
            self.asks.lock().unwrap().push_back(Ok(VqaResponse {
                session_id: session_id.into(),
                answer: answer.into(),
                timestamp: None,
            }));
            self
        }

        pub fn ask_fails(self, err: ClientError) -> Self {
            self.asks.lock().unwrap().push_back(Err(err));
            self
        }

        pub fn recognized(self, task_id: &str, text: &str) -> Self {
            self.recognitions.lock().unwrap().push_back(Ok(OcrResponse {
                task_id: task_id.into(),
                text: text.into(),
                download_url: None,
            }));
            self
        }

        pub fn recognize_fails(self, err: ClientError) -> Self {
            self.recognitions.lock().unwrap().push_back(Err(err));
            self
        }

        pub fn serves(self, body: &'static [u8]) -> Self {
            self.downloads
                .lock()
                .unwrap()
                .push_back(Ok(Bytes::from_static(body)));
            self
        }

        pub fn download_fails(self, err: ClientError) -> Self {
            self.downloads.lock().unwrap().push_back(Err(err));
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn unscripted() -> ClientError {
        ClientError::Transport("unscripted call".into())
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn ask(&self, req: &VqaRequest) -> Result<VqaResponse, ClientError> {
            self.calls.lock().unwrap().push(Call::Ask(req.clone()));
            self.asks.lock().unwrap().pop_front().unwrap_or_else(|| Err(unscripted()))
        }

        async fn recognize(&self, req: &OcrRequest) -> Result<OcrResponse, ClientError> {
            self.calls.lock().unwrap().push(Call::Recognize(req.clone()));
            self.recognitions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(unscripted()))
        }

        async fn download_ocr(&self, task_id: &str) -> Result<Bytes, ClientError> {
            self.calls.lock().unwrap().push(Call::Download(task_id.into()));
            self.downloads
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(unscripted()))
        }

        async fn health(&self) -> Result<HealthStatus, ClientError> {
            self.calls.lock().unwrap().push(Call::Health);
            Ok(HealthStatus {
                status: "healthy".into(),
                model_loaded: true,
                device: "cpu".into(),
            })
        }
    }
}
