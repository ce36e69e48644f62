// Inference Provider Service
// HTTP client for the sentence-embedding and classification services

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::models::EmbeddingMatrix;
use crate::services::moderation::backends::{BinaryClassifier, SentenceEmbedder};
use crate::services::moderation::error::ModerationResult;

pub const INFERENCE_DEFAULT_URL: &str = "http://127.0.0.1:8501";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest<'a> {
    sentences: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize)]
struct ClassifyRequest {
    inputs: Vec<Vec<Vec<f32>>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClassifyResponse {
    probabilities: Vec<Vec<f32>>,
}

/// Client for the model-serving endpoints `POST /embed` and `POST /classify`.
#[derive(Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl InferenceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: get_api_key(),
        }
    }

    /// Base URL from `MINDGATE_INFERENCE_URL`, falling back to the local default.
    pub fn from_env() -> Result<Self, ProviderError> {
        let url = env::var("MINDGATE_INFERENCE_URL").unwrap_or_else(|_| INFERENCE_DEFAULT_URL.to_string());
        Self::new(&url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);
        let start = Instant::now();

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data = response
            .json()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        debug!(url = %url, latency_ms = start.elapsed().as_millis(), "inference.call");
        Ok(data)
    }

    pub fn embed_sentences(&self, sentences: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let data: EmbedResponse = self.post_json("embed", &EmbedRequest { sentences })?;
        Ok(data.embeddings)
    }

    pub fn classify(&self, matrix: &EmbeddingMatrix) -> Result<Vec<Vec<f32>>, ProviderError> {
        let data: ClassifyResponse = self.post_json(
            "classify",
            &ClassifyRequest {
                inputs: matrix.to_batch(),
            },
        )?;
        Ok(data.probabilities)
    }
}

impl SentenceEmbedder for InferenceClient {
    fn embed(&self, sentences: &[String]) -> ModerationResult<Vec<Vec<f32>>> {
        Ok(self.embed_sentences(sentences)?)
    }
}

impl BinaryClassifier for InferenceClient {
    fn predict(&self, matrix: &EmbeddingMatrix) -> ModerationResult<Vec<Vec<f32>>> {
        Ok(self.classify(matrix)?)
    }
}

/// Bearer token for the inference service, if one is configured.
pub fn get_api_key() -> Option<String> {
    for key in ["MINDGATE_INFERENCE_API_KEY", "INFERENCE_API_KEY"] {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::moderation::error::ModerationError;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn serve_once(status: &str, body: &str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                read_request(&mut stream);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}", addr)
    }

    /// Drain headers and the declared body so the client sees a clean close.
    fn read_request(stream: &mut std::net::TcpStream) {
        let mut data = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .and_then(|v| v.trim().parse::<usize>().ok())
                    })
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + content_length {
                    return;
                }
            }
        }
    }

    fn local_client(url: &str) -> InferenceClient {
        let http = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        InferenceClient::with_client(http, url)
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = InferenceClient::new("http://localhost:8501/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8501");
    }

    #[test]
    fn test_embed_parses_response() {
        let url = serve_once("200 OK", r#"{"embeddings": [[0.5, 0.25]]}"#);
        let client = local_client(&url);
        let vectors = client.embed_sentences(&["Hello there.".to_string()]).unwrap();
        assert_eq!(vectors, vec![vec![0.5, 0.25]]);
    }

    #[test]
    fn test_api_error_is_invocation_error() {
        let url = serve_once("503 Service Unavailable", r#"{"error": "warming up"}"#);
        let client = local_client(&url);
        let err = client.predict(&EmbeddingMatrix::zeros(2, 2)).unwrap_err();
        assert!(matches!(err, ModerationError::ModelInvocation(_)));
    }

    #[test]
    fn test_malformed_body_is_output_error() {
        let url = serve_once("200 OK", r#"{"unexpected": true}"#);
        let client = local_client(&url);
        let err = client.predict(&EmbeddingMatrix::zeros(2, 2)).unwrap_err();
        assert!(matches!(err, ModerationError::ModelOutput(_)));
    }

    #[test]
    fn test_unreachable_service_is_invocation_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let client = local_client(&url);
        let err = client.embed(&["x".to_string()]).unwrap_err();
        assert!(matches!(err, ModerationError::ModelInvocation(_)));
    }
}
