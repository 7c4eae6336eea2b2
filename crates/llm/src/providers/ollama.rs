//! Ollama generation provider.
//!
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use std::time::Duration;

use crate::client::{GenerationRequest, LlmClient, LlmResponse, LlmUsage};
use crate::http::{build_http_client, classify_send_error, classify_status};
use medrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Ollama generation client.
pub struct OllamaClient {
    /// Base URL for Ollama API
    base_url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a client for `base_url` whose requests time out after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: build_http_client(timeout)?,
        })
    }

    fn to_ollama_request(&self, request: &GenerationRequest) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_output_tokens,
            },
        }
    }

    fn convert_response(&self, response: OllamaResponse) -> AppResult<LlmResponse> {
        if response.response.trim().is_empty() {
            return Err(AppError::terminal("Ollama returned an empty response"));
        }

        Ok(LlmResponse {
            content: response.response,
            model: response.model,
            usage: LlmUsage::new(
                response.prompt_eval_count.unwrap_or(0),
                response.eval_count.unwrap_or(0),
            ),
        })
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    #[tracing::instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: &GenerationRequest) -> AppResult<LlmResponse> {
        tracing::debug!(prompt_chars = request.prompt.len(), "Sending generation request to Ollama");

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.to_ollama_request(request))
            .send()
            .await
            .map_err(|e| classify_send_error("Ollama", &e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status("Ollama", status, &error_text));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::terminal(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!("Received completion from Ollama");
        self.convert_response(ollama_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server::serve_once;

    fn client(base_url: &str) -> OllamaClient {
        OllamaClient::new(base_url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_ollama_request_conversion() {
        let client = client(DEFAULT_OLLAMA_URL);
        let request = GenerationRequest::new("Hello", "llama3.2")
            .with_temperature(0.7)
            .with_max_output_tokens(100);

        let ollama_req = client.to_ollama_request(&request);
        assert_eq!(ollama_req.model, "llama3.2");
        assert_eq!(ollama_req.prompt, "Hello");
        assert!(!ollama_req.stream);
        assert_eq!(ollama_req.options.temperature, 0.7);
        assert_eq!(ollama_req.options.num_predict, 100);
    }

    #[tokio::test]
    async fn test_generate_parses_response() {
        let body = r#"{"model":"llama3.2","response":"Metformin.","done":true,"prompt_eval_count":12,"eval_count":3}"#;
        let (base_url, server) = serve_once("200 OK", body).await;

        let response = client(&base_url)
            .generate(&GenerationRequest::new("Which drug?", "llama3.2"))
            .await
            .unwrap();

        assert_eq!(response.content, "Metformin.");
        assert_eq!(response.usage.total_tokens, 15);

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /api/generate"));
        assert!(raw.contains("\"num_predict\":512"));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let (base_url, _server) = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#).await;

        let err = client(&base_url)
            .generate(&GenerationRequest::new("q", "llama3.2"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_not_found_is_terminal() {
        let (base_url, _server) =
            serve_once("404 Not Found", r#"{"error":"model 'nope' not found"}"#).await;

        let err = client(&base_url)
            .generate(&GenerationRequest::new("q", "nope"))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("not found"));
    }
}
