// OpenAI REST client: embeddings, chat completions, model listing.


use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::OpenAiConfig;
use crate::net::HttpClient;
use crate::{RagError, Result};

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_key: String,
    api_base: Url,
    embedding_model: String,
    chat_model: String,
    embedding_dimension: u32,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub id: String,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            embedding_dimension: config.embedding_dimension,
            http: HttpClient::new(),
        }
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub fn embedding_dimension(&self) -> u32 {
        self.embedding_dimension
    }

    fn endpoint(&self, segment: &str) -> Result<Url> {
        self.api_base
            .join(segment)
            .with_context(|| format!("Failed to build OpenAI URL for {segment}"))
            .map_err(RagError::Other)
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    /// Embed a single text, returning its vector.
    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("Empty embeddings response".to_string()))
    }

    /// Embed a batch of texts, returning vectors in input order.
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Requesting embeddings for {} texts", texts.len());

        let request = EmbeddingsRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let body = serde_json::to_string(&request)
            .context("Failed to serialize embeddings request")
            .map_err(RagError::Other)?;

        let url = self.endpoint("embeddings")?;
        let auth = self.auth_header();
        let response_text = self
            .http
            .post_json(url.as_str(), &[("Authorization", &auth)], &body)
            .map_err(|e| RagError::Embedding(format!("Embeddings request failed: {e}")))?;

        let response: EmbeddingsResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Embedding(format!("Invalid embeddings response: {e}")))?;

        if response.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Requested {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        // The API may return entries out of order; restore input order.
        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        for entry in &data {
            if entry.embedding.len() != self.embedding_dimension as usize {
                return Err(RagError::Embedding(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.embedding_dimension,
                    entry.embedding.len()
                )));
            }
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    /// Run a single-message chat completion and return the answer text.
    ///
    /// Falls back to a string rendering of the response body when the
    /// expected `choices[0].message.content` field is absent.
    #[inline]
    pub fn chat(&self, prompt: &str) -> Result<String> {
        debug!("Requesting chat completion ({} chars)", prompt.len());

        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let body = serde_json::to_string(&request)
            .context("Failed to serialize chat request")
            .map_err(RagError::Other)?;

        let url = self.endpoint("chat/completions")?;
        let auth = self.auth_header();
        let response_text = self
            .http
            .post_json(url.as_str(), &[("Authorization", &auth)], &body)
            .map_err(|e| RagError::Inference(format!("Chat request failed: {e}")))?;

        let response: Value = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Inference(format!("Invalid chat response: {e}")))?;

        let answer = response["choices"][0]["message"]["content"]
            .as_str()
            .map_or_else(|| response.to_string(), |content| content.to_string());

        Ok(answer.trim().to_string())
    }

    /// List the model ids visible to the API key. Used as a connectivity
    /// check.
    #[inline]
    pub fn list_models(&self) -> Result<Vec<String>> {
        let url = self.endpoint("models")?;
        let auth = self.auth_header();
        let response_text = self
            .http
            .get(url.as_str(), &[("Authorization", &auth)])
            .map_err(|e| RagError::Inference(format!("Model listing failed: {e}")))?;

        let response: ModelsResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Inference(format!("Invalid models response: {e}")))?;

        Ok(response.data.into_iter().map(|m| m.id).collect())
    }
}
