use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{EmbeddingError, EmbeddingModel};

/// Embedding model behind an OpenAI-compatible `/embeddings` endpoint
/// (Voyage AI and OpenAI both speak this format).
pub struct OpenAIEmbeddingModel {
    base_url: String,
    model_name: String,
    api_key: String,
    dimensions: usize,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

impl OpenAIEmbeddingModel {
    pub fn new(
        base_url: &str,
        model_name: &str,
        api_key: &str,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model_name: model_name.to_string(),
            api_key: api_key.to_string(),
            dimensions,
            http_client,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OpenAIEmbeddingModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model_name,
            input: vec![text],
        };

        let resp = self
            .http_client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api { status, body });
        }

        let response: EmbeddingResponse = resp.json().await?;
        let embedding = response
            .data
            .into_iter()
            .next()
            .and_then(|d| d.embedding)
            .ok_or(EmbeddingError::MissingVector)?;

        if embedding.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn model(server: &MockServer, dimensions: usize) -> OpenAIEmbeddingModel {
        OpenAIEmbeddingModel::new(
            &server.url("/v1"),
            "voyage-large-2",
            "test-key",
            dimensions,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_embedding_request_serialization() {
        let req = EmbeddingRequest {
            model: "voyage-large-2",
            input: vec!["hello world"],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "voyage-large-2");
        assert_eq!(json["input"][0], "hello world");
    }

    #[tokio::test]
    async fn test_embed_returns_vector() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer test-key");
                then.status(200).json_body(json!({
                    "object": "list",
                    "data": [{"object": "embedding", "embedding": [0.1, 0.2, 0.3], "index": 0}],
                    "model": "voyage-large-2"
                }));
            })
            .await;

        let vector = model(&server, 3).embed("Hello Mira").await.unwrap();
        assert_eq!(vector.len(), 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_embed_missing_vector_is_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(json!({"data": []}));
            })
            .await;

        let err = model(&server, 3).embed("Hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::MissingVector));
    }

    #[tokio::test]
    async fn test_embed_upstream_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(429).body("rate limited");
            })
            .await;

        let err = model(&server, 3).embed("Hello").await.unwrap_err();
        match err {
            EmbeddingError::Api { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_embed_rejects_dimension_mismatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(json!({"data": [{"embedding": [0.1, 0.2]}]}));
            })
            .await;

        let err = model(&server, 3).embed("Hello").await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch { expected: 3, actual: 2 }
        ));
    }
}
