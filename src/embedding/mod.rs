//! 임베딩 모듈 - Ollama API를 통한 텍스트 벡터화
//!
//! 텍스트를 벡터로 변환하는 Ollama 임베딩 프로바이더입니다.
//! 시맨틱 검색을 위한 핵심 모듈입니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::new(&config)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
/// 차원은 프로바이더가 선언하지 않고 첫 응답에서 관찰됩니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// Ollama 임베딩 요청
/// source: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

/// Ollama 임베딩 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama 임베딩 구현체
///
/// /api/embed 엔드포인트는 배치 입력을 받으므로 embed_batch가 요청 한 번으로 끝납니다.
#[derive(Debug)]
pub struct OllamaEmbedding {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedding {
    pub fn new(config: &RagConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                RagError::Configuration(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.ollama_base_url.trim_end_matches('/').to_string(),
            model: config.embedding_model.clone(),
        })
    }

    fn embed_url(&self) -> String {
        format!("{}/api/embed", self.base_url)
    }

    /// 임베딩 요청 공통 경로
    async fn request_embeddings(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = input.len();
        let request = EmbedRequest {
            model: self.model.clone(),
            input,
        };

        let response = self
            .client
            .post(self.embed_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                RagError::ModelUnavailable(format!(
                    "embedding request to {} failed: {}",
                    self.base_url, e
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RagError::ModelUnavailable(format!("failed to read embedding response: {}", e))
        })?;

        if !status.is_success() {
            return Err(RagError::ModelUnavailable(format!(
                "embedding API returned {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        let parsed: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::ModelUnavailable(format!(
                "unexpected embedding response: {} ({})",
                truncate_body(&body),
                e
            ))
        })?;

        if parsed.embeddings.len() != expected {
            return Err(RagError::ModelUnavailable(format!(
                "embedding API returned {} vectors for {} inputs",
                parsed.embeddings.len(),
                expected
            )));
        }

        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.request_embeddings(vec![text.to_string()]).await?;
        embeddings.pop().ok_or_else(|| {
            RagError::ModelUnavailable("embedding API returned no vectors".to_string())
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        tracing::debug!("Embedding batch of {} texts", texts.len());
        self.request_embeddings(texts.to_vec()).await
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// 에러 메시지에 싣는 응답 본문 길이 제한
fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}

// ============================================================================
// Tests
// ============================================================================
