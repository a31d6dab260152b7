//! Retriever - 쿼리 임베딩 + 벡터 검색
//!
//! 질의 문자열을 임베딩한 뒤 인덱스에서 상위 k개 청크를 가져옵니다.
//! 빈 인덱스에서는 임베딩 호출 없이 즉시 빈 결과를 반환합니다.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::{SearchResult, VectorIndex};

/// 검색 파이프라인의 조회 단계
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// 질의에 대해 상위 k개 청크 검색
    ///
    /// 검색마다 쿼리를 새로 임베딩합니다 (캐시 없음).
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(RagError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }

        // 빈 인덱스면 임베딩 비용을 아낀다
        if self.index.is_empty() {
            tracing::debug!("Index is empty, skipping query embedding");
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(query).await?;
        let results = self.index.search(&query_embedding, top_k)?;

        tracing::debug!(
            "Retrieved {} results for query ({} chars)",
            results.len(),
            query.len()
        );
        Ok(results)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunk;
    use crate::extractor::Metadata;
    use crate::index::DistanceMetric;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FakeEmbedder {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.vector.clone())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// 호출되면 안 되는 경로 검증용
    struct PanickingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for PanickingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            panic!("embed must not be called for an empty index");
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    fn create_test_index(dir: &TempDir) -> Arc<VectorIndex> {
        Arc::new(
            VectorIndex::open(
                &dir.path().join("index.db"),
                DistanceMetric::Cosine,
                "test-model",
            )
            .unwrap(),
        )
    }

    fn make_chunk(source: &str, chunk_index: usize, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: source.to_string(),
            chunk_index,
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_retrieve_returns_nearest() {
        let dir = TempDir::new().unwrap();
        let index = create_test_index(&dir);
        index
            .add(
                &[
                    make_chunk("a.txt", 0, "about cats"),
                    make_chunk("a.txt", 1, "about dogs"),
                ],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .unwrap();

        let retriever = Retriever::new(
            Arc::new(FakeEmbedder {
                vector: vec![0.0, 1.0],
            }),
            index,
        );

        let results = retriever.retrieve("dogs", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "about dogs");
    }

    #[tokio::test]
    async fn test_retrieve_empty_index_skips_embedding() {
        let dir = TempDir::new().unwrap();
        let index = create_test_index(&dir);

        let retriever = Retriever::new(Arc::new(PanickingEmbedder), index);
        let results = retriever.retrieve("anything", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_zero_top_k_rejected() {
        let dir = TempDir::new().unwrap();
        let index = create_test_index(&dir);

        let retriever = Retriever::new(Arc::new(PanickingEmbedder), index);
        let err = retriever.retrieve("anything", 0).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }
}
