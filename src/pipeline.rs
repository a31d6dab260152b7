//! RAG Pipeline - 인제스트와 질의의 조정자
//!
//! 추출 → 청킹 → 임베딩 → 인덱싱(인제스트), 검색 → 생성(질의)을 잇습니다.
//! 구성 요소는 생성 시점에 주입되며, 테스트는 가짜 구현을 꽂아 네트워크 없이 돕니다.
//! 질의는 인덱스를 절대 변경하지 않습니다.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::chunker::{Chunk, Chunker};
use crate::config::RagConfig;
use crate::embedding::{EmbeddingProvider, OllamaEmbedding};
use crate::error::{RagError, Result};
use crate::extractor::{self, DocumentFormat};
use crate::generator::{AnswerGenerator, AnswerStream, OllamaGenerator};
use crate::index::{IndexStats, Retriever, SearchResult, VectorIndex};

// ============================================================================
// Types
// ============================================================================

/// 인제스트 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// 인제스트된 문서 (파일명)
    pub source: String,
    /// 인덱스에 추가된 청크 수
    pub chunks_added: usize,
}

/// 질의 응답
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    /// 생성된 답변
    pub answer: String,
    /// 답변의 근거가 된 검색 결과 (순위순)
    pub results: Vec<SearchResult>,
}

/// 스트리밍 질의 응답
///
/// 검색 결과는 즉시, 답변은 프래그먼트 스트림으로 도착합니다.
/// answer를 drop하면 백엔드 생성도 중단됩니다.
pub struct StreamingQuery {
    pub results: Vec<SearchResult>,
    pub answer: AnswerStream,
}

// ============================================================================
// RagPipeline
// ============================================================================

/// 문서 질의응답 파이프라인
pub struct RagPipeline {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    retriever: Retriever,
    generator: Arc<dyn AnswerGenerator>,
}

impl RagPipeline {
    /// 설정으로 Ollama 기반 파이프라인 구성
    pub fn new(config: &RagConfig) -> Result<Self> {
        config.validate()?;

        let chunker = Chunker::new(config.chunk_config())?;
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OllamaEmbedding::new(config)?);
        let generator: Arc<dyn AnswerGenerator> = Arc::new(OllamaGenerator::new(config)?);
        let index = Arc::new(VectorIndex::open(
            &config.index_path(),
            config.metric,
            &config.embedding_model,
        )?);

        Ok(Self::with_components(chunker, embedder, index, generator))
    }

    /// 구성 요소를 직접 주입해 파이프라인 구성
    pub fn with_components(
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        let retriever = Retriever::new(embedder.clone(), index.clone());
        Self {
            chunker,
            embedder,
            index,
            retriever,
            generator,
        }
    }

    /// 문서 바이트를 추출·청킹·임베딩해 인덱스에 추가
    ///
    /// 어느 단계에서 실패하든 인덱스는 변경되지 않습니다 (add가 원자적).
    /// 추출 결과가 비어있으면 0 청크로 성공합니다.
    pub async fn ingest(
        &self,
        filename: &str,
        format: DocumentFormat,
        bytes: Vec<u8>,
    ) -> Result<IngestReport> {
        let source = filename.to_string();
        let chunker = self.chunker.clone();
        let chunk_source = source.clone();

        // 추출과 청킹은 CPU 작업이라 blocking 풀로 보낸다
        let chunks = tokio::task::spawn_blocking(move || -> Result<Vec<Chunk>> {
            let document = extractor::extract(format, &bytes)?;
            let mut chunks = chunker.chunk(&document.text, &chunk_source);

            // 문서 메타데이터를 청크에 병합, 청크 키가 우선
            for chunk in &mut chunks {
                for (key, value) in &document.metadata {
                    if !chunk.metadata.contains_key(key) {
                        chunk.metadata.insert(key.clone(), value.clone());
                    }
                }
            }
            Ok(chunks)
        })
        .await
        .map_err(|e| RagError::TaskJoin(e.to_string()))??;

        if chunks.is_empty() {
            tracing::warn!("No text extracted from {}, nothing to index", source);
            return Ok(IngestReport {
                source,
                chunks_added: 0,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        let added = self.index.add(&chunks, &embeddings)?;

        tracing::info!("Ingested {} ({} chunks)", source, added);
        Ok(IngestReport {
            source,
            chunks_added: added,
        })
    }

    /// 파일 경로로 인제스트 (형식은 확장자로 판별)
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let format = extractor::format_for_path(path)?;
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        self.ingest(&filename, format, bytes).await
    }

    /// 질의: 검색 후 답변 생성
    pub async fn query(&self, question: &str, top_k: usize) -> Result<QueryResponse> {
        let results = self.retriever.retrieve(question, top_k).await?;
        let answer = self.generator.generate(question, &results).await?;
        Ok(QueryResponse { answer, results })
    }

    /// 질의: 검색 후 답변을 스트림으로 생성
    pub async fn query_stream(&self, question: &str, top_k: usize) -> Result<StreamingQuery> {
        let results = self.retriever.retrieve(question, top_k).await?;
        let answer = self.generator.generate_stream(question, &results).await?;
        Ok(StreamingQuery { results, answer })
    }

    /// 인덱스 통계
    pub fn stats(&self) -> Result<IndexStats> {
        self.index.stats()
    }

    /// 인덱스 전체 삭제
    pub fn clear(&self) -> Result<()> {
        self.index.clear()
    }

    /// 내부 인덱스 접근 (검사용)
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkConfig;
    use crate::generator::NO_CONTEXT_ANSWER;
    use crate::index::DistanceMetric;
    use async_trait::async_trait;
    use futures::StreamExt;
    use tempfile::TempDir;

    /// 텍스트 길이 기반 결정적 임베딩
    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.chars().count() as f32, 1.0, 0.0])
        }

        fn name(&self) -> &str {
            "fake-embed"
        }
    }

    struct FakeGenerator;

    #[async_trait]
    impl AnswerGenerator for FakeGenerator {
        async fn generate(&self, _query: &str, passages: &[SearchResult]) -> Result<String> {
            if passages.is_empty() {
                return Ok(NO_CONTEXT_ANSWER.to_string());
            }
            Ok(format!("answer from {} passages", passages.len()))
        }

        async fn generate_stream(
            &self,
            query: &str,
            passages: &[SearchResult],
        ) -> Result<AnswerStream> {
            let answer = self.generate(query, passages).await?;
            let fragments: Vec<Result<String>> = answer
                .split_inclusive(' ')
                .map(|w| Ok(w.to_string()))
                .collect();
            Ok(Box::pin(futures::stream::iter(fragments)))
        }

        fn name(&self) -> &str {
            "fake-gen"
        }
    }

    fn test_pipeline(dir: &TempDir) -> RagPipeline {
        let index = Arc::new(
            VectorIndex::open(
                &dir.path().join("index.db"),
                DistanceMetric::Cosine,
                "fake-embed",
            )
            .unwrap(),
        );
        let chunker = Chunker::new(ChunkConfig::default()).unwrap();
        RagPipeline::with_components(chunker, Arc::new(FakeEmbedder), index, Arc::new(FakeGenerator))
    }

    #[tokio::test]
    async fn test_ingest_and_query() {
        let dir = TempDir::new().unwrap();
        let pipeline = test_pipeline(&dir);

        let report = pipeline
            .ingest(
                "notes.txt",
                DocumentFormat::Text,
                b"rust is a systems programming language".to_vec(),
            )
            .await
            .unwrap();
        assert_eq!(report.chunks_added, 1);
        assert_eq!(report.source, "notes.txt");

        let response = pipeline.query("what is rust", 3).await.unwrap();
        assert_eq!(response.answer, "answer from 1 passages");
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].source, "notes.txt");
    }

    #[tokio::test]
    async fn test_query_empty_index_returns_fixed_answer() {
        let dir = TempDir::new().unwrap();
        let pipeline = test_pipeline(&dir);

        let response = pipeline.query("anything", 5).await.unwrap();
        assert_eq!(response.answer, NO_CONTEXT_ANSWER);
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn test_query_zero_top_k_rejected() {
        let dir = TempDir::new().unwrap();
        let pipeline = test_pipeline(&dir);

        let err = pipeline.query("anything", 0).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_ingest_failure_leaves_index_unchanged() {
        let dir = TempDir::new().unwrap();
        let pipeline = test_pipeline(&dir);

        let err = pipeline
            .ingest("bad.pdf", DocumentFormat::Pdf, b"not a pdf".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
        assert_eq!(pipeline.stats().unwrap().total_entries, 0);
    }

    #[tokio::test]
    async fn test_ingest_empty_document_adds_nothing() {
        let dir = TempDir::new().unwrap();
        let pipeline = test_pipeline(&dir);

        let report = pipeline
            .ingest("empty.txt", DocumentFormat::Text, b"   \n  ".to_vec())
            .await
            .unwrap();
        assert_eq!(report.chunks_added, 0);
        assert_eq!(pipeline.stats().unwrap().total_entries, 0);
    }

    #[tokio::test]
    async fn test_query_stream_fragments_concatenate() {
        let dir = TempDir::new().unwrap();
        let pipeline = test_pipeline(&dir);

        pipeline
            .ingest("doc.txt", DocumentFormat::Text, b"streaming test body".to_vec())
            .await
            .unwrap();

        let mut streaming = pipeline.query_stream("question", 3).await.unwrap();
        assert_eq!(streaming.results.len(), 1);

        let mut answer = String::new();
        while let Some(fragment) = streaming.answer.next().await {
            answer.push_str(&fragment.unwrap());
        }
        assert_eq!(answer, "answer from 1 passages");
    }

    #[tokio::test]
    async fn test_document_metadata_merged_into_chunks() {
        let dir = TempDir::new().unwrap();
        let pipeline = test_pipeline(&dir);

        pipeline
            .ingest(
                "team.csv",
                DocumentFormat::Csv,
                b"name,role\nAlice,dev\n".to_vec(),
            )
            .await
            .unwrap();

        let response = pipeline.query("who is alice", 1).await.unwrap();
        let metadata = &response.results[0].metadata;
        // 추출기 메타데이터와 청커 오프셋이 함께 실린다
        assert_eq!(metadata.get("record_count"), Some(&serde_json::Value::from(1u64)));
        assert!(metadata.contains_key("start_char"));
    }

    #[tokio::test]
    async fn test_per_document_failure_isolation() {
        let dir = TempDir::new().unwrap();
        let pipeline = test_pipeline(&dir);

        let bad = pipeline
            .ingest("bad.pdf", DocumentFormat::Pdf, b"garbage".to_vec())
            .await;
        assert!(bad.is_err());

        let good = pipeline
            .ingest("good.txt", DocumentFormat::Text, b"usable content".to_vec())
            .await
            .unwrap();
        assert_eq!(good.chunks_added, 1);
        assert_eq!(pipeline.stats().unwrap().total_entries, 1);
    }

    #[tokio::test]
    async fn test_ingest_file_from_disk() {
        let dir = TempDir::new().unwrap();
        let pipeline = test_pipeline(&dir);

        let file_path = dir.path().join("doc.txt");
        std::fs::write(&file_path, "file based ingest").unwrap();

        let report = pipeline.ingest_file(&file_path).await.unwrap();
        assert_eq!(report.source, "doc.txt");
        assert_eq!(report.chunks_added, 1);

        let unsupported = dir.path().join("binary.exe");
        std::fs::write(&unsupported, "x").unwrap();
        let err = pipeline.ingest_file(&unsupported).await.unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat(_)));
    }
}
