//! docqa-rag - 문서 질의응답 RAG 파이프라인
//!
//! 로컬 문서를 추출·청킹·임베딩해 SQLite 벡터 인덱스에 넣고,
//! 질문을 받으면 검색된 청크를 근거로 Ollama가 답변을 생성합니다.

pub mod chunker;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod index;
pub mod pipeline;

// Re-exports
pub use chunker::{Chunk, ChunkConfig, Chunker};
pub use collector::{CollectedFile, CollectionStats, CollectorConfig, FileCollector};
pub use config::RagConfig;
pub use embedding::{EmbeddingProvider, OllamaEmbedding};
pub use error::{RagError, Result};
pub use extractor::{extract, DocumentFormat, ExtractedDocument, Metadata};
pub use generator::{AnswerGenerator, AnswerStream, OllamaGenerator, NO_CONTEXT_ANSWER};
pub use index::{
    cosine_similarity, DistanceMetric, IndexEntry, IndexStats, Retriever, SearchResult,
    VectorIndex,
};
pub use pipeline::{IngestReport, QueryResponse, RagPipeline, StreamingQuery};
