//! 벡터 인덱스 모듈
//!
//! - Store: rusqlite 영속화 + 메모리 미러 전수 탐색
//! - Retriever: 쿼리 임베딩 + 인덱스 검색

mod retriever;
mod store;

// Re-exports
pub use retriever::Retriever;
pub use store::{
    cosine_similarity, DistanceMetric, IndexEntry, IndexStats, SearchResult, VectorIndex,
};
