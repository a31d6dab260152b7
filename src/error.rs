//! 에러 타입 정의
//!
//! 파이프라인 전체에서 사용하는 에러 열거형입니다.
//! 복구 가능 여부 판단은 호출자의 몫이며, 코어는 자동 재시도를 하지 않습니다.

use thiserror::Error;

/// 파이프라인 공용 Result 타입
pub type Result<T> = std::result::Result<T, RagError>;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 등록되지 않은 문서 형식
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// 손상되었거나 형식과 맞지 않는 문서 바이트
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// 잘못된 설정 조합
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// 벡터 차원 불일치
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// 잘못된 호출 인자
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 임베딩 백엔드 접근 불가
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// 생성 백엔드 실패
    #[error("generation backend error: {0}")]
    GenerationBackend(String),

    /// SQLite 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// 파일 I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 메타데이터 직렬화 에러
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// 저장된 인덱스 데이터 손상
    #[error("corrupt index data: {0}")]
    CorruptData(String),

    /// blocking 태스크 join 실패
    #[error("blocking task failed: {0}")]
    TaskJoin(String),

    /// 락 poisoning
    #[error("lock poisoned: {0}")]
    Lock(String),
}

// ============================================================================
// Tests
// ============================================================================
