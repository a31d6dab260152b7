//! Configuration - 환경변수 기반 파이프라인 설정
//!
//! 모든 설정은 프로세스 시작 시점에 한 번 읽히고 검증됩니다.
//! 잘못된 값은 기본값으로 대체하지 않고 즉시 에러를 반환합니다.

use std::path::PathBuf;
use std::str::FromStr;

use crate::chunker::ChunkConfig;
use crate::error::{RagError, Result};
use crate::index::DistanceMetric;

/// 기본 임베딩 모델
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
/// 기본 생성 모델
pub const DEFAULT_GENERATION_MODEL: &str = "mistral";
/// 기본 Ollama 엔드포인트
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// 파이프라인 전역 설정
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// 인덱스 파일이 놓이는 디렉토리
    pub data_dir: PathBuf,
    /// 임베딩 모델 이름
    pub embedding_model: String,
    /// 답변 생성 모델 이름
    pub generation_model: String,
    /// Ollama 서버 주소
    pub ollama_base_url: String,
    /// 청크 최대 문자 수
    pub chunk_size: usize,
    /// 인접 청크 간 겹침 문자 수
    pub chunk_overlap: usize,
    /// 검색 결과 기본 개수
    pub top_k: usize,
    /// 프롬프트 컨텍스트 문자 예산
    pub max_context_chars: usize,
    /// HTTP 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 거리 측정 방식
    pub metric: DistanceMetric,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 5,
            max_context_chars: 4000,
            request_timeout_secs: 120,
            metric: DistanceMetric::Cosine,
        }
    }
}

impl RagConfig {
    /// 환경변수에서 설정 로드
    ///
    /// 지원 변수:
    /// - `DATA_DIR`: 인덱스 저장 위치
    /// - `EMBEDDING_MODEL`: 임베딩 모델 이름
    /// - `GENERATION_MODEL` (또는 `OLLAMA_MODEL`): 생성 모델 이름
    /// - `OLLAMA_BASE_URL`: Ollama 서버 주소
    /// - `CHUNK_SIZE` / `CHUNK_OVERLAP`: 청킹 파라미터
    /// - `TOP_K` / `MAX_CONTEXT_CHARS`: 검색 파라미터
    /// - `REQUEST_TIMEOUT_SECS`: HTTP 타임아웃
    /// - `DISTANCE_METRIC`: "cosine" 또는 "l2"
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let metric = match non_empty_env("DISTANCE_METRIC") {
            Some(v) => DistanceMetric::parse(&v).ok_or_else(|| {
                RagError::Configuration(format!(
                    "DISTANCE_METRIC must be 'cosine' or 'l2' (got '{}')",
                    v
                ))
            })?,
            None => defaults.metric,
        };

        let config = Self {
            data_dir: non_empty_env("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            embedding_model: env_or("EMBEDDING_MODEL", defaults.embedding_model),
            generation_model: non_empty_env("GENERATION_MODEL")
                .or_else(|| non_empty_env("OLLAMA_MODEL"))
                .unwrap_or(defaults.generation_model),
            ollama_base_url: env_or("OLLAMA_BASE_URL", defaults.ollama_base_url),
            chunk_size: env_parse("CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: env_parse("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            top_k: env_parse("TOP_K", defaults.top_k)?,
            max_context_chars: env_parse("MAX_CONTEXT_CHARS", defaults.max_context_chars)?,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            metric,
        };

        config.validate()?;
        Ok(config)
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Configuration(
                "top_k must be at least 1".to_string(),
            ));
        }
        if self.max_context_chars == 0 {
            return Err(RagError::Configuration(
                "max_context_chars must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(RagError::Configuration(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !self.ollama_base_url.starts_with("http://")
            && !self.ollama_base_url.starts_with("https://")
        {
            return Err(RagError::Configuration(format!(
                "ollama_base_url must start with http:// or https:// (got '{}')",
                self.ollama_base_url
            )));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(RagError::Configuration(
                "embedding_model must not be empty".to_string(),
            ));
        }
        if self.generation_model.trim().is_empty() {
            return Err(RagError::Configuration(
                "generation_model must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// 인덱스 DB 파일 경로
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.db")
    }

    /// 청커 설정
    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            max_chars: self.chunk_size,
            overlap_chars: self.chunk_overlap,
        }
    }
}

/// 기본 데이터 디렉토리
///
/// 플랫폼 로컬 데이터 디렉토리 아래 `.docqa-rag`, 없으면 홈, 그마저 없으면 현재 디렉토리.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docqa-rag")
}

// ============================================================================
// Env Helpers
// ============================================================================

/// 공백이 아닌 환경변수 값 조회
fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: String) -> String {
    non_empty_env(name).unwrap_or(default)
}

/// 환경변수를 파싱, 실패하면 폴백 없이 에러
fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T> {
    match non_empty_env(name) {
        Some(v) => v.parse::<T>().map_err(|_| {
            RagError::Configuration(format!("{} has invalid value '{}'", name, v))
        }),
        None => Ok(default),
    }
}

// ============================================================================
// Tests
// ============================================================================
