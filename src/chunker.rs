//! Text Chunker - 슬라이딩 윈도우 텍스트 분할
//!
//! 추출된 텍스트를 문자 단위 고정 윈도우로 자르고 인접 청크끼리 겹치게 합니다.
//! 윈도우 경계가 단어 중간에 떨어지면 꼬리 구간에서 공백을 찾아 앞으로 당깁니다.
//! 모든 오프셋은 바이트가 아니라 문자(char) 단위입니다.

use serde::Serialize;

use crate::error::{RagError, Result};
use crate::extractor::Metadata;

/// 청킹 파라미터
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    /// 청크 최대 문자 수
    pub max_chars: usize,
    /// 인접 청크 간 겹침 문자 수
    pub overlap_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: 500,
            overlap_chars: 50,
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_chars == 0 {
            return Err(RagError::Configuration(
                "max_chars must be at least 1".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(RagError::Configuration(format!(
                "overlap_chars ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// 문서에서 잘려 나온 청크 하나
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    /// 청크 텍스트 (원문 그대로, 트리밍하지 않음)
    pub text: String,
    /// 출처 문서 (파일명)
    pub source: String,
    /// 문서 내 순번 (0부터 연속)
    pub chunk_index: usize,
    /// 문자 오프셋 등 부가 정보
    pub metadata: Metadata,
}

/// 슬라이딩 윈도우 청커
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 텍스트를 청크 목록으로 분할
    ///
    /// 공백뿐인 윈도우는 건너뛰며, 반환된 청크의 chunk_index는 0부터 연속입니다.
    /// 각 청크의 metadata에 start_char / end_char 오프셋이 기록됩니다.
    pub fn chunk(&self, text: &str, source: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return vec![];
        }

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let max = self.config.max_chars;
        let overlap = self.config.overlap_chars;
        // 경계 보정으로 물러날 수 있는 최대 거리
        let margin = max * 15 / 100;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut chunk_index = 0usize;

        loop {
            let hard_end = (start + max).min(total);
            let mut end = hard_end;

            // 윈도우 끝이 단어 중간이면 꼬리 구간에서 마지막 공백을 찾는다
            if hard_end < total
                && !chars[hard_end].is_whitespace()
                && !chars[hard_end - 1].is_whitespace()
            {
                let floor = hard_end.saturating_sub(margin);
                if let Some(ws) = (floor..hard_end).rev().find(|&i| chars[i].is_whitespace()) {
                    let candidate = ws + 1;
                    // 당긴 경계가 겹침 구간 안으로 들어오면 진행이 멈추므로 포기
                    if candidate > start + overlap {
                        end = candidate;
                    }
                }
            }

            let window = &chars[start..end];
            if window.iter().any(|c| !c.is_whitespace()) {
                let mut metadata = Metadata::new();
                metadata.insert(
                    "start_char".to_string(),
                    serde_json::Value::from(start as u64),
                );
                metadata.insert("end_char".to_string(), serde_json::Value::from(end as u64));

                chunks.push(Chunk {
                    text: window.iter().collect(),
                    source: source.to_string(),
                    chunk_index,
                    metadata,
                });
                chunk_index += 1;
            }

            if end >= total {
                break;
            }
            start = end - overlap;
        }

        chunks
    }
}

// ============================================================================
// Tests
// ============================================================================
