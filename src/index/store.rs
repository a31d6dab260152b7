//! Vector Index - rusqlite 기반 영속 벡터 인덱스
//!
//! 임베딩 벡터를 SQLite 파일 하나에 저장하고, 메모리 미러에서 전수 탐색합니다.
//! 쓰기는 단일 트랜잭션으로 커밋된 뒤에만 미러에 반영됩니다 (write-through).
//! 차원은 첫 삽입에서 고정되고 clear로만 초기화됩니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;

use crate::chunker::Chunk;
use crate::error::{RagError, Result};
use crate::extractor::Metadata;

/// 인덱스 스키마
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS index_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entries (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    source      TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    text        TEXT NOT NULL,
    metadata    TEXT NOT NULL,
    embedding   BLOB NOT NULL,
    created_at  TEXT NOT NULL
);
"#;

// ============================================================================
// Types
// ============================================================================

/// 거리 측정 방식
///
/// 인덱스 생성 시점에 고정되며 파일에 기록됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    /// 코사인 유사도 (기본값)
    Cosine,
    /// 유클리드 거리
    L2,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::Cosine
    }
}

impl DistanceMetric {
    /// 문자열 태그 파싱 ("cosine" / "l2")
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Some(Self::Cosine),
            "l2" | "euclidean" => Some(Self::L2),
            _ => None,
        }
    }

    /// 저장용 태그
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
        }
    }
}

/// 인덱스 엔트리
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// 삽입 순번 (SQLite rowid)
    pub seq: i64,
    /// 출처 문서 (파일명)
    pub source: String,
    /// 문서 내 청크 순번
    pub chunk_index: usize,
    /// 청크 텍스트
    pub text: String,
    /// 청크 메타데이터
    pub metadata: Metadata,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
    /// 인제스트 시각
    pub created_at: DateTime<Utc>,
}

/// 검색 결과
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// 청크 텍스트
    pub text: String,
    /// 출처 문서
    pub source: String,
    /// 문서 내 청크 순번
    pub chunk_index: usize,
    /// 청크 메타데이터
    pub metadata: Metadata,
    /// 유사도 스코어 (높을수록 가까움)
    pub score: f32,
}

/// 인덱스 통계
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    /// 저장된 엔트리 수
    pub total_entries: usize,
    /// 고정된 임베딩 차원 (비어있으면 0)
    pub embedding_dimension: usize,
    /// 임베딩 모델 이름
    pub model_name: String,
}

/// 메모리 미러 상태
struct IndexState {
    entries: Vec<IndexEntry>,
    dimension: Option<usize>,
}

// ============================================================================
// VectorIndex
// ============================================================================

/// 영속 벡터 인덱스
///
/// 단일 쓰기 / 다중 읽기 규칙을 RwLock으로 강제합니다.
/// `add`와 `clear`는 쓰기 락, `search`와 `stats`는 읽기 락을 잡습니다.
pub struct VectorIndex {
    conn: Arc<Mutex<Connection>>,
    state: RwLock<IndexState>,
    metric: DistanceMetric,
    model_name: String,
    db_path: PathBuf,
}

impl VectorIndex {
    /// 인덱스 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - SQLite 파일 경로
    /// * `metric` - 거리 측정 방식 (기존 인덱스와 다르면 에러)
    /// * `model_name` - 통계에 보고할 임베딩 모델 이름
    pub fn open(path: &Path, metric: DistanceMetric, model_name: &str) -> Result<Self> {
        // 부모 디렉토리 생성
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(SCHEMA_SQL)?;

        // 거리 측정 방식은 인덱스 생성 시점에 고정된다
        match read_meta(&conn, "metric")? {
            Some(stored) => {
                let stored_metric = DistanceMetric::parse(&stored).ok_or_else(|| {
                    RagError::CorruptData(format!("unknown stored metric: {}", stored))
                })?;
                if stored_metric != metric {
                    return Err(RagError::Configuration(format!(
                        "index at {:?} was created with metric '{}' (requested '{}')",
                        path,
                        stored_metric.as_str(),
                        metric.as_str()
                    )));
                }
            }
            None => {
                conn.execute(
                    "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('metric', ?1)",
                    params![metric.as_str()],
                )?;
            }
        }

        let state = load_state(&conn)?;
        tracing::debug!(
            "Vector index opened at {:?} ({} entries)",
            path,
            state.entries.len()
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            state: RwLock::new(state),
            metric,
            model_name: model_name.to_string(),
            db_path: path.to_path_buf(),
        })
    }

    /// DB 파일 경로
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 거리 측정 방식
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// 엔트리 수
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    /// 인덱스가 비어있는지
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 청크 배치 추가
    ///
    /// 검증을 모두 통과한 뒤에만 쓰기가 시작됩니다 (전량 아니면 전무).
    /// 첫 삽입이 인덱스 차원을 고정합니다.
    ///
    /// # Returns
    /// 추가된 엔트리 수
    pub fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::InvalidArgument(format!(
                "chunk count ({}) does not match embedding count ({})",
                chunks.len(),
                embeddings.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut state = self
            .state
            .write()
            .map_err(|e| RagError::Lock(e.to_string()))?;

        // 차원 검증 (쓰기 전에 전부 확인)
        let dimension = state.dimension.unwrap_or(embeddings[0].len());
        if dimension == 0 {
            return Err(RagError::InvalidArgument(
                "embedding vectors must not be empty".to_string(),
            ));
        }
        for (i, embedding) in embeddings.iter().enumerate() {
            if embedding.len() != dimension {
                return Err(RagError::DimensionMismatch(format!(
                    "embedding {} has dimension {} (index dimension is {})",
                    i,
                    embedding.len(),
                    dimension
                )));
            }
        }

        let is_first_insert = state.dimension.is_none();
        let now = Utc::now();

        let mut conn = self.conn.lock().map_err(|e| RagError::Lock(e.to_string()))?;
        let tx = conn.transaction()?;

        let mut new_entries = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            tx.execute(
                "INSERT INTO entries (source, chunk_index, text, metadata, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    chunk.source,
                    chunk.chunk_index as i64,
                    chunk.text,
                    metadata_json,
                    encode_embedding(embedding),
                    now.to_rfc3339(),
                ],
            )?;

            new_entries.push(IndexEntry {
                seq: tx.last_insert_rowid(),
                source: chunk.source.clone(),
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                embedding: embedding.clone(),
                created_at: now,
            });
        }

        if is_first_insert {
            tx.execute(
                "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('dimension', ?1)",
                params![dimension.to_string()],
            )?;
        }

        tx.commit()?;
        drop(conn);

        // 커밋 이후에만 미러 반영
        state.entries.extend(new_entries);
        state.dimension = Some(dimension);

        tracing::info!(
            "Added {} entries to index (dimension={})",
            chunks.len(),
            dimension
        );
        Ok(chunks.len())
    }

    /// 벡터 검색
    ///
    /// 전수 탐색으로 스코어를 계산하고 내림차순 정렬합니다.
    /// 동률은 삽입 순서로 결정됩니다.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(RagError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }

        let state = self.state.read().map_err(|e| RagError::Lock(e.to_string()))?;

        if state.entries.is_empty() {
            return Ok(vec![]);
        }

        let dimension = state.dimension.unwrap_or(0);
        if query.len() != dimension {
            return Err(RagError::DimensionMismatch(format!(
                "query has dimension {} (index dimension is {})",
                query.len(),
                dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = state
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let score = match self.metric {
                    DistanceMetric::Cosine => cosine_similarity(query, &entry.embedding),
                    DistanceMetric::L2 => 1.0 / (1.0 + l2_distance(query, &entry.embedding)),
                };
                (i, score)
            })
            .collect();

        // 안정 정렬이므로 동률은 삽입 순서를 유지한다
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        let results = scored
            .into_iter()
            .map(|(i, score)| {
                let entry = &state.entries[i];
                SearchResult {
                    text: entry.text.clone(),
                    source: entry.source.clone(),
                    chunk_index: entry.chunk_index,
                    metadata: entry.metadata.clone(),
                    score,
                }
            })
            .collect();

        Ok(results)
    }

    /// 인덱스 통계
    pub fn stats(&self) -> Result<IndexStats> {
        let state = self.state.read().map_err(|e| RagError::Lock(e.to_string()))?;
        Ok(IndexStats {
            total_entries: state.entries.len(),
            embedding_dimension: state.dimension.unwrap_or(0),
            model_name: self.model_name.clone(),
        })
    }

    /// 인덱스 전체 삭제
    ///
    /// 엔트리와 차원을 모두 초기화합니다. 빈 인덱스에 호출해도 성공합니다.
    pub fn clear(&self) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| RagError::Lock(e.to_string()))?;

        let mut conn = self.conn.lock().map_err(|e| RagError::Lock(e.to_string()))?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM entries", [])?;
        tx.execute("DELETE FROM index_meta WHERE key = 'dimension'", [])?;
        tx.commit()?;
        drop(conn);

        let removed = state.entries.len();
        state.entries.clear();
        state.dimension = None;

        tracing::info!("Cleared vector index ({} entries removed)", removed);
        Ok(())
    }
}

// ============================================================================
// Similarity Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// 유클리드 거리 계산
fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = *x as f64 - *y as f64;
        sum += d * d;
    }
    sum.sqrt() as f32
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 임베딩을 little-endian f32 블롭으로 인코딩
fn encode_embedding(values: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(values.len() * 4);
    for v in values {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// 블롭을 임베딩으로 디코딩
fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(RagError::CorruptData(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// 메타 테이블에서 값 조회
fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// 디스크에서 미러 상태 로드
fn load_state(conn: &Connection) -> Result<IndexState> {
    let dimension = match read_meta(conn, "dimension")? {
        Some(v) => Some(v.parse::<usize>().map_err(|e| {
            RagError::CorruptData(format!("invalid dimension metadata: {} ({})", v, e))
        })?),
        None => None,
    };

    let mut stmt = conn.prepare(
        "SELECT seq, source, chunk_index, text, metadata, embedding, created_at
         FROM entries ORDER BY seq",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Vec<u8>>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (seq, source, chunk_index, text, metadata_json, blob, created_at) = row?;
        entries.push(IndexEntry {
            seq,
            source,
            chunk_index: chunk_index as usize,
            text,
            metadata: serde_json::from_str(&metadata_json)?,
            embedding: decode_embedding(&blob)?,
            created_at: parse_datetime(created_at),
        });
    }

    Ok(IndexState { entries, dimension })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================
