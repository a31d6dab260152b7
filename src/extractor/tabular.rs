//! 표 형식 추출 (CSV / JSON)
//!
//! 셀 값만 덜렁 남기면 검색 품질이 나빠지므로,
//! 필드를 "이름: 값" 쌍으로 풀어 헤더/경로 문맥을 텍스트에 남깁니다.

use csv::ReaderBuilder;

use crate::error::{RagError, Result};
use crate::extractor::{ExtractedDocument, Metadata};

// ============================================================================
// CSV
// ============================================================================

/// CSV에서 텍스트 추출
///
/// 첫 행을 헤더로 보고 레코드마다 "헤더: 값" 쌍을 " | "로 이어 한 줄을 만듭니다.
/// 빈 값은 건너뜁니다.
pub fn extract_csv(bytes: &[u8]) -> Result<ExtractedDocument> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| RagError::Extraction(format!("failed to parse CSV header: {}", e)))?
        .clone();

    let mut lines = Vec::new();
    let mut record_count = 0usize;
    for record in reader.records() {
        let record = record
            .map_err(|e| RagError::Extraction(format!("failed to parse CSV record: {}", e)))?;
        record_count += 1;

        let fields: Vec<String> = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(header, value)| format!("{}: {}", header.trim(), value.trim()))
            .collect();
        if !fields.is_empty() {
            lines.push(fields.join(" | "));
        }
    }

    let mut metadata = Metadata::new();
    metadata.insert(
        "record_count".to_string(),
        serde_json::Value::from(record_count as u64),
    );

    Ok(ExtractedDocument {
        text: lines.join("\n"),
        metadata,
    })
}

// ============================================================================
// JSON
// ============================================================================

/// JSON에서 텍스트 추출
///
/// 최상위 배열은 원소마다 한 줄, 그 외에는 전체가 한 줄이 됩니다.
/// 중첩 키는 점 표기("user.name"), 배열 원소는 "[i]" 접미사로 경로를 남깁니다.
pub fn extract_json(bytes: &[u8]) -> Result<ExtractedDocument> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| RagError::Extraction(format!("failed to parse JSON: {}", e)))?;

    let text = match &value {
        serde_json::Value::Array(items) => items
            .iter()
            .map(flatten_value)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => flatten_value(&value),
    };

    Ok(ExtractedDocument {
        text,
        metadata: Metadata::new(),
    })
}

/// JSON 값 하나를 "경로: 값" 쌍들의 한 줄로 평탄화
fn flatten_value(value: &serde_json::Value) -> String {
    let mut parts = Vec::new();
    flatten_into(value, String::new(), &mut parts);
    parts.join(" | ")
}

fn flatten_into(value: &serde_json::Value, path: String, out: &mut Vec<String>) {
    match value {
        // null은 검색에 보탬이 안 되므로 버린다
        serde_json::Value::Null => {}
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                flatten_into(child, child_path, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(child, format!("{}[{}]", path, i), out);
            }
        }
        serde_json::Value::String(s) => {
            if path.is_empty() {
                out.push(s.clone());
            } else {
                out.push(format!("{}: {}", path, s));
            }
        }
        other => {
            if path.is_empty() {
                out.push(other.to_string());
            } else {
                out.push(format!("{}: {}", path, other));
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
