//! PDF 텍스트 추출
//!
//! pdf-extract 크레이트를 사용하여 PDF 바이트에서 텍스트를 추출합니다.
//! 스캔본처럼 텍스트 레이어가 없는 PDF는 빈 본문으로 처리됩니다.

use crate::error::{RagError, Result};
use crate::extractor::{ExtractedDocument, Metadata};

/// PDF에서 텍스트 추출
pub fn extract_pdf(bytes: &[u8]) -> Result<ExtractedDocument> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RagError::Extraction(format!("failed to extract text from PDF: {}", e)))?;

    if text.trim().is_empty() {
        tracing::warn!("No text layer found in PDF. It might be a scanned document.");
    }

    let mut metadata = Metadata::new();
    metadata.insert(
        "page_count".to_string(),
        serde_json::Value::from(count_pdf_pages(&text) as u64),
    );

    Ok(ExtractedDocument { text, metadata })
}

/// 폼피드 문자로 페이지 수 추정
///
/// pdf-extract는 페이지 경계를 \x0c로 구분합니다. 구분자가 없으면 1페이지로 봅니다.
fn count_pdf_pages(text: &str) -> usize {
    text.split('\x0c')
        .filter(|page| !page.trim().is_empty())
        .count()
        .max(1)
}

// ============================================================================
// Tests
// ============================================================================
