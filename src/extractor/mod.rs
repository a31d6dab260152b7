//! Document Extractor - 파일 형식별 텍스트 추출
//!
//! 바이트 입력을 받아 형식별 추출기로 분기합니다.
//! 모든 추출기는 순수 함수이며 파일시스템을 직접 건드리지 않습니다.
//!
//! - PDF: pdf-extract
//! - DOCX / XLSX / PPTX: OOXML zip 컨테이너에서 XML 파싱
//! - HTML: scraper로 본문 선택 후 텍스트 수집
//! - CSV / JSON: 행·필드 단위 평탄화
//! - TXT / Markdown: UTF-8 검증 후 정리

pub mod html;
pub mod office;
pub mod pdf;
pub mod tabular;

use std::path::Path;

use regex::Regex;

use crate::error::{RagError, Result};

/// 청크와 문서에 붙는 부가 정보
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Document Format
// ============================================================================

/// 지원하는 문서 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Xlsx,
    Pptx,
    Text,
    Markdown,
    Csv,
    Json,
    Html,
}

impl DocumentFormat {
    /// 확장자에서 형식 판별 (대소문자 무시)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "xlsx" => Some(Self::Xlsx),
            "pptx" => Some(Self::Pptx),
            "txt" | "text" | "log" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }

    /// 경로의 확장자에서 형식 판별
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// 출력용 라벨
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
            Self::Xlsx => "XLSX",
            Self::Pptx => "PPTX",
            Self::Text => "TEXT",
            Self::Markdown => "MARKDOWN",
            Self::Csv => "CSV",
            Self::Json => "JSON",
            Self::Html => "HTML",
        }
    }
}

/// 추출 결과
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// 추출된 본문 텍스트
    pub text: String,
    /// 형식별 부가 정보 (page_count, sheet_count 등)
    pub metadata: Metadata,
}

// ============================================================================
// Extraction Entry Points
// ============================================================================

/// 경로에서 형식 판별, 미지원이면 에러
pub fn format_for_path(path: &Path) -> Result<DocumentFormat> {
    DocumentFormat::from_path(path)
        .ok_or_else(|| RagError::UnsupportedFormat(path.display().to_string()))
}

/// 형식별 추출기로 분기
pub fn extract(format: DocumentFormat, bytes: &[u8]) -> Result<ExtractedDocument> {
    match format {
        DocumentFormat::Pdf => pdf::extract_pdf(bytes),
        DocumentFormat::Docx => office::extract_docx(bytes),
        DocumentFormat::Xlsx => office::extract_xlsx(bytes),
        DocumentFormat::Pptx => office::extract_pptx(bytes),
        DocumentFormat::Text => extract_plain_text(bytes),
        DocumentFormat::Markdown => extract_markdown(bytes),
        DocumentFormat::Csv => tabular::extract_csv(bytes),
        DocumentFormat::Json => tabular::extract_json(bytes),
        DocumentFormat::Html => html::extract_html(bytes),
    }
}

/// 일반 텍스트 추출
///
/// UTF-8이 아니면 손실 변환 대신 에러를 반환합니다.
fn extract_plain_text(bytes: &[u8]) -> Result<ExtractedDocument> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| RagError::Extraction(format!("text file is not valid UTF-8: {}", e)))?;

    Ok(ExtractedDocument {
        text: text.to_string(),
        metadata: Metadata::new(),
    })
}

/// 마크다운 추출
///
/// 서식 기호를 걷어내고 본문만 남깁니다. 코드 블록 내용은 유지됩니다.
fn extract_markdown(bytes: &[u8]) -> Result<ExtractedDocument> {
    let raw = std::str::from_utf8(bytes)
        .map_err(|e| RagError::Extraction(format!("markdown file is not valid UTF-8: {}", e)))?;

    Ok(ExtractedDocument {
        text: strip_markdown(raw),
        metadata: Metadata::new(),
    })
}

/// 마크다운 서식 제거
fn strip_markdown(text: &str) -> String {
    let code_fence_re = Regex::new(r"(?m)^```[^\n]*$").expect("Invalid regex");
    let heading_re = Regex::new(r"(?m)^#{1,6}\s+").expect("Invalid regex");
    let link_re = Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("Invalid regex");
    let bold_re = Regex::new(r"\*\*([^*]+)\*\*").expect("Invalid regex");
    let italic_re = Regex::new(r"\*([^*]+)\*").expect("Invalid regex");
    let blank_re = Regex::new(r"\n{3,}").expect("Invalid regex");

    let text = code_fence_re.replace_all(text, "");
    let text = heading_re.replace_all(&text, "");
    let text = link_re.replace_all(&text, "$1");
    let text = bold_re.replace_all(&text, "$1");
    let text = italic_re.replace_all(&text, "$1");
    let text = text.replace('`', "");
    let text = blank_re.replace_all(&text, "\n\n");

    text.trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================
