//! OOXML 텍스트 추출 (DOCX / XLSX / PPTX)
//!
//! OOXML 문서는 XML 파트를 담은 zip 컨테이너입니다.
//! 전체 스키마를 파싱하는 대신 텍스트 런만 정규식으로 수집합니다.
//! 서식, 수식, 임베드 객체는 무시됩니다.

use std::io::{Cursor, Read};

use regex::Regex;
use zip::ZipArchive;

use crate::error::{RagError, Result};
use crate::extractor::{ExtractedDocument, Metadata};

// ============================================================================
// Container Helpers
// ============================================================================

fn open_archive(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| RagError::Extraction(format!("not a valid OOXML container: {}", e)))
}

/// 컨테이너에서 XML 파트 하나 읽기, 없으면 None
fn read_part(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(RagError::Extraction(format!(
                "failed to open part {}: {}",
                name, e
            )))
        }
    };

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| RagError::Extraction(format!("failed to read part {}: {}", name, e)))?;
    Ok(Some(content))
}

/// XML 엔티티 복원
///
/// &amp;는 이중 복원을 피하려고 마지막에 처리합니다.
fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ============================================================================
// DOCX
// ============================================================================

/// DOCX에서 텍스트 추출
///
/// word/document.xml의 문단(w:p) 단위로 텍스트 런(w:t)을 이어붙입니다.
pub fn extract_docx(bytes: &[u8]) -> Result<ExtractedDocument> {
    let mut archive = open_archive(bytes)?;
    let xml = read_part(&mut archive, "word/document.xml")?
        .ok_or_else(|| RagError::Extraction("word/document.xml missing from DOCX".to_string()))?;

    let paragraphs = extract_paragraphs(&xml);

    let mut metadata = Metadata::new();
    metadata.insert(
        "paragraph_count".to_string(),
        serde_json::Value::from(paragraphs.len() as u64),
    );

    Ok(ExtractedDocument {
        text: paragraphs.join("\n"),
        metadata,
    })
}

fn extract_paragraphs(xml: &str) -> Vec<String> {
    let para_re = Regex::new(r"(?s)<w:p[ >].*?</w:p>").expect("Invalid regex");
    let run_re = Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").expect("Invalid regex");

    let mut paragraphs = Vec::new();
    for para in para_re.find_iter(xml) {
        // 런은 단어 중간에서도 끊기므로 구분자 없이 이어붙인다
        let text: String = run_re
            .captures_iter(para.as_str())
            .map(|c| xml_unescape(&c[1]))
            .collect();
        let text = text.trim().to_string();
        if !text.is_empty() {
            paragraphs.push(text);
        }
    }

    // 문단 매칭이 안 되면 문서 전체에서 런을 긁는다
    if paragraphs.is_empty() {
        let runs: Vec<String> = run_re
            .captures_iter(xml)
            .map(|c| xml_unescape(&c[1]))
            .collect();
        let text = runs.join(" ").trim().to_string();
        if !text.is_empty() {
            paragraphs.push(text);
        }
    }

    paragraphs
}

// ============================================================================
// XLSX
// ============================================================================

/// XLSX에서 텍스트 추출
///
/// 시트별로 행을 순회하며 셀 값을 " | "로 이어 한 줄씩 만듭니다.
/// 공유 문자열(t="s")과 인라인 문자열(t="inlineStr"), 숫자 값을 모두 지원합니다.
pub fn extract_xlsx(bytes: &[u8]) -> Result<ExtractedDocument> {
    let mut archive = open_archive(bytes)?;

    // 공유 문자열 테이블은 없을 수도 있다
    let shared: Vec<String> = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml),
        None => vec![],
    };

    let mut sheet_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|n| n.to_string())
        .collect();
    sheet_names.sort();

    if sheet_names.is_empty() {
        return Err(RagError::Extraction(
            "no worksheets found in XLSX".to_string(),
        ));
    }

    let mut lines = Vec::new();
    for name in &sheet_names {
        if let Some(xml) = read_part(&mut archive, name)? {
            lines.extend(extract_sheet_rows(&xml, &shared));
        }
    }

    let mut metadata = Metadata::new();
    metadata.insert(
        "sheet_count".to_string(),
        serde_json::Value::from(sheet_names.len() as u64),
    );

    Ok(ExtractedDocument {
        text: lines.join("\n"),
        metadata,
    })
}

fn parse_shared_strings(xml: &str) -> Vec<String> {
    let si_re = Regex::new(r"(?s)<si>(.*?)</si>").expect("Invalid regex");
    let t_re = Regex::new(r"(?s)<t(?:\s[^>]*)?>(.*?)</t>").expect("Invalid regex");

    si_re
        .captures_iter(xml)
        .map(|si| {
            t_re.captures_iter(&si[1])
                .map(|t| xml_unescape(&t[1]))
                .collect::<String>()
        })
        .collect()
}

fn extract_sheet_rows(xml: &str, shared: &[String]) -> Vec<String> {
    // 속성 그룹에서 /를 제외해 자기닫힘 셀(<c r="A1"/>)이 다음 셀을 삼키지 않게 한다
    let row_re = Regex::new(r"(?s)<row[^>/]*>(.*?)</row>").expect("Invalid regex");
    let cell_re = Regex::new(r"(?s)<c([^>/]*)>(.*?)</c>").expect("Invalid regex");
    let value_re = Regex::new(r"(?s)<v>(.*?)</v>").expect("Invalid regex");
    let inline_re = Regex::new(r"(?s)<t(?:\s[^>]*)?>(.*?)</t>").expect("Invalid regex");

    let mut lines = Vec::new();
    for row in row_re.captures_iter(xml) {
        let mut cells = Vec::new();
        for cell in cell_re.captures_iter(&row[1]) {
            let attrs = &cell[1];
            let body = &cell[2];

            let value = if attrs.contains(r#"t="s""#) {
                // 공유 문자열 인덱스 참조
                value_re
                    .captures(body)
                    .and_then(|v| v[1].trim().parse::<usize>().ok())
                    .and_then(|i| shared.get(i))
                    .cloned()
            } else if attrs.contains(r#"t="inlineStr""#) {
                inline_re.captures(body).map(|t| xml_unescape(&t[1]))
            } else {
                value_re.captures(body).map(|v| xml_unescape(&v[1]))
            };

            if let Some(v) = value {
                let v = v.trim().to_string();
                if !v.is_empty() {
                    cells.push(v);
                }
            }
        }
        if !cells.is_empty() {
            lines.push(cells.join(" | "));
        }
    }
    lines
}

// ============================================================================
// PPTX
// ============================================================================

/// PPTX에서 텍스트 추출
///
/// 슬라이드를 번호순으로 정렬해 텍스트 런(a:t)을 수집합니다.
/// 슬라이드 하나가 한 문단이 됩니다.
pub fn extract_pptx(bytes: &[u8]) -> Result<ExtractedDocument> {
    let mut archive = open_archive(bytes)?;

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|n| n.to_string())
        .collect();
    // slide10이 slide2보다 뒤에 오도록 번호로 정렬
    slide_names.sort_by_key(|n| slide_number(n));

    if slide_names.is_empty() {
        return Err(RagError::Extraction("no slides found in PPTX".to_string()));
    }

    let text_re = Regex::new(r"(?s)<a:t(?:\s[^>]*)?>(.*?)</a:t>").expect("Invalid regex");

    let mut slides = Vec::new();
    for name in &slide_names {
        if let Some(xml) = read_part(&mut archive, name)? {
            let runs: Vec<String> = text_re
                .captures_iter(&xml)
                .map(|c| xml_unescape(&c[1]))
                .filter(|t| !t.trim().is_empty())
                .collect();
            if !runs.is_empty() {
                slides.push(runs.join(" "));
            }
        }
    }

    let mut metadata = Metadata::new();
    metadata.insert(
        "slide_count".to_string(),
        serde_json::Value::from(slide_names.len() as u64),
    );

    Ok(ExtractedDocument {
        text: slides.join("\n\n"),
        metadata,
    })
}

/// "ppt/slides/slide12.xml" -> 12
fn slide_number(name: &str) -> usize {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(0)
}

// ============================================================================
// Tests
// ============================================================================
