//! HTML 텍스트 추출
//!
//! scraper로 파싱해 본문 영역을 우선순위대로 고르고 태그를 제거합니다.
//! 스크립트·스타일 노드는 텍스트 수집에서 자연히 빠집니다.

use scraper::{Html, Selector};

use crate::error::Result;
use crate::extractor::{ExtractedDocument, Metadata};

/// HTML에서 본문 텍스트 추출
///
/// `<title>`이 있으면 metadata의 `title` 키로 보존됩니다.
pub fn extract_html(bytes: &[u8]) -> Result<ExtractedDocument> {
    let html = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&html);

    let mut metadata = Metadata::new();
    if let Some(title) = extract_title(&document) {
        metadata.insert("title".to_string(), serde_json::Value::from(title));
    }

    Ok(ExtractedDocument {
        text: extract_content(&document),
        metadata,
    })
}

/// 제목 추출
fn extract_title(document: &Html) -> Option<String> {
    // <title> 태그
    if let Ok(title_selector) = Selector::parse("title") {
        if let Some(element) = document.select(&title_selector).next() {
            let title = element.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                return Some(title);
            }
        }
    }

    // <h1> 태그
    if let Ok(h1_selector) = Selector::parse("h1") {
        if let Some(element) = document.select(&h1_selector).next() {
            let title = element.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                return Some(title);
            }
        }
    }

    None
}

/// 본문 추출 (HTML 태그 제거)
fn extract_content(document: &Html) -> String {
    // 우선순위: article > main > body
    let selectors = [
        "article",
        "main",
        "[role=main]",
        ".content",
        "#content",
        "body",
    ];

    for selector_str in selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let text = extract_text_from_element(&element);
                if text.len() > 100 {
                    return text;
                }
            }
        }
    }

    // 폴백: 전체 body 텍스트
    if let Ok(selector) = Selector::parse("body") {
        if let Some(element) = document.select(&selector).next() {
            return extract_text_from_element(&element);
        }
    }

    String::new()
}

/// 요소에서 텍스트 추출 (스크립트/스타일 제외)
fn extract_text_from_element(element: &scraper::ElementRef) -> String {
    let mut text = String::new();

    for node in element.text() {
        let trimmed = node.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    // 연속 공백 정리
    if let Ok(re) = regex::Regex::new(r"\s+") {
        re.replace_all(&text, " ").trim().to_string()
    } else {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        let html = r#"
            <html>
                <head><title>Test Page Title</title></head>
                <body><h1>Main Heading</h1></body>
            </html>
        "#;
        let document = Html::parse_document(html);
        let title = extract_title(&document);
        assert_eq!(title, Some("Test Page Title".to_string()));
    }

    #[test]
    fn test_extract_title_h1_fallback() {
        let html = r#"
            <html>
                <head><title></title></head>
                <body><h1>H1 Heading</h1></body>
            </html>
        "#;
        let document = Html::parse_document(html);
        let title = extract_title(&document);
        assert_eq!(title, Some("H1 Heading".to_string()));
    }

    #[test]
    fn test_extract_content_from_article() {
        let html = r#"
            <html>
                <body>
                    <nav>Navigation menu</nav>
                    <article>
                        This is the main article content.
                        It should be extracted as the primary content.
                        More text to ensure it's over 100 characters.
                    </article>
                    <footer>Footer content</footer>
                </body>
            </html>
        "#;
        let document = Html::parse_document(html);
        let content = extract_content(&document);
        assert!(content.contains("main article content"));
        assert!(!content.contains("Navigation menu"));
        assert!(!content.contains("Footer content"));
    }

    #[test]
    fn test_extract_html_document() {
        let html = r#"
            <html>
                <head><title>Release Notes</title><script>var x = 1;</script></head>
                <body><p>Version  2.0   adds streaming.</p></body>
            </html>
        "#;
        let doc = extract_html(html.as_bytes()).unwrap();
        assert_eq!(doc.text, "Version 2.0 adds streaming.");
        assert_eq!(
            doc.metadata.get("title"),
            Some(&serde_json::Value::from("Release Notes"))
        );
        assert!(!doc.text.contains("var x"));
    }

    #[test]
    fn test_extract_html_empty_body() {
        let doc = extract_html(b"<html><body></body></html>").unwrap();
        assert!(doc.text.is_empty());
        assert!(doc.metadata.get("title").is_none());
    }
}
