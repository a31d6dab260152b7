//! 답변 생성 모듈 - Ollama generate API
//!
//! 검색된 청크로 번호 달린 컨텍스트를 조립해 프롬프트를 만들고
//! Ollama에 생성을 요청합니다. 검색 결과가 없으면 백엔드 호출 없이
//! 고정 답변을 돌려줍니다.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::index::SearchResult;

/// 검색 결과가 없을 때의 고정 답변
pub const NO_CONTEXT_ANSWER: &str = "No relevant documents found to answer this question.";

/// 프롬프트 지시문
const PROMPT_INSTRUCTION: &str = "Answer the question based on the following context. If the answer cannot be found in the context, say \"I cannot find the answer in the provided documents.\"";

/// 답변 프래그먼트 스트림
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

// ============================================================================
// AnswerGenerator Trait
// ============================================================================

/// 답변 생성기 트레이트
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// 답변 전체를 한 번에 생성
    async fn generate(&self, query: &str, passages: &[SearchResult]) -> Result<String>;

    /// 답변을 프래그먼트 스트림으로 생성
    ///
    /// 반환된 스트림을 drop하면 백엔드 요청도 함께 끊어집니다.
    async fn generate_stream(
        &self,
        query: &str,
        passages: &[SearchResult],
    ) -> Result<AnswerStream>;

    /// 생성기 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Prompt Assembly
// ============================================================================

/// 검색 결과를 번호 달린 컨텍스트로 조립
///
/// 순위 순서대로 "[i] 텍스트" 블록을 빈 줄로 잇습니다. 문자 예산을 넘으면
/// 꼬리 블록을 통째로 버리되, 1위 블록은 예산과 무관하게 유지합니다.
fn build_context(passages: &[SearchResult], max_chars: usize) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut used = 0usize;

    for (i, passage) in passages.iter().enumerate() {
        let block = format!("[{}] {}", i + 1, passage.text);
        let cost = block.chars().count() + if blocks.is_empty() { 0 } else { 2 };

        if !blocks.is_empty() && used + cost > max_chars {
            tracing::debug!(
                "Context budget reached, dropping {} trailing passages",
                passages.len() - i
            );
            break;
        }
        used += cost;
        blocks.push(block);
    }

    blocks.join("\n\n")
}

fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        PROMPT_INSTRUCTION, context, query
    )
}

// ============================================================================
// Ollama Generator
// ============================================================================

/// Ollama 생성 요청
/// source: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-completion
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

/// Ollama 생성 응답 (스트림의 NDJSON 줄 하나와 같은 형태)
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Ollama 답변 생성기
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_context_chars: usize,
}

impl OllamaGenerator {
    pub fn new(config: &RagConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                RagError::Configuration(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.ollama_base_url.trim_end_matches('/').to_string(),
            model: config.generation_model.clone(),
            max_context_chars: config.max_context_chars,
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    async fn send_request(&self, prompt: String, stream: bool) -> Result<reqwest::Response> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt,
            stream,
        };

        let response = self
            .client
            .post(self.generate_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                RagError::GenerationBackend(format!(
                    "generation request to {} failed: {}",
                    self.base_url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(RagError::GenerationBackend(format!(
                "generation API returned {}: {}",
                status, snippet
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn generate(&self, query: &str, passages: &[SearchResult]) -> Result<String> {
        if passages.is_empty() {
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }

        let context = build_context(passages, self.max_context_chars);
        let prompt = build_prompt(query, &context);

        let response = self.send_request(prompt, false).await?;
        let body = response.text().await.map_err(|e| {
            RagError::GenerationBackend(format!("failed to read generation response: {}", e))
        })?;

        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            let snippet: String = body.chars().take(200).collect();
            RagError::GenerationBackend(format!(
                "unexpected generation response: {} ({})",
                snippet, e
            ))
        })?;

        if let Some(error) = parsed.error {
            return Err(RagError::GenerationBackend(error));
        }

        Ok(parsed.response)
    }

    async fn generate_stream(
        &self,
        query: &str,
        passages: &[SearchResult],
    ) -> Result<AnswerStream> {
        if passages.is_empty() {
            let once =
                stream::once(async { Ok::<String, RagError>(NO_CONTEXT_ANSWER.to_string()) });
            return Ok(Box::pin(once));
        }

        let context = build_context(passages, self.max_context_chars);
        let prompt = build_prompt(query, &context);

        let response = self.send_request(prompt, true).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(ndjson_fragments(body))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// NDJSON Stream Parsing
// ============================================================================

struct NdjsonState {
    body: BoxStream<'static, std::result::Result<Vec<u8>, reqwest::Error>>,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
}

/// 스트리밍 응답 본문을 답변 프래그먼트 스트림으로 변환
///
/// Ollama는 줄마다 {"response": "...", "done": false} JSON을 보냅니다.
/// 청크 경계가 멀티바이트 문자 한가운데에 걸릴 수 있으므로 줄이 완성될
/// 때까지 바이트로 모았다가 파싱합니다. done이 찍힌 줄 이후의 입력은
/// 무시됩니다.
fn ndjson_fragments(
    body: BoxStream<'static, std::result::Result<Vec<u8>, reqwest::Error>>,
) -> AnswerStream {
    let state = NdjsonState {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    let fragments = stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Ok(Some((fragment, state)));
            }
            if state.finished {
                return Ok(None);
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    drain_lines(&mut state)?;
                }
                Some(Err(e)) => {
                    return Err(RagError::GenerationBackend(format!(
                        "stream read failed: {}",
                        e
                    )));
                }
                None => {
                    state.finished = true;
                    // 개행 없이 끝난 마지막 줄 처리
                    let tail = std::mem::take(&mut state.buffer);
                    let line = tail.trim_ascii();
                    if !line.is_empty() {
                        push_line(&mut state, line)?;
                    }
                }
            }
        }
    });

    Box::pin(fragments)
}

/// 버퍼에서 완성된 줄들을 꺼내 파싱
///
/// 0x0A는 멀티바이트 UTF-8 시퀀스 안에 나타나지 않으므로 바이트 기준으로
/// 줄을 잘라도 문자가 깨지지 않는다.
fn drain_lines(state: &mut NdjsonState) -> Result<()> {
    while let Some(pos) = state.buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = state.buffer.drain(..=pos).collect();
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }
        push_line(state, trimmed)?;
        if state.finished {
            break;
        }
    }
    Ok(())
}

/// NDJSON 줄 하나를 파싱해 프래그먼트 큐에 싣는다
fn push_line(state: &mut NdjsonState, line: &[u8]) -> Result<()> {
    let parsed: GenerateResponse = serde_json::from_slice(line).map_err(|e| {
        RagError::GenerationBackend(format!(
            "failed to parse stream line: {} ({})",
            String::from_utf8_lossy(line),
            e
        ))
    })?;

    if let Some(error) = parsed.error {
        return Err(RagError::GenerationBackend(error));
    }
    if !parsed.response.is_empty() {
        state.pending.push_back(parsed.response);
    }
    if parsed.done {
        state.finished = true;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Metadata;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn make_passage(text: &str) -> SearchResult {
        SearchResult {
            text: text.to_string(),
            source: "doc.txt".to_string(),
            chunk_index: 0,
            metadata: Metadata::new(),
            score: 0.9,
        }
    }

    fn test_generator() -> OllamaGenerator {
        let mut config = RagConfig::default();
        config.generation_model = "test-gen".to_string();
        // 포트 1은 어떤 환경에서도 리스너가 없다
        config.ollama_base_url = "http://127.0.0.1:1".to_string();
        config.request_timeout_secs = 2;
        OllamaGenerator::new(&config).unwrap()
    }

    fn byte_chunks(
        chunks: Vec<Vec<u8>>,
    ) -> BoxStream<'static, std::result::Result<Vec<u8>, reqwest::Error>> {
        let items: Vec<std::result::Result<Vec<u8>, reqwest::Error>> =
            chunks.into_iter().map(Ok).collect();
        stream::iter(items).boxed()
    }

    /// NDJSON 본문을 지정한 청크 단위로 흘려보내는 1회용 HTTP 서버
    async fn spawn_stream_server(chunks: Vec<Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.set_nodelay(true).unwrap();

            // Content-Length만큼 요청 본문까지 다 읽는다
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..pos]).to_ascii_lowercase();
                    let body_len = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() - (pos + 4) >= body_len {
                        break;
                    }
                }
            }

            let total: usize = chunks.iter().map(|c| c.len()).sum();
            let header = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ncontent-length: {}\r\n\r\n",
                total
            );
            socket.write_all(header.as_bytes()).await.unwrap();
            for chunk in chunks {
                socket.write_all(&chunk).await.unwrap();
                socket.flush().await.unwrap();
                // 청크가 세그먼트 하나로 합쳐지지 않게 간격을 둔다
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        format!("http://{}", addr)
    }

    fn server_generator(base_url: &str) -> OllamaGenerator {
        let mut config = RagConfig::default();
        config.generation_model = "test-gen".to_string();
        config.ollama_base_url = base_url.to_string();
        config.request_timeout_secs = 5;
        OllamaGenerator::new(&config).unwrap()
    }

    #[test]
    fn test_build_context_numbering() {
        let passages = vec![
            make_passage("first"),
            make_passage("second"),
            make_passage("third"),
        ];
        let context = build_context(&passages, 4000);
        assert_eq!(context, "[1] first\n\n[2] second\n\n[3] third");
    }

    #[test]
    fn test_build_context_budget_drops_tail() {
        let passages = vec![
            make_passage("aaaaa"),
            make_passage("bbbbb"),
            make_passage("ccccc"),
        ];
        // "[1] aaaaa"는 9자, 다음 블록은 구분자 포함 11자라 13 예산을 넘는다
        let context = build_context(&passages, 13);
        assert_eq!(context, "[1] aaaaa");
    }

    #[test]
    fn test_build_context_keeps_top_passage_over_budget() {
        let passages = vec![make_passage(&"x".repeat(100))];
        let context = build_context(&passages, 10);
        assert!(context.starts_with("[1] xxx"));
        assert_eq!(context.chars().count(), 104);
    }

    #[test]
    fn test_build_prompt_shape() {
        let prompt = build_prompt("What is Rust?", "[1] Rust is a language.");
        assert!(prompt.starts_with("Answer the question based on the following context."));
        assert!(prompt.contains("\n\nContext:\n[1] Rust is a language.\n\n"));
        assert!(prompt.contains("Question: What is Rust?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[tokio::test]
    async fn test_generate_without_passages_returns_fixed_answer() {
        // 백엔드가 닿지 않는 주소여도 빈 결과는 호출 없이 응답한다
        let generator = test_generator();
        let answer = generator.generate("anything", &[]).await.unwrap();
        assert_eq!(answer, NO_CONTEXT_ANSWER);
    }

    #[tokio::test]
    async fn test_generate_stream_without_passages_single_fragment() {
        let generator = test_generator();
        let stream = generator.generate_stream("anything", &[]).await.unwrap();

        let fragments: Vec<Result<String>> = stream.collect().await;
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap(), NO_CONTEXT_ANSWER);
    }

    #[tokio::test]
    async fn test_generate_unreachable_backend() {
        let generator = test_generator();
        let err = generator
            .generate("question", &[make_passage("context")])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::GenerationBackend(_)));
    }

    /// 줄 하나가 여러 청크에 걸쳐 도착해도 이어 붙여 파싱된다
    #[tokio::test]
    async fn test_ndjson_fragments_line_split_across_chunks() {
        let stream = ndjson_fragments(byte_chunks(vec![
            b"{\"response\": \"Hello\", \"done\": false}\n\n{\"response\": \" wor".to_vec(),
            b"ld\", \"done\": false}\n".to_vec(),
            b"{\"response\": \"!\", \"done\": true}\n".to_vec(),
        ]));
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments, vec!["Hello", " world", "!"]);
    }

    /// 청크 경계가 멀티바이트 문자 한가운데 걸려도 조각을 이으면 원문이 된다
    #[tokio::test]
    async fn test_ndjson_fragments_chunk_split_inside_multibyte_char() {
        let line = "{\"response\": \"안녕\", \"done\": true}\n".as_bytes();
        // "안"(EC 95 88)의 선두 바이트 직후에서 자른다
        let cut = line.iter().position(|&b| b == 0xEC).unwrap() + 1;
        let stream =
            ndjson_fragments(byte_chunks(vec![line[..cut].to_vec(), line[cut..].to_vec()]));
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments.concat(), "안녕");
    }

    /// error 줄은 GenerationBackend 에러로 끝난다
    #[tokio::test]
    async fn test_ndjson_fragments_error_line() {
        let stream = ndjson_fragments(byte_chunks(vec![
            b"{\"response\": \"partial\", \"done\": false}\n".to_vec(),
            b"{\"error\": \"model exploded\"}\n".to_vec(),
        ]));
        let results: Vec<Result<String>> = stream.collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "partial");
        assert!(matches!(
            &results[1],
            Err(RagError::GenerationBackend(msg)) if msg == "model exploded"
        ));
    }

    /// done이 찍힌 줄 이후의 입력은 무시된다
    #[tokio::test]
    async fn test_ndjson_fragments_ignores_lines_after_done() {
        let stream = ndjson_fragments(byte_chunks(vec![
            b"{\"response\": \"answer\", \"done\": true}\n{\"response\": \"ghost\", \"done\": false}\n"
                .to_vec(),
        ]));
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments, vec!["answer"]);
    }

    /// 개행 없이 끝난 마지막 줄도 파싱된다
    #[tokio::test]
    async fn test_ndjson_fragments_trailing_line_without_newline() {
        let stream = ndjson_fragments(byte_chunks(vec![
            b"{\"response\": \"The\", \"done\": false}\n".to_vec(),
            b"{\"response\": \" end\", \"done\": false}".to_vec(),
        ]));
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments, vec!["The", " end"]);
    }

    /// 실제 HTTP 스트림에서 문자 중간이 잘린 세그먼트가 와도 답변이 복원된다
    #[tokio::test]
    async fn test_generate_stream_reassembles_split_multibyte_answer() {
        let body = concat!(
            r#"{"response": "안녕", "done": false}"#,
            "\n",
            r#"{"response": "!", "done": true}"#,
            "\n"
        )
        .as_bytes();
        // "안"(EC 95 88)의 선두 바이트 직후에서 자른다
        let cut = body.iter().position(|&b| b == 0xEC).unwrap() + 1;
        let base_url =
            spawn_stream_server(vec![body[..cut].to_vec(), body[cut..].to_vec()]).await;

        let generator = server_generator(&base_url);
        let stream = generator
            .generate_stream("greeting", &[make_passage("context")])
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;

        assert_eq!(fragments.concat(), "안녕!");
    }

    #[test]
    fn test_generator_name() {
        assert_eq!(test_generator().name(), "test-gen");
    }
}
