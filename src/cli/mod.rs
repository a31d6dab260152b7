//! CLI 모듈
//!
//! docqa-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;

use crate::collector::{CollectionStats, CollectorConfig, FileCollector};
use crate::config::RagConfig;
use crate::index::SearchResult;
use crate::pipeline::RagPipeline;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docqa-rag")]
#[command(version, about = "문서 질의응답 RAG 파이프라인", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일 또는 폴더를 인덱스에 추가
    Ingest {
        /// 수집할 파일 경로
        #[arg(long)]
        file: Option<PathBuf>,

        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 숨김 파일 포함
        #[arg(long)]
        include_hidden: bool,
    },

    /// 인덱스 검색 후 답변 생성
    Query {
        /// 질문
        query: String,

        /// 검색 결과 개수 (기본값은 TOP_K 설정)
        #[arg(short, long)]
        limit: Option<usize>,

        /// 답변을 스트리밍으로 출력
        #[arg(short, long)]
        stream: bool,
    },

    /// 인덱스 상태 확인
    Stats,

    /// 인덱스 전체 삭제
    Clear,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::from_env().context("설정 로드 실패")?;

    match cli.command {
        Commands::Ingest {
            file,
            dir,
            include_hidden,
        } => cmd_ingest(&config, file, dir, include_hidden).await,
        Commands::Query {
            query,
            limit,
            stream,
        } => cmd_query(&config, &query, limit, stream).await,
        Commands::Stats => cmd_stats(&config),
        Commands::Clear => cmd_clear(&config),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 수집 명령어 (ingest)
///
/// 파일 또는 폴더를 수집하여 인덱스에 추가합니다.
/// 파일 하나가 실패해도 나머지는 계속 처리됩니다.
async fn cmd_ingest(
    config: &RagConfig,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    include_hidden: bool,
) -> Result<()> {
    let collector_config = CollectorConfig {
        include_hidden,
        ..Default::default()
    };
    let collector = FileCollector::new(collector_config);

    // 파일 수집
    let files = if let Some(ref file_path) = file {
        match collector.collect_file(file_path)? {
            Some(f) => vec![f],
            None => {
                println!("[!] 지원하지 않는 파일 형식: {:?}", file_path);
                return Ok(());
            }
        }
    } else if let Some(ref dir_path) = dir {
        collector.collect_directory(dir_path)?
    } else {
        bail!("--file 또는 --dir를 지정해야 합니다");
    };

    if files.is_empty() {
        println!("[!] 수집할 파일이 없습니다.");
        return Ok(());
    }

    // 통계 표시
    let stats = CollectionStats::from_files(&files);
    println!(
        "[*] 수집 대상: {} 파일 ({})",
        stats.total_files,
        stats.format_summary()
    );
    println!("    총 크기: {}", format_bytes(stats.total_size as usize));
    println!();

    let pipeline = RagPipeline::new(config).context("파이프라인 초기화 실패")?;

    // 파일별 처리
    let mut success_count = 0;
    let mut error_count = 0;
    let mut total_chunks = 0;

    for (i, collected) in files.iter().enumerate() {
        let file_name = collected
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        print!(
            "[{}/{}] [{}] {}... ",
            i + 1,
            files.len(),
            collected.format.label(),
            file_name
        );
        std::io::stdout().flush().ok();

        match pipeline.ingest_file(&collected.path).await {
            Ok(report) => {
                println!("완료 ({} 청크)", report.chunks_added);
                success_count += 1;
                total_chunks += report.chunks_added;
            }
            Err(e) => {
                println!("실패: {}", e);
                error_count += 1;
            }
        }
    }

    println!();
    println!(
        "[OK] 완료: 성공 {}, 실패 {} (청크 {} 개)",
        success_count, error_count, total_chunks
    );

    Ok(())
}

/// 질의 명령어 (query)
///
/// 인덱스를 검색하고 검색 결과를 근거로 답변을 생성합니다.
async fn cmd_query(
    config: &RagConfig,
    query: &str,
    limit: Option<usize>,
    stream: bool,
) -> Result<()> {
    let top_k = limit.unwrap_or(config.top_k);

    println!("[*] 검색 중: \"{}\"", query);

    let pipeline = RagPipeline::new(config).context("파이프라인 초기화 실패")?;

    if stream {
        let mut response = pipeline
            .query_stream(query, top_k)
            .await
            .context("질의 실패")?;

        print_results(&response.results);

        println!("[*] 답변:");
        while let Some(fragment) = response.answer.next().await {
            let fragment = fragment.context("답변 스트림 오류")?;
            print!("{}", fragment);
            std::io::stdout().flush().ok();
        }
        println!();
    } else {
        let response = pipeline.query(query, top_k).await.context("질의 실패")?;

        print_results(&response.results);

        println!("[*] 답변:");
        println!("{}", response.answer);
    }

    Ok(())
}

/// 검색 결과 출력
fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.\n");
        return;
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [점수: {:.4}] {} (청크 #{})",
            i + 1,
            result.score,
            result.source,
            result.chunk_index
        );
        println!("   내용: {}", truncate_text(&result.text, 200));
        println!();
    }
}

/// 상태 명령어 (stats)
fn cmd_stats(config: &RagConfig) -> Result<()> {
    println!("docqa-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!("[*] Ollama 엔드포인트: {}", config.ollama_base_url);

    let pipeline = RagPipeline::new(config).context("파이프라인 초기화 실패")?;
    let stats = pipeline.stats().context("통계 조회 실패")?;

    println!("[OK] 저장된 청크: {} 개", stats.total_entries);
    if stats.embedding_dimension > 0 {
        println!("     임베딩 차원: {}", stats.embedding_dimension);
    } else {
        println!("     임베딩 차원: (비어 있음)");
    }
    println!("     임베딩 모델: {}", stats.model_name);
    println!("     생성 모델: {}", config.generation_model);

    Ok(())
}

/// 초기화 명령어 (clear)
fn cmd_clear(config: &RagConfig) -> Result<()> {
    let pipeline = RagPipeline::new(config).context("파이프라인 초기화 실패")?;

    let before = pipeline.stats().context("통계 조회 실패")?;
    pipeline.clear().context("인덱스 삭제 실패")?;

    println!(
        "[OK] 인덱스를 비웠습니다 ({} 청크 삭제)",
        before.total_entries
    );
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        let truncated = truncate_text(korean, 5);
        assert_eq!(truncated, "안녕하세요...");
    }

    #[test]
    fn test_cli_parses_query_command() {
        let cli =
            Cli::try_parse_from(["docqa-rag", "query", "what is rust", "--limit", "3", "--stream"])
                .unwrap();
        match cli.command {
            Commands::Query {
                query,
                limit,
                stream,
            } => {
                assert_eq!(query, "what is rust");
                assert_eq!(limit, Some(3));
                assert!(stream);
            }
            _ => panic!("expected query command"),
        }
    }
}
