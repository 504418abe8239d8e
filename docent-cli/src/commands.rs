//! CLI subcommand handlers.

use std::io::Write;
use std::path::{Path, PathBuf};

use docent_core::{Answer, AnswerMode, DocentConfig, Pipeline};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::ConfigAction;

/// Ingest the given documents and answer one question.
pub async fn ask(
    config: DocentConfig,
    docs: &[PathBuf],
    question: &str,
    json: bool,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::with_defaults(&config).await?;
    ingest_all(&pipeline, docs).await?;

    let answer = pipeline.submit_query(question).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }
    Ok(())
}

/// Ingest the given documents, then answer questions until EOF or 'exit'.
pub async fn chat(config: DocentConfig, docs: &[PathBuf]) -> anyhow::Result<()> {
    let pipeline = Pipeline::with_defaults(&config).await?;
    ingest_all(&pipeline, docs).await?;

    println!("Ask a question, or 'exit' to quit. '/stats' shows the index, '/clear' drops it.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("docent> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "exit" | "quit" => break,
            "/stats" => {
                let stats = pipeline.stats().await?;
                println!(
                    "{} document(s), {} chunk(s), {} dimensions",
                    stats.documents, stats.chunks, stats.dimensions
                );
            }
            "/clear" => {
                let removed = pipeline.clear().await?;
                println!("Removed {removed} chunk(s)");
            }
            question => match pipeline.submit_query(question).await {
                Ok(answer) => print_answer(&answer),
                Err(e) => eprintln!("Query failed: {e}"),
            },
        }
    }
    Ok(())
}

/// Handle `docent config <action>`.
pub fn config(config: DocentConfig, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path = Path::new("docent.toml");
            if path.exists() {
                println!("Configuration file already exists at: {}", path.display());
                return Ok(());
            }
            let toml_str = toml::to_string_pretty(&DocentConfig::default())?;
            std::fs::write(path, &toml_str)?;
            println!("Created default configuration at: {}", path.display());
        }
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

/// Submit each file, reporting receipts and skipping rejected documents.
async fn ingest_all(pipeline: &Pipeline, docs: &[PathBuf]) -> anyhow::Result<()> {
    for path in docs {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Skipped {}: {e}", path.display());
                continue;
            }
        };
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match pipeline.submit_document(bytes, &filename).await {
            Ok(receipt) => {
                tracing::debug!(doc_id = %receipt.doc_id, chunks = receipt.chunks, "Ingested");
                println!("Ingested {} ({} chunk(s))", receipt.doc_id, receipt.chunks);
            }
            Err(e) => eprintln!("Skipped {}: {e}", path.display()),
        }
    }

    let stats = pipeline.stats().await?;
    if stats.chunks == 0 {
        eprintln!("Warning: no chunks indexed; answers will have no context.");
    }
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!();
    println!("{}", answer.text);
    println!();
    match answer.mode {
        AnswerMode::Generative => println!("(generated answer)"),
        AnswerMode::Fallback => println!("(retrieval-only answer, no generation performed)"),
    }
    if !answer.sources.is_empty() {
        println!("Sources:");
        for source in &answer.sources {
            println!(
                "  {} chunk {} (score {:.3})",
                source.doc_id, source.chunk_index, source.score
            );
        }
    }
}
