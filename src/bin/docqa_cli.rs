use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docqa::{config, logging, processing::DocumentService};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "docqa-cli",
    about = "Ingest documents and ask questions without the HTTP server"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest files, or every .pdf/.docx below the given directories.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Ask a question against the ingested documents.
    Ask {
        question: String,
        /// Restrict retrieval to one ingested file.
        #[arg(long)]
        file: Option<String>,
    },
    /// List ingested file names.
    List,
    /// Delete an ingested file and its chunks.
    Delete { filename: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("Failed to load configuration")?;
    logging::init_tracing();
    let service = DocumentService::new(config)
        .await
        .context("Failed to initialize document service")?;

    match cli.command {
        Command::Ingest { paths } => {
            let files = collect_documents(&paths)?;
            if files.is_empty() {
                bail!("no .pdf or .docx files found");
            }
            let mut failures = 0usize;
            for file in files {
                match service.ingest(&file).await {
                    Ok(outcome) => println!(
                        "{}: {} chunks -> {}",
                        outcome.document,
                        outcome.chunk_count,
                        outcome.stored_path.display()
                    ),
                    Err(error) => {
                        failures += 1;
                        eprintln!("{}: {error}", file.display());
                    }
                }
            }
            if failures > 0 {
                bail!("{failures} file(s) failed to ingest");
            }
        }
        Command::Ask { question, file } => {
            let answer = service.ask(&question, file.as_deref()).await?;
            println!("{answer}");
        }
        Command::List => {
            for name in service.list_documents().await? {
                println!("{name}");
            }
        }
        Command::Delete { filename } => {
            if service.delete_document(&filename).await? {
                println!("deleted {filename}");
            } else {
                bail!("no document named {filename}");
            }
        }
    }

    Ok(())
}

fn collect_documents(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            bail!("{} does not exist", path.display());
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
            if entry.file_type().is_file() && is_supported(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf") || ext.eq_ignore_ascii_case("docx"))
}
