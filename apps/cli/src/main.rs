use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{FileSelection, NotesWorkflow};

mod config;

#[derive(Parser, Debug)]
#[command(name = "smart-notes")]
struct Args {
    /// Document to upload (pdf, docx, txt, ...).
    file: PathBuf,
    /// Backend base URL; falls back to client.toml / API_BASE_URL / the default.
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let base_url = args
        .base_url
        .unwrap_or_else(|| config::load_settings().api_base_url);

    let content = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let workflow = NotesWorkflow::new(base_url);
    workflow.select_file(FileSelection::new(name, content)).await;

    workflow.upload().await?;
    let snapshot = workflow.snapshot().await;
    if let Some(stored) = &snapshot.stored_file {
        println!("Uploaded {} (id: {})", stored.filename, stored.file_id);
    }
    if let Some(url) = workflow.current_file_url().await {
        println!("Raw file: {url}");
    }

    workflow.generate().await?;
    let snapshot = workflow.snapshot().await;
    if let Some(notes) = &snapshot.notes {
        if notes.cached {
            println!("Study notes (from cache):\n");
        } else {
            println!("Study notes:\n");
        }
        println!("{}", notes.text);
    }

    Ok(())
}
