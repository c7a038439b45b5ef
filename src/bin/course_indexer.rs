use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use course_rag::config::Settings;
use course_rag::ingest::{chunks_from_slides, chunks_from_transcript, walk_course_dir, CourseFile};
use course_rag::models::{Chunk, CollectionName, TranscriptResult};
use course_rag::rag::language::Language;
use course_rag::rag::result::PipelineResult;
use course_rag::rag::RagService;

#[derive(Parser, Debug)]
#[command(name = "course-indexer")]
#[command(about = "Index a course's transcripts and slides into its vector collection")]
struct Args {
    /// Numeric course id; content lands in course_<id>_mixed
    #[arg(short, long)]
    course_id: u64,

    /// Directory to recursively index
    #[arg(short, long)]
    dir: PathBuf,

    /// Language assumed for slides whose language cannot be detected
    #[arg(long, default_value = "en")]
    language: String,

    /// Only chunk the files and report counts, without embedding anything
    #[arg(long)]
    dry_run: bool,
}

fn load_chunks(service: &RagService, path: &Path, kind: CourseFile, fallback: Language) -> Result<Vec<Chunk>> {
    match kind {
        CourseFile::Transcript => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
            let transcript: TranscriptResult = serde_json::from_str(&raw)
                .with_context(|| format!("Not a transcript result: {}", path.display()))?;
            Ok(chunks_from_transcript(service.detector(), &transcript))
        }
        CourseFile::Slides(format) => chunks_from_slides(service.detector(), path, format, fallback),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if !args.dir.exists() {
        anyhow::bail!("Directory does not exist: {}", args.dir.display());
    }
    let fallback = Language::from_code(&args.language)
        .with_context(|| format!("Unsupported language '{}', expected en, es or ca", args.language))?;

    let settings = Settings::load()?;

    println!("Initializing pipeline (embedding model {})...", settings.embedding.model);
    let service = RagService::from_settings(&settings)?;

    println!("Scanning directory: {}", args.dir.display());
    let files = walk_course_dir(&args.dir);
    println!("Found {} supported files", files.len());

    if files.is_empty() {
        println!("No supported files found. Exiting.");
        return Ok(());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut success_count = 0usize;
    let mut total_chunks = 0usize;
    let mut failed_files: Vec<(PathBuf, String)> = Vec::new();

    for (path, kind) in &files {
        pb.set_message(format!("{}", path.file_name().unwrap_or_default().to_string_lossy()));

        let chunks = match load_chunks(&service, path, *kind, fallback) {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!("Failed to read {}: {:#}", path.display(), e);
                failed_files.push((path.clone(), format!("{:#}", e)));
                pb.inc(1);
                continue;
            }
        };

        if chunks.is_empty() {
            success_count += 1;
            pb.inc(1);
            continue;
        }

        if args.dry_run {
            success_count += 1;
            total_chunks += chunks.len();
        } else {
            match service.create_embeddings(args.course_id, chunks).await {
                PipelineResult::Success(indexed) => {
                    success_count += 1;
                    total_chunks += indexed.chunks_added;
                }
                PipelineResult::Failure(failure) => {
                    tracing::warn!("Failed to index {}: {}", path.display(), failure.error);
                    failed_files.push((path.clone(), failure.error));
                }
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("done");

    println!("\nIndexing complete!");
    println!("  Files processed: {}/{}", success_count, files.len());
    println!("  Files failed:    {}", failed_files.len());
    println!("  Total chunks:    {}", total_chunks);
    println!("  Collection:      {}", CollectionName::for_course(args.course_id));
    if args.dry_run {
        println!("  (dry run, nothing was written)");
    }

    if !failed_files.is_empty() {
        println!("\nFailed files:");
        for (path, err) in &failed_files {
            println!("  {}: {}", path.display(), err);
        }
    }

    Ok(())
}
