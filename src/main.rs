//! xlsxvision CLI - Excel content extraction and image OCR

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use xlsxvision::{
    ExtractorBuilder, OcrBuilder, OcrMode, Provider, SheetSelector, TextLayout, XlsxVisionError,
};

#[derive(Parser)]
#[command(name = "xlsxvision")]
#[command(
    author,
    version,
    about = "Extract cells, shapes, images and SmartArt from Excel into Markdown"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a workbook into converted.md and an images/ directory
    Extract {
        /// Input workbook (.xlsx)
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Also write extracted_data.json
        #[arg(long)]
        json: bool,

        /// Put cell text in its own sub-section
        #[arg(long)]
        split_cell_text: bool,

        /// Skip SmartArt diagrams
        #[arg(long)]
        no_smartart: bool,

        /// Sheet names to extract (default: all sheets)
        #[arg(long = "sheet")]
        sheets: Vec<String>,

        /// Document title
        #[arg(long)]
        title: Option<String>,
    },

    /// Run OCR on an image with a vision model
    Ocr {
        /// Input image (png, jpg, gif, webp)
        image: PathBuf,

        /// Vision provider
        #[arg(long, default_value = "bedrock")]
        provider: Provider,

        /// Locate visual elements and crop them into sub-images
        #[arg(long)]
        extract_images: bool,

        /// Override the model ID
        #[arg(long)]
        model: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Also write {stem}_ocr.json
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Extract {
            input,
            output,
            json,
            split_cell_text,
            no_smartart,
            sheets,
            title,
        } => extract(&input, &output, json, split_cell_text, !no_smartart, sheets, title),
        Commands::Ocr {
            image,
            provider,
            extract_images,
            model,
            output,
            json,
        } => ocr(&image, provider, extract_images, model, &output, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    }
}

/// 入力ファイルが見つからない場合は2、それ以外の失敗は1
fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<XlsxVisionError>() {
        Some(XlsxVisionError::InputNotFound(_)) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

fn extract(
    input: &Path,
    output: &Path,
    json: bool,
    split_cell_text: bool,
    include_smartart: bool,
    sheets: Vec<String>,
    title: Option<String>,
) -> Result<()> {
    let mut builder = ExtractorBuilder::new()
        .split_cell_text(split_cell_text)
        .include_smartart(include_smartart)
        .write_json(json);
    if !sheets.is_empty() {
        builder = builder.with_sheet_selector(SheetSelector::Names(sheets));
    }
    if let Some(title) = title {
        builder = builder.with_title(title);
    }
    let extractor = builder.build().context("Invalid extraction options")?;

    let report = extractor
        .convert_file(input, output)
        .with_context(|| format!("Failed to extract '{}'", input.display()))?;

    println!("Markdown: {}", report.markdown_path.display());
    println!(
        "Images:   {} ({} files)",
        report.images_dir.display(),
        report.image_count
    );
    if let Some(path) = &report.json_path {
        println!("JSON:     {}", path.display());
    }
    println!(
        "Extracted {} text items from {} sheets",
        report.text_count, report.sheet_count
    );
    Ok(())
}

fn ocr(
    image: &Path,
    provider: Provider,
    extract_images: bool,
    model: Option<String>,
    output: &Path,
    json: bool,
) -> Result<()> {
    let mode = if extract_images {
        OcrMode::Structured
    } else {
        OcrMode::Transcribe
    };
    let mut builder = OcrBuilder::new()
        .with_provider(provider)
        .with_mode(mode)
        .with_output_dir(output)
        .write_json(json);
    if let Some(model) = model {
        builder = builder.with_model(model);
    }
    let pipeline = builder.build().context("Failed to configure the vision client")?;

    let stdout = io::stdout();
    let mut on_text = |text: &str| {
        let mut out = stdout.lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    };
    let outcome = pipeline
        .run(image, &mut on_text)
        .with_context(|| format!("OCR failed for '{}'", image.display()))?;

    if mode == OcrMode::Transcribe {
        println!();
    }
    println!("Report: {}", outcome.report_path.display());
    if !outcome.result.sub_images.is_empty() {
        println!("Sub-images: {}", outcome.result.sub_images.len());
    }
    if let Some(path) = &outcome.json_path {
        println!("JSON:   {}", path.display());
    }
    if let Some(total) = outcome.result.usage.total() {
        println!("Tokens: {}", total);
    }
    Ok(())
}
