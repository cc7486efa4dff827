//! xlsxvision - Excel content extractor and vision OCR client
//!
//! This crate extracts everything a reader sees in an Excel workbook (XLSX):
//! cell values, text inside shapes, embedded images and SmartArt diagrams,
//! and writes it as a single Markdown document for RAG pipelines.
//! The optional `ocr` feature sends images to a vision model (OpenAI or
//! AWS Bedrock) to transcribe them or to locate and crop their visual elements.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use xlsxvision::ExtractorBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extractor = ExtractorBuilder::new().build()?;
//!
//!     // Writes output/converted.md and output/images/*
//!     let report = extractor.convert_file("report.xlsx", "output")?;
//!     println!("{} sheets, {} images", report.sheet_count, report.image_count);
//!
//!     Ok(())
//! }
//! ```
//!
//! # In-memory Conversion
//!
//! ```rust,no_run
//! use std::io::Cursor;
//! use xlsxvision::ExtractorBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = ExtractorBuilder::new().build()?;
//! let excel_data: Vec<u8> = vec![]; // Your Excel file bytes
//! let markdown = extractor.convert_to_string(Cursor::new(excel_data))?;
//! println!("{}", markdown);
//! # Ok(())
//! # }
//! ```
//!
//! # Custom Configuration
//!
//! ```rust,no_run
//! use xlsxvision::{ExtractorBuilder, SheetSelector, TextLayout};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extractor = ExtractorBuilder::new()
//!         .with_sheet_selector(SheetSelector::Names(vec!["Summary".to_string()]))
//!         .with_text_layout(TextLayout::Split)
//!         .include_smartart(false)
//!         .with_title("Quarterly Report")
//!         .write_json(true)
//!         .build()?;
//!
//!     extractor.convert_file("report.xlsx", "output")?;
//!     Ok(())
//! }
//! ```
//!
//! # OCR
//!
//! ```rust,no_run
//! # #[cfg(feature = "ocr")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use xlsxvision::{OcrBuilder, OcrMode, Provider};
//!
//! // Reads OPENAI_API_KEY from the environment
//! let pipeline = OcrBuilder::new()
//!     .with_provider(Provider::OpenAi)
//!     .with_mode(OcrMode::Transcribe)
//!     .build()?;
//! pipeline.run("output/images/Sheet1_img_1.png", &mut |text: &str| print!("{}", text))?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "ocr"))]
//! # fn main() {}
//! ```

mod api;
mod builder;
mod error;
mod formatter;
mod output;
mod parser;
mod security;
mod types;

#[cfg(feature = "ocr")]
pub mod ocr;

// 公開API
pub use api::{SheetSelector, TextLayout};
#[cfg(feature = "ocr")]
pub use api::{OcrMode, Provider};
pub use builder::{ConversionReport, Extractor, ExtractorBuilder, JSON_FILE_NAME, MARKDOWN_FILE_NAME};
pub use error::XlsxVisionError;
pub use output::{slugify, ImageStore, JsonReport, MarkdownDocument, DEFAULT_TITLE};
pub use types::{
    Anchor, CellCoord, SheetRecord, ShapeImage, SmartArtNode, TextCell, TextOrigin,
    WorkbookContent,
};

#[cfg(feature = "ocr")]
pub use ocr::{OcrBuilder, OcrOutcome, OcrPipeline, OcrResult};
