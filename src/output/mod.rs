//! Output Module
//!
//! 抽出結果の出力（Markdownドキュメント、JSONレポート、画像ファイル）を提供するモジュール。

mod images;
mod json;
mod markdown;

pub use images::ImageStore;
pub use json::JsonReport;
pub use markdown::{slugify, MarkdownAssembler, MarkdownDocument, DEFAULT_TITLE};
