//! Error Types Module
//!
//! クレート全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。

use std::path::PathBuf;
use thiserror::Error;

/// xlsxvisionクレート全体で使用するエラー型
///
/// Excelファイルの読み込み・抽出・Markdown出力、およびOCRクライアントの
/// 処理中に発生するすべてのエラーを統一的に扱います。
///
/// # 致命的なエラーと非致命的なエラー
///
/// このエラー型で返されるものはすべて処理を中断します。個々のセル・図形・画像の
/// デコード失敗はエラーとして返さず、ログに記録してスキップします。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsxvision::XlsxVisionError;
/// use std::fs::File;
///
/// fn read_excel_file(path: &str) -> Result<(), XlsxVisionError> {
///     let file = File::open(path)?;  // Ioエラーが自動的に変換される
///     // ... 処理 ...
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum XlsxVisionError {
    /// I/O操作中に発生したエラー
    ///
    /// `#[from]`属性により、`std::io::Error`から自動的に変換されます。
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 入力ファイル（ワークブックまたは画像）が存在しない
    ///
    /// CLIでは終了コード2に対応します。
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Excelファイルの解析中に発生したエラー（calamine由来）
    #[error("Failed to parse Excel file: {0}")]
    Parse(#[from] calamine::Error),

    /// UTF-8文字列の変換エラー
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// ZIPアーカイブの解析エラー
    #[error("ZIP archive error: {0}")]
    Zip(String),

    /// パッケージ内XMLの解析エラー
    #[error("XML error in '{part}': {message}")]
    Xml {
        /// 解析に失敗したパッケージ内パス
        part: String,
        /// エラーの詳細
        message: String,
    },

    /// JSONのシリアライズ／デシリアライズエラー
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 設定の検証に失敗したエラー
    ///
    /// `ExtractorBuilder::build()`や`OcrBuilder::build()`で無効な設定が
    /// 検出された場合、またはシート選択が解決できない場合に発生します。
    ///
    /// # 例
    ///
    /// ```rust,no_run
    /// use xlsxvision::{ExtractorBuilder, XlsxVisionError};
    ///
    /// let result = ExtractorBuilder::new()
    ///     .with_images_dir("../images")  // 無効なディレクトリ名
    ///     .build();
    ///
    /// match result {
    ///     Err(XlsxVisionError::Config(msg)) => {
    ///         println!("設定エラー: {}", msg);
    ///     }
    ///     _ => {}
    /// }
    /// ```
    #[error("Configuration error: {0}")]
    Config(String),

    /// セキュリティ制限に違反したエラー
    ///
    /// ZIP bomb、パストラバーサル、ファイルサイズ制限などに違反した場合に発生します。
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// HTTPリクエストの失敗（接続エラー、タイムアウトなど）
    #[cfg(feature = "ocr")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// 画像のデコード／エンコードエラー
    #[cfg(feature = "ocr")]
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// 認証情報が環境変数から取得できない
    #[cfg(feature = "ocr")]
    #[error("Missing credentials: {0}")]
    Credentials(String),

    /// モデルAPIがエラーレスポンスを返した
    #[cfg(feature = "ocr")]
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTPステータスコード
        status: u16,
        /// レスポンス本文またはエラーメッセージ
        message: String,
    },

    /// AWSイベントストリームのフレームが不正
    #[cfg(feature = "ocr")]
    #[error("Event stream error: {0}")]
    EventStream(String),
}

impl XlsxVisionError {
    /// パッケージ内XMLのエラーを生成するヘルパー
    pub(crate) fn xml(part: &str, message: impl std::fmt::Display) -> Self {
        XlsxVisionError::Xml {
            part: part.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for XlsxVisionError {
    fn from(err: zip::result::ZipError) -> Self {
        XlsxVisionError::Zip(err.to_string())
    }
}
