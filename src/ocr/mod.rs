//! OCR Module
//!
//! 画像をビジョンモデル（OpenAIまたはBedrock）に送り、テキストの書き起こし、
//! または視覚要素の位置推定と部分画像の切り出しを行うモジュール。
//!
//! # 使用例
//!
//! ```rust,no_run
//! use xlsxvision::{OcrBuilder, OcrMode, Provider};
//!
//! # fn main() -> Result<(), xlsxvision::XlsxVisionError> {
//! let pipeline = OcrBuilder::new()
//!     .with_provider(Provider::Bedrock)
//!     .with_mode(OcrMode::Structured)
//!     .with_output_dir("output")
//!     .build()?;
//! let outcome = pipeline.run("output/images/Sheet1_img_1.png", &mut |_: &str| {})?;
//! println!("{}", outcome.report_path.display());
//! # Ok(())
//! # }
//! ```

mod bedrock;
mod client;
mod config;
mod crop;
mod eventstream;
mod openai;
mod placeholder;
mod prompt;
mod report;

pub use client::{media_type_for, Completion, EncodedImage, Usage, VisionClient, VisionRequest};
pub use config::{ProviderConfig, DEFAULT_TIMEOUT};
pub use crop::{BoundingBox, ElementCategory};
pub use placeholder::{find_placeholders, Placeholder};
pub use report::{OcrResult, SubImage};

use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{OcrMode, Provider};
use crate::error::XlsxVisionError;
use crate::security::sanitize_component;

/// OCRパイプラインのビルダー
#[derive(Debug)]
pub struct OcrBuilder {
    provider: Provider,
    mode: OcrMode,
    model: Option<String>,
    output_dir: PathBuf,
    write_json: bool,
    timeout: Duration,
    timestamp: Option<NaiveDateTime>,
}

impl Default for OcrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrBuilder {
    /// デフォルト設定（Bedrock、書き起こしモード、カレントディレクトリに出力）
    pub fn new() -> Self {
        Self {
            provider: Provider::default(),
            mode: OcrMode::default(),
            model: None,
            output_dir: PathBuf::from("."),
            write_json: false,
            timeout: DEFAULT_TIMEOUT,
            timestamp: None,
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_mode(mut self, mode: OcrMode) -> Self {
        self.mode = mode;
        self
    }

    /// 環境変数のモデルIDを上書きする
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// レポートと部分画像の出力先
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// `{stem}_ocr.json`も書き出すか
    pub fn write_json(mut self, write: bool) -> Self {
        self.write_json = write;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// レポートの`Processed:`時刻を固定する
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    fn validate(&self) -> Result<(), XlsxVisionError> {
        if self.timeout.is_zero() {
            return Err(XlsxVisionError::Config(
                "Timeout must be greater than zero".to_string(),
            ));
        }
        if matches!(&self.model, Some(model) if model.trim().is_empty()) {
            return Err(XlsxVisionError::Config("Model ID must not be empty".to_string()));
        }
        Ok(())
    }

    /// 環境変数から認証情報を読み込み、パイプラインを生成する
    ///
    /// # 戻り値
    ///
    /// * `Err(XlsxVisionError::Credentials)` - 認証情報が設定されていない場合
    /// * `Err(XlsxVisionError::Config)` - 設定が無効な場合
    pub fn build(self) -> Result<OcrPipeline, XlsxVisionError> {
        self.validate()?;
        let mut config = ProviderConfig::from_env(self.provider)?.with_timeout(self.timeout);
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        tracing::debug!(?config, "vision client configured");
        let client = client::connect(&config)?;
        self.build_with_client(client)
    }

    /// 任意のクライアントでパイプラインを生成する
    pub fn build_with_client(
        self,
        client: Box<dyn VisionClient>,
    ) -> Result<OcrPipeline, XlsxVisionError> {
        self.validate()?;
        Ok(OcrPipeline {
            client,
            mode: self.mode,
            output_dir: self.output_dir,
            write_json: self.write_json,
            timestamp: self.timestamp,
        })
    }
}

/// `OcrPipeline::run`の結果
#[derive(Debug, Clone)]
pub struct OcrOutcome {
    pub report_path: PathBuf,
    pub json_path: Option<PathBuf>,
    pub result: OcrResult,
}

/// OCRパイプライン
pub struct OcrPipeline {
    client: Box<dyn VisionClient>,
    mode: OcrMode,
    output_dir: PathBuf,
    write_json: bool,
    timestamp: Option<NaiveDateTime>,
}

impl OcrPipeline {
    pub fn mode(&self) -> OcrMode {
        self.mode
    }

    /// 1枚の画像を処理し、レポートを書き出す
    ///
    /// 書き起こしモードでは受信したテキスト片ごとに`on_text`を呼びます。
    /// 構造化モードでは応答を一度に受け取り、マーカーごとに部分画像を切り出します。
    /// マーカーが見つからない応答は部分画像なしのレポートになります。
    pub fn run(
        &self,
        image_path: impl AsRef<Path>,
        on_text: &mut dyn FnMut(&str),
    ) -> Result<OcrOutcome, XlsxVisionError> {
        let image_path = image_path.as_ref();
        if !image_path.is_file() {
            return Err(XlsxVisionError::InputNotFound(image_path.to_path_buf()));
        }
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let bytes = fs::read(image_path)?;
        // 切り出しに使う画像はリクエスト前にデコードしておく
        let decoded = match self.mode {
            OcrMode::Structured => Some(image::load_from_memory(&bytes)?),
            OcrMode::Transcribe => None,
        };

        let request = VisionRequest {
            image: EncodedImage::from_bytes(image_path, &bytes),
            prompt: prompt::prompt_for(self.mode).to_string(),
            max_tokens: prompt::max_tokens_for(self.mode),
        };

        tracing::info!(
            image = %image_path.display(),
            provider = %self.client.provider(),
            model = %self.client.model(),
            mode = self.mode.as_str(),
            "sending image to vision model"
        );
        let completion = match self.mode {
            OcrMode::Transcribe => self.client.stream(&request, on_text)?,
            OcrMode::Structured => self.client.complete(&request)?,
        };

        let mut result = OcrResult::new(
            image_path.display().to_string(),
            self.client.provider(),
            self.client.model(),
            self.mode,
        );
        result.text = completion.text;
        result.usage = completion.usage;

        fs::create_dir_all(&self.output_dir)?;
        if let Some(image) = decoded {
            // ファイル名に使えない文字を含むステムでも応答を失わない
            let dir_name = format!("{}_subimages", sanitize_component(&stem));
            result.dimensions = Some((image.width(), image.height()));
            result.sub_images = self.extract_sub_images(&image, &result.text, &dir_name);
            result.sub_image_dir = Some(dir_name);
        }

        let processed_at = self
            .timestamp
            .unwrap_or_else(|| chrono::Local::now().naive_local())
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let report_path = self.output_dir.join(format!("{}_out_ocr_simple.md", stem));
        fs::write(&report_path, result.to_markdown(&processed_at))?;

        let json_path = if self.write_json {
            let path = self.output_dir.join(format!("{}_ocr.json", stem));
            fs::write(&path, serde_json::to_string_pretty(&result)?)?;
            Some(path)
        } else {
            None
        };

        tracing::info!(
            report = %report_path.display(),
            sub_images = result.sub_images.len(),
            "OCR finished"
        );
        Ok(OcrOutcome {
            report_path,
            json_path,
            result,
        })
    }

    fn extract_sub_images(
        &self,
        image: &image::DynamicImage,
        text: &str,
        dir_name: &str,
    ) -> Vec<SubImage> {
        let placeholders = find_placeholders(text);
        if placeholders.is_empty() {
            tracing::warn!("no positioned visual elements found in the response");
            return Vec::new();
        }

        let dir = self.output_dir.join(dir_name);
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to create sub-image directory");
            return Vec::new();
        }

        let mut sub_images = Vec::new();
        for (i, placeholder) in placeholders.into_iter().enumerate() {
            let index = i + 1;
            let category = ElementCategory::classify(&placeholder.description);
            let bbox = BoundingBox::estimate(
                image.width(),
                image.height(),
                placeholder.top_percent,
                placeholder.left_percent,
                category,
            );
            if bbox.is_empty() {
                tracing::warn!(
                    element = %placeholder.description,
                    top = placeholder.top_percent,
                    left = placeholder.left_percent,
                    "crop box is empty, skipping"
                );
                continue;
            }

            let file_name = crop::sub_image_file_name(index, &placeholder.position);
            if let Err(e) = crop::save_crop(image, &bbox, &dir.join(&file_name)) {
                tracing::warn!(file = %file_name, error = %e, "failed to save sub-image");
                continue;
            }
            tracing::debug!(file = %file_name, ?category, width = bbox.width(), height = bbox.height(), "saved sub-image");

            sub_images.push(SubImage {
                index,
                relative_path: format!("{}/{}", dir_name, file_name),
                marker: placeholder.raw,
                description: placeholder.description,
                position: placeholder.position,
                file_name,
                bbox,
            });
        }
        sub_images
    }
}
