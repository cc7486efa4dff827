//! Vision Client Module
//!
//! ビジョンモデルへのリクエスト・レスポンスの共通型と、
//! プロバイダごとのクライアントが実装するトレイトを定義します。

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::path::Path;

use crate::api::Provider;
use crate::error::XlsxVisionError;
use crate::ocr::bedrock::BedrockClient;
use crate::ocr::config::ProviderConfig;
use crate::ocr::openai::OpenAiClient;

/// Base64エンコード済みの画像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub media_type: &'static str,
    /// 標準アルファベットのBase64
    pub data: String,
}

impl EncodedImage {
    /// ファイルパスの拡張子からメディアタイプを決めてエンコード
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type_for(path),
            data: STANDARD.encode(bytes),
        }
    }

    /// `data:`URL形式（OpenAI用）
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// 拡張子からメディアタイプを判定（不明な場合は`image/png`）
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// 1回分のリクエスト
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub image: EncodedImage,
    pub prompt: String,
    pub max_tokens: u32,
}

/// トークン使用量（プロバイダが返さない項目は`None`）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl Usage {
    /// 合計トークン数（明示されていなければ入力と出力の和）
    pub fn total(&self) -> Option<u64> {
        self.total_tokens.or(match (self.input_tokens, self.output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        })
    }
}

/// モデルの応答
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

/// ビジョンモデルのクライアント
///
/// 失敗時は再試行せずにエラーを返します。
pub trait VisionClient {
    /// プロバイダ
    fn provider(&self) -> Provider;

    /// 使用するモデルID
    fn model(&self) -> &str;

    /// 応答全体を一度に受け取る
    fn complete(&self, request: &VisionRequest) -> Result<Completion, XlsxVisionError>;

    /// 応答をストリーミングで受け取り、テキスト片ごとに`on_text`を呼ぶ
    fn stream(
        &self,
        request: &VisionRequest,
        on_text: &mut dyn FnMut(&str),
    ) -> Result<Completion, XlsxVisionError>;
}

/// 設定に応じたクライアントを生成
pub fn connect(config: &ProviderConfig) -> Result<Box<dyn VisionClient>, XlsxVisionError> {
    Ok(match config.provider {
        Provider::OpenAi => Box::new(OpenAiClient::new(config)?),
        Provider::Bedrock => Box::new(BedrockClient::new(config)?),
    })
}

/// HTTPエラー応答を`Api`エラーに変換
pub(crate) fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, XlsxVisionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().unwrap_or_default();
    Err(XlsxVisionError::Api {
        status: status.as_u16(),
        message,
    })
}
