//! OCR Report
//!
//! OCR結果のMarkdownレポートとJSON出力を生成します。

use serde::Serialize;
use std::fmt::Write as _;

use crate::api::{OcrMode, Provider};
use crate::ocr::client::Usage;
use crate::ocr::crop::BoundingBox;
use crate::ocr::placeholder::render_remaining_markers;

/// 切り出した部分画像
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubImage {
    /// 1始まりの番号（応答内のマーカー順）
    pub index: usize,
    /// 応答内のマーカー文字列
    pub marker: String,
    pub description: String,
    pub position: String,
    pub file_name: String,
    /// レポートからの相対パス
    pub relative_path: String,
    pub bbox: BoundingBox,
}

/// 1枚の画像に対するOCR結果
#[derive(Debug, Clone, Serialize)]
pub struct OcrResult {
    /// 入力画像のパス（表示用）
    pub source: String,
    pub provider: String,
    pub model: String,
    pub mode: &'static str,
    /// モデルが返したテキスト（加工前）
    pub text: String,
    pub usage: Usage,
    pub sub_images: Vec<SubImage>,
    /// 部分画像の出力ディレクトリ名（構造化モードのみ）
    pub sub_image_dir: Option<String>,
    /// 元画像のサイズ（構造化モードのみ）
    pub dimensions: Option<(u32, u32)>,
}

fn provider_label(provider: &str) -> &'static str {
    match provider.parse::<Provider>() {
        Ok(Provider::OpenAi) => "OpenAI",
        _ => "AWS Bedrock",
    }
}

impl OcrResult {
    pub(crate) fn new(source: String, provider: Provider, model: &str, mode: OcrMode) -> Self {
        Self {
            source,
            provider: provider.to_string(),
            model: model.to_string(),
            mode: mode.as_str(),
            text: String::new(),
            usage: Usage::default(),
            sub_images: Vec::new(),
            sub_image_dir: None,
            dimensions: None,
        }
    }

    /// マーカーを部分画像のリンクに置き換えた本文
    ///
    /// 置き換えられなかった`[IMAGE: ...]`は引用行として残します。
    pub fn body(&self) -> String {
        let mut body = self.text.clone();
        for sub in &self.sub_images {
            let link = format!(
                "\n\n![{}]({})\n\n*{}*\n\n",
                sub.description, sub.relative_path, sub.description
            );
            body = body.replace(&sub.marker, &link);
        }
        render_remaining_markers(&body)
    }

    /// Markdownレポートを生成
    pub fn to_markdown(&self, processed_at: &str) -> String {
        let model = format!("{} ({})", self.model, provider_label(&self.provider));
        let mut out = String::new();

        if self.mode == OcrMode::Structured.as_str() {
            let dir = self.sub_image_dir.as_deref().unwrap_or_default();
            let _ = write!(
                out,
                "# OCR Analysis with Sub-Images\n\n\
                 **Source Image:** `{}`  \n\
                 **Processed:** {}  \n\
                 **Model:** {}  \n\
                 **Sub-images extracted:** {}  \n\
                 **Sub-images directory:** `{}/`\n\n\
                 ---\n\n\
                 {}\n\n\
                 ---\n\n\
                 ## Extracted Sub-Images\n\n",
                self.source,
                processed_at,
                model,
                self.sub_images.len(),
                dir,
                self.body()
            );

            if self.sub_images.is_empty() {
                out.push_str("\nNo sub-images were automatically extracted.\n");
            } else {
                out.push_str("\n| # | Description | Position | File |\n");
                out.push_str("|---|-------------|----------|------|\n");
                for sub in &self.sub_images {
                    let _ = writeln!(
                        out,
                        "| {} | {} | {} | `{}` |",
                        sub.index, sub.description, sub.position, sub.file_name
                    );
                }
            }

            let dimensions = self
                .dimensions
                .map(|(w, h)| format!("{} x {} pixels", w, h))
                .unwrap_or_else(|| "N/A".to_string());
            let tokens = self
                .usage
                .total()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            let _ = write!(
                out,
                "\n\n---\n\n\
                 ## Technical Details\n\n\
                 - **Original image dimensions:** {}\n\
                 - **Total tokens used:** {}\n\
                 - **Processing method:** {} vision analysis\n\n\
                 *Generated by {} OCR with Sub-Image Extraction*\n",
                dimensions,
                tokens,
                model,
                provider_label(&self.provider)
            );
        } else {
            let _ = write!(
                out,
                "# OCR Results\n\n\
                 **Source Image:** `{}`  \n\
                 **Processed:** {}  \n\
                 **Model:** {}\n\n\
                 ---\n\n\
                 ## Extracted Text\n\n\
                 {}\n\n\
                 ---\n\n\
                 *Generated by {} OCR*\n",
                self.source,
                processed_at,
                model,
                self.text,
                provider_label(&self.provider)
            );
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structured(text: &str) -> OcrResult {
        let mut result = OcrResult::new(
            "sheet2.png".to_string(),
            Provider::Bedrock,
            "model-x",
            OcrMode::Structured,
        );
        result.text = text.to_string();
        result.sub_image_dir = Some("sheet2_subimages".to_string());
        result.dimensions = Some((1000, 800));
        result
    }

    fn sub(index: usize, description: &str, position: &str, marker: &str) -> SubImage {
        let file_name = crate::ocr::crop::sub_image_file_name(index, position);
        SubImage {
            index,
            marker: marker.to_string(),
            description: description.to_string(),
            position: position.to_string(),
            relative_path: format!("sheet2_subimages/{}", file_name),
            file_name,
            bbox: BoundingBox {
                left: 0,
                top: 0,
                right: 10,
                bottom: 10,
            },
        }
    }

    #[test]
    fn test_transcribe_report() {
        let mut result = OcrResult::new(
            "a.png".to_string(),
            Provider::OpenAi,
            "gpt-4o",
            OcrMode::Transcribe,
        );
        result.text = "Hello".to_string();
        let md = result.to_markdown("2025-01-02 03:04:05");

        assert!(md.starts_with("# OCR Results\n\n**Source Image:** `a.png`  \n"));
        assert!(md.contains("**Processed:** 2025-01-02 03:04:05  \n"));
        assert!(md.contains("**Model:** gpt-4o (OpenAI)\n"));
        assert!(md.contains("## Extracted Text\n\nHello\n\n---\n"));
        assert!(md.ends_with("*Generated by OpenAI OCR*\n"));
    }

    #[test]
    fn test_structured_body_replaces_placeholders() {
        let mut result = structured(
            "# Title\n\
             [IMAGE: Logo | Position: top-left | ApproxPercent: 5% from top, 10% from left]\n\
             [IMAGE: Off-page photo | Position: center | ApproxPercent: 300% from top, 300% from left]\n\
             [IMAGE: Just a photo]",
        );
        result.sub_images.push(sub(
            1,
            "Logo",
            "top-left",
            "[IMAGE: Logo | Position: top-left | ApproxPercent: 5% from top, 10% from left]",
        ));

        let body = result.body();
        assert!(body.contains("![Logo](sheet2_subimages/subimg_01_top_left.png)\n\n*Logo*"));
        assert!(!body.contains("[IMAGE: Logo"));
        // 切り出されなかったマーカーは引用行になる
        assert!(body.contains("> 📷 **Visual Element:** Off-page photo | Position: center"));
        assert!(body.contains("> 📷 **Visual Element:** Just a photo"));
    }

    #[test]
    fn test_structured_report_table_and_details() {
        let marker =
            "[IMAGE: Sales chart | Position: center | ApproxPercent: 40% from top, 50% from left]";
        let mut result = structured(marker);
        result.sub_images.push(sub(1, "Sales chart", "center", marker));
        result.usage = Usage {
            input_tokens: Some(100),
            output_tokens: Some(50),
            total_tokens: None,
        };

        let md = result.to_markdown("t");
        assert!(md.starts_with("# OCR Analysis with Sub-Images\n"));
        assert!(md.contains("**Sub-images extracted:** 1  \n"));
        assert!(md.contains("**Sub-images directory:** `sheet2_subimages/`\n"));
        assert!(md.contains("| 1 | Sales chart | center | `subimg_01_center.png` |\n"));
        assert!(md.contains("- **Original image dimensions:** 1000 x 800 pixels\n"));
        assert!(md.contains("- **Total tokens used:** 150\n"));
        assert!(md.ends_with("*Generated by AWS Bedrock OCR with Sub-Image Extraction*\n"));
    }

    #[test]
    fn test_structured_report_without_sub_images() {
        let result = structured("Plain text only");
        let md = result.to_markdown("t");
        assert!(md.contains("\nNo sub-images were automatically extracted.\n"));
        assert!(md.contains("- **Total tokens used:** N/A\n"));
    }

    #[test]
    fn test_json_serialization() {
        let mut result = structured("x");
        result.sub_images.push(sub(1, "Logo", "top-left", "[IMAGE: Logo]"));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["provider"], "bedrock");
        assert_eq!(value["mode"], "structured");
        assert_eq!(value["sub_images"][0]["file_name"], "subimg_01_top_left.png");
        assert_eq!(value["sub_images"][0]["bbox"]["right"], 10);
        assert_eq!(value["dimensions"], serde_json::json!([1000, 800]));
    }
}
