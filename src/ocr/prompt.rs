//! Prompts
//!
//! OCRモードごとのプロンプトと最大トークン数。

use crate::api::OcrMode;

/// 書き起こしモードのプロンプト
pub const TRANSCRIBE_PROMPT: &str =
    "Please extract all text from this image. Preserve the structure and formatting.";

/// 構造化モードのプロンプト
///
/// 視覚要素ごとに`[IMAGE: ... | Position: ... | ApproxPercent: X% from top, Y% from left]`
/// の形式で位置を報告させます。
pub const STRUCTURED_PROMPT: &str = r#"Analyze this image and create a structured markdown document with the following:

1. **Extract all text content** preserving hierarchy (headings, paragraphs, lists)

2. **Identify ALL visual elements** (charts, diagrams, icons, photos, illustrations, graphs, tables)

3. **For each visual element**, provide in this EXACT format:
   [IMAGE: Brief description | Position: top-left/top-center/top-right/middle-left/center/middle-right/bottom-left/bottom-center/bottom-right | ApproxPercent: X% from top, Y% from left]

4. **Insert image placeholders EXACTLY where they appear** in the document flow

5. **Maintain reading order**: top to bottom, left to right

6. Use markdown formatting: `#` for headings, `##` for subheadings, `-` for bullets, `**bold**` for emphasis

Example:
```
# Title
[IMAGE: Logo | Position: top-left | ApproxPercent: 5% from top, 10% from left]

## Section
Text content...
[IMAGE: Chart | Position: center | ApproxPercent: 40% from top, 50% from left]
```

Provide complete markdown with all text and image placeholders."#;

pub fn prompt_for(mode: OcrMode) -> &'static str {
    match mode {
        OcrMode::Transcribe => TRANSCRIBE_PROMPT,
        OcrMode::Structured => STRUCTURED_PROMPT,
    }
}

pub fn max_tokens_for(mode: OcrMode) -> u32 {
    match mode {
        OcrMode::Transcribe => 4096,
        OcrMode::Structured => 8192,
    }
}
