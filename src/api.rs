//! Public API Types
//!
//! 公開APIで使用する列挙型を定義するモジュール。

#[cfg(feature = "ocr")]
use std::fmt;
#[cfg(feature = "ocr")]
use std::str::FromStr;

/// シート選択方式
///
/// 抽出対象のシートを選択する方法を指定します。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum SheetSelector {
    /// すべてのシートを抽出（デフォルト）
    #[default]
    All,

    /// インデックス指定（0始まり）
    ///
    /// 例: `SheetSelector::Index(0)` は最初のシートを選択
    Index(usize),

    /// シート名指定
    ///
    /// 例: `SheetSelector::Name("Sheet1".to_string())`
    Name(String),

    /// 複数のインデックス指定
    ///
    /// 例: `SheetSelector::Indices(vec![0, 2, 4])`
    Indices(Vec<usize>),

    /// 複数のシート名指定
    ///
    /// 例: `SheetSelector::Names(vec!["Sheet1".to_string(), "Sheet2".to_string()])`
    Names(Vec<String>),
}

/// シートセクション内のテキストの並べ方
///
/// セル由来のテキストと図形由来のテキストを、ひとつのリストにまとめるか、
/// 別々の見出しに分けるかを指定します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum TextLayout {
    /// すべてのテキストを`### Shapes Text`にまとめて出力（デフォルト）
    ///
    /// ```markdown
    /// ### Shapes Text
    /// - (r0, c0): Header
    /// - (r4, c2): Callout text
    /// ```
    #[default]
    Combined,

    /// セル由来のテキストを`### Cell Text`にA1参照付きで分けて出力
    ///
    /// ```markdown
    /// ### Cell Text
    /// - A1: Header
    ///
    /// ### Shapes Text
    /// - (r4, c2): Callout text
    /// ```
    Split,
}

/// OCRの処理モード
#[cfg(feature = "ocr")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum OcrMode {
    /// 画像内のテキストを書き起こす（デフォルト、ストリーミング）
    #[default]
    Transcribe,

    /// テキストに加えて視覚要素の位置を報告させ、部分画像を切り出す
    Structured,
}

#[cfg(feature = "ocr")]
impl OcrMode {
    /// レポートやJSONに記録する名前
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrMode::Transcribe => "transcribe",
            OcrMode::Structured => "structured",
        }
    }
}

/// ビジョンモデルのプロバイダ
#[cfg(feature = "ocr")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum Provider {
    /// OpenAI互換のChat Completions API
    OpenAi,

    /// AWS Bedrock Runtime上のAnthropicモデル（デフォルト）
    #[default]
    Bedrock,
}

#[cfg(feature = "ocr")]
impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => f.write_str("openai"),
            Provider::Bedrock => f.write_str("bedrock"),
        }
    }
}

#[cfg(feature = "ocr")]
impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "bedrock" | "aws" => Ok(Provider::Bedrock),
            other => Err(format!("Unknown provider: {}", other)),
        }
    }
}
