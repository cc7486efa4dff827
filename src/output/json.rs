//! JSON Report Writer
//!
//! 抽出結果を機械可読なJSON（`extracted_data.json`）として書き出します。
//! 画像のバイト列は含まず、出力ファイル名とアンカー位置のみを出力します。

use serde_json::json;
use std::io::Write;

use crate::error::XlsxVisionError;
use crate::types::WorkbookContent;

/// 抽出結果のJSONレポート
#[derive(Debug, Clone, Copy)]
pub struct JsonReport<'a> {
    content: &'a WorkbookContent,
    /// `metadata.created`に出力するISO 8601形式の時刻
    created: &'a str,
}

impl<'a> JsonReport<'a> {
    pub fn new(content: &'a WorkbookContent, created: &'a str) -> Self {
        Self { content, created }
    }

    /// レポートを`serde_json::Value`として構築
    pub fn to_value(&self) -> Result<serde_json::Value, XlsxVisionError> {
        let sheet_names: Vec<&str> = self
            .content
            .sheets
            .iter()
            .map(|s| s.name.as_str())
            .collect();

        Ok(json!({
            "metadata": {
                "filename": self.content.source_name,
                "created": self.created,
                "date_1904": self.content.is_1904,
                "sheets": sheet_names,
            },
            "sheets": serde_json::to_value(&self.content.sheets)?,
        }))
    }

    /// 整形済みJSONを書き出す
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), XlsxVisionError> {
        let value = self.to_value()?;
        serde_json::to_writer_pretty(&mut writer, &value)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}
