//! Markdown Assembler
//!
//! 抽出結果からMarkdownドキュメント（タイトル、生成日時、目次、シートごとのセクション）
//! を組み立てるモジュール。

use std::collections::HashSet;
use std::io::Write;

use crate::api::TextLayout;
use crate::error::XlsxVisionError;
use crate::types::{SheetRecord, SmartArtNode, TextCell, WorkbookContent};

/// デフォルトのドキュメントタイトル
pub const DEFAULT_TITLE: &str = "Excel to Markdown Conversion";

/// 組み立て済みのMarkdownドキュメント
///
/// ヘッダー、目次、シートごとのセクションを順に保持し、最後に一度だけ連結して書き出します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownDocument {
    sections: Vec<String>,
}

impl MarkdownDocument {
    /// セクションの一覧（ヘッダー、目次、各シートの順）
    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    /// ドキュメント全体を連結する（末尾の改行はちょうど1つ）
    pub fn to_markdown(&self) -> String {
        let mut joined = self.sections.concat();
        let trimmed = joined.trim_end().len();
        joined.truncate(trimmed);
        joined.push('\n');
        joined
    }

    /// ドキュメントを書き出す
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), XlsxVisionError> {
        writer.write_all(self.to_markdown().as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// シート名からアンカー用のスラッグを生成
///
/// 小文字化し、`[a-z0-9]`以外の文字の連続を`-`に置き換え、前後の`-`を取り除きます。
/// 結果が空になる場合は`sheet-{index+1}`を使います。
///
/// ```text
/// "Sales Q1"  -> "sales-q1"
/// "売上"      -> "sheet-1"（index = 0）
/// ```
pub fn slugify(name: &str, index: usize) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        format!("sheet-{}", index + 1)
    } else {
        slug
    }
}

/// ドキュメント内で一意なスラッグを割り当てる
#[derive(Debug, Default)]
struct SlugRegistry {
    used: HashSet<String>,
}

impl SlugRegistry {
    /// 重複する場合は`-2`、`-3`…を付ける
    fn assign(&mut self, base: String) -> String {
        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.used.contains(&candidate) {
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

/// Markdownアセンブラ
#[derive(Debug, Clone)]
pub struct MarkdownAssembler {
    pub(crate) title: String,
    pub(crate) images_dir: String,
    pub(crate) layout: TextLayout,
    /// `Generated on:`に出力する時刻（`%Y-%m-%d %H:%M:%S`）
    pub(crate) generated_on: String,
}

impl MarkdownAssembler {
    pub fn new(generated_on: impl Into<String>) -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            images_dir: "images".to_string(),
            layout: TextLayout::default(),
            generated_on: generated_on.into(),
        }
    }

    /// 抽出結果からドキュメントを組み立てる
    pub fn render(&self, content: &WorkbookContent) -> MarkdownDocument {
        let mut registry = SlugRegistry::default();
        let slugs: Vec<String> = content
            .sheets
            .iter()
            .map(|sheet| registry.assign(slugify(&sheet.name, sheet.index)))
            .collect();

        let mut sections = Vec::with_capacity(content.sheets.len() + 2);
        sections.push(format!(
            "# {}\nGenerated on: {}\n\n",
            self.title, self.generated_on
        ));

        let mut toc = String::from("## Table of Contents\n");
        for (sheet, slug) in content.sheets.iter().zip(&slugs) {
            toc.push_str(&format!("- [{}](#{})\n", sheet.name, slug));
        }
        toc.push('\n');
        sections.push(toc);

        for (sheet, slug) in content.sheets.iter().zip(&slugs) {
            sections.push(self.render_sheet(sheet, slug));
        }

        MarkdownDocument { sections }
    }

    fn render_sheet(&self, sheet: &SheetRecord, slug: &str) -> String {
        let mut lines = vec![format!("<a id=\"{}\"></a>", slug), format!("## {}", sheet.name)];

        match self.layout {
            TextLayout::Combined => {
                let all: Vec<&TextCell> = sheet.texts.iter().collect();
                push_positioned(&mut lines, "Shapes Text", &all);
            }
            TextLayout::Split => {
                let cells: Vec<&TextCell> = sheet.cell_texts().collect();
                if !cells.is_empty() {
                    lines.push(String::new());
                    lines.push("### Cell Text".to_string());
                    for cell in cells {
                        lines.push(format!("- {}: {}", cell.coord().to_a1_notation(), cell.text));
                    }
                }
                let shapes: Vec<&TextCell> = sheet.shape_texts().collect();
                push_positioned(&mut lines, "Shapes Text", &shapes);
            }
        }

        if !sheet.images.is_empty() {
            lines.push(String::new());
            lines.push("### Images".to_string());
            for image in &sheet.images {
                lines.push(format!(
                    "![Image at r{} c{}]({}/{})",
                    image.anchor.row, image.anchor.col, self.images_dir, image.file_name
                ));
            }
        }

        if !sheet.smartart.is_empty() {
            lines.push(String::new());
            lines.push("### SmartArt".to_string());
            push_smartart(&mut lines, &sheet.smartart, 0);
        }

        let mut section = lines.join("\n");
        section.push_str("\n\n");
        section
    }
}

fn push_positioned(lines: &mut Vec<String>, heading: &str, texts: &[&TextCell]) {
    if texts.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push(format!("### {}", heading));
    for text in texts {
        lines.push(format!("- (r{}, c{}): {}", text.row, text.col, text.text));
    }
}

fn push_smartart(lines: &mut Vec<String>, nodes: &[SmartArtNode], depth: usize) {
    for node in nodes {
        lines.push(format!("{}- {}", "  ".repeat(depth), node.label()));
        push_smartart(lines, &node.children, depth + 1);
    }
}
