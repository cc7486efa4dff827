//! Workbook Parser Module
//!
//! calamineによるセル値の読み込みと、パッケージ解析による描画レイヤー
//! （画像・図形テキスト・SmartArt）の読み込みをまとめるモジュール。

use calamine::{open_workbook_auto_from_rs, Data, Reader, Sheets, Xlsx};
use std::io::{Cursor, Read};

use crate::api::SheetSelector;
use crate::error::XlsxVisionError;
use crate::formatter::CellFormatter;
use crate::parser::drawing::{parse_drawing, DrawingItem};
use crate::parser::package::{SheetEntry, WorkbookInfo, XlsxPackage};
use crate::parser::smartart::parse_smartart;
use crate::security::SecurityConfig;
use crate::types::{Anchor, SmartArtNode, TextCell};

/// 描画パートから取り出した画像（ファイル名は未割り当て）
#[derive(Debug, Clone)]
pub(crate) struct RawPicture {
    pub anchor: Anchor,
    pub part_path: String,
    pub data: Vec<u8>,
}

/// 1シート分の描画レイヤーの内容
#[derive(Debug, Default)]
pub(crate) struct DrawingContent {
    pub shapes: Vec<TextCell>,
    pub pictures: Vec<RawPicture>,
    pub smartart: Vec<SmartArtNode>,
}

/// ワークブックパーサー
///
/// calamineのワークブックと、同じバイト列から開いたパッケージを保持します。
pub(crate) struct WorkbookParser {
    /// calamineのワークブック（XLSX形式のみサポート）
    workbook: Xlsx<Cursor<Vec<u8>>>,
    package: XlsxPackage,
    info: WorkbookInfo,
}

impl WorkbookParser {
    /// ワークブックを開く
    ///
    /// 入力全体をメモリに読み込み、サイズ制限とZIPの制限を検証してから
    /// calamineとパッケージの両方で開きます。
    ///
    /// # 戻り値
    ///
    /// * `Ok(WorkbookParser)` - 読み込みに成功した場合
    /// * `Err(XlsxVisionError::SecurityViolation)` - 制限に違反した場合
    /// * `Err(XlsxVisionError::Config)` - XLSX以外の形式の場合
    pub fn open<R: Read>(reader: R, security: &SecurityConfig) -> Result<Self, XlsxVisionError> {
        let buffer = security.read_input(reader)?;

        let mut package = XlsxPackage::open(buffer.clone(), security)?;

        let sheets = open_workbook_auto_from_rs(Cursor::new(buffer))?;
        let workbook = match sheets {
            Sheets::Xlsx(workbook) => workbook,
            _ => {
                return Err(XlsxVisionError::Config(
                    "Only XLSX format is supported".to_string(),
                ))
            }
        };

        let info = package.workbook_info()?;
        tracing::debug!(
            sheets = info.sheets.len(),
            is_1904 = info.is_1904,
            "opened workbook"
        );

        Ok(Self {
            workbook,
            package,
            info,
        })
    }

    /// 1904年エポックを使用しているか
    pub fn is_1904(&self) -> bool {
        self.info.is_1904
    }

    /// ワークブック内の順序でのシート一覧
    pub fn sheets(&self) -> &[SheetEntry] {
        &self.info.sheets
    }

    /// シート選択方式に基づいてシートを選択
    ///
    /// # 戻り値
    ///
    /// * `Ok(Vec<usize>)` - 選択されたシートのインデックス（ワークブック内の順序、重複なし）
    /// * `Err(XlsxVisionError::Config)` - シートが見つからない、またはインデックスが範囲外の場合
    pub fn select_sheets(&self, selector: &SheetSelector) -> Result<Vec<usize>, XlsxVisionError> {
        let total = self.info.sheets.len();
        let by_index = |index: usize| {
            if index < total {
                Ok(index)
            } else {
                Err(XlsxVisionError::Config(format!(
                    "Sheet index {} is out of range (total: {})",
                    index, total
                )))
            }
        };
        let by_name = |name: &str| {
            self.info
                .sheets
                .iter()
                .position(|s| s.name == name)
                .ok_or_else(|| XlsxVisionError::Config(format!("Sheet '{}' not found", name)))
        };

        let mut selected = match selector {
            SheetSelector::All => (0..total).collect(),
            SheetSelector::Index(index) => vec![by_index(*index)?],
            SheetSelector::Name(name) => vec![by_name(name)?],
            SheetSelector::Indices(indices) => indices
                .iter()
                .map(|&i| by_index(i))
                .collect::<Result<Vec<_>, _>>()?,
            SheetSelector::Names(names) => names
                .iter()
                .map(|n| by_name(n))
                .collect::<Result<Vec<_>, _>>()?,
        };
        selected.sort_unstable();
        selected.dedup();
        Ok(selected)
    }

    /// シートの空でないセルを行優先で取得
    ///
    /// セル範囲が読み込めないシート（チャートシートなど）は警告を出して空のリストを返します。
    pub fn cell_texts(
        &mut self,
        sheet_name: &str,
        formatter: &CellFormatter,
    ) -> Result<Vec<TextCell>, XlsxVisionError> {
        let range = match self.workbook.worksheet_range(sheet_name) {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!(sheet = %sheet_name, error = %e, "cannot read cell range, skipping cells");
                return Ok(Vec::new());
            }
        };

        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        let mut texts = Vec::new();
        for (row, col, cell) in range.used_cells() {
            if matches!(cell, Data::Empty) {
                continue;
            }
            let text = match formatter.format_cell(cell) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(sheet = %sheet_name, row, col, error = %e, "skipping cell");
                    continue;
                }
            };
            if text.trim().is_empty() {
                continue;
            }
            texts.push(TextCell::cell(
                start_row + row as u32,
                start_col + col as u32,
                text,
            ));
        }
        Ok(texts)
    }

    /// シートの描画レイヤーを読み込む
    ///
    /// 描画パートやメディアの破損は警告を出してスキップします。
    pub fn drawing_content(
        &mut self,
        sheet_part: &str,
        include_smartart: bool,
    ) -> Result<DrawingContent, XlsxVisionError> {
        let mut content = DrawingContent::default();

        let drawing_parts: Vec<String> = self
            .package
            .relationships(sheet_part)?
            .into_iter()
            .filter(|r| !r.external && r.is_kind("drawing"))
            .map(|r| r.target)
            .collect();

        for drawing_part in drawing_parts {
            if let Err(e) = self.read_drawing(&drawing_part, include_smartart, &mut content) {
                tracing::warn!(part = %drawing_part, error = %e, "skipping unreadable drawing");
            }
        }

        Ok(content)
    }

    fn read_drawing(
        &mut self,
        drawing_part: &str,
        include_smartart: bool,
        content: &mut DrawingContent,
    ) -> Result<(), XlsxVisionError> {
        let xml = self.package.read_part(drawing_part)?.ok_or_else(|| {
            XlsxVisionError::Zip(format!("Missing drawing part: {}", drawing_part))
        })?;
        let items = parse_drawing(&xml, drawing_part)?;
        let rels = self.package.relationships(drawing_part)?;
        let target_of = |id: &str| {
            rels.iter()
                .find(|r| r.id == id && !r.external)
                .map(|r| r.target.clone())
        };

        for item in items {
            match item {
                DrawingItem::Shape { anchor, text } => {
                    content.shapes.push(TextCell::shape(anchor, text));
                }
                DrawingItem::Picture { anchor, embed } => {
                    let Some(part_path) = target_of(&embed) else {
                        tracing::warn!(part = %drawing_part, rel = %embed, "image relationship not found");
                        continue;
                    };
                    match self.package.read_part(&part_path) {
                        Ok(Some(data)) => content.pictures.push(RawPicture {
                            anchor,
                            part_path,
                            data,
                        }),
                        Ok(None) => {
                            tracing::warn!(media = %part_path, "media part missing, skipping image");
                        }
                        Err(e) => {
                            tracing::warn!(media = %part_path, error = %e, "cannot read media, skipping image");
                        }
                    }
                }
                DrawingItem::Diagram { data_model, .. } if include_smartart => {
                    let Some(part_path) = target_of(&data_model) else {
                        tracing::warn!(part = %drawing_part, rel = %data_model, "diagram data relationship not found");
                        continue;
                    };
                    match self.read_smartart(&part_path) {
                        Ok(nodes) => content.smartart.extend(nodes),
                        Err(e) => {
                            tracing::warn!(part = %part_path, error = %e, "skipping unreadable SmartArt");
                        }
                    }
                }
                DrawingItem::Diagram { .. } => {}
            }
        }

        Ok(())
    }

    fn read_smartart(&mut self, part_path: &str) -> Result<Vec<SmartArtNode>, XlsxVisionError> {
        let xml = self
            .package
            .read_part(part_path)?
            .ok_or_else(|| XlsxVisionError::Zip(format!("Missing diagram part: {}", part_path)))?;
        parse_smartart(&xml, part_path)
    }
}

// 実際のXLSXファイルが必要なテストは統合テスト（tests/）で実装します。
