//! Builder Module
//!
//! Fluent Builder APIを提供し、`Extractor`インスタンスを段階的に構築する。

use chrono::NaiveDateTime;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::api::{SheetSelector, TextLayout};
use crate::error::XlsxVisionError;
use crate::formatter::CellFormatter;
use crate::output::{ImageStore, JsonReport, MarkdownAssembler, MarkdownDocument, DEFAULT_TITLE};
use crate::parser::WorkbookParser;
use crate::security::{is_plain_dir_name, sanitize_component, SecurityConfig};
use crate::types::{ShapeImage, SheetRecord, WorkbookContent};

/// Markdownの出力ファイル名
pub const MARKDOWN_FILE_NAME: &str = "converted.md";

/// JSONレポートの出力ファイル名
pub const JSON_FILE_NAME: &str = "extracted_data.json";

/// 抽出処理の設定を保持する内部構造体
#[derive(Debug, Clone)]
pub(crate) struct ExtractionConfig {
    /// シート選択方式
    pub sheet_selector: SheetSelector,

    /// セルテキストと図形テキストの出力レイアウト
    pub text_layout: TextLayout,

    /// SmartArtを抽出するか
    pub include_smartart: bool,

    /// ドキュメントタイトル
    pub title: String,

    /// 画像ディレクトリ名（出力ディレクトリからの相対パス）
    pub images_dir: String,

    /// 生成日時（Noneの場合は変換時のローカル時刻）
    pub timestamp: Option<NaiveDateTime>,

    /// `extracted_data.json`を書き出すか
    pub write_json: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            sheet_selector: SheetSelector::All,
            text_layout: TextLayout::Combined,
            include_smartart: true,
            title: DEFAULT_TITLE.to_string(),
            images_dir: "images".to_string(),
            timestamp: None,
            write_json: false,
        }
    }
}

/// Fluent Builder APIを提供する構造体
///
/// `Extractor`インスタンスを段階的に構築するためのビルダーです。
/// すべての設定項目にデフォルト値が設定されており、必要な設定のみをオーバーライドできます。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsxvision::{ExtractorBuilder, SheetSelector};
///
/// # fn main() -> Result<(), xlsxvision::XlsxVisionError> {
/// let extractor = ExtractorBuilder::new()
///     .with_sheet_selector(SheetSelector::Index(0))
///     .write_json(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ExtractorBuilder {
    /// 内部設定（構築中）
    config: ExtractionConfig,
}

impl Default for ExtractorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorBuilder {
    /// デフォルト設定を持つビルダーインスタンスを生成する
    ///
    /// # デフォルト設定
    ///
    /// - シート選択: すべてのシート
    /// - テキストレイアウト: セルと図形をまとめて`### Shapes Text`に出力
    /// - SmartArt: 抽出する
    /// - タイトル: `Excel to Markdown Conversion`
    /// - 画像ディレクトリ: `images`
    /// - JSONレポート: 書き出さない
    pub fn new() -> Self {
        Self {
            config: ExtractionConfig::default(),
        }
    }

    /// 抽出対象のシートを選択する
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use xlsxvision::{ExtractorBuilder, SheetSelector};
    ///
    /// let builder = ExtractorBuilder::new()
    ///     .with_sheet_selector(SheetSelector::Names(vec!["Summary".to_string()]));
    /// ```
    pub fn with_sheet_selector(mut self, selector: SheetSelector) -> Self {
        self.config.sheet_selector = selector;
        self
    }

    /// テキストの出力レイアウトを指定する
    pub fn with_text_layout(mut self, layout: TextLayout) -> Self {
        self.config.text_layout = layout;
        self
    }

    /// セルテキストを`### Cell Text`として分けて出力するか
    ///
    /// `with_text_layout(TextLayout::Split)`の省略形です。
    pub fn split_cell_text(self, split: bool) -> Self {
        self.with_text_layout(if split {
            TextLayout::Split
        } else {
            TextLayout::Combined
        })
    }

    /// SmartArtを抽出するか
    pub fn include_smartart(mut self, include: bool) -> Self {
        self.config.include_smartart = include;
        self
    }

    /// ドキュメントタイトルを指定する
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    /// 画像ディレクトリ名を指定する
    ///
    /// 単一のパス要素でなければなりません（`build()`時に検証）。
    pub fn with_images_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.images_dir = dir.into();
        self
    }

    /// `Generated on:`に出力する時刻を固定する
    ///
    /// 出力を比較するテストなどで使用します。
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.config.timestamp = Some(timestamp);
        self
    }

    /// `convert_file`で`extracted_data.json`も書き出すか
    pub fn write_json(mut self, write: bool) -> Self {
        self.config.write_json = write;
        self
    }

    /// 設定を検証し、`Extractor`インスタンスを生成する
    ///
    /// # 戻り値
    ///
    /// * `Ok(Extractor)`: 設定が有効な場合
    /// * `Err(XlsxVisionError::Config)`: 設定が無効な場合
    ///
    /// # 発生し得るエラー
    ///
    /// * タイトルが空、または改行を含む
    /// * 画像ディレクトリ名が単一のパス要素でない
    /// * シート選択のリストが空
    pub fn build(self) -> Result<Extractor, XlsxVisionError> {
        // 1. タイトルの検証
        if self.config.title.trim().is_empty() {
            return Err(XlsxVisionError::Config("Title must not be empty".to_string()));
        }
        if self.config.title.contains(|c: char| c == '\n' || c == '\r') {
            return Err(XlsxVisionError::Config(
                "Title must be a single line".to_string(),
            ));
        }

        // 2. 画像ディレクトリ名の検証
        if !is_plain_dir_name(&self.config.images_dir) {
            return Err(XlsxVisionError::Config(format!(
                "Invalid images directory name: '{}'",
                self.config.images_dir
            )));
        }

        // 3. シート選択の検証
        let empty_selection = match &self.config.sheet_selector {
            SheetSelector::Indices(indices) => indices.is_empty(),
            SheetSelector::Names(names) => names.is_empty(),
            _ => false,
        };
        if empty_selection {
            return Err(XlsxVisionError::Config(
                "Sheet selection must not be empty".to_string(),
            ));
        }

        Ok(Extractor::new(self.config))
    }
}

/// `convert_file`の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    /// 書き出したMarkdownファイル
    pub markdown_path: PathBuf,
    /// 画像ディレクトリ
    pub images_dir: PathBuf,
    /// 書き出したJSONレポート（無効の場合は`None`）
    pub json_path: Option<PathBuf>,
    pub sheet_count: usize,
    pub text_count: usize,
    pub image_count: usize,
}

/// 抽出処理のファサード
///
/// Excelファイルからテキスト・画像・SmartArtを抽出し、Markdownとして出力するための
/// メインエントリーポイントです。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsxvision::ExtractorBuilder;
///
/// # fn main() -> Result<(), xlsxvision::XlsxVisionError> {
/// let extractor = ExtractorBuilder::new().build()?;
/// let report = extractor.convert_file("book.xlsx", "output")?;
/// println!("{} images", report.image_count);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Extractor {
    /// 抽出設定
    config: ExtractionConfig,

    security: SecurityConfig,
}

impl Extractor {
    pub(crate) fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            security: SecurityConfig::default(),
        }
    }

    /// ワークブックの内容を抽出する
    ///
    /// 画像ファイル名は`{シート名}_img_{n}{拡張子}`の形式で割り当てます。
    /// `n`は抽出全体で1から始まる通し番号です。
    ///
    /// # 処理フロー
    ///
    /// 1. WorkbookParserの初期化（サイズ制限とZIPの検証を含む）
    /// 2. シート選択
    /// 3. 各シートについて処理（ループ）
    ///    - セルテキストの読み込み
    ///    - 描画レイヤー（図形テキスト・画像・SmartArt）の読み込み
    ///    - 画像ファイル名の割り当て
    pub fn extract<R: Read>(&self, input: R) -> Result<WorkbookContent, XlsxVisionError> {
        let mut parser = WorkbookParser::open(input, &self.security)?;
        let formatter = CellFormatter::new(parser.is_1904());

        let selected = parser.select_sheets(&self.config.sheet_selector)?;
        let targets: Vec<(usize, String, Option<String>)> = selected
            .into_iter()
            .map(|index| {
                let entry = &parser.sheets()[index];
                (index, entry.name.clone(), entry.part_path.clone())
            })
            .collect();

        let mut content = WorkbookContent {
            source_name: None,
            is_1904: parser.is_1904(),
            sheets: Vec::with_capacity(targets.len()),
        };
        let mut image_counter = 0usize;

        for (index, name, part_path) in targets {
            let mut record = SheetRecord::new(&name, index, part_path.clone().unwrap_or_default());
            record.texts = parser.cell_texts(&name, &formatter)?;

            match part_path {
                Some(part_path) => {
                    let drawing = parser.drawing_content(&part_path, self.config.include_smartart)?;
                    record.texts.extend(drawing.shapes);
                    record.smartart = drawing.smartart;

                    let prefix = sanitize_component(&name);
                    for picture in drawing.pictures {
                        image_counter += 1;
                        let file_name = format!(
                            "{}_img_{}{}",
                            prefix,
                            image_counter,
                            media_extension(&picture.part_path)
                        );
                        record.images.push(ShapeImage {
                            anchor: picture.anchor,
                            part_path: picture.part_path,
                            file_name,
                            data: picture.data,
                        });
                    }
                }
                None => {
                    tracing::warn!(sheet = %name, "worksheet part not found, skipping drawings");
                }
            }

            tracing::debug!(
                sheet = %record.name,
                texts = record.texts.len(),
                images = record.images.len(),
                smartart = record.smartart.len(),
                "extracted sheet"
            );
            content.sheets.push(record);
        }

        Ok(content)
    }

    /// 抽出結果をMarkdownドキュメントに組み立てる
    pub fn render(&self, content: &WorkbookContent) -> MarkdownDocument {
        self.assembler(self.timestamp()).render(content)
    }

    /// ExcelファイルをMarkdown形式に変換して書き出す
    ///
    /// 画像ファイルは書き出しません（参照リンクのみ出力されます）。
    /// 画像も含めて出力する場合は`convert_file`を使用してください。
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use xlsxvision::ExtractorBuilder;
    /// use std::fs::File;
    ///
    /// # fn main() -> Result<(), xlsxvision::XlsxVisionError> {
    /// let extractor = ExtractorBuilder::new().build()?;
    /// let input = File::open("example.xlsx")?;
    /// extractor.convert(input, std::io::stdout())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn convert<R: Read, W: Write>(&self, input: R, output: W) -> Result<(), XlsxVisionError> {
        let content = self.extract(input)?;
        self.render(&content).write_to(BufWriter::new(output))
    }

    /// ExcelファイルをMarkdown形式の文字列に変換
    pub fn convert_to_string<R: Read>(&self, input: R) -> Result<String, XlsxVisionError> {
        let content = self.extract(input)?;
        Ok(self.render(&content).to_markdown())
    }

    /// Excelファイルを出力ディレクトリへ変換する
    ///
    /// 出力ディレクトリには`converted.md`と画像ディレクトリ、
    /// 有効な場合は`extracted_data.json`が作成されます。
    ///
    /// # 戻り値
    ///
    /// * `Ok(ConversionReport)` - 変換に成功した場合
    /// * `Err(XlsxVisionError::InputNotFound)` - 入力ファイルが存在しない場合
    pub fn convert_file(
        &self,
        input: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<ConversionReport, XlsxVisionError> {
        let input = input.as_ref();
        let output_dir = output_dir.as_ref();
        if !input.is_file() {
            return Err(XlsxVisionError::InputNotFound(input.to_path_buf()));
        }

        tracing::info!(input = %input.display(), "extracting workbook");
        let mut content = self.extract(BufReader::new(File::open(input)?))?;
        content.source_name = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        fs::create_dir_all(output_dir)?;
        let store = ImageStore::new(output_dir.join(&self.config.images_dir));
        let image_count = store.persist(&mut content)?;

        // MarkdownとJSONで同じ時刻を使う
        let generated = self.timestamp();
        let markdown_path = output_dir.join(MARKDOWN_FILE_NAME);
        self.assembler(generated)
            .render(&content)
            .write_to(BufWriter::new(File::create(&markdown_path)?))?;

        let json_path = if self.config.write_json {
            let path = output_dir.join(JSON_FILE_NAME);
            let created = generated.format("%Y-%m-%dT%H:%M:%S").to_string();
            JsonReport::new(&content, &created).write_to(BufWriter::new(File::create(&path)?))?;
            Some(path)
        } else {
            None
        };

        let report = ConversionReport {
            markdown_path,
            images_dir: store.dir().to_path_buf(),
            json_path,
            sheet_count: content.sheets.len(),
            text_count: content.text_count(),
            image_count,
        };
        tracing::info!(
            sheets = report.sheet_count,
            texts = report.text_count,
            images = report.image_count,
            output = %report.markdown_path.display(),
            "conversion finished"
        );
        Ok(report)
    }

    fn timestamp(&self) -> NaiveDateTime {
        self.config
            .timestamp
            .unwrap_or_else(|| chrono::Local::now().naive_local())
    }

    fn assembler(&self, generated: NaiveDateTime) -> MarkdownAssembler {
        let mut assembler =
            MarkdownAssembler::new(generated.format("%Y-%m-%d %H:%M:%S").to_string());
        assembler.title = self.config.title.clone();
        assembler.images_dir = self.config.images_dir.clone();
        assembler.layout = self.config.text_layout;
        assembler
    }
}

/// メディアパートの拡張子（ドット付き、なければ`.bin`）
fn media_extension(part_path: &str) -> String {
    Path::new(part_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| ".bin".to_string())
}
