//! Types Module
//!
//! クレート全体で使用する共通データ型を定義するモジュール。
//! 抽出結果（`WorkbookContent`）はMarkdown出力とJSON出力の両方で共有されます。

use serde::Serialize;

/// セル座標（0始まり）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CellCoord {
    pub row: u32,
    pub col: u32,
}

impl CellCoord {
    /// 新しい座標を生成
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// A1形式の文字列に変換（例: (0, 0) -> "A1"）
    #[allow(clippy::wrong_self_convention)]
    pub fn to_a1_notation(&self) -> String {
        let col_str = Self::col_index_to_letter(self.col);
        format!("{}{}", col_str, self.row + 1)
    }

    /// 列インデックスを文字列に変換（0 -> "A", 25 -> "Z", 26 -> "AA"）
    fn col_index_to_letter(mut col: u32) -> String {
        let mut result = String::new();
        loop {
            let remainder = col % 26;
            result.insert(0, (b'A' + remainder as u8) as char);
            if col < 26 {
                break;
            }
            col = col / 26 - 1;
        }
        result
    }
}

/// テキストの出所
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextOrigin {
    /// ワークシートのセル
    Cell,
    /// 描画レイヤー上の図形（テキストボックスなど）
    Shape,
}

/// シート上の位置を持つテキスト
///
/// セル由来の場合はセル座標、図形由来の場合はアンカーの`from`位置を持ちます。
/// テキストは加工せずに保持します（図形テキストのみ、ラン単位でトリムして
/// 空白1つで連結した結果になります）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextCell {
    pub row: u32,
    pub col: u32,
    pub text: String,
    pub origin: TextOrigin,
}

impl TextCell {
    /// セル由来のテキストを生成
    pub fn cell(row: u32, col: u32, text: impl Into<String>) -> Self {
        Self {
            row,
            col,
            text: text.into(),
            origin: TextOrigin::Cell,
        }
    }

    /// 図形由来のテキストを生成
    pub fn shape(anchor: Anchor, text: impl Into<String>) -> Self {
        Self {
            row: anchor.row,
            col: anchor.col,
            text: text.into(),
            origin: TextOrigin::Shape,
        }
    }

    pub fn coord(&self) -> CellCoord {
        CellCoord::new(self.row, self.col)
    }

    pub fn is_shape(&self) -> bool {
        self.origin == TextOrigin::Shape
    }
}

/// 描画アンカーの開始位置
///
/// `xdr:from`要素の値です。オフセットはEMU単位。
/// `xdr:from`を持たないアンカー（`absoluteAnchor`など）はすべて0になります。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Anchor {
    pub row: u32,
    pub col: u32,
    pub row_off: i64,
    pub col_off: i64,
}

impl Anchor {
    pub fn new(row: u32, col: u32) -> Self {
        Self {
            row,
            col,
            ..Self::default()
        }
    }
}

/// 図形として配置された画像
///
/// `file_name`は抽出時に一意に割り当てられます。バイト列は画像ストアが
/// ディスクへ書き出した時点で破棄されます。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeImage {
    #[serde(flatten)]
    pub anchor: Anchor,
    /// パッケージ内のメディアパス（例: `xl/media/image1.png`）
    pub part_path: String,
    /// 出力ファイル名（例: `Sheet1_img_1.png`）
    pub file_name: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ShapeImage {
    /// 画像データを取り出し、保持していたバッファを空にする
    pub fn take_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

/// SmartArtの階層ノード
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmartArtNode {
    pub id: String,
    pub text: String,
    pub children: Vec<SmartArtNode>,
}

impl SmartArtNode {
    /// 表示用ラベル（テキストが空なら`(id: X)`）
    pub fn label(&self) -> String {
        if self.text.is_empty() {
            format!("(id: {})", self.id)
        } else {
            self.text.clone()
        }
    }
}

/// 1シート分の抽出結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetRecord {
    pub name: String,
    /// ワークブック内での位置（0始まり）
    pub index: usize,
    /// ワークシートのパート（例: `xl/worksheets/sheet1.xml`）
    #[serde(skip)]
    pub part_path: String,
    pub texts: Vec<TextCell>,
    pub images: Vec<ShapeImage>,
    pub smartart: Vec<SmartArtNode>,
}

impl SheetRecord {
    pub fn new(name: impl Into<String>, index: usize, part_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index,
            part_path: part_path.into(),
            texts: Vec::new(),
            images: Vec::new(),
            smartart: Vec::new(),
        }
    }

    /// テキスト・画像・SmartArtのいずれも持たないか
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.images.is_empty() && self.smartart.is_empty()
    }

    pub fn cell_texts(&self) -> impl Iterator<Item = &TextCell> {
        self.texts.iter().filter(|t| !t.is_shape())
    }

    pub fn shape_texts(&self) -> impl Iterator<Item = &TextCell> {
        self.texts.iter().filter(|t| t.is_shape())
    }
}

/// ワークブック全体の抽出結果
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WorkbookContent {
    /// 入力ファイル名（ストリームから抽出した場合は`None`）
    pub source_name: Option<String>,
    /// 1904年基準の日付システムを使用しているか
    pub is_1904: bool,
    /// シートの抽出結果（ワークブック内の順序）
    pub sheets: Vec<SheetRecord>,
}

impl WorkbookContent {
    /// すべてのシートの画像数
    pub fn image_count(&self) -> usize {
        self.sheets.iter().map(|s| s.images.len()).sum()
    }

    /// すべてのシートのテキスト数
    pub fn text_count(&self) -> usize {
        self.sheets.iter().map(|s| s.texts.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_coord_to_a1_notation() {
        assert_eq!(CellCoord::new(0, 0).to_a1_notation(), "A1");
        assert_eq!(CellCoord::new(0, 25).to_a1_notation(), "Z1");
        assert_eq!(CellCoord::new(0, 26).to_a1_notation(), "AA1");
        assert_eq!(CellCoord::new(99, 701).to_a1_notation(), "ZZ100");
        assert_eq!(CellCoord::new(0, 51).to_a1_notation(), "AZ1");
        assert_eq!(CellCoord::new(0, 52).to_a1_notation(), "BA1");
        assert_eq!(CellCoord::new(0, 702).to_a1_notation(), "AAA1");
    }

    #[test]
    fn test_text_cell_constructors() {
        let cell = TextCell::cell(2, 3, "Revenue");
        assert_eq!(cell.coord().to_a1_notation(), "D3");
        assert!(!cell.is_shape());

        let shape = TextCell::shape(Anchor::new(5, 1), "Note");
        assert_eq!((shape.row, shape.col), (5, 1));
        assert!(shape.is_shape());
    }

    #[test]
    fn test_shape_image_take_data() {
        let mut image = ShapeImage {
            anchor: Anchor::default(),
            part_path: "xl/media/image1.png".to_string(),
            file_name: "Sheet1_img_1.png".to_string(),
            data: vec![1, 2, 3],
        };
        assert_eq!(image.take_data(), vec![1, 2, 3]);
        assert!(image.data.is_empty());
    }

    #[test]
    fn test_smartart_label() {
        let named = SmartArtNode {
            id: "1".to_string(),
            text: "Root".to_string(),
            children: vec![],
        };
        let unnamed = SmartArtNode {
            id: "{A2}".to_string(),
            text: String::new(),
            children: vec![],
        };
        assert_eq!(named.label(), "Root");
        assert_eq!(unnamed.label(), "(id: {A2})");
    }

    #[test]
    fn test_sheet_record_text_partition() {
        let mut sheet = SheetRecord::new("Data", 0, "xl/worksheets/sheet1.xml");
        assert!(sheet.is_empty());
        sheet.texts.push(TextCell::cell(0, 0, "a"));
        sheet.texts.push(TextCell::shape(Anchor::new(1, 1), "b"));
        sheet.texts.push(TextCell::cell(1, 0, "c"));

        assert_eq!(sheet.cell_texts().count(), 2);
        assert_eq!(sheet.shape_texts().count(), 1);
        assert!(!sheet.is_empty());
    }

    #[test]
    fn test_image_serialization_skips_bytes() {
        let image = ShapeImage {
            anchor: Anchor::new(3, 4),
            part_path: "xl/media/image2.jpeg".to_string(),
            file_name: "Data_img_2.jpeg".to_string(),
            data: vec![0xFF; 16],
        };
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["row"], 3);
        assert_eq!(json["col"], 4);
        assert_eq!(json["file_name"], "Data_img_2.jpeg");
        assert!(json.get("data").is_none());
    }

    // プロパティベーステスト
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_a1_notation_shape(row in 0u32..10000, col in 0u32..10000) {
                let a1 = CellCoord::new(row, col).to_a1_notation();

                let letters: String = a1.chars().take_while(|c| c.is_ascii_uppercase()).collect();
                let digits = &a1[letters.len()..];

                prop_assert!(!letters.is_empty());
                prop_assert!(digits.chars().all(|c| c.is_ascii_digit()));

                let row_num: u32 = digits.parse().unwrap();
                prop_assert_eq!(row_num, row + 1);

                // 列文字列を26進数（A=1）として戻すと元の列番号になる
                let col_back = letters
                    .bytes()
                    .fold(0u32, |acc, b| acc * 26 + u32::from(b - b'A' + 1))
                    - 1;
                prop_assert_eq!(col_back, col);
            }
        }
    }
}
