//! OOXML Package Module
//!
//! XLSXファイル（ZIPアーカイブ）を直接読み込み、calamineでは取得できない
//! パッケージ構造（シートとパートの対応、リレーションシップ、描画、メディア）を提供します。

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::XlsxVisionError;
use crate::security::SecurityConfig;

const WORKBOOK_PART: &str = "xl/workbook.xml";

/// リレーションシップ（`*.rels`の`Relationship`要素）
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    /// パッケージルートからの正規化済みパス（外部リンクの場合は`Target`そのまま）
    pub target: String,
    pub external: bool,
}

impl Relationship {
    /// Type属性の末尾（例: `.../relationships/drawing` -> `drawing`）が一致するか
    pub fn is_kind(&self, kind: &str) -> bool {
        self.rel_type
            .rsplit('/')
            .next()
            .is_some_and(|tail| tail == kind)
    }
}

/// ワークブックに登録されたシート
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetEntry {
    pub name: String,
    /// ワークシートのパート（リレーションシップが解決できない場合は`None`）
    pub part_path: Option<String>,
}

/// `xl/workbook.xml`から得られる情報
#[derive(Debug, Clone, Default)]
pub(crate) struct WorkbookInfo {
    pub sheets: Vec<SheetEntry>,
    pub is_1904: bool,
}

/// XLSXパッケージ
///
/// 生成時にセキュリティ制限を検証済みのZIPアーカイブを保持します。
pub(crate) struct XlsxPackage {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl XlsxPackage {
    /// メモリ上のXLSXデータからパッケージを開く
    ///
    /// # 戻り値
    ///
    /// * `Ok(XlsxPackage)` - ZIPとして読み込め、セキュリティ制限を満たした場合
    /// * `Err(XlsxVisionError::Zip)` - ZIPとして不正な場合
    /// * `Err(XlsxVisionError::SecurityViolation)` - 制限に違反した場合
    pub fn open(buffer: Vec<u8>, security: &SecurityConfig) -> Result<Self, XlsxVisionError> {
        let mut archive = ZipArchive::new(Cursor::new(buffer))?;
        security.check_archive(&mut archive)?;
        Ok(Self { archive })
    }

    /// パートの内容を読み込む（存在しない場合は`None`）
    pub fn read_part(&mut self, path: &str) -> Result<Option<Vec<u8>>, XlsxVisionError> {
        let mut file = match self.archive.by_name(path) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut content = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut content)?;
        Ok(Some(content))
    }

    /// `xl/workbook.xml`を解析し、シート一覧と日付システムを取得する
    ///
    /// シートはワークブック内の順序で返します。
    pub fn workbook_info(&mut self) -> Result<WorkbookInfo, XlsxVisionError> {
        let xml = self.read_part(WORKBOOK_PART)?.ok_or_else(|| {
            XlsxVisionError::Zip(format!("Missing workbook part: {}", WORKBOOK_PART))
        })?;
        let (declared, is_1904) = parse_workbook_xml(&xml)?;
        let rels = self.relationships(WORKBOOK_PART)?;

        let sheets = declared
            .into_iter()
            .map(|(name, rel_id)| {
                let part_path = rel_id.and_then(|id| {
                    rels.iter()
                        .find(|r| r.id == id && !r.external && r.is_kind("worksheet"))
                        .map(|r| r.target.clone())
                });
                if part_path.is_none() {
                    tracing::debug!(sheet = %name, "sheet has no worksheet relationship");
                }
                SheetEntry { name, part_path }
            })
            .collect();

        Ok(WorkbookInfo { sheets, is_1904 })
    }

    /// 指定パートのリレーションシップを取得する
    ///
    /// `.rels`パートが存在しない場合は空のリストを返します。
    pub fn relationships(&mut self, part_path: &str) -> Result<Vec<Relationship>, XlsxVisionError> {
        let rels_path = rels_path_for(part_path);
        match self.read_part(&rels_path)? {
            Some(xml) => parse_relationships(&xml, &rels_path, part_path),
            None => Ok(Vec::new()),
        }
    }
}

/// パートに対応する`.rels`パートのパス
///
/// `xl/worksheets/sheet1.xml` -> `xl/worksheets/_rels/sheet1.xml.rels`
pub(crate) fn rels_path_for(part_path: &str) -> String {
    match part_path.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part_path),
    }
}

/// リレーションシップのターゲットをパッケージルートからのパスに解決する
///
/// 相対ターゲットはソースパートのディレクトリを基準にし、`.`と`..`を正規化します。
/// `/`で始まるターゲットはパッケージルートからの絶対パスです。
pub(crate) fn resolve_target(source_part: &str, target: &str) -> String {
    let joined = if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else {
        match source_part.rsplit_once('/') {
            Some((dir, _)) => format!("{}/{}", dir, target),
            None => target.to_string(),
        }
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// `xl/workbook.xml`から（シート名, r:id）の一覧とdate1904フラグを取得
fn parse_workbook_xml(xml: &[u8]) -> Result<(Vec<(String, Option<String>)>, bool), XlsxVisionError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut is_1904 = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"workbookPr" => {
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| XlsxVisionError::xml(WORKBOOK_PART, e))?;
                        if attr.key.local_name().as_ref() == b"date1904" {
                            let value = std::str::from_utf8(&attr.value)?;
                            is_1904 = value == "1" || value == "true";
                        }
                    }
                }
                b"sheet" => {
                    let mut name = None;
                    let mut rel_id = None;
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| XlsxVisionError::xml(WORKBOOK_PART, e))?;
                        let value = attr
                            .decode_and_unescape_value(&reader)
                            .map_err(|e| XlsxVisionError::xml(WORKBOOK_PART, e))?
                            .into_owned();
                        match attr.key.local_name().as_ref() {
                            b"name" => name = Some(value),
                            // r:id（名前空間プレフィックスは問わない）
                            b"id" => rel_id = Some(value),
                            _ => {}
                        }
                    }
                    if let Some(name) = name {
                        sheets.push((name, rel_id));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxVisionError::xml(WORKBOOK_PART, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok((sheets, is_1904))
}

/// `.rels`パートを解析する
fn parse_relationships(
    xml: &[u8],
    rels_path: &str,
    source_part: &str,
) -> Result<Vec<Relationship>, XlsxVisionError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut relationships = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let mut id = None;
                    let mut rel_type = String::new();
                    let mut target = None;
                    let mut external = false;

                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| XlsxVisionError::xml(rels_path, e))?;
                        let value = attr
                            .decode_and_unescape_value(&reader)
                            .map_err(|e| XlsxVisionError::xml(rels_path, e))?
                            .into_owned();
                        match attr.key.as_ref() {
                            b"Id" => id = Some(value),
                            b"Type" => rel_type = value,
                            b"Target" => target = Some(value),
                            b"TargetMode" => external = value.eq_ignore_ascii_case("External"),
                            _ => {}
                        }
                    }

                    // IdまたはTargetが欠落している場合はスキップ
                    if let (Some(id), Some(target)) = (id, target) {
                        let target = if external {
                            target
                        } else {
                            resolve_target(source_part, &target)
                        };
                        relationships.push(Relationship {
                            id,
                            rel_type,
                            target,
                            external,
                        });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxVisionError::xml(rels_path, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_support::build_package;

    const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet1.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <workbookPr date1904="1"/>
  <sheets>
    <sheet name="R&amp;D" sheetId="1" r:id="rId1"/>
    <sheet name="Second" sheetId="2" r:id="rId2"/>
    <sheet name="Orphan" sheetId="3" r:id="rId9"/>
  </sheets>
</workbook>"#;

    #[test]
    fn test_rels_path_for() {
        assert_eq!(
            rels_path_for("xl/worksheets/sheet1.xml"),
            "xl/worksheets/_rels/sheet1.xml.rels"
        );
        assert_eq!(rels_path_for("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(rels_path_for("root.xml"), "_rels/root.xml.rels");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../drawings/drawing1.xml"),
            "xl/drawings/drawing1.xml"
        );
        assert_eq!(
            resolve_target("xl/drawings/drawing1.xml", "./../media/./image1.png"),
            "xl/media/image1.png"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/worksheets/sheet3.xml"),
            "xl/worksheets/sheet3.xml"
        );
        // ルートより上には出ない
        assert_eq!(resolve_target("xl/a.xml", "../../../etc/x"), "etc/x");
    }

    #[test]
    fn test_workbook_info_order_and_epoch() {
        let data = build_package(&[
            ("xl/workbook.xml", WORKBOOK.as_bytes()),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes()),
        ]);
        let mut package = XlsxPackage::open(data, &SecurityConfig::default()).unwrap();
        let info = package.workbook_info().unwrap();

        assert!(info.is_1904);
        let names: Vec<_> = info.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["R&D", "Second", "Orphan"]);
        assert_eq!(
            info.sheets[0].part_path.as_deref(),
            Some("xl/worksheets/sheet1.xml")
        );
        assert_eq!(
            info.sheets[1].part_path.as_deref(),
            Some("xl/worksheets/sheet2.xml")
        );
        assert_eq!(info.sheets[2].part_path, None);
    }

    #[test]
    fn test_relationships_external_and_missing() {
        let rels = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/a?b=1&amp;c=2" TargetMode="External"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing" Target="../drawings/drawing1.xml"/>
</Relationships>"#;
        let data = build_package(&[("xl/worksheets/_rels/sheet1.xml.rels", rels.as_bytes())]);
        let mut package = XlsxPackage::open(data, &SecurityConfig::default()).unwrap();

        let found = package.relationships("xl/worksheets/sheet1.xml").unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].external);
        assert_eq!(found[0].target, "https://example.com/a?b=1&c=2");
        assert!(found[1].is_kind("drawing"));
        assert_eq!(found[1].target, "xl/drawings/drawing1.xml");

        assert!(package
            .relationships("xl/worksheets/sheet2.xml")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_missing_workbook_part() {
        let data = build_package(&[("docProps/app.xml", b"<Properties/>".as_slice())]);
        let mut package = XlsxPackage::open(data, &SecurityConfig::default()).unwrap();
        assert!(matches!(
            package.workbook_info(),
            Err(XlsxVisionError::Zip(_))
        ));
        assert_eq!(package.read_part("xl/media/none.png").unwrap(), None);
    }

    #[test]
    fn test_malformed_workbook_xml() {
        let data = build_package(&[("xl/workbook.xml", b"<workbook><sheets></workbook>".as_slice())]);
        let mut package = XlsxPackage::open(data, &SecurityConfig::default()).unwrap();
        assert!(matches!(
            package.workbook_info(),
            Err(XlsxVisionError::Xml { .. })
        ));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            XlsxPackage::open(b"plain text".to_vec(), &SecurityConfig::default()),
            Err(XlsxVisionError::Zip(_))
        ));
    }
}
