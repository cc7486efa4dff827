//! Drawing Parser Module
//!
//! 描画パート（`xl/drawings/drawingN.xml`）を解析し、アンカーごとに
//! 画像・図形テキスト・SmartArt参照を文書順に取り出すモジュール。

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::XlsxVisionError;
use crate::types::Anchor;

/// 描画レイヤー上の要素
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DrawingItem {
    /// `xdr:pic`（`a:blip/@r:embed`のリレーションシップID）
    Picture { anchor: Anchor, embed: String },
    /// テキストを持つ`xdr:sp`
    Shape { anchor: Anchor, text: String },
    /// SmartArtの`xdr:graphicFrame`（`dgm:relIds/@r:dm`のリレーションシップID）
    Diagram { anchor: Anchor, data_model: String },
}

/// `xdr:from`の子要素
#[derive(Debug, Clone, Copy)]
enum FromField {
    Col,
    ColOff,
    Row,
    RowOff,
}

/// 解析中の`xdr:sp`のテキスト
#[derive(Debug, Default)]
struct ShapeText {
    runs: Vec<String>,
    current: Option<String>,
}

impl ShapeText {
    /// ランごとにトリムし、空でないものを空白1つで連結
    fn finish(self) -> String {
        self.runs
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn is_anchor(name: &[u8]) -> bool {
    matches!(name, b"twoCellAnchor" | b"oneCellAnchor" | b"absoluteAnchor")
}

/// 要素から、ローカル名が一致する属性の値を取得
pub(crate) fn attr_value(
    e: &BytesStart<'_>,
    local: &[u8],
    part: &str,
) -> Result<Option<String>, XlsxVisionError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XlsxVisionError::xml(part, err))?;
        if attr.key.local_name().as_ref() == local {
            let value = attr
                .decode_and_unescape_value(&Reader::from_reader(&b""[..]))
                .map_err(|err| XlsxVisionError::xml(part, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// 描画パートを解析する
///
/// # 引数
///
/// * `xml` - 描画パートの内容
/// * `part` - 描画パートのパス（エラーメッセージ用）
///
/// # 戻り値
///
/// アンカーの文書順に並んだ`DrawingItem`のリスト。
/// グループ（`xdr:grpSp`）内の図形・画像も個別の要素として返し、
/// アンカー位置はグループを含むアンカーのものを使います。
pub(crate) fn parse_drawing(xml: &[u8], part: &str) -> Result<Vec<DrawingItem>, XlsxVisionError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut items = Vec::new();

    let mut anchor: Option<Anchor> = None;
    let mut in_from = false;
    let mut from_field: Option<FromField> = None;
    let mut pic_depth = 0usize;
    let mut pic_has_blip = false;
    let mut shape: Option<ShapeText> = None;
    let mut in_diagram = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if is_anchor(name) {
                    anchor = Some(Anchor::default());
                } else if let Some(current) = anchor {
                    match name {
                        b"from" => in_from = true,
                        b"col" if in_from => from_field = Some(FromField::Col),
                        b"colOff" if in_from => from_field = Some(FromField::ColOff),
                        b"row" if in_from => from_field = Some(FromField::Row),
                        b"rowOff" if in_from => from_field = Some(FromField::RowOff),
                        b"pic" => {
                            pic_depth += 1;
                            pic_has_blip = false;
                        }
                        b"sp" => shape = Some(ShapeText::default()),
                        b"t" => {
                            if let Some(shape) = shape.as_mut() {
                                shape.current = Some(String::new());
                            }
                        }
                        b"graphicData" => {
                            in_diagram = attr_value(&e, b"uri", part)?
                                .is_some_and(|uri| uri.ends_with("/diagram"));
                        }
                        _ => {
                            handle_reference(
                                &e,
                                current,
                                pic_depth,
                                &mut pic_has_blip,
                                in_diagram,
                                part,
                                &mut items,
                            )?;
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(current) = anchor {
                    handle_reference(
                        &e,
                        current,
                        pic_depth,
                        &mut pic_has_blip,
                        in_diagram,
                        part,
                        &mut items,
                    )?;
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| XlsxVisionError::xml(part, e))?;
                if let (Some(field), Some(current)) = (from_field, anchor.as_mut()) {
                    let value = text.trim();
                    match field {
                        FromField::Col => current.col = value.parse().unwrap_or(0),
                        FromField::Row => current.row = value.parse().unwrap_or(0),
                        FromField::ColOff => current.col_off = value.parse().unwrap_or(0),
                        FromField::RowOff => current.row_off = value.parse().unwrap_or(0),
                    }
                } else if let Some(run) = shape.as_mut().and_then(|s| s.current.as_mut()) {
                    run.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    n if is_anchor(n) => {
                        anchor = None;
                        in_from = false;
                        from_field = None;
                        pic_depth = 0;
                        shape = None;
                        in_diagram = false;
                    }
                    b"from" => in_from = false,
                    b"col" | b"colOff" | b"row" | b"rowOff" => from_field = None,
                    b"pic" => pic_depth = pic_depth.saturating_sub(1),
                    b"t" => {
                        if let Some(shape) = shape.as_mut() {
                            if let Some(run) = shape.current.take() {
                                shape.runs.push(run);
                            }
                        }
                    }
                    b"sp" => {
                        if let (Some(finished), Some(current)) = (shape.take(), anchor) {
                            let text = finished.finish();
                            if !text.is_empty() {
                                items.push(DrawingItem::Shape {
                                    anchor: current,
                                    text,
                                });
                            }
                        }
                    }
                    b"graphicData" => in_diagram = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxVisionError::xml(part, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

/// `a:blip`と`dgm:relIds`のリレーションシップ参照を取り出す
fn handle_reference(
    e: &BytesStart<'_>,
    anchor: Anchor,
    pic_depth: usize,
    pic_has_blip: &mut bool,
    in_diagram: bool,
    part: &str,
    items: &mut Vec<DrawingItem>,
) -> Result<(), XlsxVisionError> {
    match e.local_name().as_ref() {
        // 1つの画像につき最初のblipのみ
        b"blip" if pic_depth > 0 && !*pic_has_blip => {
            if let Some(embed) = attr_value(e, b"embed", part)? {
                *pic_has_blip = true;
                items.push(DrawingItem::Picture { anchor, embed });
            }
        }
        b"relIds" if in_diagram => {
            if let Some(data_model) = attr_value(e, b"dm", part)? {
                items.push(DrawingItem::Diagram { anchor, data_model });
            }
        }
        _ => {}
    }
    Ok(())
}
