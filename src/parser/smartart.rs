//! SmartArt Parser Module
//!
//! SmartArtのデータモデルパート（`xl/diagrams/dataN.xml`）から
//! ノードの階層構造を構築するモジュール。

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};

use crate::error::XlsxVisionError;
use crate::parser::drawing::attr_value;
use crate::types::SmartArtNode;

/// データモデルの点（`dgm:pt`）
#[derive(Debug, Clone)]
struct Point {
    id: String,
    kind: String,
    text: String,
    /// `dgm:prSet/@name`（テキストが空の場合の代替ラベル）
    name: Option<String>,
}

/// 親子関係の接続（`dgm:cxn`、type=parOf）
#[derive(Debug, Clone)]
struct Connection {
    src: String,
    dest: String,
    order: u32,
}

/// 構築する木の最大ノード数
const MAX_TREE_NODES: usize = 10_000;

/// 構築する木の最大深さ
const MAX_TREE_DEPTH: usize = 64;

/// 木に含める点の種類（接続用の`parTrans`/`sibTrans`や表示用の`pres`は除外）
///
/// `asst`は組織図のアシスタント枠で、`node`と同じく利用者が入力したテキストを持つ。
fn is_content_point(kind: &str) -> bool {
    matches!(kind, "node" | "asst" | "doc")
}

/// データモデルパートを解析し、ルートノードのリストを返す
///
/// ルートは入ってくる接続を持たない点で、データモデル内の順序に並びます。
/// テキストを持たない`doc`点はルートから外し、その子をルートとして扱います。
/// 各点は木全体で一度だけ出力されます。複数の親を持つ点は最初に到達した親の下に置かれ、
/// 循環や菱形の接続でノード数が増えることはありません。
pub(crate) fn parse_smartart(xml: &[u8], part: &str) -> Result<Vec<SmartArtNode>, XlsxVisionError> {
    let (points, connections) = read_data_model(xml, part)?;
    Ok(build_tree(points, connections))
}

fn read_data_model(
    xml: &[u8],
    part: &str,
) -> Result<(Vec<Point>, Vec<Connection>), XlsxVisionError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut points = Vec::new();
    let mut connections = Vec::new();

    let mut current: Option<(Point, Vec<String>)> = None;
    let mut run: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"pt" => current = Some((read_point(&e, part)?, Vec::new())),
                b"t" if current.is_some() => run = Some(String::new()),
                b"prSet" => read_preset_name(&e, part, current.as_mut())?,
                b"cxn" => connections.extend(read_connection(&e, part)?),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"pt" => points.push(read_point(&e, part)?),
                b"prSet" => read_preset_name(&e, part, current.as_mut())?,
                b"cxn" => connections.extend(read_connection(&e, part)?),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some(run) = run.as_mut() {
                    let text = t.unescape().map_err(|e| XlsxVisionError::xml(part, e))?;
                    run.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => {
                    if let (Some(text), Some((_, runs))) = (run.take(), current.as_mut()) {
                        runs.push(text);
                    }
                }
                b"pt" => {
                    if let Some((mut point, runs)) = current.take() {
                        point.text = runs
                            .iter()
                            .map(|r| r.trim())
                            .filter(|r| !r.is_empty())
                            .collect::<Vec<_>>()
                            .join(" ");
                        if point.text.is_empty() {
                            if let Some(name) = point.name.take() {
                                point.text = name;
                            }
                        }
                        points.push(point);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxVisionError::xml(part, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok((points, connections))
}

fn read_point(e: &BytesStart<'_>, part: &str) -> Result<Point, XlsxVisionError> {
    Ok(Point {
        id: attr_value(e, b"modelId", part)?.unwrap_or_default(),
        kind: attr_value(e, b"type", part)?.unwrap_or_else(|| "node".to_string()),
        text: String::new(),
        name: None,
    })
}

fn read_preset_name(
    e: &BytesStart<'_>,
    part: &str,
    current: Option<&mut (Point, Vec<String>)>,
) -> Result<(), XlsxVisionError> {
    if let Some((point, _)) = current {
        point.name = attr_value(e, b"name", part)?.filter(|n| !n.trim().is_empty());
    }
    Ok(())
}

fn read_connection(e: &BytesStart<'_>, part: &str) -> Result<Option<Connection>, XlsxVisionError> {
    let kind = attr_value(e, b"type", part)?.unwrap_or_else(|| "parOf".to_string());
    if kind != "parOf" {
        return Ok(None);
    }
    let src = attr_value(e, b"srcId", part)?;
    let dest = attr_value(e, b"destId", part)?;
    let order = attr_value(e, b"srcOrd", part)?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    Ok(match (src, dest) {
        (Some(src), Some(dest)) => Some(Connection { src, dest, order }),
        _ => None,
    })
}

fn build_tree(points: Vec<Point>, connections: Vec<Connection>) -> Vec<SmartArtNode> {
    let points: Vec<Point> = points
        .into_iter()
        .filter(|p| !p.id.is_empty() && is_content_point(&p.kind))
        .collect();
    let by_id: HashMap<&str, &Point> = points.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut children: HashMap<&str, Vec<(u32, &str)>> = HashMap::new();
    let mut has_parent: HashSet<&str> = HashSet::new();
    for cxn in &connections {
        if by_id.contains_key(cxn.src.as_str()) && by_id.contains_key(cxn.dest.as_str()) {
            children
                .entry(cxn.src.as_str())
                .or_default()
                .push((cxn.order, cxn.dest.as_str()));
            has_parent.insert(cxn.dest.as_str());
        }
    }
    for list in children.values_mut() {
        // 同じsrcOrdの場合は出現順を保つ
        list.sort_by_key(|(order, _)| *order);
    }

    let mut roots: Vec<&str> = points
        .iter()
        .map(|p| p.id.as_str())
        .filter(|id| !has_parent.contains(id))
        .collect();
    if roots.is_empty() {
        // すべての点が循環内にある場合
        roots = points.iter().map(|p| p.id.as_str()).collect();
    }

    let mut builder = TreeBuilder {
        by_id: &by_id,
        children: &children,
        visited: HashSet::new(),
        truncated: false,
    };
    let mut nodes = Vec::new();
    for root in roots {
        let Some(point) = by_id.get(root) else {
            continue;
        };
        if !builder.enter(root) {
            continue;
        }
        if point.kind == "doc" && point.text.is_empty() {
            nodes.extend(builder.children_of(root, 0));
        } else {
            nodes.push(builder.node(root, 0));
        }
    }
    if builder.truncated {
        tracing::warn!(
            limit = MAX_TREE_NODES,
            max_depth = MAX_TREE_DEPTH,
            "SmartArt tree truncated"
        );
    }
    nodes
}

struct TreeBuilder<'a> {
    by_id: &'a HashMap<&'a str, &'a Point>,
    children: &'a HashMap<&'a str, Vec<(u32, &'a str)>>,
    visited: HashSet<&'a str>,
    truncated: bool,
}

impl<'a> TreeBuilder<'a> {
    /// 未出力の点を出力済みにする。出力済みまたは上限到達ならfalse
    fn enter(&mut self, id: &'a str) -> bool {
        if self.visited.len() >= MAX_TREE_NODES {
            self.truncated = true;
            return false;
        }
        self.visited.insert(id)
    }

    fn node(&mut self, id: &'a str, depth: usize) -> SmartArtNode {
        let children = self.children_of(id, depth + 1);
        SmartArtNode {
            id: id.to_string(),
            text: self
                .by_id
                .get(id)
                .map(|p| p.text.clone())
                .unwrap_or_default(),
            children,
        }
    }

    fn children_of(&mut self, id: &'a str, depth: usize) -> Vec<SmartArtNode> {
        let mut nodes = Vec::new();
        let children = self.children;
        let Some(list) = children.get(id) else {
            return nodes;
        };
        if depth >= MAX_TREE_DEPTH {
            self.truncated = true;
            return nodes;
        }
        for &(_, child) in list {
            if self.enter(child) {
                nodes.push(self.node(child, depth));
            }
        }
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PART: &str = "xl/diagrams/data1.xml";

    fn data_model(points: &str, connections: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<dgm:dataModel xmlns:dgm="http://schemas.openxmlformats.org/drawingml/2006/diagram" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">
  <dgm:ptLst>{}</dgm:ptLst>
  <dgm:cxnLst>{}</dgm:cxnLst>
</dgm:dataModel>"#,
            points, connections
        )
    }

    fn pt(id: &str, kind: Option<&str>, text: &str) -> String {
        let kind_attr = kind.map(|k| format!(r#" type="{}""#, k)).unwrap_or_default();
        format!(
            r#"<dgm:pt modelId="{}"{}><dgm:prSet/><dgm:spPr/><dgm:t><a:bodyPr/><a:p><a:r><a:t>{}</a:t></a:r></a:p></dgm:t></dgm:pt>"#,
            id, kind_attr, text
        )
    }

    fn cxn(src: &str, dest: &str, ord: u32) -> String {
        format!(
            r#"<dgm:cxn modelId="c-{src}-{dest}" srcId="{src}" destId="{dest}" srcOrd="{ord}" destOrd="0"/>"#,
        )
    }

    #[test]
    fn test_doc_root_is_elided() {
        let xml = data_model(
            &[
                r#"<dgm:pt modelId="0" type="doc"><dgm:prSet/><dgm:spPr/><dgm:t><a:bodyPr/><a:p><a:endParaRPr/></a:p></dgm:t></dgm:pt>"#.to_string(),
                pt("1", None, "Plan"),
                pt("2", None, "Build"),
                pt("11", None, "Scope"),
                r#"<dgm:pt modelId="t1" type="parTrans"/>"#.to_string(),
                pt("p1", Some("pres"), "ignored"),
            ]
            .concat(),
            &[cxn("0", "2", 1), cxn("0", "1", 0), cxn("1", "11", 0)].concat(),
        );

        let nodes = parse_smartart(xml.as_bytes(), PART).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].text, "Plan");
        assert_eq!(nodes[0].children.len(), 1);
        assert_eq!(nodes[0].children[0].text, "Scope");
        assert_eq!(nodes[1].text, "Build");
        assert!(nodes[1].children.is_empty());
    }

    #[test]
    fn test_non_parent_connections_are_ignored() {
        let xml = data_model(
            &[pt("a", None, "A"), pt("b", None, "B")].concat(),
            r#"<dgm:cxn modelId="x" type="presOf" srcId="a" destId="b"/>"#,
        );
        let nodes = parse_smartart(xml.as_bytes(), PART).unwrap();
        let labels: Vec<_> = nodes.iter().map(|n| n.label()).collect();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[test]
    fn test_multi_run_text_and_empty_label() {
        let xml = data_model(
            &[
                r#"<dgm:pt modelId="n1"><dgm:t><a:p><a:r><a:t> Quarterly </a:t></a:r><a:r><a:t>Review</a:t></a:r></a:p></dgm:t></dgm:pt>"#,
                r#"<dgm:pt modelId="n2"><dgm:prSet/></dgm:pt>"#,
            ]
            .concat(),
            &cxn("n1", "n2", 0),
        );
        let nodes = parse_smartart(xml.as_bytes(), PART).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].text, "Quarterly Review");
        assert_eq!(nodes[0].children[0].label(), "(id: n2)");
    }

    #[test]
    fn test_cycle_is_broken() {
        let xml = data_model(
            &[pt("a", None, "A"), pt("b", None, "B")].concat(),
            &[cxn("a", "b", 0), cxn("b", "a", 0)].concat(),
        );
        let nodes = parse_smartart(xml.as_bytes(), PART).unwrap();
        // ルートが存在しないため全点が候補になるが、bはaの下で出力済み
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "a");
        assert_eq!(nodes[0].children[0].id, "b");
        assert!(nodes[0].children[0].children.is_empty());
    }

    fn count(nodes: &[SmartArtNode]) -> usize {
        nodes.iter().map(|n| 1 + count(&n.children)).sum()
    }

    #[test]
    fn test_layered_diamonds_stay_linear() {
        // 各層2点、前の層の両方の点から接続される
        let layers = 30;
        let mut points = vec![pt("root", None, "Root")];
        let mut connections = vec![cxn("root", "L0a", 0), cxn("root", "L0b", 1)];
        for layer in 0..layers {
            for side in ["a", "b"] {
                points.push(pt(&format!("L{layer}{side}"), None, "x"));
            }
            if layer + 1 < layers {
                for side in ["a", "b"] {
                    let src = format!("L{layer}{side}");
                    connections.push(cxn(&src, &format!("L{}a", layer + 1), 0));
                    connections.push(cxn(&src, &format!("L{}b", layer + 1), 1));
                }
            }
        }
        let xml = data_model(&points.concat(), &connections.concat());

        let nodes = parse_smartart(xml.as_bytes(), PART).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(count(&nodes), 1 + 2 * layers);
    }

    #[test]
    fn test_complete_graph_emits_each_point_once() {
        let ids: Vec<String> = (0..12).map(|i| format!("n{i}")).collect();
        let points: String = ids.iter().map(|id| pt(id, None, id)).collect();
        let mut connections = String::new();
        for (i, src) in ids.iter().enumerate() {
            for (j, dest) in ids.iter().enumerate() {
                if i != j {
                    connections.push_str(&cxn(src, dest, j as u32));
                }
            }
        }
        let xml = data_model(&points, &connections);

        let nodes = parse_smartart(xml.as_bytes(), PART).unwrap();
        assert_eq!(count(&nodes), ids.len());
    }

    #[test]
    fn test_node_limit_truncates_tree() {
        let total = MAX_TREE_NODES + 50;
        let points: String = (0..total).map(|i| pt(&format!("n{i}"), None, "x")).collect();
        let connections: String = (1..total).map(|i| cxn("n0", &format!("n{i}"), i as u32)).collect();
        let xml = data_model(&points, &connections);

        let nodes = parse_smartart(xml.as_bytes(), PART).unwrap();
        assert_eq!(count(&nodes), MAX_TREE_NODES);
    }

    fn depth(nodes: &[SmartArtNode]) -> usize {
        nodes.iter().map(|n| 1 + depth(&n.children)).max().unwrap_or(0)
    }

    #[test]
    fn test_depth_limit_truncates_chain() {
        let total = 500;
        let points: String = (0..total).map(|i| pt(&format!("n{i}"), None, "x")).collect();
        let connections: String = (1..total)
            .map(|i| cxn(&format!("n{}", i - 1), &format!("n{i}"), 0))
            .collect();
        let xml = data_model(&points, &connections);

        let nodes = parse_smartart(xml.as_bytes(), PART).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(depth(&nodes), MAX_TREE_DEPTH);
    }

    #[test]
    fn test_assistant_points_and_preset_name_fallback() {
        let xml = data_model(
            &[
                pt("ceo", None, "CEO"),
                pt("as", Some("asst"), "Assistant"),
                r#"<dgm:pt modelId="blank"><dgm:prSet name="Placeholder box"/><dgm:spPr/><dgm:t><a:p/></dgm:t></dgm:pt>"#.to_string(),
                r#"<dgm:pt modelId="named"><dgm:prSet name="Unused"/><dgm:t><a:p><a:r><a:t>Real</a:t></a:r></a:p></dgm:t></dgm:pt>"#.to_string(),
            ]
            .concat(),
            &[cxn("ceo", "as", 0), cxn("ceo", "blank", 1), cxn("ceo", "named", 2)].concat(),
        );
        let nodes = parse_smartart(xml.as_bytes(), PART).unwrap();
        let labels: Vec<_> = nodes[0].children.iter().map(|n| n.label()).collect();
        assert_eq!(labels, vec!["Assistant", "Placeholder box", "Real"]);
    }

    #[test]
    fn test_empty_data_model() {
        let xml = data_model("", "");
        assert!(parse_smartart(xml.as_bytes(), PART).unwrap().is_empty());
    }
}
