//! Placeholder Parser
//!
//! 構造化モードの応答に含まれる視覚要素のマーカーを解析します。
//!
//! ```text
//! [IMAGE: Bar chart of sales | Position: center | ApproxPercent: 40% from top, 50% from left]
//! ```

use regex::Regex;
use std::sync::OnceLock;

/// 位置情報付きのマーカー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// 応答内のマーカー文字列そのもの
    pub raw: String,
    pub description: String,
    pub position: String,
    pub top_percent: u32,
    pub left_percent: u32,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\[IMAGE:\s*([^|]+)\|\s*Position:\s*([^|]+)\|\s*ApproxPercent:\s*(\d+)%\s*from top,\s*(\d+)%\s*from left\]",
        )
        .expect("placeholder pattern is a valid regex")
    })
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[IMAGE:\s*([^\]]+)\]")
            .expect("marker pattern is a valid regex")
    })
}

/// 位置情報付きのマーカーを出現順に取得
///
/// パーセント値が数値として読めないマーカーはスキップします。
pub fn find_placeholders(text: &str) -> Vec<Placeholder> {
    placeholder_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let percent = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
            let (Some(top_percent), Some(left_percent)) = (percent(3), percent(4)) else {
                tracing::warn!(marker = %&caps[0], "skipping placeholder with unreadable percentages");
                return None;
            };
            Some(Placeholder {
                raw: caps[0].to_string(),
                description: caps[1].trim().to_string(),
                position: caps[2].trim().to_string(),
                top_percent,
                left_percent,
            })
        })
        .collect()
}

/// 置換されずに残った`[IMAGE: ...]`マーカーを引用行に変換
pub fn render_remaining_markers(text: &str) -> String {
    marker_regex()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("\n\n> 📷 **Visual Element:** {}\n\n", caps[1].trim())
        })
        .into_owned()
}
