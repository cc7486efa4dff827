//! Parser Module
//!
//! calamineを使用したセル値の解析と、ZIP + quick-xmlによる
//! OOXMLパッケージ（描画、メディア、SmartArt）の解析を提供します。

mod drawing;
mod package;
mod smartart;
mod workbook;

pub(crate) use workbook::WorkbookParser;
