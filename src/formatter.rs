//! Formatter Module
//!
//! セル値を表示用文字列に変換するモジュール。
//! calamineの`Data`を、Excelで見える計算済みの値に近い文字列にします。

use calamine::Data;
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::XlsxVisionError;

const SECONDS_PER_DAY: i64 = 86_400;

/// セルフォーマッター
///
/// セル値のフォーマット処理のファサードとして機能します。
#[derive(Debug)]
pub(crate) struct CellFormatter {
    date_formatter: DateFormatter,
    number_formatter: NumberFormatter,
    is_1904: bool,
}

impl CellFormatter {
    /// ワークブックの日付システムを指定して生成
    pub fn new(is_1904: bool) -> Self {
        Self {
            date_formatter: DateFormatter,
            number_formatter: NumberFormatter,
            is_1904,
        }
    }

    /// セル値をフォーマット
    ///
    /// # 戻り値
    ///
    /// * `Ok(String)` - 表示用文字列（空セルは空文字列）
    /// * `Err(XlsxVisionError)` - 日付計算がオーバーフローした場合
    pub fn format_cell(&self, cell: &Data) -> Result<String, XlsxVisionError> {
        let text = match cell {
            Data::Empty => String::new(),
            Data::String(s) => s.clone(),
            Data::Int(i) => i.to_string(),
            Data::Float(f) => self.number_formatter.format(*f),
            Data::Bool(true) => "TRUE".to_string(),
            Data::Bool(false) => "FALSE".to_string(),
            Data::Error(e) => e.to_string(),
            Data::DateTime(dt) => {
                if dt.is_duration() {
                    self.date_formatter.format_duration(dt.as_f64())
                } else {
                    self.date_formatter.format(dt.as_f64(), self.is_1904)?
                }
            }
            Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        };
        Ok(text)
    }
}

/// 日付フォーマッター
///
/// Excelのシリアル日付値を文字列に変換します。
#[derive(Debug)]
pub(crate) struct DateFormatter;

impl DateFormatter {
    /// 日付値をフォーマット
    ///
    /// 時刻部分がない場合は`%Y-%m-%d`、ある場合は`%Y-%m-%d %H:%M:%S`で出力します。
    ///
    /// # エポックシステム
    ///
    /// - 1900年システム（デフォルト）: 1899年12月30日起算
    ///   - Excelは1900年をうるう年として扱うため、シリアル値60（存在しない1900-02-29）
    ///     より前は1日ずれる
    ///   - シリアル値1 = 1900年1月1日、シリアル値61 = 1900年3月1日
    /// - 1904年システム: 1904年1月1日起算
    ///   - シリアル値0 = 1904年1月1日
    pub fn format(&self, serial_value: f64, is_1904: bool) -> Result<String, XlsxVisionError> {
        let datetime = self.to_datetime(serial_value, is_1904)?;
        let formatted = if datetime.time() == chrono::NaiveTime::MIN {
            datetime.format("%Y-%m-%d").to_string()
        } else {
            datetime.format("%Y-%m-%d %H:%M:%S").to_string()
        };
        Ok(formatted)
    }

    fn to_datetime(
        &self,
        serial_value: f64,
        is_1904: bool,
    ) -> Result<NaiveDateTime, XlsxVisionError> {
        let overflow = || {
            XlsxVisionError::Config(format!(
                "Date calculation overflow: serial_value={}, is_1904={}",
                serial_value, is_1904
            ))
        };

        if !serial_value.is_finite() {
            return Err(overflow());
        }

        let epoch = if is_1904 {
            NaiveDate::from_ymd_opt(1904, 1, 1)
        } else if serial_value < 61.0 {
            NaiveDate::from_ymd_opt(1899, 12, 31)
        } else {
            NaiveDate::from_ymd_opt(1899, 12, 30)
        }
        .ok_or_else(|| XlsxVisionError::Config("Invalid epoch date".to_string()))?;

        // 秒単位に丸めてから日と時刻に分ける（23:59:59.9999 は翌日0時）
        let total_seconds = (serial_value * SECONDS_PER_DAY as f64).round() as i64;
        let days = total_seconds.div_euclid(SECONDS_PER_DAY);
        let seconds = total_seconds.rem_euclid(SECONDS_PER_DAY);

        Duration::try_days(days)
            .and_then(|delta| epoch.checked_add_signed(delta))
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .and_then(|dt| dt.checked_add_signed(Duration::seconds(seconds)))
            .ok_or_else(overflow)
    }

    /// 経過時間を`[h]:mm:ss`形式でフォーマット
    pub fn format_duration(&self, serial_value: f64) -> String {
        let total_seconds = (serial_value * SECONDS_PER_DAY as f64).round() as i64;
        let sign = if total_seconds < 0 { "-" } else { "" };
        let total_seconds = total_seconds.unsigned_abs();
        format!(
            "{}{}:{:02}:{:02}",
            sign,
            total_seconds / 3600,
            (total_seconds % 3600) / 60,
            total_seconds % 60
        )
    }
}

/// 数値フォーマッター
#[derive(Debug)]
pub(crate) struct NumberFormatter;

impl NumberFormatter {
    /// 数値をフォーマット
    ///
    /// 整数値でi64の範囲に収まる場合は小数点なしで、それ以外は
    /// 往復可能な最短の10進表記で出力します（`3.0` -> `3`、`0.1` -> `0.1`）。
    pub fn format(&self, value: f64) -> String {
        if value.is_finite()
            && value.fract() == 0.0
            && value >= i64::MIN as f64
            && value < i64::MAX as f64
        {
            // -0.0 も "0" にする
            (value as i64).to_string()
        } else {
            value.to_string()
        }
    }
}
