//! Sub-image Cropping
//!
//! マーカーの位置（上端・左端からのパーセント）と要素の種類から切り出し範囲を推定し、
//! 元画像から部分画像を切り出します。

use image::{DynamicImage, ImageFormat};
use std::path::Path;

use crate::error::XlsxVisionError;
use crate::security::sanitize_component;

/// 視覚要素の種類（説明文から判定）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementCategory {
    /// `icon` / `logo`
    Icon,
    /// `chart` / `graph` / `diagram`
    Chart,
    Other,
}

impl ElementCategory {
    pub fn classify(description: &str) -> Self {
        let lower = description.to_lowercase();
        if lower.contains("icon") || lower.contains("logo") {
            ElementCategory::Icon
        } else if ["chart", "graph", "diagram"].iter().any(|k| lower.contains(k)) {
            ElementCategory::Chart
        } else {
            ElementCategory::Other
        }
    }

    /// 画像全体に対する切り出し範囲の割合（幅, 高さ）
    pub fn size_factors(self) -> (f64, f64) {
        match self {
            ElementCategory::Icon => (0.10, 0.08),
            ElementCategory::Chart => (0.35, 0.25),
            ElementCategory::Other => (0.20, 0.15),
        }
    }
}

/// 切り出し範囲（ピクセル、右端・下端は含まない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    /// 中心位置と要素の種類から範囲を推定し、画像内に収める
    pub fn estimate(
        width: u32,
        height: u32,
        top_percent: u32,
        left_percent: u32,
        category: ElementCategory,
    ) -> Self {
        let (w, h) = (i64::from(width), i64::from(height));
        let center_x = w * i64::from(left_percent) / 100;
        let center_y = h * i64::from(top_percent) / 100;

        let (width_factor, height_factor) = category.size_factors();
        let half_w = (width as f64 * width_factor).floor() as i64 / 2;
        let half_h = (height as f64 * height_factor).floor() as i64 / 2;

        let clamp = |v: i64, max: i64| v.clamp(0, max) as u32;
        Self {
            left: clamp(center_x - half_w, w),
            top: clamp(center_y - half_h, h),
            right: clamp(center_x + half_w, w),
            bottom: clamp(center_y + half_h, h),
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// 面積が0の範囲（要素が画像外を指している場合など）
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// 部分画像のファイル名（`subimg_{nn}_{position}.png`）
pub fn sub_image_file_name(counter: usize, position: &str) -> String {
    format!(
        "subimg_{:02}_{}.png",
        counter,
        sanitize_component(&position.replace('-', "_"))
    )
}

/// 範囲を切り出してPNGとして保存
pub fn save_crop(
    image: &DynamicImage,
    bbox: &BoundingBox,
    path: &Path,
) -> Result<(), XlsxVisionError> {
    let cropped = image.crop_imm(bbox.left, bbox.top, bbox.width(), bbox.height());
    cropped.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
