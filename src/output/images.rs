//! Image Store
//!
//! 抽出した画像のバイト列を出力ディレクトリへ書き出すモジュール。

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::XlsxVisionError;
use crate::types::WorkbookContent;

/// 画像の出力先ディレクトリ
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// すべての画像を書き出し、書き出した枚数を返す
    ///
    /// 書き出した画像のバイト列は`WorkbookContent`から取り除かれます。
    /// 画像がない場合もディレクトリは作成します。
    pub fn persist(&self, content: &mut WorkbookContent) -> Result<usize, XlsxVisionError> {
        fs::create_dir_all(&self.dir)?;

        let mut written = 0;
        for image in content.sheets.iter_mut().flat_map(|s| s.images.iter_mut()) {
            let data = image.take_data();
            let path = self.dir.join(&image.file_name);
            fs::write(&path, &data)?;
            tracing::debug!(path = %path.display(), bytes = data.len(), "wrote image");
            written += 1;
        }
        Ok(written)
    }
}
