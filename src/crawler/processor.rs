use std::path::PathBuf;

use bytes::Bytes;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::{FetchError, FetchResult};

/// 把伴随服务返回的图片写入 `<output_dir>/<folder>/<filename>`
#[derive(Clone)]
pub struct Processor {
    output_dir: PathBuf,
}

impl Processor {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub async fn prepare(&self) -> FetchResult<()> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| FetchError::io(&self.output_dir, e))
    }

    #[instrument(skip_all, fields(folder = folder, filename = filename))]
    pub async fn write_image(
        &self,
        folder: &str,
        filename: &str,
        image_bytes: Bytes,
    ) -> FetchResult<PathBuf> {
        ensure_plain_name(folder)?;
        ensure_plain_name(filename)?;

        let chapter_dir = self.output_dir.join(folder);
        fs::create_dir_all(&chapter_dir)
            .await
            .map_err(|e| FetchError::io(&chapter_dir, e))?;

        let image_path = chapter_dir.join(filename);
        fs::write(&image_path, &image_bytes)
            .await
            .map_err(|e| FetchError::io(&image_path, e))?;

        info!("图片已保存到: {}", image_path.display());
        Ok(image_path)
    }
}

// 只允许单层文件名，防止清单中的名字写出章节目录
fn ensure_plain_name(name: &str) -> FetchResult<()> {
    let unsafe_name = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(FetchError::UnsafeFilename(name.to_owned()));
    }
    Ok(())
}
