use tracing::{info, instrument, warn};

use crate::error::{FetchError, FetchResult};
use crate::models::ChapterInfo;

/// 解析章节列表脚本的返回值
///
/// 没有链接的章节保留下来，由逐章处理时记为失败。
#[instrument(skip_all)]
pub fn chapters(json: &str) -> FetchResult<Vec<ChapterInfo>> {
    let chapters: Vec<ChapterInfo> =
        serde_json::from_str(json).map_err(|e| FetchError::json("章节列表", e))?;

    let missing = chapters
        .iter()
        .filter(|chapter| chapter.url.trim().is_empty())
        .count();
    if missing > 0 {
        warn!("{} 个章节没有链接", missing);
    }

    info!("章节列表解析完成: {}", chapters.len());
    Ok(chapters)
}

/// 解析图片脚本的返回值
pub fn image_urls(json: &str) -> FetchResult<Vec<String>> {
    let urls: Vec<String> =
        serde_json::from_str(json).map_err(|e| FetchError::json("图片列表", e))?;
    Ok(urls
        .into_iter()
        .map(|url| url.trim().to_owned())
        .filter(|url| !url.is_empty())
        .collect())
}
