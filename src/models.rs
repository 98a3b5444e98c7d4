use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

/// 章节目录名无法从URL推导时使用的目录名
pub const DEFAULT_CHAPTER_FOLDER: &str = "default_chapter";

/// 章节列表脚本返回的单个章节
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterInfo {
    pub title: String,
    pub number: f64,
    // 没有 href 的链接会得到 null
    #[serde(default, deserialize_with = "nullable_string")]
    pub url: String,
}

impl ChapterInfo {
    pub fn folder(&self) -> String {
        chapter_folder(&self.url)
    }
}

/// `/get_image` 返回的已保存图片清单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterImages {
    pub chapter: String,
    #[serde(default)]
    pub images: Vec<String>,
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// 取章节URL路径的最后一段作为目录名
pub fn chapter_folder(chapter_url: &str) -> String {
    let Ok(url) = Url::parse(chapter_url) else {
        return DEFAULT_CHAPTER_FOLDER.to_owned();
    };

    url.path()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| DEFAULT_CHAPTER_FOLDER.to_owned())
}
