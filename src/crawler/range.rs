use std::num::ParseFloatError;
use std::str::FromStr;

use thiserror::Error;

use crate::models::ChapterInfo;

#[derive(Debug, Error, PartialEq)]
pub enum RangeError {
    #[error("无效的章节范围 {0:?}, 格式应为 start-end")]
    Format(String),
    #[error("无效的起始章节 {0:?}: {1}")]
    Start(String, #[source] ParseFloatError),
    #[error("无效的结束章节 {0:?}: {1}")]
    End(String, #[source] ParseFloatError),
}

/// 闭区间 `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChapterRange {
    pub start: f64,
    pub end: f64,
}

impl FromStr for ChapterRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('-').collect();
        let [start, end] = parts.as_slice() else {
            return Err(RangeError::Format(s.to_owned()));
        };

        let start = start
            .trim()
            .parse()
            .map_err(|e| RangeError::Start(start.to_string(), e))?;
        let end = end
            .trim()
            .parse()
            .map_err(|e| RangeError::End(end.to_string(), e))?;

        Ok(Self { start, end })
    }
}

impl ChapterRange {
    pub fn contains(&self, number: f64) -> bool {
        self.start <= number && number <= self.end
    }

    /// 保留区间内的章节并按章节号升序排列，章节号相同时保持原顺序
    pub fn select(&self, chapters: Vec<ChapterInfo>) -> Vec<ChapterInfo> {
        let mut selected: Vec<ChapterInfo> = chapters
            .into_iter()
            .filter(|chapter| self.contains(chapter.number))
            .collect();
        selected.sort_by(|a, b| a.number.total_cmp(&b.number));
        selected
    }
}
