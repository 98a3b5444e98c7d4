use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// 与远程浏览器或伴随服务交互时可能出现的错误
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("请求 {endpoint} 失败: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} 返回非200响应: {status}, message: {body}")]
    Status {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("解析{what}JSON失败: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{what}超时 ({elapsed:?})")]
    Timeout {
        what: &'static str,
        elapsed: Duration,
    },

    #[error("浏览器操作失败: {0}")]
    Browser(String),

    #[error("文件操作失败 {}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("拒绝写入不安全的文件名: {0:?}")]
    UnsafeFilename(String),

    #[error("无效的URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl FetchError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(what: &'static str, source: serde_json::Error) -> Self {
        Self::Json { what, source }
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
