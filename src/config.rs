use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::snippet::Snippets;

pub static DEFAULT_CONFIG_FILE: &str = "toongod.toml";

pub static REMOTE_DEBUG_URL_ENV: &str = "REMOTE_DEBUG_URL";
pub static FASTAPI_BASE_URL_ENV: &str = "FASTAPI_BASE_URL";

pub static DEFAULT_REMOTE_DEBUG_URL: &str = "http://localhost:6082";
pub static DEFAULT_FASTAPI_BASE_URL: &str = "http://localhost:6081";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// 远程浏览器调试地址
    pub remote_debug_url: String,
    /// 伴随服务(FastAPI)地址
    pub fastapi_base_url: String,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub snippets: Snippets,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_debug_url: DEFAULT_REMOTE_DEBUG_URL.to_owned(),
            fastapi_base_url: DEFAULT_FASTAPI_BASE_URL.to_owned(),
            timing: Timing::default(),
            snippets: Snippets::default(),
        }
    }
}

impl Config {
    /// 默认值 -> 配置文件 -> 环境变量
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    pub fn load_with<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let builder = config::Config::builder()
            .set_default("remote_debug_url", DEFAULT_REMOTE_DEBUG_URL)?
            .set_default("fastapi_base_url", DEFAULT_FASTAPI_BASE_URL)?;

        // 显式指定的配置文件必须存在
        let builder = match path {
            Some(path) => builder
                .add_source(config::File::from(path).format(config::FileFormat::Toml)),
            None => builder.add_source(
                config::File::new(DEFAULT_CONFIG_FILE, config::FileFormat::Toml).required(false),
            ),
        };

        builder
            .set_override_option("remote_debug_url", non_empty(env(REMOTE_DEBUG_URL_ENV)))?
            .set_override_option("fastapi_base_url", non_empty(env(FASTAPI_BASE_URL_ENV)))?
            .build()?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("配置文件反序列化失败: {}", e))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// 流程中的各个固定延迟与超时
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub trigger_sleep_ms: u64,
    pub poll_interval_ms: u64,
    pub bypass_timeout_secs: u64,
    pub poll_sleep_ms: u64,
    pub extract_sleep_ms: u64,
    pub extraction_timeout_secs: u64,
    pub save_pause_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            trigger_sleep_ms: 5000,
            poll_interval_ms: 2000,
            bypass_timeout_secs: 30,
            poll_sleep_ms: 2000,
            extract_sleep_ms: 5000,
            extraction_timeout_secs: 60,
            save_pause_ms: 500,
            request_timeout_secs: 120,
        }
    }
}

impl Timing {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn bypass_timeout(&self) -> Duration {
        Duration::from_secs(self.bypass_timeout_secs)
    }

    pub fn poll_sleep(&self) -> Duration {
        Duration::from_millis(self.poll_sleep_ms)
    }

    pub fn extract_sleep(&self) -> Duration {
        Duration::from_millis(self.extract_sleep_ms)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn save_pause(&self) -> Duration {
        Duration::from_millis(self.save_pause_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
