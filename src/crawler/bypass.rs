use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument};
use url::Url;

use super::browser::{Extract, Extraction};
use super::companion::Companion;
use crate::error::{FetchError, FetchResult};
use crate::snippet::Snippet;

/// 轮询参数
#[derive(Debug, Clone, Copy)]
pub struct Poll {
    /// 两次尝试之间的间隔
    pub interval: Duration,
    /// 每次提取时页面内的停顿
    pub settle: Duration,
    pub timeout: Duration,
}

/// 请求伴随服务打开系列页面并完成 Cloudflare 验证
#[instrument(skip_all, fields(url = series_url))]
pub async fn trigger<C>(companion: &C, series_url: &str, sleep_ms: u64) -> FetchResult<()>
where
    C: Companion + ?Sized,
{
    ensure_http_url(series_url)?;

    info!("调用 /trigger 绕过 Cloudflare: {}", series_url);
    companion.trigger(series_url, sleep_ms).await?;
    info!("Cloudflare 验证已触发，等待验证完成...");
    Ok(())
}

/// 反复提取标题直到得到非空结果，返回去掉首尾空白的标题
#[instrument(skip_all, fields(url = series_url))]
pub async fn wait_for_bypass<E>(
    extractor: &E,
    series_url: &str,
    title: &Snippet,
    poll: Poll,
) -> FetchResult<String>
where
    E: Extract + ?Sized,
{
    let start = Instant::now();
    let request = Extraction::new(series_url, title, poll.settle);

    loop {
        match extractor.extract(&request).await {
            Ok(text) if !text.trim().is_empty() => {
                let text = text.trim().to_owned();
                info!("验证已完成，检测到系列标题: {}", text);
                return Ok(text);
            }
            Ok(_) => debug!("标题为空"),
            Err(e) => debug!("提取标题失败: {}", e),
        }

        if start.elapsed() > poll.timeout {
            return Err(FetchError::Timeout {
                what: "等待 Cloudflare 验证完成",
                elapsed: start.elapsed(),
            });
        }
        info!("等待 Cloudflare 验证完成...");
        sleep(poll.interval).await;
    }
}

fn ensure_http_url(series_url: &str) -> FetchResult<()> {
    let url = Url::parse(series_url).map_err(|e| FetchError::InvalidUrl {
        url: series_url.to_owned(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(FetchError::InvalidUrl {
            url: series_url.to_owned(),
            reason: format!("不支持的协议 {}", scheme),
        }),
    }
}
