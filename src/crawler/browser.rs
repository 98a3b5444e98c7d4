use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::{Browser, Tab};
use reqwest::header::{CONNECTION, UPGRADE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::snippet::Snippet;

/// 阻塞任务按截止时间自行返回，外层超时只在其失控时兜底
const BACKSTOP_GRACE: Duration = Duration::from_secs(5);

/// 一次页面提取: 打开页面，等待选择器可见，稍作停顿后执行脚本
#[derive(Debug, Clone, Copy)]
pub struct Extraction<'a> {
    pub url: &'a str,
    pub script: &'a str,
    pub wait_selector: &'a str,
    pub sleep: Duration,
}

impl<'a> Extraction<'a> {
    pub fn new(url: &'a str, snippet: &'a Snippet, sleep: Duration) -> Self {
        Self {
            url,
            script: &snippet.script,
            wait_selector: &snippet.wait_selector,
            sleep,
        }
    }
}

#[async_trait]
pub trait Extract: Send + Sync {
    /// 返回脚本执行结果(JSON字符串或纯文本)
    async fn extract(&self, request: &Extraction<'_>) -> FetchResult<String>;
}

/// 通过远程调试端口驱动浏览器
///
/// 每次提取都在默认上下文中新开一个标签页，与 `/trigger` 共用同一个 cookie 存储，
/// 这样 Cloudflare 验证通过后的 cookie 对后续提取可见。
pub struct RemoteBrowser {
    debug_url: String,
    client: Client,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {
    web_socket_debugger_url: String,
}

struct Job {
    url: String,
    script: String,
    wait_selector: String,
    sleep: Duration,
}

/// 一次提取的截止时间，每一步只能使用剩余的时间
#[derive(Debug, Clone, Copy)]
struct Deadline {
    start: Instant,
    limit: Duration,
}

impl Deadline {
    fn after(limit: Duration) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    fn remaining(&self) -> FetchResult<Duration> {
        let elapsed = self.start.elapsed();
        if elapsed >= self.limit {
            return Err(FetchError::Timeout {
                what: "页面提取",
                elapsed,
            });
        }
        Ok(self.limit - elapsed)
    }

    fn timeout_error(&self) -> FetchError {
        FetchError::Timeout {
            what: "页面提取",
            elapsed: self.start.elapsed(),
        }
    }
}

impl RemoteBrowser {
    pub fn new(debug_url: &str, timeout: Duration) -> Self {
        Self {
            debug_url: debug_url.trim_end_matches('/').to_owned(),
            client: Client::new(),
            timeout,
        }
    }

    /// `/json/version` 返回的地址通常指向 localhost，这里换成配置中的主机和端口
    async fn websocket_url(&self, deadline: Deadline) -> FetchResult<String> {
        if self.debug_url.starts_with("ws://") || self.debug_url.starts_with("wss://") {
            return Ok(self.debug_url.clone());
        }

        let version_url = format!("{}/json/version", self.debug_url);
        let info: VersionInfo = self
            .client
            .get(&version_url)
            .timeout(deadline.remaining()?)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(request_error("/json/version", deadline))?
            .json()
            .await
            .map_err(request_error("/json/version", deadline))?;

        rewrite_host(&info.web_socket_debugger_url, &self.debug_url)
    }

    // Browser::connect 的握手没有超时，先在截止时间内确认端点会完成 WebSocket 升级
    async fn ensure_upgradable(&self, ws_url: &str, deadline: Deadline) -> FetchResult<()> {
        let http_url = upgrade_check_url(ws_url)?;
        let response = self
            .client
            .get(&http_url)
            .header(CONNECTION, "Upgrade")
            .header(UPGRADE, "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .timeout(deadline.remaining()?)
            .send()
            .await
            .map_err(request_error("devtools websocket", deadline))?;

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            return Err(FetchError::Browser(format!(
                "调试端点未接受 WebSocket 升级: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn run(&self, request: &Extraction<'_>, deadline: Deadline) -> FetchResult<String> {
        let ws_url = self.websocket_url(deadline).await?;
        self.ensure_upgradable(&ws_url, deadline).await?;
        debug!("连接浏览器: {}", ws_url);

        let job = Job {
            url: request.url.to_owned(),
            script: request.script.to_owned(),
            wait_selector: request.wait_selector.trim().to_owned(),
            sleep: request.sleep,
        };

        tokio::task::spawn_blocking(move || extract_blocking(ws_url, job, deadline))
            .await
            .map_err(|e| FetchError::Browser(format!("提取任务异常退出: {}", e)))?
    }
}

#[async_trait]
impl Extract for RemoteBrowser {
    #[instrument(skip_all, fields(url = request.url))]
    async fn extract(&self, request: &Extraction<'_>) -> FetchResult<String> {
        let deadline = Deadline::after(self.timeout);
        let backstop = self.timeout + BACKSTOP_GRACE;
        match tokio::time::timeout(backstop, self.run(request, deadline)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("提取任务未在截止时间内返回");
                Err(deadline.timeout_error())
            }
        }
    }
}

fn request_error(
    endpoint: &'static str,
    deadline: Deadline,
) -> impl Fn(reqwest::Error) -> FetchError {
    move |source| {
        if source.is_timeout() {
            deadline.timeout_error()
        } else {
            FetchError::Transport { endpoint, source }
        }
    }
}

fn upgrade_check_url(ws_url: &str) -> FetchResult<String> {
    let mut url = Url::parse(ws_url).map_err(|e| FetchError::InvalidUrl {
        url: ws_url.to_owned(),
        reason: e.to_string(),
    })?;
    let scheme = match url.scheme() {
        "ws" => "http",
        "wss" => "https",
        other => {
            return Err(FetchError::InvalidUrl {
                url: ws_url.to_owned(),
                reason: format!("不支持的协议 {}", other),
            });
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| FetchError::InvalidUrl {
            url: ws_url.to_owned(),
            reason: "无法转换协议".to_owned(),
        })?;
    Ok(url.to_string())
}

fn rewrite_host(ws_url: &str, debug_url: &str) -> FetchResult<String> {
    let invalid = |url: &str, reason: String| FetchError::InvalidUrl {
        url: url.to_owned(),
        reason,
    };

    let mut ws = Url::parse(ws_url).map_err(|e| invalid(ws_url, e.to_string()))?;
    let debug = Url::parse(debug_url).map_err(|e| invalid(debug_url, e.to_string()))?;

    if let Some(host) = debug.host_str() {
        ws.set_host(Some(host))
            .map_err(|e| invalid(ws_url, e.to_string()))?;
        ws.set_port(debug.port_or_known_default())
            .map_err(|_| invalid(ws_url, "无法设置端口".to_owned()))?;
    }
    Ok(ws.to_string())
}

fn browser_error(step: &str) -> impl Fn(anyhow::Error) -> FetchError + '_ {
    move |e| FetchError::Browser(format!("{}: {}", step, e))
}

fn extract_blocking(ws_url: String, job: Job, deadline: Deadline) -> FetchResult<String> {
    let browser = Browser::connect_with_timeout(ws_url, deadline.remaining()?)
        .map_err(browser_error("连接浏览器"))?;
    // 默认上下文中的新标签页，共享验证后的 cookie
    let tab = browser.new_tab().map_err(browser_error("打开标签页"))?;

    let result = drive_tab(&tab, &job, deadline);

    if let Err(e) = tab.close(false) {
        warn!("关闭标签页失败: {}", e);
    }
    result
}

fn drive_tab(tab: &Arc<Tab>, job: &Job, deadline: Deadline) -> FetchResult<String> {
    tab.set_default_timeout(deadline.remaining()?);
    tab.navigate_to(&job.url)
        .and_then(|tab| tab.wait_until_navigated())
        .map_err(browser_error("页面导航"))?;

    if !job.wait_selector.is_empty() {
        wait_visible(tab, &job.wait_selector, deadline)?;
    }

    if !job.sleep.is_zero() {
        std::thread::sleep(job.sleep.min(deadline.remaining()?));
    }

    deadline.remaining()?;
    let remote = tab
        .evaluate(&job.script, false)
        .map_err(browser_error("执行脚本"))?;

    match remote.value {
        Some(serde_json::Value::String(result)) => Ok(result),
        other => Err(FetchError::Browser(format!(
            "脚本返回了非字符串结果: {:?}",
            other
        ))),
    }
}

fn wait_visible(tab: &Arc<Tab>, selector: &str, deadline: Deadline) -> FetchResult<()> {
    tab.wait_for_element_with_custom_timeout(selector, deadline.remaining()?)
        .map_err(browser_error("等待元素出现"))?;

    let script = visibility_script(selector);
    loop {
        let visible = tab
            .evaluate(&script, false)
            .map_err(browser_error("检查元素可见性"))?
            .value
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        if visible {
            return Ok(());
        }
        let remaining = deadline.remaining()?;
        std::thread::sleep(remaining.min(Duration::from_millis(100)));
    }
}

fn visibility_script(selector: &str) -> String {
    let quoted = serde_json::Value::String(selector.to_owned()).to_string();
    format!(
        r#"(function(){{
	var el = document.querySelector({quoted});
	if(!el) return false;
	var style = window.getComputedStyle(el);
	if(style.display === "none" || style.visibility === "hidden") return false;
	var rect = el.getBoundingClientRect();
	return rect.width > 0 || rect.height > 0;
}})();"#
    )
}
