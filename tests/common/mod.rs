#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use toongod_fetch::config::Timing;
use toongod_fetch::crawler::{Companion, Extract, Extraction};
use toongod_fetch::{ChapterImages, Config, FetchError, FetchResult};

type Handler = dyn Fn(&str) -> (u16, Vec<u8>) + Send + Sync;

/// 只回应一次请求就关闭连接的 HTTP 桩服务
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> (u16, Vec<u8>) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        let n = socket.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        head.extend_from_slice(&chunk[..n]);
                    }

                    let head = String::from_utf8_lossy(&head);
                    let target = head.split_whitespace().nth(1).unwrap_or("/").to_owned();
                    recorded.lock().unwrap().push(target.clone());

                    let (status, body) = handler(&target);
                    let response = format!(
                        "HTTP/1.1 {} Stub\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn path_of(target: &str) -> String {
    target.split('?').next().unwrap_or_default().to_owned()
}

pub fn query_of(target: &str) -> HashMap<String, String> {
    url::Url::parse(&format!("http://stub{}", target))
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

/// 所有延迟都缩短到毫秒级的配置
pub fn fast_config() -> Config {
    Config {
        timing: Timing {
            trigger_sleep_ms: 5000,
            poll_interval_ms: 5,
            bypass_timeout_secs: 1,
            poll_sleep_ms: 2000,
            extract_sleep_ms: 5000,
            extraction_timeout_secs: 60,
            save_pause_ms: 1,
            request_timeout_secs: 5,
        },
        ..Config::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractCall {
    pub url: String,
    pub script: String,
    pub wait_selector: String,
    pub sleep_ms: u128,
}

/// 按脚本内容返回预置结果的假浏览器
pub struct FakeBrowser {
    config: Config,
    title: String,
    blank_titles: usize,
    fail_title_after_bypass: bool,
    title_calls: AtomicUsize,
    chapters_json: String,
    images: HashMap<String, String>,
    calls: Mutex<Vec<ExtractCall>>,
}

impl FakeBrowser {
    pub fn new(config: &Config, title: &str, chapters_json: &str) -> Self {
        Self {
            config: config.clone(),
            title: title.to_owned(),
            blank_titles: 0,
            fail_title_after_bypass: false,
            title_calls: AtomicUsize::new(0),
            chapters_json: chapters_json.to_owned(),
            images: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 前 `n` 次标题提取返回空字符串，模拟验证尚未完成
    pub fn blank_titles(mut self, n: usize) -> Self {
        self.blank_titles = n;
        self
    }

    /// 验证轮询拿到标题之后，正式的标题提取失败
    pub fn fail_title_after_bypass(mut self) -> Self {
        self.fail_title_after_bypass = true;
        self
    }

    pub fn images(mut self, chapter_url: &str, json: &str) -> Self {
        self.images.insert(chapter_url.to_owned(), json.to_owned());
        self
    }

    pub fn calls(&self) -> Vec<ExtractCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn image_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.script == self.config.snippets.images.script)
            .map(|call| call.url)
            .collect()
    }
}

#[async_trait]
impl Extract for FakeBrowser {
    async fn extract(&self, request: &Extraction<'_>) -> FetchResult<String> {
        self.calls.lock().unwrap().push(ExtractCall {
            url: request.url.to_owned(),
            script: request.script.to_owned(),
            wait_selector: request.wait_selector.to_owned(),
            sleep_ms: request.sleep.as_millis(),
        });

        let snippets = &self.config.snippets;
        if request.script == snippets.title.script {
            let n = self.title_calls.fetch_add(1, Ordering::SeqCst);
            if n < self.blank_titles {
                return Ok(String::new());
            }
            if self.fail_title_after_bypass && n > self.blank_titles {
                return Err(FetchError::Browser("tab crashed".to_owned()));
            }
            return Ok(self.title.clone());
        }
        if request.script == snippets.chapters.script {
            return Ok(self.chapters_json.clone());
        }
        if request.script == snippets.images.script {
            return self
                .images
                .get(request.url)
                .cloned()
                .ok_or_else(|| FetchError::Browser(format!("no page {}", request.url)));
        }
        Err(FetchError::Browser("unknown script".to_owned()))
    }
}

/// 记录所有调用的假伴随服务
#[derive(Default)]
pub struct FakeCompanion {
    pub fail_trigger: bool,
    pub failing_saves: HashSet<String>,
    pub failing_lists: HashSet<String>,
    pub failing_files: HashSet<String>,
    pub manifests: HashMap<String, Vec<String>>,
    pub triggers: Mutex<Vec<(String, u64)>>,
    pub saves: Mutex<Vec<(String, String)>>,
    pub lists: Mutex<Vec<String>>,
    pub fetches: Mutex<Vec<(String, String)>>,
}

impl FakeCompanion {
    pub fn manifest(mut self, folder: &str, files: &[&str]) -> Self {
        self.manifests
            .insert(folder.to_owned(), files.iter().map(|f| f.to_string()).collect());
        self
    }
}

fn status(endpoint: &'static str, code: u16, body: &str) -> FetchError {
    FetchError::Status {
        endpoint,
        status: StatusCode::from_u16(code).unwrap(),
        body: body.to_owned(),
    }
}

#[async_trait]
impl Companion for FakeCompanion {
    async fn trigger(&self, page_url: &str, sleep_ms: u64) -> FetchResult<()> {
        self.triggers
            .lock()
            .unwrap()
            .push((page_url.to_owned(), sleep_ms));
        if self.fail_trigger {
            return Err(status("/trigger", 500, "Browser update error"));
        }
        Ok(())
    }

    async fn save_image(&self, chapter_url: &str, image_url: &str) -> FetchResult<()> {
        self.saves
            .lock()
            .unwrap()
            .push((chapter_url.to_owned(), image_url.to_owned()));
        if self.failing_saves.contains(image_url) {
            return Err(status("/save_image", 400, "Image URL does not belong to a CDN."));
        }
        Ok(())
    }

    async fn list_images(&self, folder: &str) -> FetchResult<ChapterImages> {
        self.lists.lock().unwrap().push(folder.to_owned());
        if self.failing_lists.contains(folder) {
            return Err(status("/get_image", 404, "Chapter folder not found"));
        }
        Ok(ChapterImages {
            chapter: folder.to_owned(),
            images: self.manifests.get(folder).cloned().unwrap_or_default(),
        })
    }

    async fn fetch_image(&self, folder: &str, filename: &str) -> FetchResult<Bytes> {
        self.fetches
            .lock()
            .unwrap()
            .push((folder.to_owned(), filename.to_owned()));
        if self.failing_files.contains(filename) {
            return Err(status("/get_image", 404, "Image not found"));
        }
        Ok(Bytes::from(format!("{}/{}", folder, filename)))
    }
}
