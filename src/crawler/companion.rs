use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::models::ChapterImages;

static TRIGGER: &str = "/trigger";
static SAVE_IMAGE: &str = "/save_image";
static GET_IMAGE: &str = "/get_image";

/// 负责抓取、缓存并提供章节图片的伴随服务
#[async_trait]
pub trait Companion: Send + Sync {
    /// 让服务端打开页面并通过 Cloudflare 验证，不注入脚本，不等待选择器
    async fn trigger(&self, page_url: &str, sleep_ms: u64) -> FetchResult<()>;

    async fn save_image(&self, chapter_url: &str, image_url: &str) -> FetchResult<()>;

    async fn list_images(&self, folder: &str) -> FetchResult<ChapterImages>;

    async fn fetch_image(&self, folder: &str, filename: &str) -> FetchResult<Bytes>;
}

pub struct CompanionClient {
    client: Client,
    base_url: String,
    slug: Option<String>,
}

impl CompanionClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            slug: None,
        })
    }

    /// 服务端按系列 slug 划分存储目录
    pub fn with_slug(mut self, slug: Option<String>) -> Self {
        self.slug = slug.filter(|s| !s.trim().is_empty());
        self
    }

    async fn get(&self, endpoint: &'static str, query: &[(&str, &str)]) -> FetchResult<Response> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("请求 {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|source| FetchError::Transport { endpoint, source })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                endpoint,
                status,
                body,
            });
        }
        Ok(response)
    }

    fn with_slug_param<'a>(&'a self, mut query: Vec<(&'a str, &'a str)>) -> Vec<(&'a str, &'a str)> {
        if let Some(slug) = &self.slug {
            query.push(("slug", slug));
        }
        query
    }
}

#[async_trait]
impl Companion for CompanionClient {
    async fn trigger(&self, page_url: &str, sleep_ms: u64) -> FetchResult<()> {
        let sleep = sleep_ms.to_string();
        let query = [
            ("url", page_url),
            ("js", ""),
            ("wait", ""),
            ("sleep", sleep.as_str()),
        ];
        let response = self.get(TRIGGER, &query).await?;
        let body = response
            .text()
            .await
            .map_err(|source| FetchError::Transport {
                endpoint: TRIGGER,
                source,
            })?;
        debug!("{} 响应: {}", TRIGGER, body);
        Ok(())
    }

    async fn save_image(&self, chapter_url: &str, image_url: &str) -> FetchResult<()> {
        let query = self.with_slug_param(vec![("chapter_url", chapter_url), ("image_url", image_url)]);
        self.get(SAVE_IMAGE, &query).await?;
        Ok(())
    }

    async fn list_images(&self, folder: &str) -> FetchResult<ChapterImages> {
        let query = self.with_slug_param(vec![("chapter", folder)]);
        let response = self.get(GET_IMAGE, &query).await?;
        let body = response
            .text()
            .await
            .map_err(|source| FetchError::Transport {
                endpoint: GET_IMAGE,
                source,
            })?;
        serde_json::from_str(&body).map_err(|e| FetchError::json("已保存图片清单", e))
    }

    async fn fetch_image(&self, folder: &str, filename: &str) -> FetchResult<Bytes> {
        let query = self.with_slug_param(vec![("chapter", folder), ("filename", filename)]);
        let response = self.get(GET_IMAGE, &query).await?;
        response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                endpoint: GET_IMAGE,
                source,
            })
    }
}
