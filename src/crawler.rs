pub mod browser;
pub mod bypass;
pub mod companion;
pub mod parser;
pub mod processor;
pub mod range;

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

pub use browser::{Extract, Extraction, RemoteBrowser};
pub use companion::{Companion, CompanionClient};
pub use processor::Processor;
pub use range::{ChapterRange, RangeError};

use crate::config::Config;
use crate::models::ChapterInfo;

/// 单次运行的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub title: String,
    pub chapters_total: usize,
    pub chapters_selected: usize,
    pub chapters_failed: usize,
    pub images_saved: usize,
    pub images_failed: usize,
    pub files_downloaded: usize,
    pub files_failed: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: 章节 {}/{} (失败 {}), 保存图片 {} (失败 {}), 下载文件 {} (失败 {})",
            self.title,
            self.chapters_selected,
            self.chapters_total,
            self.chapters_failed,
            self.images_saved,
            self.images_failed,
            self.files_downloaded,
            self.files_failed
        )
    }
}

pub struct ToongodCrawler<E, C> {
    extractor: E,
    companion: C,
    config: Config,
}

impl ToongodCrawler<RemoteBrowser, CompanionClient> {
    pub fn from_config(config: Config, slug: Option<String>) -> Result<Self> {
        let extractor =
            RemoteBrowser::new(&config.remote_debug_url, config.timing.extraction_timeout());
        let companion =
            CompanionClient::new(&config.fastapi_base_url, config.timing.request_timeout())?
                .with_slug(slug);
        Ok(Self::new(extractor, companion, config))
    }
}

impl<E, C> ToongodCrawler<E, C>
where
    E: Extract,
    C: Companion,
{
    pub fn new(extractor: E, companion: C, config: Config) -> Self {
        Self {
            extractor,
            companion,
            config,
        }
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    pub fn companion(&self) -> &C {
        &self.companion
    }

    /// 绕过验证 -> 标题 -> 章节列表 -> 按范围逐章处理
    ///
    /// 章节之前的任何一步失败都会中止整个运行，之后的失败只跳过对应的章节或图片。
    #[instrument(skip_all, fields(series = series_url))]
    pub async fn run(
        &self,
        series_url: &str,
        chapter_range: &str,
        output_dir: &Path,
    ) -> Result<RunReport> {
        let range: ChapterRange = chapter_range.parse().context("章节范围解析失败")?;

        let processor = Processor::new(output_dir);
        processor.prepare().await.context("创建输出目录失败")?;

        let timing = &self.config.timing;
        let snippets = &self.config.snippets;

        bypass::trigger(&self.companion, series_url, timing.trigger_sleep_ms)
            .await
            .context("Cloudflare 验证触发失败")?;

        let poll = bypass::Poll {
            interval: timing.poll_interval(),
            settle: timing.poll_sleep(),
            timeout: timing.bypass_timeout(),
        };
        bypass::wait_for_bypass(&self.extractor, series_url, &snippets.title, poll)
            .await
            .context("等待 Cloudflare 验证完成失败")?;

        info!("正在获取系列标题...");
        let title = self
            .extractor
            .extract(&Extraction::new(
                series_url,
                &snippets.title,
                timing.extract_sleep(),
            ))
            .await
            .context("获取标题失败")?;
        let title = title.trim().to_owned();
        info!("系列标题: {}", title);

        info!("正在获取章节列表...");
        let chapters_json = self
            .extractor
            .extract(&Extraction::new(
                series_url,
                &snippets.chapters,
                timing.extract_sleep(),
            ))
            .await
            .context("获取章节列表失败")?;
        let chapters = parser::chapters(&chapters_json).context("章节列表解析失败")?;
        info!("共获取 {} 个章节", chapters.len());

        let mut report = RunReport {
            title,
            chapters_total: chapters.len(),
            ..Default::default()
        };

        let selected = range.select(chapters);
        report.chapters_selected = selected.len();
        info!("待下载章节: {}", selected.len());
        if selected.is_empty() {
            info!("指定范围内没有章节");
            return Ok(report);
        }

        for chapter in &selected {
            if let Err(e) = self.process_chapter(chapter, &processor, &mut report).await {
                error!("章节 {:.2} 处理失败: {:#}", chapter.number, e);
                report.chapters_failed += 1;
            }
        }

        info!("{}", report);
        Ok(report)
    }

    /// 提取图片地址 -> 逐张保存 -> 获取清单 -> 逐个下载
    #[instrument(skip_all, fields(chapter = chapter.number))]
    pub async fn process_chapter(
        &self,
        chapter: &ChapterInfo,
        processor: &Processor,
        report: &mut RunReport,
    ) -> Result<()> {
        let timing = &self.config.timing;
        info!("正在处理章节: {} (Chapter {:.2})", chapter.title, chapter.number);
        anyhow::ensure!(!chapter.url.trim().is_empty(), "章节没有链接: {}", chapter.title);

        let images_json = self
            .extractor
            .extract(&Extraction::new(
                &chapter.url,
                &self.config.snippets.images,
                timing.extract_sleep(),
            ))
            .await
            .context("获取章节图片失败")?;
        let image_urls = parser::image_urls(&images_json).context("图片列表解析失败")?;
        info!("章节 {:.2} 共 {} 张图片", chapter.number, image_urls.len());

        for (i, image_url) in image_urls.iter().enumerate() {
            info!("通过 /save_image 保存第 {} 张图片: {}", i + 1, image_url);
            match self.companion.save_image(&chapter.url, image_url).await {
                Ok(()) => {
                    info!("第 {} 张图片已保存", i + 1);
                    report.images_saved += 1;
                }
                Err(e) => {
                    warn!("第 {} 张图片保存失败: {}", i + 1, e);
                    report.images_failed += 1;
                }
            }
            sleep(timing.save_pause()).await;
        }

        let folder = chapter.folder();
        let saved = self
            .companion
            .list_images(&folder)
            .await
            .context("获取已保存图片清单失败")?;

        info!("下载章节 {:.2} 的 {} 张已保存图片", chapter.number, saved.images.len());
        for filename in &saved.images {
            let downloaded = match self.companion.fetch_image(&folder, filename).await {
                Ok(image_bytes) => processor.write_image(&folder, filename, image_bytes).await,
                Err(e) => Err(e),
            };
            match downloaded {
                Ok(_) => report.files_downloaded += 1,
                Err(e) => {
                    warn!("图片 {} 下载失败: {}", filename, e);
                    report.files_failed += 1;
                }
            }
        }
        Ok(())
    }
}
