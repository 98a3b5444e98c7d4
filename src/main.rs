use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use toongod_fetch::utils::display_elapsed_time;
use toongod_fetch::{Config, ToongodCrawler, logger};

#[derive(Parser, Debug)]
#[command(version, about = "通过远程浏览器和图片缓存服务下载漫画章节")]
struct Cli {
    /// 系列页面地址
    series_url: String,
    /// 章节范围，例如 1-5
    chapter_range: String,
    #[arg(long, value_name = "DIR", default_value = "./bin")]
    output_dir: PathBuf,
    /// TOML 配置文件，默认读取当前目录的 toongod.toml(可不存在)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// 伴随服务中的系列目录
    #[arg(long)]
    slug: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_exit_code(&e));
        }
    };

    ExitCode::from(run_exit_code(run(cli).await))
}

/// `--help`/`--version` 正常退出，其余参数错误统一返回 1
fn usage_exit_code(e: &clap::Error) -> u8 {
    if e.use_stderr() { 1 } else { 0 }
}

fn run_exit_code(result: Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Series URL: {}", cli.series_url);
    info!("Chapter Range: {}", cli.chapter_range);
    info!("Output Directory: {}", cli.output_dir.display());

    let config = Config::load(cli.config.as_deref())?;
    let crawler = ToongodCrawler::from_config(config, cli.slug)?;

    let start = Instant::now();
    crawler
        .run(&cli.series_url, &cli.chapter_range, &cli.output_dir)
        .await?;
    display_elapsed_time(start.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_arguments_exit_with_one() {
        let err = Cli::try_parse_from(["toongod-fetch"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), 1);

        let err = Cli::try_parse_from(["toongod-fetch", "https://x/series"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), 1);

        let err = Cli::try_parse_from(["toongod-fetch", "a", "1-1", "--bogus"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), 1);
    }

    #[test]
    fn help_and_version_exit_with_zero() {
        for flag in ["--help", "--version"] {
            let err = Cli::try_parse_from(["toongod-fetch", flag]).unwrap_err();
            assert_eq!(usage_exit_code(&err), 0, "{}", flag);
        }
    }

    #[test]
    fn run_result_maps_to_exit_code() {
        assert_eq!(run_exit_code(Ok(())), 0);
        assert_eq!(run_exit_code(Err(anyhow::anyhow!("章节范围解析失败"))), 1);
    }

    #[test]
    fn positional_arguments_and_defaults() {
        let cli = Cli::try_parse_from(["toongod-fetch", "https://x/series", "1-5"]).unwrap();
        assert_eq!(cli.series_url, "https://x/series");
        assert_eq!(cli.chapter_range, "1-5");
        assert_eq!(cli.output_dir, PathBuf::from("./bin"));
        assert!(cli.config.is_none());
        assert!(cli.slug.is_none());
    }
}
