pub mod config;
pub mod crawler;
pub mod error;
pub mod logger;
pub mod models;
pub mod snippet;
pub mod utils;

pub use config::Config;
pub use crawler::{ChapterRange, RunReport, ToongodCrawler};
pub use error::{FetchError, FetchResult};
pub use models::{ChapterImages, ChapterInfo, chapter_folder};
pub use snippet::{Snippet, Snippets};
