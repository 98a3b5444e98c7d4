use scraper::Selector;
use serde::{Deserialize, Deserializer};

/// 标题: `div.post-title h1` 的文本，不存在时为空字符串
pub static TITLE_SCRIPT: &str = r#"document.querySelector("div.post-title h1") ? document.querySelector("div.post-title h1").innerText : "";"#;

pub static TITLE_WAIT: &str = "div.post-title";

/// 章节列表: 返回 `[{title, number, url}]` 的JSON字符串
pub static CHAPTERS_SCRIPT: &str = r#"(function(){
	var chapters = [];
	var items = document.querySelectorAll("ul.main.version-chap.no-volumn.active li.wp-manga-chapter");
	for(var i=0; i<items.length; i++){
		var link = items[i].querySelector("a");
		if(!link) continue;
		var titleText = link.textContent.trim();
		var numStr = titleText.replace(/Chapter\s*/i, "");
		var num = parseFloat(numStr) || 0;
		var href = link.getAttribute("href");
		chapters.push({title: titleText, number: num, url: href});
	}
	return JSON.stringify(chapters);
})();"#;

pub static CHAPTERS_WAIT: &str = "ul.main.version-chap.no-volumn.active";

/// 章节图片: 按DOM顺序返回图片地址数组的JSON字符串
pub static IMAGES_SCRIPT: &str = r#"(function(){
	var imgs = document.querySelectorAll("div.reading-content img.wp-manga-chapter-img");
	var srcs = [];
	for(var i = 0; i < imgs.length; i++){
		var src = imgs[i].getAttribute("src") || imgs[i].getAttribute("data-src");
		if(src && src.trim() !== ""){
			srcs.push(src.trim());
		}
	}
	return JSON.stringify(srcs);
})();"#;

pub static IMAGES_WAIT: &str = "div.reading-content";

/// 在页面中执行的提取脚本，以及执行前需要等待可见的选择器
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Snippet {
    pub script: String,
    #[serde(default, deserialize_with = "deserialize_wait_selector")]
    pub wait_selector: String,
}

impl Snippet {
    pub fn new(script: &str, wait_selector: &str) -> Self {
        Self {
            script: script.to_owned(),
            wait_selector: wait_selector.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Snippets {
    pub title: Snippet,
    pub chapters: Snippet,
    pub images: Snippet,
}

impl Default for Snippets {
    fn default() -> Self {
        Self {
            title: Snippet::new(TITLE_SCRIPT, TITLE_WAIT),
            chapters: Snippet::new(CHAPTERS_SCRIPT, CHAPTERS_WAIT),
            images: Snippet::new(IMAGES_SCRIPT, IMAGES_WAIT),
        }
    }
}

// 选择器由浏览器使用，这里只做语法校验，空字符串表示不等待
fn deserialize_wait_selector<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let option_str: Option<String> = Option::deserialize(deserializer)?;

    match option_str {
        Some(s) if s.trim().is_empty() => Ok(String::new()),
        Some(s) => Selector::parse(&s)
            .map(|_| s.trim().to_owned())
            .map_err(|e| serde::de::Error::custom(format!("Invalid selector '{}': {}", s, e))),
        None => Ok(String::new()),
    }
}
