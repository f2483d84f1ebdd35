use crate::domain::ports::Tool;
use crate::utils::error::{DocCrewError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub const SERPER_API_BASE: &str = "https://google.serper.dev";
const DEFAULT_SCRAPE_LIMIT: usize = 8_000;

/// `[[tools]]` 定義
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolSpec {
    FileRead {
        name: String,
        path: String,
    },
    ScrapeWebsite {
        name: String,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        max_chars: Option<usize>,
    },
    SerperSearch {
        name: String,
        #[serde(default)]
        num_results: Option<usize>,
    },
    YoutubeChannelSearch {
        name: String,
        channel_handle: String,
        #[serde(default)]
        num_results: Option<usize>,
    },
}

impl ToolSpec {
    pub fn name(&self) -> &str {
        match self {
            ToolSpec::FileRead { name, .. }
            | ToolSpec::ScrapeWebsite { name, .. }
            | ToolSpec::SerperSearch { name, .. }
            | ToolSpec::YoutubeChannelSearch { name, .. } => name,
        }
    }

    /// 可以帶 `{input}` 佔位符的欄位
    pub fn templated_fields(&self) -> Vec<&str> {
        match self {
            ToolSpec::FileRead { path, .. } => vec![path.as_str()],
            ToolSpec::ScrapeWebsite { url, .. } => url.as_deref().into_iter().collect(),
            ToolSpec::YoutubeChannelSearch { channel_handle, .. } => vec![channel_handle.as_str()],
            ToolSpec::SerperSearch { .. } => Vec::new(),
        }
    }
}

/// 搜尋類工具需要的連線設定
#[derive(Debug, Clone)]
pub struct SearchBackend {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for SearchBackend {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: SERPER_API_BASE.to_string(),
        }
    }
}

pub fn build_tool(spec: &ToolSpec, backend: &SearchBackend) -> Result<Arc<dyn Tool>> {
    let search = |name: &str, num_results: Option<usize>| -> Result<SerperSearchTool> {
        let api_key = backend
            .api_key
            .clone()
            .ok_or_else(|| DocCrewError::MissingConfigError {
                field: format!("SERPER_API_KEY (required by tool '{}')", name),
            })?;
        Ok(SerperSearchTool::new(name, api_key)?
            .with_base_url(backend.base_url.clone())
            .with_num_results(num_results.unwrap_or(5)))
    };

    let tool: Arc<dyn Tool> = match spec {
        ToolSpec::FileRead { name, path } => Arc::new(FileReadTool::new(name, path)),
        ToolSpec::ScrapeWebsite { name, url, max_chars } => {
            let mut tool = ScrapeWebsiteTool::new(name)?
                .with_max_chars(max_chars.unwrap_or(DEFAULT_SCRAPE_LIMIT));
            if let Some(url) = url {
                tool = tool.with_url(url.clone());
            }
            Arc::new(tool)
        }
        ToolSpec::SerperSearch { name, num_results } => Arc::new(search(name, *num_results)?),
        ToolSpec::YoutubeChannelSearch {
            name,
            channel_handle,
            num_results,
        } => Arc::new(YoutubeChannelSearchTool::new(
            name,
            channel_handle,
            search(name, *num_results)?,
        )),
    };
    Ok(tool)
}

fn tool_error(tool: &str, message: impl Into<String>) -> DocCrewError {
    DocCrewError::ToolError {
        tool: tool.to_string(),
        message: message.into(),
    }
}

fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("doc-crew/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

pub struct FileReadTool {
    name: String,
    path: PathBuf,
}

impl FileReadTool {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Reads the content of a local file"
    }

    async fn run(&self, _query: &str) -> Result<String> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            tool_error(&self.name, format!("cannot read {}: {}", self.path.display(), e))
        })
    }
}

pub struct ScrapeWebsiteTool {
    name: String,
    client: Client,
    url: Option<String>,
    max_chars: usize,
}

impl ScrapeWebsiteTool {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            client: http_client()?,
            url: None,
            max_chars: DEFAULT_SCRAPE_LIMIT,
        })
    }

    /// 固定抓取的網址；未設定時從 query 中找第一個 URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn target(&self, query: &str) -> Option<String> {
        self.url.clone().or_else(|| first_url(query))
    }
}

#[async_trait]
impl Tool for ScrapeWebsiteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Fetches a web page and returns its readable text"
    }

    async fn run(&self, query: &str) -> Result<String> {
        let url = self
            .target(query)
            .ok_or_else(|| tool_error(&self.name, "no URL configured or found in the task"))?;

        tracing::debug!("🌐 {}: fetching {}", self.name, url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(tool_error(
                &self.name,
                format!("GET {} returned HTTP {}", url, response.status()),
            ));
        }
        let html = response.text().await?;
        let text = html_to_text(&html);
        Ok(truncate_chars(&text, self.max_chars))
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

pub struct SerperSearchTool {
    name: String,
    client: Client,
    api_key: String,
    base_url: String,
    num_results: usize,
}

impl SerperSearchTool {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            client: http_client()?,
            api_key: api_key.into(),
            base_url: SERPER_API_BASE.to_string(),
            num_results: 5,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_num_results(mut self, num_results: usize) -> Self {
        self.num_results = num_results.max(1);
        self
    }

    async fn search(&self, query: &str) -> Result<String> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "q": query, "num": self.num_results });

        tracing::debug!("🔎 {}: searching '{}'", self.name, query);
        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(tool_error(
                &self.name,
                format!("search returned HTTP {}", response.status()),
            ));
        }

        let parsed: SerperResponse = response.json().await?;
        if parsed.organic.is_empty() {
            return Ok(format!("No search results found for '{}'.", query));
        }
        Ok(parsed
            .organic
            .iter()
            .take(self.num_results)
            .map(|r| format!("{} - {}\n{}", r.title, r.link, r.snippet))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[async_trait]
impl Tool for SerperSearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Searches the web and returns the top results"
    }

    async fn run(&self, query: &str) -> Result<String> {
        self.search(query.trim()).await
    }
}

/// 以搜尋後端限定在某個 YouTube 頻道內搜尋影片
pub struct YoutubeChannelSearchTool {
    name: String,
    channel_handle: String,
    search: SerperSearchTool,
}

impl YoutubeChannelSearchTool {
    pub fn new(name: impl Into<String>, channel_handle: impl Into<String>, search: SerperSearchTool) -> Self {
        let handle = channel_handle.into();
        let channel_handle = if handle.starts_with('@') {
            handle
        } else {
            format!("@{}", handle)
        };
        Self {
            name: name.into(),
            channel_handle,
            search,
        }
    }

    pub fn scoped_query(&self, query: &str) -> String {
        format!("site:youtube.com/{} {}", self.channel_handle, query.trim())
    }
}

#[async_trait]
impl Tool for YoutubeChannelSearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Searches videos published on a specific YouTube channel"
    }

    async fn run(&self, query: &str) -> Result<String> {
        self.search.search(&self.scoped_query(query)).await
    }
}

fn first_url(text: &str) -> Option<String> {
    static URL: OnceLock<Regex> = OnceLock::new();
    let pattern = URL.get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("static url regex"));
    pattern
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')', ';']).to_string())
}

/// 去掉 script/style 區塊與所有標籤，合併空白
pub fn html_to_text(html: &str) -> String {
    static BLOCKS: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();

    let blocks = BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>").expect("static block regex")
    });
    let tags = TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("static tag regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("static whitespace regex"));

    let without_blocks = blocks.replace_all(html, " ");
    let without_tags = tags.replace_all(&without_blocks, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    spaces.replace_all(&decoded, " ").trim().to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text() {
        let html = r#"<html><head><style>body { color: red; }</style><script>var x = "<p>";</script></head>
            <body><h1>Senior   Rust Engineer</h1><p>Tokio &amp; async<br/>experience</p></body></html>"#;
        assert_eq!(html_to_text(html), "Senior Rust Engineer Tokio & async experience");
    }

    #[test]
    fn test_first_url_trims_punctuation() {
        assert_eq!(
            first_url("Analyze the job posting URL provided (https://jobs.example.com/42?src=x)."),
            Some("https://jobs.example.com/42?src=x".to_string())
        );
        assert_eq!(first_url("no link here"), None);
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo…");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_youtube_query_is_scoped_to_channel() {
        let search = SerperSearchTool::new("search", "key").unwrap();
        let tool = YoutubeChannelSearchTool::new("youtube", "techwithzoum", search);
        assert_eq!(
            tool.scoped_query(" fine-tuning "),
            "site:youtube.com/@techwithzoum fine-tuning"
        );
    }

    #[test]
    fn test_search_tools_require_key() {
        let spec = ToolSpec::SerperSearch {
            name: "search".to_string(),
            num_results: None,
        };
        assert!(matches!(
            build_tool(&spec, &SearchBackend::default()),
            Err(DocCrewError::MissingConfigError { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_read_tool() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"# Jane Doe\nRust developer").unwrap();

        let tool = FileReadTool::new("read_resume", file.path());
        let content = tool.run("ignored").await.unwrap();
        assert!(content.contains("Rust developer"));

        let missing = FileReadTool::new("read_resume", "/definitely/not/here.md");
        assert!(matches!(missing.run("").await, Err(DocCrewError::ToolError { .. })));
    }
}
