//! 网络检索与抓取工具（Tavily）

use anyhow::{Context, Result};
use async_trait::async_trait;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::SearchConfig;

/// 一条检索结果，顺序即服务返回的顺序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

/// 抓取得到的页面
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlPage {
    pub url: String,
    #[serde(default, alias = "raw_content")]
    pub content: String,
}

/// 网络检索服务
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;

    async fn crawl(&self, url: &str) -> Result<Vec<CrawlPage>>;
}

/// Tavily检索服务客户端
#[derive(Debug, Clone)]
pub struct TavilyClient {
    http: reqwest::Client,
    config: SearchConfig,
}

#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyCrawlResponse {
    #[serde(default)]
    results: Vec<CrawlPage>,
}

impl TavilyClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    async fn post<T: for<'a> Deserialize<'a>>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        if self.config.api_key.is_empty() {
            anyhow::bail!("TAVILY_API_KEY is not configured");
        }
        let url = format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("{} returned an error status", url))?;

        response
            .json::<T>()
            .await
            .with_context(|| format!("invalid response body from {}", url))
    }
}

#[async_trait]
impl SearchEngine for TavilyClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        tracing::debug!(query, "tavily search");
        let response: TavilySearchResponse = self
            .post(
                "search",
                serde_json::json!({
                    "query": query,
                    "max_results": self.config.max_results,
                }),
            )
            .await?;
        Ok(response.results)
    }

    async fn crawl(&self, url: &str) -> Result<Vec<CrawlPage>> {
        tracing::debug!(url, "tavily crawl");
        let response: TavilyCrawlResponse = self
            .post(
                "crawl",
                serde_json::json!({
                    "url": url,
                    "max_depth": self.config.crawl_max_depth,
                    "max_breadth": self.config.crawl_max_breadth,
                    "limit": self.config.crawl_limit,
                }),
            )
            .await?;
        Ok(response.results)
    }
}

/// 检索工具错误
#[derive(Debug, thiserror::Error)]
#[error("web search failed: {0}")]
pub struct WebSearchToolError(String);

/// 网络检索工具
#[derive(Clone)]
pub struct AgentToolWebSearch {
    engine: Arc<dyn SearchEngine>,
}

/// 检索参数
#[derive(Debug, Deserialize)]
pub struct WebSearchArgs {
    pub query: String,
}

impl AgentToolWebSearch {
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Self { engine }
    }
}

impl Tool for AgentToolWebSearch {
    const NAME: &'static str = "tavily_search";

    type Error = WebSearchToolError;
    type Args = WebSearchArgs;
    type Output = Vec<SearchResult>;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        rig::completion::ToolDefinition {
            name: Self::NAME.to_string(),
            description: "A search engine optimized for comprehensive, accurate, and trusted results. \
                Useful for answering questions about current events. Returns a list of results with title, url and content."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query to look up"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        tracing::debug!(query = %args.query, "🔧 tool called...tavily_search");
        self.engine
            .search(&args.query)
            .await
            .map_err(|e| WebSearchToolError(format!("{:#}", e)))
    }
}

/// 页面抓取工具
#[derive(Clone)]
pub struct AgentToolCrawl {
    engine: Arc<dyn SearchEngine>,
}

/// 抓取参数
#[derive(Debug, Deserialize)]
pub struct CrawlArgs {
    pub url: String,
}

impl AgentToolCrawl {
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Self { engine }
    }
}

impl Tool for AgentToolCrawl {
    const NAME: &'static str = "tavily_crawl";

    type Error = WebSearchToolError;
    type Args = CrawlArgs;
    type Output = Vec<CrawlPage>;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        rig::completion::ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Crawl a website starting from a base URL and return the content of the discovered pages."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The root URL to begin the crawl"
                    }
                },
                "required": ["url"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        tracing::debug!(url = %args.url, "🔧 tool called...tavily_crawl");
        self.engine
            .crawl(&args.url)
            .await
            .map_err(|e| WebSearchToolError(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticSearchEngine;

    #[tokio::test]
    async fn test_search_tool_returns_engine_results_in_order() {
        let engine = Arc::new(StaticSearchEngine::new(vec![
            SearchResult {
                title: "A".to_string(),
                url: "https://a".to_string(),
                content: "first".to_string(),
            },
            SearchResult {
                title: "B".to_string(),
                url: "https://b".to_string(),
                content: "second".to_string(),
            },
        ]));
        let tool = AgentToolWebSearch::new(engine.clone());

        let results = tool
            .call(WebSearchArgs {
                query: "rust".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(results[0].title, "A");
        assert_eq!(results[1].title, "B");
        assert_eq!(engine.queries(), vec!["rust".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_reported() {
        let config = SearchConfig {
            api_key: String::new(),
            ..SearchConfig::default()
        };
        let client = TavilyClient::new(&config).unwrap();
        let err = client.search("anything").await.unwrap_err();
        assert!(err.to_string().contains("TAVILY_API_KEY"));
    }
}
