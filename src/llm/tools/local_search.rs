//! 用户资源检索工具

use anyhow::Result;
use rig::tool::Tool;
use serde::Deserialize;
use std::path::PathBuf;

use crate::types::Resource;

const NO_RESULTS: &str = "No results found from the local knowledge base.";
const MAX_DOCUMENTS: usize = 5;

/// 检索工具错误
#[derive(Debug, thiserror::Error)]
#[error("local search failed: {0}")]
pub struct LocalSearchToolError(String);

/// 在用户提及的资源中按关键词检索段落
#[derive(Debug, Clone)]
pub struct AgentToolLocalSearch {
    resources: Vec<Resource>,
}

/// 检索参数
#[derive(Debug, Deserialize)]
pub struct LocalSearchArgs {
    pub keywords: String,
}

#[derive(Debug)]
struct Document<'a> {
    resource: &'a Resource,
    content: String,
    score: usize,
}

impl AgentToolLocalSearch {
    /// 没有资源时不创建该工具
    pub fn new(resources: Vec<Resource>) -> Option<Self> {
        if resources.is_empty() {
            None
        } else {
            Some(Self { resources })
        }
    }

    /// 资源的本地路径；`rag://` 等远端资源没有本地副本
    fn local_path(resource: &Resource) -> Option<PathBuf> {
        let uri = resource.uri.as_str();
        if let Some(path) = uri.strip_prefix("file://") {
            return Some(PathBuf::from(path));
        }
        if uri.contains("://") {
            return None;
        }
        Some(PathBuf::from(uri))
    }

    async fn query(&self, keywords: &str) -> Result<Vec<Document<'_>>> {
        let terms: Vec<String> = keywords
            .split_whitespace()
            .map(|term| term.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut documents = Vec::new();
        for resource in &self.resources {
            let Some(path) = Self::local_path(resource) else {
                tracing::debug!(uri = %resource.uri, "资源没有本地副本，跳过");
                continue;
            };
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "读取资源失败: {}", e);
                    continue;
                }
            };

            for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
                let lowered = paragraph.to_lowercase();
                let score = terms.iter().filter(|term| lowered.contains(term.as_str())).count();
                if score > 0 {
                    documents.push(Document {
                        resource,
                        content: paragraph.to_string(),
                        score,
                    });
                }
            }
        }

        // 稳定排序：同分时保持资源与段落的原有顺序
        documents.sort_by(|a, b| b.score.cmp(&a.score));
        documents.truncate(MAX_DOCUMENTS);
        Ok(documents)
    }
}

impl Tool for AgentToolLocalSearch {
    const NAME: &'static str = "local_search_tool";

    type Error = LocalSearchToolError;
    type Args = LocalSearchArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        rig::completion::ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Useful for retrieving information from the file with `rag://` uri prefix, \
                it should be higher priority than the web search or writing code. Input should be a search keywords."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "keywords": {
                        "type": "string",
                        "description": "search keywords to look up"
                    }
                },
                "required": ["keywords"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        tracing::info!(keywords = %args.keywords, "🔧 tool called...local_search_tool");
        let documents = self
            .query(&args.keywords)
            .await
            .map_err(|e| LocalSearchToolError(format!("{:#}", e)))?;

        if documents.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        Ok(documents
            .iter()
            .map(|doc| format!("## {} ({})\n\n{}", doc.resource.title, doc.resource.uri, doc.content))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
