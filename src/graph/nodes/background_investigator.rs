use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::graph::node::{Node, NodeContext};
use crate::graph::types::{Command, StageName};
use crate::llm::tools::web_search::SearchResult;
use crate::types::{RunState, StateUpdate};

/// 规划前对主题做一次网络检索，结果作为planner的背景材料
pub struct BackgroundInvestigatorNode;

#[async_trait]
impl Node for BackgroundInvestigatorNode {
    fn name(&self) -> StageName {
        StageName::BackgroundInvestigator
    }

    async fn run(&self, state: &RunState, ctx: &NodeContext<'_>) -> Result<Command> {
        let query = state.research_topic.as_str();
        let results = ctx
            .services
            .search
            .search(query)
            .await
            .with_context(|| format!("background investigation for '{}' failed", query))?;
        tracing::info!(query, results = results.len(), "🔎 背景调查完成");

        Ok(Command::update(StateUpdate {
            background_investigation_results: Some(digest(&results)),
            ..Default::default()
        }))
    }
}

/// 按返回顺序拼接为 `## 标题\n\n正文`，条目之间空一行
pub fn digest(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|result| format!("## {}\n\n{}", result.title, result.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
