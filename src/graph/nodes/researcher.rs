use anyhow::Result;
use async_trait::async_trait;

use super::step_executor::execute_agent_step;
use crate::graph::node::{Node, NodeContext};
use crate::graph::types::{AgentRole, Command, StageName};
use crate::llm::tools::ToolBox;
use crate::llm::tools::local_search::AgentToolLocalSearch;
use crate::llm::tools::web_search::{AgentToolCrawl, AgentToolWebSearch};
use crate::types::{ChatMessage, Resource, RunState};

const CITATION_INSTRUCTION: &str = "IMPORTANT: DO NOT include inline citations in the text. Instead, track all sources and include a References section at the end using link reference format. Include an empty line between each citation for better readability. Use this format for each reference:\n- [Source Title](URL)\n\n- [Another Source](URL)";

/// 调研步骤执行者：网络检索、网页抓取，以及用户资源的本地检索
pub struct ResearcherNode;

#[async_trait]
impl Node for ResearcherNode {
    fn name(&self) -> StageName {
        StageName::Researcher
    }

    async fn run(&self, state: &RunState, ctx: &NodeContext<'_>) -> Result<Command> {
        let mut tools = ToolBox::new();
        if let Some(local_search) = AgentToolLocalSearch::new(state.resources.clone()) {
            tools = tools.with_tool(local_search);
        }
        let tools = tools
            .with_tool(AgentToolWebSearch::new(ctx.services.search.clone()))
            .with_tool(AgentToolCrawl::new(ctx.services.search.clone()));

        let mut extra_messages = Vec::new();
        if !state.resources.is_empty() {
            extra_messages.push(ChatMessage::user(resources_notice(&state.resources)));
        }
        extra_messages.push(ChatMessage::user(CITATION_INSTRUCTION).named("system"));

        execute_agent_step(AgentRole::Researcher, tools, extra_messages, state, ctx).await
    }
}

fn resources_notice(resources: &[Resource]) -> String {
    let mut notice = String::from("**The user mentioned the following resource files:**\n\n");
    for resource in resources {
        notice.push_str(&format!(
            "- {} ({})\n",
            resource.title,
            resource.description.as_deref().unwrap_or_default()
        ));
    }
    notice.push_str(
        "\n\nYou MUST use the **local_search_tool** to retrieve the information from the resource files.",
    );
    notice
}
