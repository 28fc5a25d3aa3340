use anyhow::Result;
use async_trait::async_trait;

use crate::graph::node::{Node, NodeContext};
use crate::graph::types::{Command, StageName};
use crate::llm::client::ChatRequest;
use crate::llm::tools::handoff::{handoff_to_planner_definition, parse_handoff};
use crate::prompts::PromptTemplate;
use crate::types::{ChatMessage, Role, RunState, StateUpdate};

/// 面向用户的第一个阶段：识别研究意图并提取主题与语言
pub struct CoordinatorNode;

#[async_trait]
impl Node for CoordinatorNode {
    fn name(&self) -> StageName {
        StageName::Coordinator
    }

    async fn run(&self, state: &RunState, ctx: &NodeContext<'_>) -> Result<Command> {
        let system = PromptTemplate::Coordinator.render(&ctx.prompt_vars(state));
        let request = ChatRequest::new(system, state.messages.clone())
            .with_tools(vec![handoff_to_planner_definition()]);
        let response = ctx.services.llm_client.invoke(request).await?;

        let mut update = StateUpdate {
            tokens_used: response.usage.total_tokens,
            ..Default::default()
        };
        if !response.text.trim().is_empty() {
            update
                .messages
                .push(ChatMessage::assistant(response.text.clone()).named("coordinator"));
        }

        if response.tool_calls.is_empty() {
            tracing::warn!("Coordinator response contains no tool calls. Terminating workflow execution.");
            return Ok(Command::end().with_update(update));
        }

        let (locale, research_topic) = match response.tool_calls.iter().find_map(parse_handoff) {
            Some(handoff) => (handoff.locale, handoff.research_topic),
            None => (state.locale.clone(), fallback_topic(state)),
        };
        tracing::info!(%locale, %research_topic, "🧭 交接给planner");
        update.locale = Some(locale);
        update.research_topic = Some(research_topic);

        let next = if state.enable_background_investigation {
            StageName::BackgroundInvestigator
        } else {
            StageName::Planner
        };
        Ok(Command::goto(next).with_update(update))
    }
}

/// 交接参数不完整时沿用已有主题，仍为空则取最近一条用户消息
fn fallback_topic(state: &RunState) -> String {
    if !state.research_topic.is_empty() {
        return state.research_topic.clone();
    }
    state
        .messages
        .iter()
        .rev()
        .find(|message| message.role == Role::User)
        .map(|message| message.content.clone())
        .unwrap_or_default()
}
