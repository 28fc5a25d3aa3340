use anyhow::Result;
use async_trait::async_trait;

use crate::graph::node::{Node, NodeContext};
use crate::graph::outlet::extract_title;
use crate::graph::types::{Command, StageName};
use crate::prompts::PromptTemplate;
use crate::types::{ChatMessage, RunState, StateUpdate};

const REPORT_STRUCTURE_INSTRUCTION: &str = "IMPORTANT: Structure your report according to the format in the prompt. Remember to include:\n\n1. Key Points - A bulleted list of the most important findings\n2. Overview - A brief introduction to the topic\n3. Detailed Analysis - Organized into logical sections\n4. Survey Note (optional) - For more comprehensive reports\n5. Key Citations - List all references at the end\n\nFor citations, DO NOT include inline citations in the text. Instead, place all citations in the 'Key Citations' section at the end using the format: `- [Source Title](URL)`. Include an empty line between each citation for better readability.\n\nPRIORITIZE USING MARKDOWN TABLES for data presentation and comparison. Use tables whenever presenting comparative data, statistics, features, or options. Structure tables with clear headers and aligned columns. Example table format:\n\n| Feature | Description | Pros | Cons |\n|---------|-------------|------|------|\n| Feature 1 | Description 1 | Pros 1 | Cons 1 |\n| Feature 2 | Description 2 | Pros 2 | Cons 2 |";

/// 汇总计划与观察结果，生成最终报告并交给报告输出
pub struct ReporterNode;

#[async_trait]
impl Node for ReporterNode {
    fn name(&self) -> StageName {
        StageName::Reporter
    }

    async fn run(&self, state: &RunState, ctx: &NodeContext<'_>) -> Result<Command> {
        let system = PromptTemplate::Reporter.render(&ctx.prompt_vars(state));
        let response = ctx
            .services
            .llm_client
            .prompt(&system, report_messages(state))
            .await?;
        let report = response.text;

        let title = extract_title(&report);
        let location = ctx.services.outlet.save(&title, &report).await?;
        tracing::info!(%title, %location, "📄 报告已生成");

        Ok(Command::update(StateUpdate {
            final_report: Some(report),
            tokens_used: response.usage.total_tokens,
            ..Default::default()
        }))
    }
}

/// 先放入既有对话，再追加研究要求、结构说明与各步骤观察，保证以用户消息收尾
pub fn report_messages(state: &RunState) -> Vec<ChatMessage> {
    let (title, thought) = match state.plan() {
        Some(plan) => (plan.title.clone(), plan.thought.clone()),
        None if !state.research_topic.is_empty() => {
            (state.research_topic.clone(), state.research_topic.clone())
        }
        None => ("Research Report".to_string(), String::new()),
    };

    let mut messages = state.messages.clone();
    messages.push(ChatMessage::user(format!(
        "# Research Requirements\n\n## Task\n\n{}\n\n## Description\n\n{}",
        title, thought
    )));
    messages.push(ChatMessage::user(REPORT_STRUCTURE_INSTRUCTION).named("system"));
    messages.extend(state.observations.iter().map(|observation| {
        ChatMessage::user(format!(
            "Below are some observations for the research task:\n\n{}",
            observation
        ))
        .named("observation")
    }));
    messages
}
