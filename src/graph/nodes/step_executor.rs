//! researcher与coder共用的步骤执行逻辑

use anyhow::Result;

use crate::config::servers_for_role;
use crate::graph::node::NodeContext;
use crate::graph::types::{AgentRole, Command, StageName};
use crate::llm::client::{ReActConfig, ReActExecutor};
use crate::llm::tools::ToolBox;
use crate::prompts::PromptTemplate;
use crate::types::{ChatMessage, Plan, RunState, StateUpdate, Step, StepCompletion};

/// 执行计划中的当前步骤，结果写回该步骤并回到research_team
pub async fn execute_agent_step(
    role: AgentRole,
    tools: ToolBox,
    extra_messages: Vec<ChatMessage>,
    state: &RunState,
    ctx: &NodeContext<'_>,
) -> Result<Command> {
    let Some(plan) = state.plan() else {
        tracing::warn!(role = role.as_str(), "没有可执行的计划");
        return Ok(Command::goto(StageName::ResearchTeam));
    };
    let Some((index, step)) = plan.current_step() else {
        tracing::warn!(role = role.as_str(), "计划中没有未执行的步骤");
        return Ok(Command::goto(StageName::ResearchTeam));
    };

    for (name, server) in servers_for_role(&ctx.config.tool_servers, role) {
        tracing::info!(
            server = name,
            transport = %server.transport,
            tools = ?server.enabled_tools,
            "tool server configured for {}, not connected in this build",
            role.as_str()
        );
    }

    let mut messages = vec![ChatMessage::user(step_input(plan, step, &state.locale))];
    messages.extend(extra_messages);

    let template = match role {
        AgentRole::Researcher => PromptTemplate::Researcher,
        AgentRole::Coder => PromptTemplate::Coder,
    };
    let system = template.render(&ctx.prompt_vars(state));
    let react_config = ReActConfig {
        max_iterations: ctx.config.step_recursion_limit,
        verbose: ctx.services.config.verbose,
    };

    tracing::info!(role = role.as_str(), step = %step.title, tools = ?tools.names(), "🚀 执行步骤");
    let response = ReActExecutor::execute(
        &ctx.services.llm_client,
        &system,
        messages,
        &tools,
        &react_config,
    )
    .await?;
    tracing::info!(
        role = role.as_str(),
        step = %step.title,
        iterations = response.iterations_used,
        "✅ 步骤完成"
    );

    let result = response.content;
    Ok(Command::goto(StageName::ResearchTeam).with_update(StateUpdate {
        messages: vec![ChatMessage::assistant(result.clone()).named(role.as_str())],
        observations: vec![result.clone()],
        completed_step: Some(StepCompletion { index, result }),
        tokens_used: response.usage.total_tokens,
        ..Default::default()
    }))
}

/// 组装步骤输入：研究主题、已完成步骤的发现、当前步骤与语言
pub fn step_input(plan: &Plan, step: &Step, locale: &str) -> String {
    let mut completed = String::new();
    let mut finished = plan.completed_steps().peekable();
    if finished.peek().is_some() {
        completed.push_str("# Completed Research Steps\n\n");
        for (i, done) in finished.enumerate() {
            completed.push_str(&format!(
                "## Completed Step {}: {}\n\n<finding>\n{}\n</finding>\n\n",
                i + 1,
                done.title,
                done.execution_res.as_deref().unwrap_or_default()
            ));
        }
    }

    format!(
        "# Research Topic\n\n{}\n\n{}# Current Step\n\n## Title\n\n{}\n\n## Description\n\n{}\n\n## Locale\n\n{}",
        plan.title, completed, step.title, step.description, locale
    )
}
