//! ReAct执行器 - 有界的工具调用循环

use anyhow::Result;

use super::LLMClient;
use super::types::{ChatRequest, TokenUsage};
use crate::error::{LimitScope, WorkflowError};
use crate::llm::tools::{ToolBox, ToolCallError};
use crate::types::ChatMessage;

/// ReAct模式配置
#[derive(Debug, Clone)]
pub struct ReActConfig {
    /// 允许的模型调用次数上限，达到上限即中止
    pub max_iterations: usize,
    /// 是否输出每轮的工具调用
    pub verbose: bool,
}

impl Default for ReActConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            verbose: false,
        }
    }
}

/// ReAct执行结果
#[derive(Debug, Clone)]
pub struct ReActResponse {
    /// 最终的文本结果
    pub content: String,
    /// 实际使用的模型调用次数
    pub iterations_used: usize,
    /// 工具调用记录，形如 name(args)
    pub tool_calls_history: Vec<String>,
    /// 循环中新增的消息（助手工具调用与工具结果）
    pub messages: Vec<ChatMessage>,
    pub usage: TokenUsage,
}

/// ReAct执行器
pub struct ReActExecutor;

impl ReActExecutor {
    /// 执行工具调用循环：无工具调用的响应即为结果；未知工具名为致命错误，
    /// 工具自身失败则作为结果回填给模型
    pub async fn execute(
        client: &LLMClient,
        system_prompt: &str,
        messages: Vec<ChatMessage>,
        tools: &ToolBox,
        config: &ReActConfig,
    ) -> Result<ReActResponse> {
        let definitions = tools.definitions().await;
        let mut conversation = messages;
        let initial_len = conversation.len();
        let mut tool_calls_history = Vec::new();
        let mut usage = TokenUsage::default();
        let mut iterations = 0;

        loop {
            if iterations >= config.max_iterations {
                tracing::warn!(limit = config.max_iterations, "工具调用循环达到上限");
                return Err(WorkflowError::RecursionLimitExceeded {
                    scope: LimitScope::Step,
                    limit: config.max_iterations,
                }
                .into());
            }
            iterations += 1;

            let request = ChatRequest::new(system_prompt, conversation.clone())
                .with_tools(definitions.clone());
            let response = client.invoke(request).await?;
            usage += response.usage;

            if response.tool_calls.is_empty() {
                return Ok(ReActResponse {
                    content: response.text,
                    iterations_used: iterations,
                    tool_calls_history,
                    messages: conversation.split_off(initial_len),
                    usage,
                });
            }

            conversation.push(response.to_message());
            for call in &response.tool_calls {
                if config.verbose {
                    tracing::info!(tool = %call.name, args = %call.arguments, "🔧 tool called");
                }
                tool_calls_history.push(format!("{}({})", call.name, call.arguments));

                let output = match tools.dispatch(call).await {
                    Ok(output) => output,
                    Err(ToolCallError::Unknown(name)) => {
                        return Err(WorkflowError::UnknownTool(name).into());
                    }
                    Err(err) => {
                        tracing::debug!(tool = %call.name, "工具执行失败: {}", err);
                        format!("Error: {}", err)
                    }
                };
                conversation.push(ChatMessage::tool_result(&call.id, output).named(&call.name));
            }
        }
    }
}
