//! LLM客户端 - 提供统一的LLM服务接口

use anyhow::Result;
use async_trait::async_trait;
use rig::completion::ToolDefinition;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use crate::config::LLMConfig;
use crate::error::WorkflowError;
use crate::types::ChatMessage;
use crate::utils::token_estimator::TokenEstimator;

mod providers;
mod react_executor;
pub mod types;

pub use providers::{RigChatModel, build_chat_model};
pub use react_executor::{ReActConfig, ReActExecutor, ReActResponse};
pub use types::{ChatRequest, ChatResponse, TokenUsage};

/// 结构化输出时绑定给模型的提交能力
pub const SUBMIT_TOOL_NAME: &str = "submit";

static TOKEN_ESTIMATOR: LazyLock<TokenEstimator> = LazyLock::new(TokenEstimator::new);

/// 对话补全服务，生产实现包装rig的各家Provider，测试中可替换为脚本化实现
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse>;
}

/// 结构化提取结果
#[derive(Debug, Clone)]
pub struct Extracted<T> {
    pub value: T,
    pub usage: TokenUsage,
}

/// LLM客户端 - 提供统一的LLM服务接口
#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    model: Arc<dyn ChatModel>,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let model = build_chat_model(config)?;
        Ok(Self::with_model(config.clone(), model))
    }

    /// 使用指定的模型实现创建客户端
    pub fn with_model(config: LLMConfig, model: Arc<dyn ChatModel>) -> Self {
        Self { config, model }
    }

    pub fn config(&self) -> &LLMConfig {
        &self.config
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let retry_delay_ms = self.config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    if retries >= max_retries {
                        tracing::error!(attempts = retries, "调用模型服务失败: {:#}", err);
                        return Err(err);
                    }
                    tracing::warn!(
                        attempt = retries,
                        max_retries,
                        "调用模型服务出错，重试中: {:#}",
                        err
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }

    /// 调用模型；服务未返回用量时按文本估算
    pub async fn invoke(&self, request: ChatRequest) -> Result<ChatResponse> {
        let timeout = std::time::Duration::from_secs(self.config.timeout_seconds);
        let mut response = self
            .retry_with_backoff(|| async {
                tokio::time::timeout(timeout, self.model.complete(request.clone()))
                    .await
                    .map_err(|_| {
                        anyhow::anyhow!(
                            "model call timed out after {}s",
                            self.config.timeout_seconds
                        )
                    })?
            })
            .await?;

        if response.usage.is_empty() {
            response.usage = TOKEN_ESTIMATOR.estimate_usage(
                request.system.as_deref(),
                &request.messages,
                &response.text,
            );
        }
        Ok(response)
    }

    /// 单轮对话（不绑定工具）
    pub async fn prompt(&self, system_prompt: &str, messages: Vec<ChatMessage>) -> Result<ChatResponse> {
        self.invoke(ChatRequest::new(system_prompt, messages)).await
    }

    /// 数据提取方法：通过绑定submit能力获取结构化结果，失败时尝试解析文本中的JSON
    pub async fn extract<T>(
        &self,
        system_prompt: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<Extracted<T>>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let schema = schemars::schema_for!(T);
        let submit = ToolDefinition {
            name: SUBMIT_TOOL_NAME.to_string(),
            description: "Submit the structured result. Call this exactly once with the complete object."
                .to_string(),
            parameters: serde_json::to_value(&schema)?,
        };

        let request = ChatRequest::new(system_prompt, messages).with_tools(vec![submit]);
        let response = self.invoke(request).await?;

        let parsed = match response
            .tool_calls
            .iter()
            .find(|call| call.name == SUBMIT_TOOL_NAME)
        {
            Some(call) => serde_json::from_value::<T>(call.arguments.clone())
                .map_err(|e| format!("submitted object does not match the schema: {}", e)),
            None => parse_json_body::<T>(&response.text),
        };

        match parsed {
            Ok(value) => Ok(Extracted {
                value,
                usage: response.usage,
            }),
            Err(reason) => Err(WorkflowError::Collaborator(format!(
                "structured output could not be parsed: {}",
                reason
            ))
            .into()),
        }
    }
}

/// 从自由文本中解析JSON对象，兼容```json代码块包裹
fn parse_json_body<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|body| body.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if let Ok(value) = serde_json::from_str::<T>(unfenced) {
        return Ok(value);
    }

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<T>(&unfenced[start..=end]).map_err(|e| e.to_string())
        }
        _ => Err("no JSON object found in the response".to_string()),
    }
}
