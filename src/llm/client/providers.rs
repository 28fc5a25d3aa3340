//! LLM Provider支持模块

use anyhow::{Context, Result};
use async_trait::async_trait;
use rig::{
    OneOrMany,
    client::CompletionClient,
    completion::{AssistantContent, CompletionModel, Message},
    message::{ToolResultContent, UserContent},
    providers::gemini::completion::gemini_api_types::{AdditionalParameters, GenerationConfig},
};
use std::sync::Arc;

use super::ChatModel;
use super::types::{ChatRequest, ChatResponse, TokenUsage};
use crate::config::{LLMConfig, LLMProvider};
use crate::types::{ChatMessage, Role, ToolInvocation};

/// 包装任意rig补全模型的ChatModel实现
#[derive(Clone)]
pub struct RigChatModel<M> {
    model: M,
    temperature: f64,
    max_tokens: u64,
    additional_params: Option<serde_json::Value>,
}

impl<M> RigChatModel<M> {
    pub fn new(model: M, config: &LLMConfig) -> Self {
        Self {
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens.into(),
            additional_params: None,
        }
    }

    pub fn with_additional_params(mut self, params: serde_json::Value) -> Self {
        self.additional_params = Some(params);
        self
    }
}

#[async_trait]
impl<M> ChatModel for RigChatModel<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let (preamble, mut history) = to_rig_messages(request.system.as_deref(), &request.messages)?;
        let prompt = history
            .pop()
            .ok_or_else(|| anyhow::anyhow!("chat request has no messages"))?;

        let mut builder = self
            .model
            .completion_request(prompt)
            .messages(history)
            .tools(request.tools)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(params) = &self.additional_params {
            builder = builder.additional_params(params.clone());
        }

        let response = builder.send().await.context("模型服务调用失败")?;

        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();
        for content in response.choice.iter() {
            match content {
                AssistantContent::Text(text) => texts.push(text.text.clone()),
                AssistantContent::ToolCall(call) => tool_calls.push(ToolInvocation::new(
                    call.id.clone(),
                    call.function.name.clone(),
                    call.function.arguments.clone(),
                )),
                _ => {}
            }
        }

        let usage = TokenUsage::new(response.usage.input_tokens, response.usage.output_tokens);
        Ok(ChatResponse {
            text: texts.join("\n"),
            tool_calls,
            usage,
        })
    }
}

/// 将会话转为rig消息；system消息合并为preamble
fn to_rig_messages(
    system: Option<&str>,
    messages: &[ChatMessage],
) -> Result<(Option<String>, Vec<Message>)> {
    let mut preamble: Vec<&str> = system.into_iter().collect();
    let mut converted = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            Role::System => preamble.push(&message.content),
            Role::User => converted.push(Message::user(message.content.clone())),
            Role::Assistant => {
                let mut content = Vec::new();
                if !message.content.is_empty() || message.tool_calls.is_empty() {
                    content.push(AssistantContent::text(message.content.clone()));
                }
                content.extend(message.tool_calls.iter().map(|call| {
                    AssistantContent::tool_call(
                        call.id.clone(),
                        call.name.clone(),
                        call.arguments.clone(),
                    )
                }));
                converted.push(Message::Assistant {
                    id: None,
                    content: OneOrMany::many(content)?,
                });
            }
            Role::Tool => {
                let id = message.tool_call_id.clone().unwrap_or_default();
                converted.push(Message::User {
                    content: OneOrMany::one(UserContent::tool_result(
                        id,
                        OneOrMany::one(ToolResultContent::text(message.content.clone())),
                    )),
                });
            }
        }
    }

    let preamble = if preamble.is_empty() {
        None
    } else {
        Some(preamble.join("\n\n"))
    };
    Ok((preamble, converted))
}

/// 根据配置创建相应provider的对话模型
pub fn build_chat_model(config: &LLMConfig) -> Result<Arc<dyn ChatModel>> {
    let model = config.model.as_str();
    let chat_model: Arc<dyn ChatModel> = match config.provider {
        LLMProvider::OpenAI => {
            let client = rig::providers::openai::Client::builder(&config.api_key)
                .base_url(&config.api_base_url)
                .build();
            Arc::new(RigChatModel::new(
                client.completion_model(model).completions_api(),
                config,
            ))
        }
        LLMProvider::Moonshot => {
            let client = rig::providers::moonshot::Client::builder(&config.api_key)
                .base_url(&config.api_base_url)
                .build();
            Arc::new(RigChatModel::new(client.completion_model(model), config))
        }
        LLMProvider::DeepSeek => {
            let client = rig::providers::deepseek::Client::builder(&config.api_key)
                .base_url(&config.api_base_url)
                .build();
            Arc::new(RigChatModel::new(client.completion_model(model), config))
        }
        LLMProvider::Mistral => {
            let client = rig::providers::mistral::Client::builder(&config.api_key).build();
            Arc::new(RigChatModel::new(client.completion_model(model), config))
        }
        LLMProvider::OpenRouter => {
            let client = rig::providers::openrouter::Client::builder(&config.api_key).build();
            Arc::new(RigChatModel::new(client.completion_model(model), config))
        }
        LLMProvider::Anthropic => {
            let client = rig::providers::anthropic::ClientBuilder::<reqwest::Client>::new(&config.api_key).build()?;
            Arc::new(RigChatModel::new(client.completion_model(model), config))
        }
        LLMProvider::Gemini => {
            let client = rig::providers::gemini::Client::builder(&config.api_key).build()?;
            let params = AdditionalParameters::default().with_config(GenerationConfig::default());
            Arc::new(
                RigChatModel::new(client.completion_model(model), config)
                    .with_additional_params(serde_json::to_value(params)?),
            )
        }
        LLMProvider::Ollama => {
            let client = rig::providers::ollama::Client::builder().build();
            Arc::new(RigChatModel::new(client.completion_model(model), config))
        }
    };

    tracing::debug!(provider = %config.provider, model, "已创建模型客户端");
    Ok(chat_model)
}
