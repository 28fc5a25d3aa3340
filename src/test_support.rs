//! 测试替身：脚本化模型、固定检索结果、内存报告输出等

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{CheckpointBackend, Config, LLMConfig};
use crate::graph::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use crate::graph::context::WorkflowContext;
use crate::graph::outlet::ReportOutlet;
use crate::llm::client::{ChatModel, ChatRequest, ChatResponse, LLMClient, SUBMIT_TOOL_NAME};
use crate::llm::tools::handoff::HANDOFF_TO_PLANNER;
use crate::llm::tools::python_repl::CodeRunner;
use crate::llm::tools::web_search::{CrawlPage, SearchEngine, SearchResult};
use crate::types::ToolInvocation;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// 不重试、不等待的模型配置
pub fn test_llm_config() -> LLMConfig {
    LLMConfig {
        api_key: "test-key".to_string(),
        retry_attempts: 1,
        retry_delay_ms: 0,
        ..LLMConfig::default()
    }
}

/// 按顺序返回预设响应，并记录收到的请求
#[derive(Default)]
pub struct ScriptedChatModel {
    responses: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatModel {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, response: ChatResponse) {
        lock(&self.responses).push_back(response);
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        lock(&self.requests).push(request);
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| anyhow!("scripted chat model has no responses left"))
    }
}

/// coordinator 的交接响应
pub fn handoff(research_topic: &str, locale: &str) -> ChatResponse {
    ChatResponse::tool_calls(vec![ToolInvocation::new(
        "handoff-1",
        HANDOFF_TO_PLANNER,
        json!({ "research_topic": research_topic, "locale": locale }),
    )])
}

/// 结构化输出的提交响应
pub fn submit(value: Value) -> ChatResponse {
    ChatResponse::tool_calls(vec![ToolInvocation::new("submit-1", SUBMIT_TOOL_NAME, value)])
}

/// 一个含给定步骤的计划，步骤为 (step_type, title)
pub fn plan_json(title: &str, has_enough_context: bool, steps: &[(&str, &str)]) -> Value {
    let steps = steps
        .iter()
        .map(|(step_type, step_title)| {
            json!({
                "need_search": *step_type == "research",
                "title": step_title,
                "description": format!("do {}", step_title),
                "step_type": step_type,
            })
        })
        .collect::<Vec<_>>();
    json!({
        "locale": "en-US",
        "has_enough_context": has_enough_context,
        "thought": format!("thinking about {}", title),
        "title": title,
        "steps": steps,
    })
}

/// 返回固定结果的检索服务
#[derive(Default)]
pub struct StaticSearchEngine {
    results: Vec<SearchResult>,
    queries: Mutex<Vec<String>>,
    fail: bool,
}

impl StaticSearchEngine {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl SearchEngine for StaticSearchEngine {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        lock(&self.queries).push(query.to_string());
        if self.fail {
            return Err(anyhow!("search service unavailable"));
        }
        Ok(self.results.clone())
    }

    async fn crawl(&self, url: &str) -> Result<Vec<CrawlPage>> {
        lock(&self.queries).push(url.to_string());
        if self.fail {
            return Err(anyhow!("search service unavailable"));
        }
        Ok(vec![CrawlPage {
            url: url.to_string(),
            content: format!("content of {}", url),
        }])
    }
}

/// 固定成功或失败的代码执行服务
pub struct StubCodeRunner {
    outcome: std::result::Result<String, String>,
    executed: Mutex<Vec<String>>,
}

impl StubCodeRunner {
    pub fn ok(output: &str) -> Self {
        Self {
            outcome: Ok(output.to_string()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn err(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }
}

#[async_trait]
impl CodeRunner for StubCodeRunner {
    async fn run(&self, code: &str) -> Result<String> {
        lock(&self.executed).push(code.to_string());
        self.outcome.clone().map_err(|message| anyhow!(message))
    }
}

/// 把报告留在内存中
#[derive(Default)]
pub struct RecordingOutlet {
    saved: Mutex<Vec<(String, String)>>,
}

impl RecordingOutlet {
    pub fn saved(&self) -> Vec<(String, String)> {
        lock(&self.saved).clone()
    }
}

#[async_trait]
impl ReportOutlet for RecordingOutlet {
    async fn save(&self, title: &str, body: &str) -> Result<String> {
        lock(&self.saved).push((title.to_string(), body.to_string()));
        Ok(format!("memory://{}", title))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TestToolError(String);

#[derive(Debug, Deserialize)]
pub struct EchoArgs {
    pub text: String,
}

/// 原样回显参数的工具
pub struct EchoTool;

impl Tool for EchoTool {
    const NAME: &'static str = "echo";

    type Error = TestToolError;
    type Args = EchoArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Echo the given text".to_string(),
            parameters: json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(format!("echo: {}", args.text))
    }
}

/// 总是失败的工具
pub struct FailingTool;

impl Tool for FailingTool {
    const NAME: &'static str = "fail";

    type Error = TestToolError;
    type Args = Value;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Always fails".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        Err(TestToolError("tool exploded".to_string()))
    }
}

/// 组装好全部替身的工作流上下文
pub struct TestHarness {
    pub model: Arc<ScriptedChatModel>,
    pub search: Arc<StaticSearchEngine>,
    pub code_runner: Arc<StubCodeRunner>,
    pub outlet: Arc<RecordingOutlet>,
    pub context: WorkflowContext,
}

impl TestHarness {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self::with_checkpointer(responses, Arc::new(InMemoryCheckpointStore::new()))
    }

    pub fn with_checkpointer(
        responses: Vec<ChatResponse>,
        checkpointer: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self::build(
            responses,
            Arc::new(StaticSearchEngine::new(default_search_results())),
            checkpointer,
        )
    }

    pub fn with_search(responses: Vec<ChatResponse>, search: StaticSearchEngine) -> Self {
        Self::build(
            responses,
            Arc::new(search),
            Arc::new(InMemoryCheckpointStore::new()),
        )
    }

    fn build(
        responses: Vec<ChatResponse>,
        search: Arc<StaticSearchEngine>,
        checkpointer: Arc<dyn CheckpointStore>,
    ) -> Self {
        let mut config = Config {
            llm: test_llm_config(),
            ..Config::default()
        };
        config.checkpoint.backend = CheckpointBackend::Memory;

        let model = Arc::new(ScriptedChatModel::new(responses));
        let code_runner = Arc::new(StubCodeRunner::ok("42\n"));
        let outlet = Arc::new(RecordingOutlet::default());
        let context = WorkflowContext {
            llm_client: LLMClient::with_model(config.llm.clone(), model.clone()),
            config,
            search: search.clone(),
            code_runner: code_runner.clone(),
            outlet: outlet.clone(),
            checkpointer,
        };

        Self {
            model,
            search,
            code_runner,
            outlet,
            context,
        }
    }
}

pub fn default_search_results() -> Vec<SearchResult> {
    vec![
        SearchResult {
            title: "First source".to_string(),
            url: "https://example.com/first".to_string(),
            content: "first finding".to_string(),
        },
        SearchResult {
            title: "Second source".to_string(),
            url: "https://example.com/second".to_string(),
            content: "second finding".to_string(),
        },
    ]
}
