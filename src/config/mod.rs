use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::error::WorkflowError;
use crate::graph::types::{AgentRole, RunConfig};
use crate::types::Resource;

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Moonshot => write!(f, "moonshot"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Mistral => write!(f, "mistral"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "moonshot" => Ok(LLMProvider::Moonshot),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "mistral" => Ok(LLMProvider::Mistral),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// LLM模型配置
    pub llm: LLMConfig,

    /// 网络检索配置
    pub search: SearchConfig,

    /// 代码执行配置
    pub code: CodeConfig,

    /// 工作流配置
    pub workflow: WorkflowConfig,

    /// 检查点存储配置
    pub checkpoint: CheckpointConfig,

    /// 报告输出目录
    pub report_dir: PathBuf,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 模型名称
    pub model: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数（模型客户端自身的重试策略，工作流引擎不做重试）
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 单次模型调用的超时时间（秒），超时按失败计入重试
    pub timeout_seconds: u64,
}

/// 网络检索配置（Tavily）
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key: String,
    pub api_base_url: String,
    /// 单次检索返回的最大条数
    pub max_results: usize,
    pub crawl_max_depth: u32,
    pub crawl_max_breadth: u32,
    pub crawl_limit: u32,
    pub timeout_seconds: u64,
}

/// 代码执行配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CodeConfig {
    pub enable_python_repl: bool,
    pub python_bin: String,
    pub timeout_seconds: u64,
}

/// 外部工具服务描述（按角色挂载）
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ToolServerConfig {
    pub transport: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub url: Option<String>,
    pub enabled_tools: Vec<String>,
    pub add_to_agents: Vec<String>,
}

/// 工作流配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct WorkflowConfig {
    /// 最大计划迭代次数
    pub max_plan_iterations: u32,
    /// 单个计划的最大步骤数
    pub max_step_num: usize,
    /// 单次运行允许的阶段调用次数
    pub recursion_limit: usize,
    /// 单个步骤内工具调用循环允许的模型调用次数
    pub step_recursion_limit: usize,
    /// 是否自动接受计划（跳过人工确认）
    pub auto_accepted_plan: bool,
    /// 是否在规划前进行背景调查
    pub enable_background_investigation: bool,
    /// 用户提供的参考资源
    pub resources: Vec<Resource>,
    /// 外部工具服务，key为服务名
    pub tool_servers: BTreeMap<String, ToolServerConfig>,
}

/// 检查点存储后端
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    Memory,
    #[default]
    File,
}

/// 检查点存储配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    pub dir: PathBuf,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 校验运行参数的取值范围
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let workflow = &self.workflow;
        if workflow.max_plan_iterations < 1 {
            return Err(WorkflowError::Configuration(
                "max_plan_iterations must be at least 1".to_string(),
            ));
        }
        if workflow.max_step_num < 1 {
            return Err(WorkflowError::Configuration(
                "max_step_num must be at least 1".to_string(),
            ));
        }
        if workflow.recursion_limit == 0 {
            return Err(WorkflowError::Configuration(
                "recursion_limit must be greater than 0".to_string(),
            ));
        }
        if workflow.step_recursion_limit == 0 {
            return Err(WorkflowError::Configuration(
                "step_recursion_limit must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 生成一次运行的配置
    pub fn run_config(&self, thread_id: impl Into<String>) -> RunConfig {
        let workflow = &self.workflow;
        RunConfig {
            thread_id: thread_id.into(),
            max_plan_iterations: workflow.max_plan_iterations,
            max_step_num: workflow.max_step_num,
            recursion_limit: workflow.recursion_limit,
            step_recursion_limit: workflow.step_recursion_limit,
            resources: workflow.resources.clone(),
            tool_servers: workflow.tool_servers.clone(),
        }
    }
}

impl WorkflowConfig {
    /// 挂载到指定角色的外部工具服务
    pub fn tool_servers_for(&self, role: AgentRole) -> Vec<(&str, &ToolServerConfig)> {
        servers_for_role(&self.tool_servers, role)
    }
}

pub(crate) fn servers_for_role(
    servers: &BTreeMap<String, ToolServerConfig>,
    role: AgentRole,
) -> Vec<(&str, &ToolServerConfig)> {
    servers
        .iter()
        .filter(|(_, server)| {
            !server.enabled_tools.is_empty()
                && server.add_to_agents.iter().any(|agent| agent == role.as_str())
        })
        .map(|(name, server)| (name.as_str(), server))
        .collect()
}

/// 读取环境变量中的阶段调用上限，非法值回退到默认值
pub fn recursion_limit_from_env(default: usize) -> usize {
    match std::env::var("DEEPFLOW_RECURSION_LIMIT") {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(limit) if limit > 0 => limit,
            _ => {
                tracing::warn!(
                    value = %raw,
                    default,
                    "DEEPFLOW_RECURSION_LIMIT 不是正整数，使用默认值"
                );
                default
            }
        },
        Err(_) => default,
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(false)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LLMConfig::default(),
            search: SearchConfig::default(),
            code: CodeConfig::default(),
            workflow: WorkflowConfig::default(),
            checkpoint: CheckpointConfig::default(),
            report_dir: PathBuf::from("./report"),
            verbose: false,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("DEEPFLOW_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://dashscope.aliyuncs.com/compatible-mode/v1"),
            model: String::from("qwen3-max"),
            max_tokens: 8192,
            temperature: 0.1,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            timeout_seconds: 300,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("TAVILY_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api.tavily.com"),
            max_results: 3,
            crawl_max_depth: 2,
            crawl_max_breadth: 5,
            crawl_limit: 10,
            timeout_seconds: 60,
        }
    }
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            enable_python_repl: env_flag("ENABLE_PYTHON_REPL"),
            python_bin: String::from("python3"),
            timeout_seconds: 10,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_plan_iterations: 1,
            max_step_num: 3,
            recursion_limit: recursion_limit_from_env(100),
            step_recursion_limit: 25,
            auto_accepted_plan: true,
            enable_background_investigation: true,
            resources: vec![],
            tool_servers: BTreeMap::new(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::default(),
            dir: PathBuf::from(".deepflow/checkpoints"),
        }
    }
}
