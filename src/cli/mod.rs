use crate::config::{Config, LLMProvider};
use crate::graph::context::WorkflowContext;
use crate::graph::types::RunInput;
use crate::graph::workflow;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "deepflow.toml";

/// DeepFlow-RS - 由Rust驱动的 plan → execute → report 深度研究引擎
#[derive(Parser, Debug)]
#[command(name = "deepflow")]
#[command(
    about = "Deep research workflow engine: a planner drafts a research plan, a human may review it, tool-using agents execute each step, and a reporter writes the final report."
)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// LLM Provider (openai, moonshot, deepseek, mistral, openrouter, anthropic, gemini, ollama)
    #[arg(long, global = true)]
    pub llm_provider: Option<String>,

    /// LLM API KEY
    #[arg(long, global = true)]
    pub llm_api_key: Option<String>,

    /// LLM API基地址
    #[arg(long, global = true)]
    pub llm_api_base_url: Option<String>,

    /// 模型名称
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// 最大计划迭代次数
    #[arg(long, global = true)]
    pub max_plan_iterations: Option<u32>,

    /// 单个计划的最大步骤数
    #[arg(long, global = true)]
    pub max_step_num: Option<usize>,

    /// 单次运行允许的阶段调用次数
    #[arg(long, global = true)]
    pub recursion_limit: Option<usize>,

    /// 检查点目录
    #[arg(long, global = true)]
    pub checkpoint_dir: Option<PathBuf>,

    /// 报告输出目录
    #[arg(long, global = true)]
    pub report_dir: Option<PathBuf>,

    /// 是否启用详细日志
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// 开始一次新的研究
    Run {
        /// 研究问题
        query: String,

        /// 线程ID，默认随机生成
        #[arg(long)]
        thread_id: Option<String>,

        /// 执行前人工审阅计划
        #[arg(long)]
        review: bool,

        /// 跳过规划前的背景调查
        #[arg(long)]
        no_background_investigation: bool,
    },

    /// 携带反馈恢复一次挂起的运行
    Resume {
        #[arg(long)]
        thread_id: String,

        #[arg(long)]
        checkpoint_id: u64,

        /// [ACCEPTED] 或 [EDIT_PLAN] 开头的反馈
        #[arg(long)]
        feedback: String,
    },

    /// 查看线程的检查点历史
    History {
        #[arg(long)]
        thread_id: String,
    },

    /// 交互式对话
    Chat {
        #[arg(long)]
        review: bool,

        #[arg(long)]
        no_background_investigation: bool,
    },
}

impl Args {
    /// 将CLI参数转换为配置
    pub fn into_config(self) -> Result<Config> {
        let mut config = if let Some(config_path) = &self.config {
            // 如果显式指定了配置文件路径，从该路径加载
            Config::from_file(config_path)
                .with_context(|| format!("无法读取配置文件 {:?}", config_path))?
        } else {
            // 如果没有显式指定配置文件，尝试从默认位置加载
            let default_config_path = std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(DEFAULT_CONFIG_FILE);

            if default_config_path.exists() {
                Config::from_file(&default_config_path)
                    .with_context(|| format!("无法读取默认配置文件 {:?}", default_config_path))?
            } else {
                // 默认配置文件不存在，使用默认值
                Config::default()
            }
        };

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            if let Ok(provider) = provider_str.parse::<LLMProvider>() {
                config.llm.provider = provider;
            } else {
                tracing::warn!("未知的provider: {}，使用默认provider", provider_str);
            }
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        if let Some(model) = self.model {
            config.llm.model = model;
        }

        // 覆盖工作流配置
        if let Some(max_plan_iterations) = self.max_plan_iterations {
            config.workflow.max_plan_iterations = max_plan_iterations;
        }
        if let Some(max_step_num) = self.max_step_num {
            config.workflow.max_step_num = max_step_num;
        }
        if let Some(recursion_limit) = self.recursion_limit {
            config.workflow.recursion_limit = recursion_limit;
        }

        if let Some(checkpoint_dir) = self.checkpoint_dir {
            config.checkpoint.dir = checkpoint_dir;
        }
        if let Some(report_dir) = self.report_dir {
            config.report_dir = report_dir;
        }
        config.verbose = config.verbose || self.verbose;

        Ok(config)
    }
}

/// 运行输入：命令行开关只能收紧配置文件中的默认值
pub fn run_input(config: &Config, query: String, review: bool, no_background_investigation: bool) -> RunInput {
    RunInput {
        initial_message: query,
        auto_accepted_plan: config.workflow.auto_accepted_plan && !review,
        enable_background_investigation: config.workflow.enable_background_investigation
            && !no_background_investigation,
    }
}

/// 执行子命令
pub async fn execute(command: Commands, ctx: &WorkflowContext) -> Result<()> {
    match command {
        Commands::Run {
            query,
            thread_id,
            review,
            no_background_investigation,
        } => {
            let thread_id = thread_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            println!("🧵 thread: {}", thread_id);
            let input = run_input(&ctx.config, query, review, no_background_investigation);
            let outcome = workflow::launch(ctx, input, ctx.config.run_config(&thread_id)).await?;
            workflow::print_outcome(&thread_id, &outcome);
        }
        Commands::Resume {
            thread_id,
            checkpoint_id,
            feedback,
        } => {
            let outcome = workflow::resume(
                ctx,
                ctx.config.run_config(&thread_id),
                checkpoint_id,
                &feedback,
            )
            .await?;
            workflow::print_outcome(&thread_id, &outcome);
        }
        Commands::History { thread_id } => {
            let history = workflow::history(ctx, &thread_id).await?;
            if history.is_empty() {
                println!("thread '{}' has no checkpoints", thread_id);
            }
            for meta in history {
                println!(
                    "{:>4}  {:<24} -> {:<24} {}",
                    meta.checkpoint_id,
                    meta.stage.map(|s| s.as_str()).unwrap_or("(input)"),
                    meta.next.map(|s| s.as_str()).unwrap_or("END"),
                    meta.created_at.to_rfc3339()
                );
            }
        }
        Commands::Chat {
            review,
            no_background_investigation,
        } => {
            let template = run_input(&ctx.config, String::new(), review, no_background_investigation);
            workflow::chat(ctx, template).await?;
        }
    }
    Ok(())
}
