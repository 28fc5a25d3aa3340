use anyhow::Result;
use std::sync::Arc;

use crate::config::{CheckpointBackend, Config};
use crate::graph::checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
use crate::graph::outlet::{DiskOutlet, ReportOutlet};
use crate::llm::client::LLMClient;
use crate::llm::tools::python_repl::{CodeRunner, PythonRunner};
use crate::llm::tools::web_search::{SearchEngine, TavilyClient};

/// 工作流运行所需的协作方，跨运行共享
#[derive(Clone)]
pub struct WorkflowContext {
    /// 配置
    pub config: Config,
    /// LLM调用器，用于与AI通信。
    pub llm_client: LLMClient,
    /// 网络检索服务
    pub search: Arc<dyn SearchEngine>,
    /// 代码执行服务
    pub code_runner: Arc<dyn CodeRunner>,
    /// 报告输出
    pub outlet: Arc<dyn ReportOutlet>,
    /// 检查点存储
    pub checkpointer: Arc<dyn CheckpointStore>,
}

impl WorkflowContext {
    /// 按配置创建生产环境的协作方
    pub fn new(config: Config) -> Result<Self> {
        let llm_client = LLMClient::new(&config.llm)?;
        let search: Arc<dyn SearchEngine> = Arc::new(TavilyClient::new(&config.search)?);
        let code_runner: Arc<dyn CodeRunner> = Arc::new(PythonRunner::new(&config.code));
        let outlet: Arc<dyn ReportOutlet> = Arc::new(DiskOutlet::new(config.report_dir.clone()));
        let checkpointer: Arc<dyn CheckpointStore> = match config.checkpoint.backend {
            CheckpointBackend::Memory => Arc::new(InMemoryCheckpointStore::new()),
            CheckpointBackend::File => Arc::new(FileCheckpointStore::new(config.checkpoint.dir.clone())),
        };

        Ok(Self {
            config,
            llm_client,
            search,
            code_runner,
            outlet,
            checkpointer,
        })
    }
}
