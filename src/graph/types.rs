use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ToolServerConfig;
use crate::error::WorkflowError;
use crate::types::{Resource, RunState, StateUpdate};

/// 图中的阶段名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Coordinator,
    BackgroundInvestigator,
    Planner,
    HumanFeedback,
    ResearchTeam,
    Researcher,
    Coder,
    Reporter,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Coordinator => "coordinator",
            StageName::BackgroundInvestigator => "background_investigator",
            StageName::Planner => "planner",
            StageName::HumanFeedback => "human_feedback",
            StageName::ResearchTeam => "research_team",
            StageName::Researcher => "researcher",
            StageName::Coder => "coder",
            StageName::Reporter => "reporter",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 步骤执行角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Researcher,
    Coder,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Researcher => "researcher",
            AgentRole::Coder => "coder",
        }
    }
}

/// 阶段给出的路由决定
#[derive(Debug, Clone, PartialEq)]
pub enum Goto {
    Stage(StageName),
    End,
    /// 挂起等待外部输入，附带给审阅者的提示
    Interrupt(String),
}

/// 阶段的返回值：稀疏的状态更新加路由决定；未给出路由时沿图中的边前进
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub update: StateUpdate,
    pub goto: Option<Goto>,
}

impl Command {
    pub fn goto(stage: StageName) -> Self {
        Self {
            update: StateUpdate::default(),
            goto: Some(Goto::Stage(stage)),
        }
    }

    pub fn end() -> Self {
        Self {
            update: StateUpdate::default(),
            goto: Some(Goto::End),
        }
    }

    pub fn interrupt(prompt: impl Into<String>) -> Self {
        Self {
            update: StateUpdate::default(),
            goto: Some(Goto::Interrupt(prompt.into())),
        }
    }

    /// 只更新状态，路由交给图中的边
    pub fn update(update: StateUpdate) -> Self {
        Self { update, goto: None }
    }

    pub fn with_update(mut self, update: StateUpdate) -> Self {
        self.update = update;
        self
    }
}

/// 一次运行的配置
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub thread_id: String,
    pub max_plan_iterations: u32,
    pub max_step_num: usize,
    /// 单次调用（start或resume）允许的阶段调用次数
    pub recursion_limit: usize,
    /// 单个步骤内工具调用循环的模型调用次数上限
    pub step_recursion_limit: usize,
    pub resources: Vec<Resource>,
    pub tool_servers: BTreeMap<String, ToolServerConfig>,
}

impl RunConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            max_plan_iterations: 1,
            max_step_num: 3,
            recursion_limit: 100,
            step_recursion_limit: 25,
            resources: Vec::new(),
            tool_servers: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.thread_id.trim().is_empty() {
            return Err(WorkflowError::Configuration(
                "thread_id could not be empty".to_string(),
            ));
        }
        if self.max_plan_iterations < 1 || self.max_step_num < 1 {
            return Err(WorkflowError::Configuration(
                "max_plan_iterations and max_step_num must be at least 1".to_string(),
            ));
        }
        if self.recursion_limit == 0 || self.step_recursion_limit == 0 {
            return Err(WorkflowError::Configuration(
                "recursion limits must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 运行输入
#[derive(Debug, Clone, PartialEq)]
pub struct RunInput {
    pub initial_message: String,
    pub auto_accepted_plan: bool,
    pub enable_background_investigation: bool,
}

impl RunInput {
    pub fn new(initial_message: impl Into<String>) -> Self {
        Self {
            initial_message: initial_message.into(),
            auto_accepted_plan: true,
            enable_background_investigation: true,
        }
    }
}

/// 运行过程中产生的事件，每个完成的阶段一个
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    StageCompleted {
        stage: StageName,
        checkpoint: u64,
        state: RunState,
    },
    /// 运行挂起在人工反馈阶段；checkpoint为恢复时需要的检查点
    Interrupted { checkpoint: u64, prompt: String },
}

/// 一次调用的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed {
        state: RunState,
        checkpoint: u64,
    },
    Suspended {
        state: RunState,
        checkpoint: u64,
        prompt: String,
    },
}

impl RunOutcome {
    pub fn state(&self) -> &RunState {
        match self {
            RunOutcome::Completed { state, .. } | RunOutcome::Suspended { state, .. } => state,
        }
    }

    pub fn checkpoint(&self) -> u64 {
        match self {
            RunOutcome::Completed { checkpoint, .. } | RunOutcome::Suspended { checkpoint, .. } => {
                *checkpoint
            }
        }
    }
}

/// 运行失败：附带最后一个成功持久化的检查点，便于从该处恢复
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("run {thread_id} failed{}: {source}", .stage.map(|s| format!(" at {}", s)).unwrap_or_default())]
pub struct RunError {
    pub thread_id: String,
    pub stage: Option<StageName>,
    pub last_checkpoint: Option<u64>,
    #[source]
    pub source: WorkflowError,
}
