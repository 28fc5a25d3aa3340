use anyhow::Result;
use async_trait::async_trait;

use crate::graph::context::WorkflowContext;
use crate::graph::types::{Command, RunConfig, StageName};
use crate::prompts::PromptVars;
use crate::types::RunState;

/// 传给阶段的只读上下文
pub struct NodeContext<'a> {
    pub services: &'a WorkflowContext,
    pub config: &'a RunConfig,
    /// 恢复运行时外部提供的值（仅人工反馈阶段会收到）
    pub resume: Option<&'a str>,
}

impl NodeContext<'_> {
    pub fn prompt_vars<'s>(&self, state: &'s RunState) -> PromptVars<'s> {
        PromptVars {
            locale: &state.locale,
            max_step_num: self.config.max_step_num,
        }
    }
}

/// 图中的一个阶段：读取状态，返回更新与路由，从不直接修改状态
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> StageName;

    async fn run(&self, state: &RunState, ctx: &NodeContext<'_>) -> Result<Command>;
}
