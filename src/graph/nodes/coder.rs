use anyhow::Result;
use async_trait::async_trait;

use super::step_executor::execute_agent_step;
use crate::graph::node::{Node, NodeContext};
use crate::graph::types::{AgentRole, Command, StageName};
use crate::llm::tools::ToolBox;
use crate::llm::tools::python_repl::AgentToolPythonRepl;
use crate::types::RunState;

/// 处理步骤执行者，只挂载Python执行工具
pub struct CoderNode;

#[async_trait]
impl Node for CoderNode {
    fn name(&self) -> StageName {
        StageName::Coder
    }

    async fn run(&self, state: &RunState, ctx: &NodeContext<'_>) -> Result<Command> {
        let tools =
            ToolBox::new().with_tool(AgentToolPythonRepl::new(ctx.services.code_runner.clone()));
        execute_agent_step(AgentRole::Coder, tools, Vec::new(), state, ctx).await
    }
}
