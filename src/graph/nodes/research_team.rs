use anyhow::Result;
use async_trait::async_trait;

use crate::graph::node::{Node, NodeContext};
use crate::graph::router::decide;
use crate::graph::types::{Command, StageName};
use crate::types::{RunState, StateUpdate};

/// 循环的汇合点，本身不做事，由条件边选择下一个阶段
pub struct ResearchTeamNode;

#[async_trait]
impl Node for ResearchTeamNode {
    fn name(&self) -> StageName {
        StageName::ResearchTeam
    }

    async fn run(&self, state: &RunState, _ctx: &NodeContext<'_>) -> Result<Command> {
        tracing::debug!(decision = ?decide(state), "research team routing");
        Ok(Command::update(StateUpdate::default()))
    }
}
