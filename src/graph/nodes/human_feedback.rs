use anyhow::Result;
use async_trait::async_trait;

use crate::error::WorkflowError;
use crate::graph::node::{Node, NodeContext};
use crate::graph::types::{Command, StageName};
use crate::types::{ChatMessage, RunState, StateUpdate};

pub const REVIEW_PROMPT: &str = "Please Review the Plan.";
pub const EDIT_PLAN: &str = "[EDIT_PLAN]";
pub const ACCEPTED: &str = "[ACCEPTED]";

/// 人工确认计划：自动接受时直接放行，否则挂起等待反馈
pub struct HumanFeedbackNode;

#[async_trait]
impl Node for HumanFeedbackNode {
    fn name(&self) -> StageName {
        StageName::HumanFeedback
    }

    async fn run(&self, state: &RunState, ctx: &NodeContext<'_>) -> Result<Command> {
        if !state.auto_accepted_plan {
            let Some(feedback) = ctx.resume else {
                return Ok(Command::interrupt(REVIEW_PROMPT));
            };

            let normalized = feedback.to_uppercase();
            if normalized.starts_with(EDIT_PLAN) {
                tracing::info!("Plan edit requested by user.");
                return Ok(Command::goto(StageName::Planner).with_update(StateUpdate {
                    messages: vec![ChatMessage::user(feedback).named("feedback")],
                    ..Default::default()
                }));
            } else if normalized.starts_with(ACCEPTED) {
                tracing::info!("Plan is accepted by user.");
            } else {
                return Err(WorkflowError::Configuration(format!(
                    "Interrupt value of {} is not supported.",
                    feedback
                ))
                .into());
            }
        }

        Ok(Command::goto(StageName::ResearchTeam).with_update(StateUpdate {
            plan_iterations: Some(state.plan_iterations + 1),
            locale: state.plan().map(|plan| plan.locale.clone()),
            ..Default::default()
        }))
    }
}
