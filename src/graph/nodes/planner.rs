use anyhow::Result;
use async_trait::async_trait;

use crate::graph::node::{Node, NodeContext};
use crate::graph::types::{Command, StageName};
use crate::llm::client::Extracted;
use crate::prompts::PromptTemplate;
use crate::types::{ChatMessage, CurrentPlan, Plan, RunState, StateUpdate};

/// 生成结构化计划；达到迭代上限后直接交给reporter
pub struct PlannerNode;

#[async_trait]
impl Node for PlannerNode {
    fn name(&self) -> StageName {
        StageName::Planner
    }

    async fn run(&self, state: &RunState, ctx: &NodeContext<'_>) -> Result<Command> {
        if state.plan_iterations >= ctx.config.max_plan_iterations {
            tracing::info!(
                plan_iterations = state.plan_iterations,
                "计划迭代次数已达上限，进入报告阶段"
            );
            return Ok(Command::goto(StageName::Reporter));
        }

        let system = PromptTemplate::Planner.render(&ctx.prompt_vars(state));
        let mut messages = state.messages.clone();
        if state.enable_background_investigation
            && let Some(results) = &state.background_investigation_results
        {
            messages.push(ChatMessage::user(format!(
                "background investigation results of user query:\n{}\n",
                results
            )));
        }

        let Extracted { value: plan, usage } = ctx
            .services
            .llm_client
            .extract::<Plan>(&system, messages)
            .await?;
        let plan = normalize(plan, ctx.config.max_step_num);
        let full_response = serde_json::to_string(&plan)?;

        let next = if plan.has_enough_context {
            StageName::Reporter
        } else {
            StageName::HumanFeedback
        };
        tracing::info!(title = %plan.title, steps = plan.steps.len(), %next, "📋 计划已生成");

        Ok(Command::goto(next).with_update(StateUpdate {
            messages: vec![ChatMessage::assistant(full_response).named("planner")],
            current_plan: Some(CurrentPlan::Plan(plan)),
            tokens_used: usage.total_tokens,
            ..Default::default()
        }))
    }
}

/// 截断到步骤上限，并清除模型预填的执行结果
fn normalize(mut plan: Plan, max_step_num: usize) -> Plan {
    if plan.steps.len() > max_step_num {
        tracing::warn!(
            steps = plan.steps.len(),
            max_step_num,
            "计划步骤超过上限，已截断"
        );
        plan.steps.truncate(max_step_num);
    }
    for step in &mut plan.steps {
        step.execution_res = None;
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Step, StepType};

    #[test]
    fn test_normalize_truncates_and_clears_results() {
        let mut prefilled = Step::new(StepType::Research, "S1", "");
        prefilled.execution_res = Some("made up".to_string());
        let plan = Plan {
            locale: "en-US".to_string(),
            has_enough_context: false,
            thought: String::new(),
            title: "T".to_string(),
            steps: vec![
                prefilled,
                Step::new(StepType::Processing, "S2", ""),
                Step::new(StepType::Research, "S3", ""),
            ],
        };

        let plan = normalize(plan, 2);
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.steps.iter().all(|step| step.execution_res.is_none()));
    }
}
