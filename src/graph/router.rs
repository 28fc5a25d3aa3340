//! 研究团队路由：只依据状态选择下一个阶段

use crate::graph::types::StageName;
use crate::types::{CurrentPlan, RunState, StepType};

/// 路由的细分结果；Replan 与 PlanComplete 都回到 planner，但含义不同
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// 没有可执行的计划（缺失、错误或没有步骤）
    Replan,
    /// 所有步骤都已执行，由planner决定收尾还是重新规划
    PlanComplete,
    Research(usize),
    Process(usize),
}

impl RouteDecision {
    pub fn stage(&self) -> StageName {
        match self {
            RouteDecision::Replan | RouteDecision::PlanComplete => StageName::Planner,
            RouteDecision::Research(_) => StageName::Researcher,
            RouteDecision::Process(_) => StageName::Coder,
        }
    }
}

pub fn decide(state: &RunState) -> RouteDecision {
    let plan = match &state.current_plan {
        CurrentPlan::Plan(plan) if !plan.steps.is_empty() => plan,
        _ => return RouteDecision::Replan,
    };

    match plan.current_step() {
        None => RouteDecision::PlanComplete,
        Some((index, step)) => match step.step_type {
            StepType::Research => RouteDecision::Research(index),
            StepType::Processing => RouteDecision::Process(index),
        },
    }
}

pub fn route(state: &RunState) -> StageName {
    decide(state).stage()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Plan, Step};

    fn state_with(steps: Vec<Step>) -> RunState {
        RunState {
            current_plan: CurrentPlan::Plan(Plan {
                locale: "en-US".to_string(),
                has_enough_context: false,
                thought: String::new(),
                title: "T".to_string(),
                steps,
            }),
            ..Default::default()
        }
    }

    fn executed(mut step: Step) -> Step {
        step.execution_res = Some("result".to_string());
        step
    }

    #[test]
    fn test_missing_or_broken_plan_routes_to_planner() {
        assert_eq!(decide(&RunState::default()), RouteDecision::Replan);

        let errored = RunState {
            current_plan: CurrentPlan::PlanError("bad json".to_string()),
            ..Default::default()
        };
        assert_eq!(decide(&errored), RouteDecision::Replan);
        assert_eq!(decide(&state_with(vec![])), RouteDecision::Replan);
        assert_eq!(route(&errored), StageName::Planner);
    }

    #[test]
    fn test_lowest_unexecuted_step_selects_role() {
        let state = state_with(vec![
            Step::new(StepType::Research, "S1", ""),
            Step::new(StepType::Processing, "S2", ""),
        ]);
        assert_eq!(decide(&state), RouteDecision::Research(0));
        assert_eq!(route(&state), StageName::Researcher);

        let state = state_with(vec![
            executed(Step::new(StepType::Research, "S1", "")),
            Step::new(StepType::Processing, "S2", ""),
        ]);
        assert_eq!(decide(&state), RouteDecision::Process(1));
        assert_eq!(route(&state), StageName::Coder);
    }

    #[test]
    fn test_all_steps_executed_routes_to_planner() {
        let state = state_with(vec![
            executed(Step::new(StepType::Research, "S1", "")),
            executed(Step::new(StepType::Processing, "S2", "")),
        ]);
        assert_eq!(decide(&state), RouteDecision::PlanComplete);
        assert_eq!(route(&state), StageName::Planner);
    }

    #[test]
    fn test_executed_step_is_never_reselected() {
        let state = state_with(vec![
            executed(Step::new(StepType::Processing, "S1", "")),
            Step::new(StepType::Research, "S2", ""),
            Step::new(StepType::Processing, "S3", ""),
        ]);
        assert_eq!(decide(&state), RouteDecision::Research(1));
    }
}
