use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::types::message::ChatMessage;
use crate::types::plan::{CurrentPlan, Plan};

pub const DEFAULT_LOCALE: &str = "en-US";

/// 用户提及的参考资源（只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// The URI of the resource.
    pub uri: String,
    /// The title of the resource.
    pub title: String,
    /// The description of the resource.
    #[serde(default)]
    pub description: Option<String>,
}

/// 贯穿整个工作流的运行状态，只由引擎合并阶段返回的更新
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub messages: Vec<ChatMessage>,
    pub locale: String,
    pub research_topic: String,
    pub observations: Vec<String>,
    pub resources: Vec<Resource>,
    pub plan_iterations: u32,
    pub current_plan: CurrentPlan,
    pub final_report: Option<String>,
    pub auto_accepted_plan: bool,
    pub enable_background_investigation: bool,
    pub background_investigation_results: Option<String>,
    pub total_tokens: u64,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            locale: DEFAULT_LOCALE.to_string(),
            research_topic: String::new(),
            observations: Vec::new(),
            resources: Vec::new(),
            plan_iterations: 0,
            current_plan: CurrentPlan::None,
            final_report: None,
            auto_accepted_plan: false,
            enable_background_investigation: true,
            background_investigation_results: None,
            total_tokens: 0,
        }
    }
}

/// 步骤执行结果：写回计划中指定下标的步骤
#[derive(Debug, Clone, PartialEq)]
pub struct StepCompletion {
    pub index: usize,
    pub result: String,
}

/// 阶段返回的稀疏更新：标量字段后写覆盖，列表字段追加，token 累加
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Vec<ChatMessage>,
    pub observations: Vec<String>,
    pub locale: Option<String>,
    pub research_topic: Option<String>,
    pub plan_iterations: Option<u32>,
    pub current_plan: Option<CurrentPlan>,
    pub completed_step: Option<StepCompletion>,
    pub final_report: Option<String>,
    pub background_investigation_results: Option<String>,
    pub tokens_used: u64,
}

impl StateUpdate {
    pub fn is_empty(&self) -> bool {
        *self == StateUpdate::default()
    }
}

impl RunState {
    pub fn plan(&self) -> Option<&Plan> {
        self.current_plan.as_plan()
    }

    /// 合并一次阶段更新；任何不变量被破坏时整体拒绝，状态保持不变
    pub fn apply(&mut self, update: StateUpdate) -> Result<(), WorkflowError> {
        self.check(&update)?;

        let StateUpdate {
            messages,
            observations,
            locale,
            research_topic,
            plan_iterations,
            current_plan,
            completed_step,
            final_report,
            background_investigation_results,
            tokens_used,
        } = update;

        self.messages.extend(messages);
        self.observations.extend(observations);
        if let Some(locale) = locale {
            self.locale = locale;
        }
        if let Some(topic) = research_topic {
            self.research_topic = topic;
        }
        if let Some(iterations) = plan_iterations {
            self.plan_iterations = iterations;
        }
        if let Some(plan) = current_plan {
            self.current_plan = plan;
        }
        if let Some(StepCompletion { index, result }) = completed_step
            && let Some(step) = self
                .current_plan
                .as_plan_mut()
                .and_then(|plan| plan.steps.get_mut(index))
        {
            step.execution_res = Some(result);
        }
        if let Some(report) = final_report {
            self.final_report = Some(report);
        }
        if let Some(results) = background_investigation_results {
            self.background_investigation_results = Some(results);
        }
        self.total_tokens += tokens_used;

        Ok(())
    }

    fn check(&self, update: &StateUpdate) -> Result<(), WorkflowError> {
        if let Some(iterations) = update.plan_iterations
            && iterations < self.plan_iterations
        {
            return Err(WorkflowError::InvalidUpdate(format!(
                "plan_iterations cannot decrease ({} -> {})",
                self.plan_iterations, iterations
            )));
        }

        if let Some(completion) = &update.completed_step {
            // 步骤结果针对的是合并后的计划
            let plan = match &update.current_plan {
                Some(next) => next.as_plan(),
                None => self.plan(),
            };
            let step = plan
                .and_then(|plan| plan.steps.get(completion.index))
                .ok_or_else(|| {
                    WorkflowError::InvalidUpdate(format!(
                        "no step at index {} in the current plan",
                        completion.index
                    ))
                })?;
            if step.is_executed() {
                return Err(WorkflowError::InvalidUpdate(format!(
                    "step '{}' already has an execution result",
                    step.title
                )));
            }
        }

        if update.final_report.is_some() && self.final_report.is_some() {
            return Err(WorkflowError::InvalidUpdate(
                "final_report is already set".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::plan::{Step, StepType};

    fn state_with_plan() -> RunState {
        RunState {
            current_plan: CurrentPlan::Plan(Plan {
                locale: "en-US".to_string(),
                has_enough_context: false,
                thought: String::new(),
                title: "Plan".to_string(),
                steps: vec![
                    Step::new(StepType::Research, "S1", "first"),
                    Step::new(StepType::Processing, "S2", "second"),
                ],
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_appends_lists_and_overwrites_scalars() {
        let mut state = RunState::default();
        state.messages.push(ChatMessage::user("hi"));
        state.observations.push("o1".to_string());

        state
            .apply(StateUpdate {
                messages: vec![ChatMessage::assistant("hello")],
                observations: vec!["o2".to_string()],
                locale: Some("zh-CN".to_string()),
                tokens_used: 7,
                ..Default::default()
            })
            .unwrap();
        state
            .apply(StateUpdate {
                tokens_used: 3,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].content, "hi");
        assert_eq!(state.observations, vec!["o1", "o2"]);
        assert_eq!(state.locale, "zh-CN");
        assert_eq!(state.total_tokens, 10);
    }

    #[test]
    fn test_step_result_is_written_once() {
        let mut state = state_with_plan();
        let completion = StepCompletion {
            index: 0,
            result: "found".to_string(),
        };

        state
            .apply(StateUpdate {
                completed_step: Some(completion.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            state.plan().unwrap().steps[0].execution_res.as_deref(),
            Some("found")
        );

        let before = state.clone();
        let err = state
            .apply(StateUpdate {
                completed_step: Some(completion),
                observations: vec!["dup".to_string()],
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidUpdate(_)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_plan_iterations_never_decrease() {
        let mut state = RunState {
            plan_iterations: 2,
            ..Default::default()
        };
        let err = state
            .apply(StateUpdate {
                plan_iterations: Some(1),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidUpdate(_)));
        assert_eq!(state.plan_iterations, 2);
    }

    #[test]
    fn test_step_result_without_plan_is_rejected() {
        let mut state = RunState::default();
        let err = state
            .apply(StateUpdate {
                completed_step: Some(StepCompletion {
                    index: 0,
                    result: "x".to_string(),
                }),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidUpdate(_)));
    }
}
