use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 步骤性质：调研（需要检索）或处理（需要计算/代码）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Research,
    Processing,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepType::Research => write!(f, "research"),
            StepType::Processing => write!(f, "processing"),
        }
    }
}

/// 计划中的一个执行单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Step {
    /// Must be explicitly set for each step
    pub need_search: bool,
    pub title: String,
    /// Specify exactly what data to collect
    pub description: String,
    /// Indicates the nature of the step
    pub step_type: StepType,
    /// The Step execution result
    #[serde(default)]
    pub execution_res: Option<String>,
}

impl Step {
    pub fn new(step_type: StepType, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            need_search: step_type == StepType::Research,
            title: title.into(),
            description: description.into(),
            step_type,
            execution_res: None,
        }
    }

    pub fn is_executed(&self) -> bool {
        self.execution_res.is_some()
    }
}

/// Planner 产出的结构化计划，步骤顺序即执行优先级
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// e.g. 'en-US' or 'zh-CN', based on the user's language
    pub locale: String,
    pub has_enough_context: bool,
    /// Thinking process for the plan
    #[serde(default)]
    pub thought: String,
    pub title: String,
    /// Research & Processing steps to get more context
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Plan {
    /// 当前待执行步骤：下标最小且尚无 execution_res 的步骤
    pub fn current_step(&self) -> Option<(usize, &Step)> {
        self.steps
            .iter()
            .enumerate()
            .find(|(_, step)| !step.is_executed())
    }

    /// 当前步骤之前已完成的步骤（按计划顺序）
    pub fn completed_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().take_while(|step| step.is_executed())
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(Step::is_executed)
    }
}

/// Run State 中的当前计划：缺失 / 有效计划 / 计划错误信息
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CurrentPlan {
    #[default]
    None,
    Plan(Plan),
    PlanError(String),
}

impl CurrentPlan {
    pub fn as_plan(&self) -> Option<&Plan> {
        match self {
            CurrentPlan::Plan(plan) => Some(plan),
            _ => None,
        }
    }

    pub fn as_plan_mut(&mut self) -> Option<&mut Plan> {
        match self {
            CurrentPlan::Plan(plan) => Some(plan),
            _ => None,
        }
    }
}
