use std::fmt;

/// 递归上限作用的范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    /// 整个运行内的阶段调用次数
    Run,
    /// 单个步骤内工具调用循环的模型调用次数
    Step,
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitScope::Run => write!(f, "run"),
            LimitScope::Step => write!(f, "step"),
        }
    }
}

/// 工作流错误分类
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    /// 非法的外部输入（如不支持的人工反馈值）
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("recursion limit exceeded: {scope} limit of {limit} reached")]
    RecursionLimitExceeded { scope: LimitScope, limit: usize },

    /// 模型请求了未注册的能力
    #[error("unknown tool requested: {0}")]
    UnknownTool(String),

    /// 模型、检索、结构化输出等协作方失败
    #[error("collaborator failure: {0}")]
    Collaborator(String),

    /// 阶段返回的状态更新违反了 Run State 的不变量
    #[error("invalid state update: {0}")]
    InvalidUpdate(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl WorkflowError {
    /// 将任意阶段错误归类；无法识别的错误按协作方失败处理，并保留完整上下文
    pub fn classify(err: anyhow::Error) -> Self {
        match err.downcast::<WorkflowError>() {
            Ok(known) => known,
            Err(other) => WorkflowError::Collaborator(format!("{:#}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_classify_keeps_typed_errors() {
        let err = anyhow::Error::new(WorkflowError::UnknownTool("nope".to_string()));
        assert_eq!(
            WorkflowError::classify(err),
            WorkflowError::UnknownTool("nope".to_string())
        );
    }

    #[test]
    fn test_classify_wraps_unknown_errors_verbatim() {
        let err = Err::<(), _>(anyhow::anyhow!("connection reset"))
            .context("search failed")
            .unwrap_err();
        match WorkflowError::classify(err) {
            WorkflowError::Collaborator(message) => {
                assert_eq!(message, "search failed: connection reset");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
