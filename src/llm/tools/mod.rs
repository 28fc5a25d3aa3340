//! Agent可调用的工具，以及按名称分发的工具箱

use rig::completion::ToolDefinition;
use rig::tool::{Tool, ToolDyn, ToolError};
use std::collections::BTreeMap;

use crate::types::ToolInvocation;

pub mod handoff;
pub mod local_search;
pub mod python_repl;
pub mod web_search;

/// 工具分发错误
#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    /// 模型请求了未注册的工具
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error(transparent)]
    Failed(#[from] ToolError),
}

/// 一个执行角色可用的工具集合，在角色构建时一次性确定
#[derive(Default)]
pub struct ToolBox {
    tools: BTreeMap<String, Box<dyn ToolDyn>>,
    order: Vec<String>,
}

impl ToolBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool<T>(mut self, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        let name = T::NAME.to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, Box::new(tool));
        self
    }

    /// 按注册顺序返回工具名称
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 按注册顺序返回工具定义
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = Vec::with_capacity(self.order.len());
        for name in &self.order {
            if let Some(tool) = self.tools.get(name) {
                definitions.push(tool.definition(String::new()).await);
            }
        }
        definitions
    }

    /// 按名称分发一次工具调用
    pub async fn dispatch(&self, invocation: &ToolInvocation) -> Result<String, ToolCallError> {
        let tool = self
            .tools
            .get(&invocation.name)
            .ok_or_else(|| ToolCallError::Unknown(invocation.name.clone()))?;

        let raw = tool.call(invocation.arguments.to_string()).await?;
        // 字符串输出会被序列化为JSON字符串，这里还原为原文
        Ok(serde_json::from_str::<String>(&raw).unwrap_or(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EchoTool;
    use serde_json::json;

    #[tokio::test]
    async fn test_dispatch_by_name() {
        let tools = ToolBox::new().with_tool(EchoTool);
        assert_eq!(tools.names(), vec!["echo"]);

        let output = tools
            .dispatch(&ToolInvocation::new("1", "echo", json!({"text": "hi"})))
            .await
            .unwrap();
        assert_eq!(output, "echo: hi");

        let err = tools
            .dispatch(&ToolInvocation::new("2", "nope", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolCallError::Unknown(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_malformed_arguments_fail_without_panicking() {
        let tools = ToolBox::new().with_tool(EchoTool);
        let err = tools
            .dispatch(&ToolInvocation::new("1", "echo", json!({"wrong": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolCallError::Failed(_)));
    }
}
