//! Python代码执行工具

use anyhow::{Context, Result};
use async_trait::async_trait;
use rig::tool::Tool;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CodeConfig;

const DISABLED_MESSAGE: &str =
    "Python REPL tool is disabled. Please enable it in environment configuration.";

/// 代码执行服务：成功返回捕获的输出，失败返回错误描述
#[async_trait]
pub trait CodeRunner: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn run(&self, code: &str) -> Result<String>;
}

/// 通过 `python3 -c` 执行代码
#[derive(Debug, Clone)]
pub struct PythonRunner {
    enabled: bool,
    python_bin: String,
    timeout: Duration,
}

impl PythonRunner {
    pub fn new(config: &CodeConfig) -> Self {
        Self {
            enabled: config.enable_python_repl,
            python_bin: config.python_bin.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

#[async_trait]
impl CodeRunner for PythonRunner {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn run(&self, code: &str) -> Result<String> {
        let child = tokio::process::Command::new(&self.python_bin)
            .arg("-c")
            .arg(code)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| anyhow::anyhow!("execution timed out after {:?}", self.timeout))?
            .with_context(|| format!("failed to start {}", self.python_bin))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let result = if stderr.is_empty() { stdout } else { stderr };

        let lowered = result.to_lowercase();
        if !output.status.success() || lowered.contains("error") || lowered.contains("exception") {
            anyhow::bail!("{}", result);
        }
        Ok(result)
    }
}

/// Python工具错误
#[derive(Debug, thiserror::Error)]
#[error("python repl failed: {0}")]
pub struct PythonReplToolError(String);

/// Python代码执行工具
#[derive(Clone)]
pub struct AgentToolPythonRepl {
    runner: Arc<dyn CodeRunner>,
}

/// 执行参数
#[derive(Debug, Deserialize)]
pub struct PythonReplArgs {
    pub code: String,
}

impl AgentToolPythonRepl {
    pub fn new(runner: Arc<dyn CodeRunner>) -> Self {
        Self { runner }
    }
}

impl Tool for AgentToolPythonRepl {
    const NAME: &'static str = "python_repl_tool";

    type Error = PythonReplToolError;
    type Args = PythonReplArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        rig::completion::ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Use this to execute python code and do data analysis or calculation. \
                If you want to see the output of a value, you should print it out with `print(...)`. \
                This is visible to the user."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "The python code to execute to do further analysis or calculation."
                    }
                },
                "required": ["code"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        if !self.runner.is_enabled() {
            tracing::warn!("{}", DISABLED_MESSAGE);
            return Ok(format!("Tool disabled: {}", DISABLED_MESSAGE));
        }

        tracing::info!("🔧 tool called...python_repl_tool");
        let code = args.code;
        match self.runner.run(&code).await {
            Ok(stdout) => Ok(format!(
                "Successfully executed:\n```python\n{}\n```\nStdout: {}",
                code, stdout
            )),
            Err(e) => {
                tracing::debug!("python execution error: {:#}", e);
                Ok(format!(
                    "Error executing code:\n```python\n{}\n```\nError: {:#}",
                    code, e
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubCodeRunner;

    #[tokio::test]
    async fn test_successful_run_is_formatted() {
        let tool = AgentToolPythonRepl::new(Arc::new(StubCodeRunner::ok("4\n")));
        let output = tool
            .call(PythonReplArgs {
                code: "print(2+2)".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            output,
            "Successfully executed:\n```python\nprint(2+2)\n```\nStdout: 4\n"
        );
    }

    #[tokio::test]
    async fn test_failed_run_is_reported_as_text() {
        let tool = AgentToolPythonRepl::new(Arc::new(StubCodeRunner::err("NameError: x")));
        let output = tool
            .call(PythonReplArgs {
                code: "print(x)".to_string(),
            })
            .await
            .unwrap();
        assert!(output.starts_with("Error executing code:\n```python\nprint(x)\n```\nError: "));
        assert!(output.contains("NameError: x"));
    }

    #[tokio::test]
    async fn test_disabled_runner_short_circuits() {
        let runner = PythonRunner::new(&CodeConfig {
            enable_python_repl: false,
            ..CodeConfig::default()
        });
        let tool = AgentToolPythonRepl::new(Arc::new(runner));
        let output = tool
            .call(PythonReplArgs {
                code: "print(1)".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            output,
            "Tool disabled: Python REPL tool is disabled. Please enable it in environment configuration."
        );
    }
}
