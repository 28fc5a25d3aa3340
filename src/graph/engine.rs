//! 图执行引擎：逐个调用阶段、原子地合并更新并写入检查点

use futures::Stream;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{LimitScope, WorkflowError};
use crate::graph::builder::{Edge, EdgeTarget};
use crate::graph::checkpoint::CheckpointMeta;
use crate::graph::context::WorkflowContext;
use crate::graph::node::{Node, NodeContext};
use crate::graph::types::{
    Goto, RunConfig, RunError, RunEvent, RunInput, RunOutcome, StageName,
};
use crate::types::{ChatMessage, RunState};

/// 编译后的图
#[derive(Clone)]
pub struct CompiledGraph {
    nodes: BTreeMap<StageName, Arc<dyn Node>>,
    edges: BTreeMap<StageName, Edge>,
    entry: StageName,
}

/// 一次调用（start或resume）的执行进度
#[derive(Debug, Clone)]
pub struct Execution {
    config: RunConfig,
    state: RunState,
    next: Option<StageName>,
    resume: Option<String>,
    last_checkpoint: u64,
    steps: usize,
    suspended: Option<String>,
    finished: bool,
}

impl Execution {
    pub fn thread_id(&self) -> &str {
        &self.config.thread_id
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn next(&self) -> Option<StageName> {
        self.next
    }

    pub fn last_checkpoint(&self) -> u64 {
        self.last_checkpoint
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn fail(&mut self, stage: Option<StageName>, source: WorkflowError) -> RunError {
        self.finished = true;
        tracing::error!(
            thread_id = %self.config.thread_id,
            stage = ?stage,
            last_checkpoint = self.last_checkpoint,
            "运行失败: {}",
            source
        );
        RunError {
            thread_id: self.config.thread_id.clone(),
            stage,
            last_checkpoint: Some(self.last_checkpoint),
            source,
        }
    }
}

fn setup_error(config: &RunConfig, source: WorkflowError, last_checkpoint: Option<u64>) -> RunError {
    RunError {
        thread_id: config.thread_id.clone(),
        stage: None,
        last_checkpoint,
        source,
    }
}

fn checkpoint_error(err: anyhow::Error) -> WorkflowError {
    match err.downcast::<WorkflowError>() {
        Ok(known) => known,
        Err(other) => WorkflowError::Checkpoint(format!("{:#}", other)),
    }
}

impl CompiledGraph {
    pub(crate) fn new(
        nodes: BTreeMap<StageName, Arc<dyn Node>>,
        edges: BTreeMap<StageName, Edge>,
        entry: StageName,
    ) -> Self {
        Self {
            nodes,
            edges,
            entry,
        }
    }

    pub fn entry(&self) -> StageName {
        self.entry
    }

    pub fn stages(&self) -> Vec<StageName> {
        self.nodes.keys().copied().collect()
    }

    /// 开始一次新运行：校验输入并写入输入检查点
    pub async fn start(
        &self,
        ctx: &WorkflowContext,
        input: RunInput,
        config: RunConfig,
    ) -> Result<Execution, RunError> {
        config
            .validate()
            .map_err(|e| setup_error(&config, e, None))?;
        if input.initial_message.trim().is_empty() {
            return Err(setup_error(
                &config,
                WorkflowError::Configuration("Input could not be empty".to_string()),
                None,
            ));
        }

        let existing = ctx
            .checkpointer
            .latest(&config.thread_id)
            .await
            .map_err(|e| setup_error(&config, checkpoint_error(e), None))?;
        if let Some(existing) = existing {
            return Err(setup_error(
                &config,
                WorkflowError::Configuration(format!(
                    "thread '{}' already has history; resume it or use a new thread id",
                    config.thread_id
                )),
                Some(existing.checkpoint_id),
            ));
        }

        let state = RunState {
            messages: vec![ChatMessage::user(input.initial_message)],
            resources: config.resources.clone(),
            auto_accepted_plan: input.auto_accepted_plan,
            enable_background_investigation: input.enable_background_investigation,
            ..Default::default()
        };

        let meta = ctx
            .checkpointer
            .append(&config.thread_id, None, None, &state, Some(self.entry))
            .await
            .map_err(|e| setup_error(&config, checkpoint_error(e), None))?;

        tracing::info!(thread_id = %config.thread_id, "🚀 开始运行");
        Ok(Execution {
            config,
            state,
            next: Some(self.entry),
            resume: None,
            last_checkpoint: meta.checkpoint_id,
            steps: 0,
            suspended: None,
            finished: false,
        })
    }

    /// 从挂起在人工反馈阶段的最新检查点恢复
    pub async fn resume(
        &self,
        ctx: &WorkflowContext,
        config: RunConfig,
        checkpoint_id: u64,
        feedback: impl Into<String>,
    ) -> Result<Execution, RunError> {
        config
            .validate()
            .map_err(|e| setup_error(&config, e, None))?;

        let latest = ctx
            .checkpointer
            .latest(&config.thread_id)
            .await
            .map_err(|e| setup_error(&config, checkpoint_error(e), None))?
            .ok_or_else(|| {
                setup_error(
                    &config,
                    WorkflowError::Checkpoint(format!(
                        "thread '{}' has no checkpoints",
                        config.thread_id
                    )),
                    None,
                )
            })?;
        let latest_id = Some(latest.checkpoint_id);

        if latest.checkpoint_id != checkpoint_id {
            let known = ctx
                .checkpointer
                .get(&config.thread_id, checkpoint_id)
                .await
                .map_err(|e| setup_error(&config, checkpoint_error(e), latest_id))?
                .is_some();
            let reason = if known {
                format!(
                    "checkpoint {} is not the latest checkpoint ({}) of thread '{}'",
                    checkpoint_id, latest.checkpoint_id, config.thread_id
                )
            } else {
                format!(
                    "checkpoint {} not found in thread '{}'",
                    checkpoint_id, config.thread_id
                )
            };
            return Err(setup_error(&config, WorkflowError::Checkpoint(reason), latest_id));
        }

        if latest.next != Some(StageName::HumanFeedback) {
            return Err(setup_error(
                &config,
                WorkflowError::Checkpoint(format!(
                    "checkpoint {} is not waiting for feedback",
                    checkpoint_id
                )),
                latest_id,
            ));
        }

        tracing::info!(thread_id = %config.thread_id, checkpoint_id, "▶️ 恢复运行");
        Ok(Execution {
            config,
            state: latest.state,
            next: Some(StageName::HumanFeedback),
            resume: Some(feedback.into()),
            last_checkpoint: latest.checkpoint_id,
            steps: 0,
            suspended: None,
            finished: false,
        })
    }

    /// 执行一个阶段；运行结束或挂起后返回None
    pub async fn advance(
        &self,
        ctx: &WorkflowContext,
        execution: &mut Execution,
    ) -> Result<Option<RunEvent>, RunError> {
        if execution.finished {
            return Ok(None);
        }
        let Some(stage) = execution.next else {
            execution.finished = true;
            return Ok(None);
        };

        if execution.steps >= execution.config.recursion_limit {
            let limit = execution.config.recursion_limit;
            return Err(execution.fail(
                Some(stage),
                WorkflowError::RecursionLimitExceeded {
                    scope: LimitScope::Run,
                    limit,
                },
            ));
        }
        execution.steps += 1;

        let Some(node) = self.nodes.get(&stage).cloned() else {
            return Err(execution.fail(
                Some(stage),
                WorkflowError::Configuration(format!("stage '{}' is not registered", stage)),
            ));
        };

        let resume = if stage == StageName::HumanFeedback {
            execution.resume.take()
        } else {
            None
        };
        tracing::debug!(thread_id = %execution.config.thread_id, %stage, step = execution.steps, "进入阶段");

        let result = {
            let node_ctx = NodeContext {
                services: ctx,
                config: &execution.config,
                resume: resume.as_deref(),
            };
            node.run(&execution.state, &node_ctx).await
        };
        let command = match result {
            Ok(command) => command,
            Err(err) => return Err(execution.fail(Some(stage), WorkflowError::classify(err))),
        };

        if let Some(Goto::Interrupt(prompt)) = &command.goto {
            if !command.update.is_empty() {
                return Err(execution.fail(
                    Some(stage),
                    WorkflowError::InvalidUpdate(
                        "a suspending stage must not update the state".to_string(),
                    ),
                ));
            }
            execution.finished = true;
            execution.suspended = Some(prompt.clone());
            tracing::info!(
                thread_id = %execution.config.thread_id,
                checkpoint_id = execution.last_checkpoint,
                "⏸️ 等待人工反馈"
            );
            return Ok(Some(RunEvent::Interrupted {
                checkpoint: execution.last_checkpoint,
                prompt: prompt.clone(),
            }));
        }

        let mut next_state = execution.state.clone();
        if let Err(err) = next_state.apply(command.update) {
            return Err(execution.fail(Some(stage), err));
        }

        let next = match command.goto {
            Some(Goto::Stage(target)) => Some(target),
            Some(Goto::End) => None,
            Some(Goto::Interrupt(_)) => None,
            None => match self.edges.get(&stage) {
                Some(Edge::Direct(EdgeTarget::Stage(target))) => Some(*target),
                Some(Edge::Direct(EdgeTarget::End)) => None,
                Some(Edge::Conditional(router)) => Some(router(&next_state)),
                None => {
                    return Err(execution.fail(
                        Some(stage),
                        WorkflowError::Configuration(format!(
                            "stage '{}' returned no route and has no outgoing edge",
                            stage
                        )),
                    ));
                }
            },
        };
        if let Some(target) = next
            && !self.nodes.contains_key(&target)
        {
            return Err(execution.fail(
                Some(stage),
                WorkflowError::Configuration(format!("stage '{}' is not registered", target)),
            ));
        }

        let meta = match ctx
            .checkpointer
            .append(
                &execution.config.thread_id,
                Some(execution.last_checkpoint),
                Some(stage),
                &next_state,
                next,
            )
            .await
        {
            Ok(meta) => meta,
            Err(err) => return Err(execution.fail(Some(stage), checkpoint_error(err))),
        };

        execution.state = next_state;
        execution.next = next;
        execution.last_checkpoint = meta.checkpoint_id;
        if next.is_none() {
            execution.finished = true;
            tracing::info!(thread_id = %execution.config.thread_id, "✅ 运行结束");
        }

        Ok(Some(RunEvent::StageCompleted {
            stage,
            checkpoint: meta.checkpoint_id,
            state: execution.state.clone(),
        }))
    }

    /// 惰性的事件流，每个完成的阶段产生一个事件
    pub fn stream<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
        execution: Execution,
    ) -> impl Stream<Item = Result<RunEvent, RunError>> + 'a {
        futures::stream::try_unfold(execution, move |mut execution| async move {
            let event = self.advance(ctx, &mut execution).await?;
            Ok(event.map(|event| (event, execution)))
        })
    }

    /// 执行到结束或挂起
    pub async fn run(
        &self,
        ctx: &WorkflowContext,
        mut execution: Execution,
    ) -> Result<RunOutcome, RunError> {
        while self.advance(ctx, &mut execution).await?.is_some() {}
        Ok(Self::outcome(execution))
    }

    pub fn outcome(execution: Execution) -> RunOutcome {
        match execution.suspended {
            Some(prompt) => RunOutcome::Suspended {
                state: execution.state,
                checkpoint: execution.last_checkpoint,
                prompt,
            },
            None => RunOutcome::Completed {
                state: execution.state,
                checkpoint: execution.last_checkpoint,
            },
        }
    }

    /// 线程的检查点历史
    pub async fn history(
        &self,
        ctx: &WorkflowContext,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMeta>, WorkflowError> {
        ctx.checkpointer
            .list(thread_id)
            .await
            .map_err(checkpoint_error)
    }
}

#[cfg(test)]
mod tests;
