//! 面向命令行的工作流入口：启动、恢复、查看历史以及交互式对话

use anyhow::Result;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::graph::builder::build_graph;
use crate::graph::checkpoint::CheckpointMeta;
use crate::graph::context::WorkflowContext;
use crate::graph::engine::{CompiledGraph, Execution};
use crate::graph::types::{RunConfig, RunError, RunEvent, RunInput, RunOutcome};
use crate::types::{ChatMessage, RunState};

/// 只输出自上次以来新增的消息
#[derive(Debug, Default)]
pub struct MessageCursor {
    printed: usize,
}

impl MessageCursor {
    /// 从当前状态开始，已有消息视为已输出
    pub fn at(state: &RunState) -> Self {
        Self {
            printed: state.messages.len(),
        }
    }

    pub fn advance<'s>(&mut self, state: &'s RunState) -> &'s [ChatMessage] {
        let start = self.printed.min(state.messages.len());
        self.printed = state.messages.len();
        &state.messages[start..]
    }
}

/// 驱动一次调用直到结束或挂起，每个阶段完成后把新增消息交给回调
pub async fn drive(
    graph: &CompiledGraph,
    ctx: &WorkflowContext,
    execution: Execution,
    mut on_message: impl FnMut(&ChatMessage),
) -> Result<RunOutcome, RunError> {
    let mut cursor = MessageCursor::at(execution.state());
    let mut last_state = execution.state().clone();
    let mut last_checkpoint = execution.last_checkpoint();
    let mut suspended = None;

    let stream = graph.stream(ctx, execution);
    futures::pin_mut!(stream);
    while let Some(event) = stream.next().await {
        match event? {
            RunEvent::StageCompleted {
                stage,
                checkpoint,
                state,
            } => {
                tracing::debug!(%stage, checkpoint, "stage completed");
                for message in cursor.advance(&state) {
                    on_message(message);
                }
                last_state = state;
                last_checkpoint = checkpoint;
            }
            RunEvent::Interrupted { checkpoint, prompt } => {
                last_checkpoint = checkpoint;
                suspended = Some(prompt);
            }
        }
    }

    Ok(match suspended {
        Some(prompt) => RunOutcome::Suspended {
            state: last_state,
            checkpoint: last_checkpoint,
            prompt,
        },
        None => RunOutcome::Completed {
            state: last_state,
            checkpoint: last_checkpoint,
        },
    })
}

/// 开始一次新运行，并把过程输出到终端
pub async fn launch(
    ctx: &WorkflowContext,
    input: RunInput,
    config: RunConfig,
) -> Result<RunOutcome> {
    let graph = build_graph()?;
    let execution = graph.start(ctx, input, config).await?;
    let outcome = drive(&graph, ctx, execution, print_message).await?;
    Ok(outcome)
}

/// 携带人工反馈从挂起处继续
pub async fn resume(
    ctx: &WorkflowContext,
    config: RunConfig,
    checkpoint_id: u64,
    feedback: &str,
) -> Result<RunOutcome> {
    let graph = build_graph()?;
    let execution = graph.resume(ctx, config, checkpoint_id, feedback).await?;
    let outcome = drive(&graph, ctx, execution, print_message).await?;
    Ok(outcome)
}

pub async fn history(ctx: &WorkflowContext, thread_id: &str) -> Result<Vec<CheckpointMeta>> {
    let graph = build_graph()?;
    Ok(graph.history(ctx, thread_id).await?)
}

/// 交互式对话：每个问题一个新线程，挂起时就地询问反馈
pub async fn chat(ctx: &WorkflowContext, template: RunInput) -> Result<()> {
    let graph = build_graph()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let Some(query) = read_line(&mut lines, "Enter your query: ").await? else {
            break;
        };
        let query = query.trim();
        if query.is_empty() {
            continue;
        }
        if is_exit_command(query) {
            break;
        }

        let config = ctx.config.run_config(uuid::Uuid::new_v4().to_string());
        let input = RunInput {
            initial_message: query.to_string(),
            ..template.clone()
        };
        let mut outcome = match graph.start(ctx, input, config.clone()).await {
            Ok(execution) => drive(&graph, ctx, execution, print_message).await,
            Err(err) => Err(err),
        };

        loop {
            let (checkpoint, prompt) = match &outcome {
                Ok(RunOutcome::Suspended {
                    state,
                    checkpoint,
                    prompt,
                }) => {
                    println!("{}", render_plan(state));
                    (*checkpoint, prompt.clone())
                }
                _ => break,
            };
            let feedback = read_line(
                &mut lines,
                &format!("{} ([ACCEPTED] or [EDIT_PLAN] ...): ", prompt),
            )
            .await?
            .unwrap_or_default();
            outcome = match graph.resume(ctx, config.clone(), checkpoint, feedback.trim()).await {
                Ok(execution) => drive(&graph, ctx, execution, print_message).await,
                Err(err) => Err(err),
            };
        }

        match outcome {
            Ok(outcome) => print_outcome(&config.thread_id, &outcome),
            Err(err) => eprintln!("❌ {}", err),
        }
    }
    Ok(())
}

async fn read_line<R>(
    lines: &mut tokio::io::Lines<BufReader<R>>,
    prompt: &str,
) -> Result<Option<String>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;
    Ok(lines.next_line().await?)
}

pub fn is_exit_command(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "q" | "quit" | "exit")
}

pub fn print_message(message: &ChatMessage) {
    println!("{}", message);
}

/// 供审阅的计划文本
pub fn render_plan(state: &RunState) -> String {
    let Some(plan) = state.plan() else {
        return "(no plan)".to_string();
    };
    let mut text = format!("📋 {}\n", plan.title);
    if !plan.thought.is_empty() {
        text.push_str(&format!("{}\n", plan.thought));
    }
    for (i, step) in plan.steps.iter().enumerate() {
        text.push_str(&format!(
            "  {}. [{}] {}: {}\n",
            i + 1,
            step.step_type,
            step.title,
            step.description
        ));
    }
    text
}

/// 运行结束后的终端摘要
pub fn print_outcome(thread_id: &str, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed { state, checkpoint } => {
            match &state.final_report {
                Some(report) => println!("\n{}\n", report),
                None => println!("\n(no report produced)"),
            }
            println!(
                "✅ finished at checkpoint {}, {} tokens used",
                checkpoint, state.total_tokens
            );
        }
        RunOutcome::Suspended {
            state,
            checkpoint,
            prompt,
        } => {
            println!("\n{}", render_plan(state));
            println!("⏸️ {}", prompt);
            println!(
                "Continue with: deepflow resume --thread-id {} --checkpoint-id {} --feedback \"[ACCEPTED]\"",
                thread_id, checkpoint
            );
        }
    }
}

#[cfg(test)]
mod tests;
