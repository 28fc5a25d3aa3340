use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;

use super::*;
use crate::graph::builder::{StateGraph, build_graph};
use crate::graph::types::Command;
use crate::llm::client::ChatResponse;
use crate::test_support::{TestHarness, handoff, plan_json, submit};
use crate::types::StateUpdate;

fn full_run_script() -> Vec<ChatResponse> {
    vec![
        handoff("EV market", "en-US"),
        submit(plan_json(
            "EV market",
            false,
            &[("research", "Sales"), ("processing", "Growth")],
        )),
        ChatResponse::text("Sales grew 30%."),
        ChatResponse::text("CAGR is 12%."),
        ChatResponse::text("# EV Market Report\n\nDone."),
    ]
}

fn review_input() -> RunInput {
    RunInput {
        auto_accepted_plan: false,
        ..RunInput::new("research the EV market")
    }
}

async fn stages_of(ctx: &WorkflowContext, thread_id: &str) -> Vec<Option<StageName>> {
    ctx.checkpointer
        .list(thread_id)
        .await
        .unwrap()
        .into_iter()
        .map(|meta| meta.stage)
        .collect()
}

#[tokio::test]
async fn test_auto_accepted_run_completes() {
    let harness = TestHarness::new(full_run_script());
    let ctx = &harness.context;
    let graph = build_graph().unwrap();

    let execution = graph
        .start(ctx, RunInput::new("research the EV market"), RunConfig::new("t1"))
        .await
        .unwrap();
    let outcome = graph.run(ctx, execution).await.unwrap();

    let RunOutcome::Completed { state, checkpoint } = outcome else {
        panic!("run should complete");
    };
    assert_eq!(checkpoint, 12);
    assert_eq!(state.final_report.as_deref(), Some("# EV Market Report\n\nDone."));
    assert_eq!(state.plan_iterations, 1);
    assert!(state.plan().unwrap().is_complete());
    assert_eq!(state.observations, vec!["Sales grew 30%.", "CAGR is 12%."]);
    assert!(state.total_tokens > 0);
    assert_eq!(harness.model.remaining(), 0);
    assert_eq!(harness.outlet.saved()[0].0, "EV Market Report");

    use StageName::*;
    assert_eq!(
        stages_of(ctx, "t1").await,
        vec![
            None,
            Some(Coordinator),
            Some(BackgroundInvestigator),
            Some(Planner),
            Some(HumanFeedback),
            Some(ResearchTeam),
            Some(Researcher),
            Some(ResearchTeam),
            Some(Coder),
            Some(ResearchTeam),
            Some(Planner),
            Some(Reporter),
        ]
    );
    let history = graph.history(ctx, "t1").await.unwrap();
    assert_eq!(history.last().unwrap().next, None);
}

#[tokio::test]
async fn test_direct_answer_ends_after_coordinator() {
    let harness = TestHarness::new(vec![ChatResponse::text("Hi there!")]);
    let ctx = &harness.context;
    let graph = build_graph().unwrap();

    let execution = graph
        .start(ctx, RunInput::new("hello"), RunConfig::new("t1"))
        .await
        .unwrap();
    let outcome = graph.run(ctx, execution).await.unwrap();

    assert_eq!(outcome.checkpoint(), 2);
    assert!(outcome.state().final_report.is_none());
    assert_eq!(outcome.state().messages.len(), 2);
}

#[tokio::test]
async fn test_start_rejects_empty_input_and_reused_thread() {
    let harness = TestHarness::new(vec![ChatResponse::text("Hi")]);
    let ctx = &harness.context;
    let graph = build_graph().unwrap();

    let err = graph
        .start(ctx, RunInput::new("   "), RunConfig::new("t1"))
        .await
        .unwrap_err();
    assert!(matches!(err.source, WorkflowError::Configuration(_)));
    assert!(stages_of(ctx, "t1").await.is_empty());

    graph
        .start(ctx, RunInput::new("hello"), RunConfig::new("t1"))
        .await
        .unwrap();
    let err = graph
        .start(ctx, RunInput::new("hello again"), RunConfig::new("t1"))
        .await
        .unwrap_err();
    assert!(matches!(err.source, WorkflowError::Configuration(_)));
    assert_eq!(err.last_checkpoint, Some(1));
}

#[tokio::test]
async fn test_review_suspends_then_resumes() {
    let harness = TestHarness::new(full_run_script());
    let ctx = &harness.context;
    let graph = build_graph().unwrap();

    let execution = graph
        .start(ctx, review_input(), RunConfig::new("t1"))
        .await
        .unwrap();
    let outcome = graph.run(ctx, execution).await.unwrap();

    let RunOutcome::Suspended {
        state,
        checkpoint,
        prompt,
    } = outcome
    else {
        panic!("run should suspend for review");
    };
    assert_eq!(prompt, "Please Review the Plan.");
    assert_eq!(checkpoint, 4);
    assert_eq!(state.plan_iterations, 0);
    let latest = ctx.checkpointer.latest("t1").await.unwrap().unwrap();
    assert_eq!(latest.checkpoint_id, 4);
    assert_eq!(latest.next, Some(StageName::HumanFeedback));

    let execution = graph
        .resume(ctx, RunConfig::new("t1"), checkpoint, "[ACCEPTED]")
        .await
        .unwrap();
    let outcome = graph.run(ctx, execution).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(outcome.state().plan_iterations, 1);
    assert!(outcome.state().final_report.is_some());
}

#[tokio::test]
async fn test_second_resume_of_same_checkpoint_cannot_fork_history() {
    let harness = TestHarness::new(full_run_script());
    let ctx = &harness.context;
    let graph = build_graph().unwrap();

    let execution = graph
        .start(ctx, review_input(), RunConfig::new("t1"))
        .await
        .unwrap();
    let parked = graph.run(ctx, execution).await.unwrap().checkpoint();
    assert_eq!(parked, 4);

    let mut first = graph
        .resume(ctx, RunConfig::new("t1"), parked, "[ACCEPTED]")
        .await
        .unwrap();
    let mut second = graph
        .resume(ctx, RunConfig::new("t1"), parked, "[ACCEPTED]")
        .await
        .unwrap();

    let event = graph.advance(ctx, &mut first).await.unwrap();
    assert!(matches!(
        event,
        Some(RunEvent::StageCompleted { checkpoint: 5, .. })
    ));

    let err = graph.advance(ctx, &mut second).await.unwrap_err();
    assert_eq!(err.stage, Some(StageName::HumanFeedback));
    assert_eq!(err.last_checkpoint, Some(parked));
    assert!(matches!(err.source, WorkflowError::Checkpoint(_)));
    assert!(second.is_finished());

    let history = ctx.checkpointer.list("t1").await.unwrap();
    let ids: Vec<_> = history.iter().map(|meta| meta.checkpoint_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    let outcome = graph.run(ctx, first).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { checkpoint: 12, .. }));
}

#[tokio::test]
async fn test_edit_plan_feedback_replans_and_suspends_again() {
    let harness = TestHarness::new(vec![
        handoff("EV market", "en-US"),
        submit(plan_json("EV market", false, &[("research", "Sales")])),
        submit(plan_json(
            "EV market and policy",
            false,
            &[("research", "Sales"), ("research", "Policy")],
        )),
    ]);
    let ctx = &harness.context;
    let graph = build_graph().unwrap();

    let execution = graph
        .start(ctx, review_input(), RunConfig::new("t1"))
        .await
        .unwrap();
    let first = graph.run(ctx, execution).await.unwrap();

    let execution = graph
        .resume(
            ctx,
            RunConfig::new("t1"),
            first.checkpoint(),
            "[EDIT_PLAN] cover policy too",
        )
        .await
        .unwrap();
    let second = graph.run(ctx, execution).await.unwrap();

    let RunOutcome::Suspended { state, checkpoint, .. } = second else {
        panic!("edited plan should be reviewed again");
    };
    assert_eq!(checkpoint, first.checkpoint() + 2);
    assert_eq!(state.plan().unwrap().title, "EV market and policy");
    assert!(
        state
            .messages
            .iter()
            .any(|m| m.name.as_deref() == Some("feedback"))
    );
}

#[tokio::test]
async fn test_unsupported_feedback_leaves_history_untouched() {
    let harness = TestHarness::new(full_run_script());
    let ctx = &harness.context;
    let graph = build_graph().unwrap();

    let execution = graph
        .start(ctx, review_input(), RunConfig::new("t1"))
        .await
        .unwrap();
    let suspended = graph.run(ctx, execution).await.unwrap();
    let before = ctx.checkpointer.list("t1").await.unwrap();

    let execution = graph
        .resume(ctx, RunConfig::new("t1"), suspended.checkpoint(), "maybe later")
        .await
        .unwrap();
    let err = graph.run(ctx, execution).await.unwrap_err();

    assert_eq!(err.stage, Some(StageName::HumanFeedback));
    assert_eq!(err.last_checkpoint, Some(suspended.checkpoint()));
    assert!(matches!(err.source, WorkflowError::Configuration(_)));
    assert_eq!(ctx.checkpointer.list("t1").await.unwrap(), before);

    let execution = graph
        .resume(ctx, RunConfig::new("t1"), suspended.checkpoint(), "[accepted]")
        .await
        .unwrap();
    assert!(graph.run(ctx, execution).await.is_ok());
}

#[tokio::test]
async fn test_resume_requires_latest_parked_checkpoint() {
    let harness = TestHarness::new(full_run_script());
    let ctx = &harness.context;
    let graph = build_graph().unwrap();

    let err = graph
        .resume(ctx, RunConfig::new("missing"), 1, "[ACCEPTED]")
        .await
        .unwrap_err();
    assert!(matches!(err.source, WorkflowError::Checkpoint(_)));

    let execution = graph
        .start(ctx, review_input(), RunConfig::new("t1"))
        .await
        .unwrap();
    let suspended = graph.run(ctx, execution).await.unwrap();

    let err = graph
        .resume(ctx, RunConfig::new("t1"), 2, "[ACCEPTED]")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not the latest"));

    let err = graph
        .resume(ctx, RunConfig::new("t1"), 99, "[ACCEPTED]")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));

    let execution = graph
        .resume(ctx, RunConfig::new("t1"), suspended.checkpoint(), "[ACCEPTED]")
        .await
        .unwrap();
    let done = graph.run(ctx, execution).await.unwrap();

    let err = graph
        .resume(ctx, RunConfig::new("t1"), done.checkpoint(), "[ACCEPTED]")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not waiting for feedback"));
}

#[tokio::test]
async fn test_recursion_limit_aborts_and_keeps_checkpoints() {
    let harness = TestHarness::new(full_run_script());
    let ctx = &harness.context;
    let graph = build_graph().unwrap();
    let config = RunConfig {
        recursion_limit: 3,
        ..RunConfig::new("t1")
    };

    let execution = graph
        .start(ctx, RunInput::new("research the EV market"), config)
        .await
        .unwrap();
    let err = graph.run(ctx, execution).await.unwrap_err();

    assert_eq!(
        err.source,
        WorkflowError::RecursionLimitExceeded {
            scope: LimitScope::Run,
            limit: 3
        }
    );
    assert_eq!(err.stage, Some(StageName::HumanFeedback));
    assert_eq!(err.last_checkpoint, Some(4));
    assert_eq!(stages_of(ctx, "t1").await.len(), 4);
}

#[tokio::test]
async fn test_stage_failure_is_classified() {
    let harness = TestHarness::new(vec![
        handoff("EV market", "en-US"),
        ChatResponse::text("not a plan"),
    ]);
    let ctx = &harness.context;
    let graph = build_graph().unwrap();

    let execution = graph
        .start(ctx, RunInput::new("research the EV market"), RunConfig::new("t1"))
        .await
        .unwrap();
    let err = graph.run(ctx, execution).await.unwrap_err();

    assert_eq!(err.stage, Some(StageName::Planner));
    assert_eq!(err.last_checkpoint, Some(3));
    assert!(matches!(err.source, WorkflowError::Collaborator(_)));
}

#[tokio::test]
async fn test_stream_is_lazy() {
    let harness = TestHarness::new(full_run_script());
    let ctx = &harness.context;
    let graph = build_graph().unwrap();

    let execution = graph
        .start(ctx, RunInput::new("research the EV market"), RunConfig::new("t1"))
        .await
        .unwrap();
    let events: Vec<_> = graph.stream(ctx, execution).take(1).collect().await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Ok(RunEvent::StageCompleted {
            stage: StageName::Coordinator,
            checkpoint: 2,
            ..
        })
    ));
    assert_eq!(harness.model.requests().len(), 1);
}

struct MisbehavingGate;

#[async_trait]
impl Node for MisbehavingGate {
    fn name(&self) -> StageName {
        StageName::HumanFeedback
    }

    async fn run(&self, _state: &RunState, _ctx: &NodeContext<'_>) -> Result<Command> {
        let mut command = Command::interrupt("review");
        command.update = StateUpdate {
            observations: vec!["sneaky".to_string()],
            ..Default::default()
        };
        Ok(command)
    }
}

struct JumpToCoder;

#[async_trait]
impl Node for JumpToCoder {
    fn name(&self) -> StageName {
        StageName::Coordinator
    }

    async fn run(&self, _state: &RunState, _ctx: &NodeContext<'_>) -> Result<Command> {
        Ok(Command::goto(StageName::Coder))
    }
}

#[tokio::test]
async fn test_suspending_stage_cannot_update_state() {
    let harness = TestHarness::new(Vec::new());
    let ctx = &harness.context;
    let mut builder = StateGraph::new();
    builder
        .add_node(MisbehavingGate)
        .set_entry_point(StageName::HumanFeedback);
    let graph = builder.compile().unwrap();

    let execution = graph
        .start(ctx, RunInput::new("x"), RunConfig::new("t1"))
        .await
        .unwrap();
    let err = graph.run(ctx, execution).await.unwrap_err();
    assert!(matches!(err.source, WorkflowError::InvalidUpdate(_)));
    assert_eq!(stages_of(ctx, "t1").await.len(), 1);
}

#[tokio::test]
async fn test_goto_unregistered_stage_fails() {
    let harness = TestHarness::new(Vec::new());
    let ctx = &harness.context;
    let mut builder = StateGraph::new();
    builder
        .add_node(JumpToCoder)
        .set_entry_point(StageName::Coordinator);
    let graph = builder.compile().unwrap();

    let execution = graph
        .start(ctx, RunInput::new("x"), RunConfig::new("t1"))
        .await
        .unwrap();
    let err = graph.run(ctx, execution).await.unwrap_err();
    assert!(matches!(err.source, WorkflowError::Configuration(_)));
    assert_eq!(err.stage, Some(StageName::Coordinator));
}
