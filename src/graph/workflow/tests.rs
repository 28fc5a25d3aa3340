use super::*;
use crate::test_support::{TestHarness, handoff, plan_json, submit};
use crate::llm::client::ChatResponse;
use crate::types::{CurrentPlan, Plan};

#[test]
fn test_message_cursor_only_yields_new_messages() {
    let mut state = RunState {
        messages: vec![ChatMessage::user("question")],
        ..Default::default()
    };
    let mut cursor = MessageCursor::at(&state);
    assert!(cursor.advance(&state).is_empty());

    state.messages.push(ChatMessage::assistant("a"));
    state.messages.push(ChatMessage::assistant("b"));
    let fresh: Vec<_> = cursor
        .advance(&state)
        .iter()
        .map(|m| m.content.clone())
        .collect();
    assert_eq!(fresh, vec!["a", "b"]);
    assert!(cursor.advance(&state).is_empty());
}

#[test]
fn test_exit_commands() {
    assert!(is_exit_command("q"));
    assert!(is_exit_command(" Quit "));
    assert!(is_exit_command("EXIT"));
    assert!(!is_exit_command("quantum computing"));
}

#[test]
fn test_render_plan_lists_steps() {
    let plan: Plan = serde_json::from_value(plan_json(
        "EV market",
        false,
        &[("research", "Sales"), ("processing", "Growth")],
    ))
    .unwrap();
    let state = RunState {
        current_plan: CurrentPlan::Plan(plan),
        ..Default::default()
    };

    let text = render_plan(&state);
    assert!(text.starts_with("📋 EV market\n"));
    assert!(text.contains("  1. [research] Sales: do Sales\n"));
    assert!(text.contains("  2. [processing] Growth: do Growth\n"));
    assert_eq!(render_plan(&RunState::default()), "(no plan)");
}

#[tokio::test]
async fn test_drive_reports_new_messages_and_suspends() {
    let harness = TestHarness::new(vec![
        handoff("EV market", "en-US"),
        submit(plan_json("EV market", false, &[("research", "Sales")])),
    ]);
    let ctx = &harness.context;
    let graph = build_graph().unwrap();
    let input = RunInput {
        auto_accepted_plan: false,
        ..RunInput::new("research the EV market")
    };

    let execution = graph
        .start(ctx, input, RunConfig::new("t1"))
        .await
        .unwrap();
    let mut seen = Vec::new();
    let outcome = drive(&graph, ctx, execution, |m| {
        seen.push(m.name.clone().unwrap_or_default())
    })
    .await
    .unwrap();

    assert_eq!(seen, vec!["planner"]);
    let RunOutcome::Suspended { checkpoint, .. } = outcome else {
        panic!("expected suspension");
    };
    assert_eq!(checkpoint, 4);
}

#[tokio::test]
async fn test_history_lists_checkpoints() {
    let harness = TestHarness::new(vec![ChatResponse::text("Hello!")]);
    let ctx = &harness.context;
    let outcome = launch(ctx, RunInput::new("hi"), RunConfig::new("t1"))
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { .. }));

    let history = history(ctx, "t1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].stage, None);
    assert_eq!(history[1].next, None);
}
