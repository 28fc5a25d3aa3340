use super::*;
use crate::error::WorkflowError;
use crate::graph::types::StageName;
use crate::types::{ChatMessage, RunState};
use std::sync::Arc;
use tempfile::TempDir;

fn state(text: &str) -> RunState {
    RunState {
        messages: vec![ChatMessage::user(text)],
        ..Default::default()
    }
}

async fn exercise_store(store: &dyn CheckpointStore) {
    assert!(store.latest("t1").await.unwrap().is_none());
    assert!(store.list("t1").await.unwrap().is_empty());

    let first = store
        .append("t1", None, None, &state("a"), Some(StageName::Coordinator))
        .await
        .unwrap();
    let second = store
        .append(
            "t1",
            Some(1),
            Some(StageName::Coordinator),
            &state("b"),
            Some(StageName::Planner),
        )
        .await
        .unwrap();
    let other = store.append("t2", None, None, &state("x"), None).await.unwrap();

    assert_eq!(first.checkpoint_id, 1);
    assert_eq!(second.checkpoint_id, 2);
    assert_eq!(other.checkpoint_id, 1);

    let history = store.list("t1").await.unwrap();
    let pairs: Vec<_> = history.iter().map(|m| (m.checkpoint_id, m.next)).collect();
    assert_eq!(
        pairs,
        vec![
            (1, Some(StageName::Coordinator)),
            (2, Some(StageName::Planner))
        ]
    );

    let latest = store.latest("t1").await.unwrap().unwrap();
    assert_eq!(latest.checkpoint_id, 2);
    assert_eq!(latest.stage, Some(StageName::Coordinator));
    assert_eq!(latest.state.messages[0].content, "b");

    let first = store.get("t1", 1).await.unwrap().unwrap();
    assert_eq!(first.state.messages[0].content, "a");
    assert!(store.get("t1", 9).await.unwrap().is_none());
}

#[tokio::test]
async fn test_in_memory_store() {
    exercise_store(&InMemoryCheckpointStore::new()).await;
}

#[tokio::test]
async fn test_file_store() {
    let dir = TempDir::new().unwrap();
    exercise_store(&FileCheckpointStore::new(dir.path())).await;
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = FileCheckpointStore::new(dir.path());
        store
            .append("run", None, None, &state("a"), Some(StageName::Coordinator))
            .await
            .unwrap();
    }

    let reopened = FileCheckpointStore::new(dir.path());
    let meta = reopened
        .append("run", Some(1), Some(StageName::Coordinator), &state("b"), None)
        .await
        .unwrap();
    assert_eq!(meta.checkpoint_id, 2);
    assert_eq!(reopened.list("run").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_file_store_rejects_path_like_thread_ids() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    for bad in ["../escape", "a/b", "", ".."] {
        assert!(store.append(bad, None, None, &state("a"), None).await.is_err());
    }
}

#[tokio::test]
async fn test_concurrent_appends_are_partitioned_by_thread() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let mut handles = Vec::new();
    for thread in ["a", "b"] {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut parent = None;
            for _ in 0..10 {
                let meta = store
                    .append(thread, parent, None, &RunState::default(), None)
                    .await?;
                parent = Some(meta.checkpoint_id);
            }
            anyhow::Ok(())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for thread in ["a", "b"] {
        let ids: Vec<u64> = store
            .list(thread)
            .await
            .unwrap()
            .iter()
            .map(|m| m.checkpoint_id)
            .collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }
}

async fn exercise_parent_check(store: &dyn CheckpointStore) {
    store.append("t", None, None, &state("a"), None).await.unwrap();
    store
        .append("t", Some(1), Some(StageName::Planner), &state("b"), None)
        .await
        .unwrap();

    // 同一父检查点只能有一个后继
    let err = store
        .append("t", Some(1), Some(StageName::HumanFeedback), &state("c"), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<WorkflowError>(),
        Some(WorkflowError::Checkpoint(_))
    ));
    // 已有历史的线程不能再写输入检查点
    assert!(store.append("t", None, None, &state("d"), None).await.is_err());
    // 空线程不接受父检查点
    assert!(store.append("empty", Some(3), None, &state("e"), None).await.is_err());

    let ids: Vec<u64> = store
        .list("t")
        .await
        .unwrap()
        .iter()
        .map(|m| m.checkpoint_id)
        .collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(store.list("empty").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_in_memory_store_rejects_stale_parent() {
    exercise_parent_check(&InMemoryCheckpointStore::new()).await;
}

#[tokio::test]
async fn test_file_store_rejects_stale_parent() {
    let dir = TempDir::new().unwrap();
    exercise_parent_check(&FileCheckpointStore::new(dir.path())).await;
}

#[tokio::test]
async fn test_racing_appends_on_one_parent_keep_a_single_successor() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    store.append("t", None, None, &state("a"), None).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .append("t", Some(1), None, &RunState::default(), None)
                .await
                .is_ok()
        }));
    }
    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(store.list("t").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_file_store_recovers_from_torn_trailing_record() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.jsonl");
    {
        let store = FileCheckpointStore::new(dir.path());
        store
            .append("t", None, None, &state("a"), Some(StageName::Coordinator))
            .await
            .unwrap();
        store
            .append("t", Some(1), Some(StageName::Coordinator), &state("b"), None)
            .await
            .unwrap();
    }
    // 模拟写入中途崩溃
    let mut content = std::fs::read_to_string(&path).unwrap();
    content.push_str(r#"{"thread_id":"t","checkpoint_id":3,"crea"#);
    std::fs::write(&path, content).unwrap();

    let reopened = FileCheckpointStore::new(dir.path());
    let latest = reopened.latest("t").await.unwrap().unwrap();
    assert_eq!(latest.checkpoint_id, 2);
    assert_eq!(latest.state.messages[0].content, "b");
    assert_eq!(reopened.list("t").await.unwrap().len(), 2);

    let meta = reopened
        .append("t", Some(2), Some(StageName::Planner), &state("c"), None)
        .await
        .unwrap();
    assert_eq!(meta.checkpoint_id, 3);

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.ends_with('\n'));
    assert!(!content.contains(r#""crea{"#));
    let ids: Vec<u64> = reopened
        .list("t")
        .await
        .unwrap()
        .iter()
        .map(|m| m.checkpoint_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_file_store_keeps_complete_record_missing_newline() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.jsonl");
    let store = FileCheckpointStore::new(dir.path());
    store.append("t", None, None, &state("a"), None).await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, content.trim_end()).unwrap();

    assert_eq!(store.latest("t").await.unwrap().unwrap().checkpoint_id, 1);
    store
        .append("t", Some(1), None, &state("b"), None)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    assert_eq!(store.list("t").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_file_store_rejects_corruption_before_the_tail() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t.jsonl");
    let store = FileCheckpointStore::new(dir.path());
    store.append("t", None, None, &state("a"), None).await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, format!("not json\n{}", content)).unwrap();

    let err = store.list("t").await.unwrap_err();
    assert!(format!("{:#}", err).contains("corrupt checkpoint"));
}
