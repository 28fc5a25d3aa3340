use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::{Checkpoint, CheckpointMeta, CheckpointStore, check_parent};
use crate::graph::types::StageName;
use crate::types::RunState;

/// 进程内检查点存储，每个线程一把锁
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    threads: RwLock<HashMap<String, Arc<Mutex<Vec<Checkpoint>>>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn thread(&self, thread_id: &str) -> Arc<Mutex<Vec<Checkpoint>>> {
        if let Some(log) = self.threads.read().await.get(thread_id) {
            return log.clone();
        }
        self.threads
            .write()
            .await
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }

    async fn existing(&self, thread_id: &str) -> Option<Arc<Mutex<Vec<Checkpoint>>>> {
        self.threads.read().await.get(thread_id).cloned()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn append(
        &self,
        thread_id: &str,
        parent: Option<u64>,
        stage: Option<StageName>,
        state: &RunState,
        next: Option<StageName>,
    ) -> Result<CheckpointMeta> {
        let log = self.thread(thread_id).await;
        let mut log = log.lock().await;
        let latest = log.last().map(|c| c.checkpoint_id);
        check_parent(thread_id, parent, latest)?;

        let checkpoint = Checkpoint {
            thread_id: thread_id.to_string(),
            checkpoint_id: latest.map(|id| id + 1).unwrap_or(1),
            created_at: chrono::Utc::now(),
            stage,
            next,
            state: state.clone(),
        };
        let meta = checkpoint.meta();
        log.push(checkpoint);
        Ok(meta)
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<CheckpointMeta>> {
        match self.existing(thread_id).await {
            Some(log) => Ok(log.lock().await.iter().map(Checkpoint::meta).collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn get(&self, thread_id: &str, checkpoint_id: u64) -> Result<Option<Checkpoint>> {
        match self.existing(thread_id).await {
            Some(log) => Ok(log
                .lock()
                .await
                .iter()
                .find(|c| c.checkpoint_id == checkpoint_id)
                .cloned()),
            None => Ok(None),
        }
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        match self.existing(thread_id).await {
            Some(log) => Ok(log.lock().await.last().cloned()),
            None => Ok(None),
        }
    }
}
