//! 检查点存储：按thread_id分区、只追加的运行历史

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::graph::types::StageName;
use crate::types::RunState;

mod file;
mod memory;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;

/// 不可变的状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    /// 线程内从1开始单调递增
    pub checkpoint_id: u64,
    pub created_at: DateTime<Utc>,
    /// 产生该快照的阶段；运行输入的快照为空
    pub stage: Option<StageName>,
    /// 待执行的下一个阶段；为空表示运行已结束
    pub next: Option<StageName>,
    pub state: RunState,
}

impl Checkpoint {
    pub fn meta(&self) -> CheckpointMeta {
        CheckpointMeta {
            checkpoint_id: self.checkpoint_id,
            stage: self.stage,
            next: self.next,
            created_at: self.created_at,
        }
    }
}

/// 历史查询返回的摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub checkpoint_id: u64,
    pub stage: Option<StageName>,
    pub next: Option<StageName>,
    pub created_at: DateTime<Utc>,
}

/// 检查点存储，不同thread_id之间的追加互不干扰
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 追加一个检查点。`parent`必须是线程当前最新的checkpoint_id（空线程为None），
    /// 否则以`WorkflowError::Checkpoint`拒绝，线程历史因此始终是一条链
    async fn append(
        &self,
        thread_id: &str,
        parent: Option<u64>,
        stage: Option<StageName>,
        state: &RunState,
        next: Option<StageName>,
    ) -> Result<CheckpointMeta>;

    /// 按写入顺序返回线程的全部检查点摘要
    async fn list(&self, thread_id: &str) -> Result<Vec<CheckpointMeta>>;

    async fn get(&self, thread_id: &str, checkpoint_id: u64) -> Result<Option<Checkpoint>>;

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;
}

/// 在线程写锁内调用：校验追加方看到的最新检查点仍是最新的
fn check_parent(thread_id: &str, parent: Option<u64>, latest: Option<u64>) -> Result<()> {
    if parent == latest {
        return Ok(());
    }
    let describe = |id: Option<u64>| id.map(|id| id.to_string()).unwrap_or_else(|| "none".to_string());
    Err(WorkflowError::Checkpoint(format!(
        "thread '{}' has moved on: expected latest checkpoint {}, found {}",
        thread_id,
        describe(parent),
        describe(latest)
    ))
    .into())
}

#[cfg(test)]
mod tests;
