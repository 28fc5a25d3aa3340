use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{Checkpoint, CheckpointMeta, CheckpointStore, check_parent};
use crate::error::WorkflowError;
use crate::graph::types::StageName;
use crate::types::RunState;

static THREAD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"));

/// 文件检查点存储：每个线程一个JSON Lines文件，追加后落盘，进程重启后可恢复
pub struct FileCheckpointStore {
    dir: PathBuf,
    /// 每个线程一把写锁
    threads: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// 读取到的线程日志
struct ThreadLog {
    checkpoints: Vec<Checkpoint>,
    /// 最后一条完整记录之后的字节偏移，之后的内容是写入中断留下的残片
    committed_len: u64,
    /// 最后一条记录完整但缺少换行
    missing_newline: bool,
}

impl ThreadLog {
    fn latest_id(&self) -> Option<u64> {
        self.checkpoints.last().map(|c| c.checkpoint_id)
    }
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            threads: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, thread_id: &str) -> Result<PathBuf> {
        if !THREAD_ID.is_match(thread_id) || thread_id == "." || thread_id == ".." {
            return Err(WorkflowError::Checkpoint(format!(
                "invalid thread id '{}': only [A-Za-z0-9._-] is allowed",
                thread_id
            ))
            .into());
        }
        Ok(self.dir.join(format!("{}.jsonl", thread_id)))
    }

    async fn lock_for(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.threads
            .lock()
            .await
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }

    async fn read_log(path: &Path) -> Result<ThreadLog> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ThreadLog {
                    checkpoints: Vec::new(),
                    committed_len: 0,
                    missing_newline: false,
                });
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        let complete_len = bytes
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let (complete, tail) = bytes.split_at(complete_len);

        let content = std::str::from_utf8(complete)
            .with_context(|| format!("corrupt checkpoint file {}", path.display()))?;
        let mut checkpoints = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<Checkpoint>(line).with_context(|| {
                    format!("corrupt checkpoint at {}:{}", path.display(), index + 1)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut log = ThreadLog {
            checkpoints: Vec::new(),
            committed_len: complete_len as u64,
            missing_newline: false,
        };
        if !tail.iter().all(u8::is_ascii_whitespace) {
            let parsed = std::str::from_utf8(tail)
                .ok()
                .and_then(|line| serde_json::from_str::<Checkpoint>(line).ok());
            match parsed {
                Some(checkpoint) => {
                    checkpoints.push(checkpoint);
                    log.committed_len = bytes.len() as u64;
                    log.missing_newline = true;
                }
                None => tracing::warn!(
                    path = %path.display(),
                    bytes = tail.len(),
                    "忽略写入中断留下的残缺检查点"
                ),
            }
        }
        log.checkpoints = checkpoints;
        Ok(log)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn append(
        &self,
        thread_id: &str,
        parent: Option<u64>,
        stage: Option<StageName>,
        state: &RunState,
        next: Option<StageName>,
    ) -> Result<CheckpointMeta> {
        let path = self.path_for(thread_id)?;
        let lock = self.lock_for(thread_id).await;
        let _guard = lock.lock().await;

        let log = Self::read_log(&path).await?;
        let latest = log.latest_id();
        check_parent(thread_id, parent, latest)?;

        let checkpoint = Checkpoint {
            thread_id: thread_id.to_string(),
            checkpoint_id: latest.map(|id| id + 1).unwrap_or(1),
            created_at: chrono::Utc::now(),
            stage,
            next,
            state: state.clone(),
        };
        let mut record = String::new();
        if log.missing_newline {
            record.push('\n');
        }
        record.push_str(&serde_json::to_string(&checkpoint)?);
        record.push('\n');

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        // 截掉上次中断留下的残片，写入失败时回退到同一位置
        file.set_len(log.committed_len)
            .await
            .with_context(|| format!("Failed to trim {}", path.display()))?;
        let written = async {
            file.write_all(record.as_bytes()).await?;
            file.sync_data().await
        }
        .await;
        if let Err(err) = written {
            if let Err(trim_err) = file.set_len(log.committed_len).await {
                tracing::warn!(path = %path.display(), "回退未完成的检查点失败: {}", trim_err);
            }
            return Err(err).with_context(|| format!("Failed to write {}", path.display()));
        }

        tracing::debug!(
            thread_id,
            checkpoint_id = checkpoint.checkpoint_id,
            "checkpoint persisted"
        );
        Ok(checkpoint.meta())
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<CheckpointMeta>> {
        let path = self.path_for(thread_id)?;
        Ok(Self::read_log(&path)
            .await?
            .checkpoints
            .iter()
            .map(Checkpoint::meta)
            .collect())
    }

    async fn get(&self, thread_id: &str, checkpoint_id: u64) -> Result<Option<Checkpoint>> {
        let path = self.path_for(thread_id)?;
        Ok(Self::read_log(&path)
            .await?
            .checkpoints
            .into_iter()
            .find(|c| c.checkpoint_id == checkpoint_id))
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(thread_id)?;
        Ok(Self::read_log(&path).await?.checkpoints.pop())
    }
}
