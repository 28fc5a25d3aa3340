//! 报告输出

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

const UNTITLED: &str = "untitled-report";
const MAX_FILENAME_CHARS: usize = 100;

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").expect("valid regex"));

/// 报告的持久化目标，返回存储位置
#[async_trait]
pub trait ReportOutlet: Send + Sync {
    async fn save(&self, title: &str, body: &str) -> Result<String>;
}

/// 将报告写入目录下的markdown文件
#[derive(Debug, Clone)]
pub struct DiskOutlet {
    report_dir: PathBuf,
}

impl DiskOutlet {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
        }
    }
}

#[async_trait]
impl ReportOutlet for DiskOutlet {
    async fn save(&self, title: &str, body: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.report_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.report_dir.display()))?;

        let path = self
            .report_dir
            .join(format!("{}.md", sanitize_filename(title)));
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!(path = %path.display(), "💾 已保存报告");
        Ok(path.display().to_string())
    }
}

/// 报告标题：第一个一级标题，其次第一个二级标题
pub fn extract_title(report: &str) -> String {
    let headings = |prefix: &str| {
        report
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix(prefix))
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
    };
    headings("# ")
        .or_else(|| headings("## "))
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// 将标题转换为安全的文件名
pub fn sanitize_filename(title: &str) -> String {
    let replaced = INVALID_CHARS.replace_all(title, "_");
    let dashed = WHITESPACE.replace_all(&replaced, "-");
    let collapsed = DASHES.replace_all(&dashed, "-");
    let trimmed: String = collapsed
        .trim_matches('-')
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect();

    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed
    }
}
