//! bee-analyst 命令行入口
//!
//! 用法：`bee-analyst <task-file> [attachment ...]`
//! 运行一个任务并把 JSON 报告打印到 stdout；报告中带错误时退出码仍为 0。

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use bee_analyst::agent::{create_orchestrator, handle_task};
use bee_analyst::observability;
use bee_analyst::submission::Attachment;

fn read_attachment(path: &Path) -> anyhow::Result<Attachment> {
    let content = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid file name: {}", path.display()))?;
    Ok(Attachment::new(name, content))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let mut args = std::env::args().skip(1).map(PathBuf::from);
    let Some(task_path) = args.next() else {
        bail!("usage: bee-analyst <task-file> [attachment ...]");
    };
    let task = std::fs::read_to_string(&task_path)
        .with_context(|| format!("Failed to read task file {}", task_path.display()))?;
    let attachments = args
        .map(|p| read_attachment(&p))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let (orchestrator, cfg) = create_orchestrator(None);
    let report = handle_task(&orchestrator, task.trim(), attachments, cfg.agent.preview_rows).await;

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}
