//! 任务提交边界：附件、任务文件识别、临时落盘与逻辑名解析
//!
//! 附件只在单次任务期间落盘到临时目录，AttachmentSet 析构时随目录一起删除。

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;

use crate::core::AgentError;

/// 没有可识别的任务文件时使用的任务文本
pub const DEFAULT_TASK: &str = "Analyze the attached files and summarize the key findings.";

/// 附件类型（按扩展名判断）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Csv,
    Json,
    Excel,
    Parquet,
    Pdf,
    Image,
    Python,
    Sql,
    Text,
    Other,
}

impl AttachmentKind {
    pub fn from_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "tsv" => AttachmentKind::Csv,
            "json" | "jsonl" => AttachmentKind::Json,
            "xlsx" | "xls" => AttachmentKind::Excel,
            "parquet" => AttachmentKind::Parquet,
            "pdf" => AttachmentKind::Pdf,
            "png" | "jpg" | "jpeg" | "gif" | "webp" => AttachmentKind::Image,
            "py" => AttachmentKind::Python,
            "sql" => AttachmentKind::Sql,
            "txt" | "md" => AttachmentKind::Text,
            _ => AttachmentKind::Other,
        }
    }

    /// 内容可直接作为文本预览
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            AttachmentKind::Csv
                | AttachmentKind::Json
                | AttachmentKind::Python
                | AttachmentKind::Sql
                | AttachmentKind::Text
        )
    }

    pub fn image_mime(name: &str) -> &'static str {
        match Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            _ => "image/png",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttachmentKind::Csv => "csv",
            AttachmentKind::Json => "json",
            AttachmentKind::Excel => "excel",
            AttachmentKind::Parquet => "parquet",
            AttachmentKind::Pdf => "pdf",
            AttachmentKind::Image => "image",
            AttachmentKind::Python => "python",
            AttachmentKind::Sql => "sql",
            AttachmentKind::Text => "text",
            AttachmentKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// 上传的文件：逻辑文件名 + 内容
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn kind(&self) -> AttachmentKind {
        AttachmentKind::from_name(&self.name)
    }
}

/// 从一组上传文件中识别任务文件，其余作为附件
///
/// 优先级：文件名以 question / task / prompt 开头 > 扩展名 .txt / .md；都没有时使用 [`DEFAULT_TASK`]。
pub fn designate_task_file(files: Vec<Attachment>) -> (String, Vec<Attachment>) {
    let stem_of = |a: &Attachment| {
        Path::new(&a.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_lowercase()
    };
    let by_name = files.iter().position(|a| {
        let stem = stem_of(a);
        ["question", "task", "prompt"].iter().any(|p| stem.starts_with(p))
            && matches!(a.kind(), AttachmentKind::Text | AttachmentKind::Other)
    });
    let idx = by_name.or_else(|| files.iter().position(|a| a.kind() == AttachmentKind::Text));

    match idx {
        Some(i) => {
            let mut files = files;
            let task_file = files.remove(i);
            tracing::info!(file = %task_file.name, "designated task file");
            let text = String::from_utf8_lossy(&task_file.content).trim().to_string();
            let text = if text.is_empty() { DEFAULT_TASK.to_string() } else { text };
            (text, files)
        }
        None => (DEFAULT_TASK.to_string(), files),
    }
}

/// 解析结果：逻辑名对应的实际文件
#[derive(Debug, Clone)]
pub struct ResolvedAttachment {
    pub name: String,
    pub path: PathBuf,
    pub kind: AttachmentKind,
}

/// 本次任务的附件集合（已落盘）
#[derive(Debug)]
pub struct AttachmentSet {
    _dir: Option<TempDir>,
    entries: Vec<(Attachment, PathBuf)>,
}

impl AttachmentSet {
    pub fn empty() -> Self {
        Self {
            _dir: None,
            entries: Vec::new(),
        }
    }

    /// 在 parent（未给出时为系统临时目录）下创建临时目录并写入所有附件
    pub fn materialize(attachments: Vec<Attachment>, parent: Option<&Path>) -> Result<Self, AgentError> {
        if attachments.is_empty() {
            return Ok(Self::empty());
        }
        let mut builder = tempfile::Builder::new();
        builder.prefix("analyst-attachments-");
        let dir = match parent {
            Some(p) => {
                std::fs::create_dir_all(p)?;
                builder.tempdir_in(p)?
            }
            None => builder.tempdir()?,
        };

        let mut entries = Vec::with_capacity(attachments.len());
        let mut used: HashSet<String> = HashSet::new();
        for (i, mut a) in attachments.into_iter().enumerate() {
            // 只保留文件名部分，防止路径穿越
            let file_name = Path::new(&a.name)
                .file_name()
                .and_then(|n| n.to_str())
                .filter(|n| !n.is_empty())
                .map(String::from)
                .unwrap_or_else(|| format!("attachment_{i}"));
            let file_name = unique_name(file_name, &mut used);
            let path = dir.path().join(&file_name);
            std::fs::write(&path, &a.content)?;
            a.name = file_name;
            entries.push((a, path));
        }
        tracing::info!(count = entries.len(), dir = %dir.path().display(), "attachments materialized");
        Ok(Self {
            _dir: Some(dir),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(a, _)| a.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Attachment> {
        self.entries.iter().find(|(a, _)| a.name == name).map(|(a, _)| a)
    }

    /// 逻辑名 -> 实际文件：精确 > 忽略大小写 > 主名相同 > 文件名包含引用 > 引用包含主名 > 唯一文件兜底；
    /// 均失败时立即报 Resolution
    pub fn resolve(&self, reference: &str) -> Result<ResolvedAttachment, AgentError> {
        if self.entries.is_empty() {
            return Err(AgentError::Resolution(format!(
                "no attachments were uploaded, cannot resolve '{reference}'"
            )));
        }
        let wanted = Path::new(reference.trim())
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(reference)
            .to_string();
        let wanted_lower = wanted.to_lowercase();
        let wanted_stem = stem_lower(&wanted);

        let entries = &self.entries;
        let find = move |pred: &dyn Fn(&Attachment) -> bool| entries.iter().find(|(a, _)| pred(a));
        // 短文件名只有在作为完整词出现或不少于 3 个字符时才算被引用
        let tokens: Vec<&str> = wanted_lower.split(|c: char| !c.is_alphanumeric()).collect();
        let mentions = |stem: &str| !stem.is_empty() && (stem.chars().count() >= 3 || tokens.contains(&stem));

        let found = find(&|a| a.name == wanted)
            .or_else(|| find(&|a| a.name.to_lowercase() == wanted_lower))
            .or_else(|| find(&|a| !wanted_stem.is_empty() && stem_lower(&a.name) == wanted_stem))
            .or_else(|| {
                find(&|a| {
                    !wanted_stem.is_empty()
                        && (a.name.to_lowercase().contains(&wanted_lower) || stem_lower(&a.name).contains(&wanted_stem))
                })
            })
            .or_else(|| {
                find(&|a| {
                    let stem = stem_lower(&a.name);
                    mentions(&stem) && wanted_lower.contains(&stem)
                })
            })
            .or_else(|| {
                (entries.len() == 1).then(|| {
                    tracing::warn!(reference = %reference, file = %entries[0].0.name, "falling back to the only attachment");
                    &entries[0]
                })
            });

        match found {
            Some((a, path)) => Ok(ResolvedAttachment {
                name: a.name.clone(),
                path: path.clone(),
                kind: a.kind(),
            }),
            None => Err(AgentError::Resolution(format!(
                "no attachment matches '{}'; available: {}",
                reference,
                self.names().join(", ")
            ))),
        }
    }

    /// 规划 prompt 中的附件概览：文本类附件附带开头内容，其余仅列出名称与类型
    pub fn previews(&self, max_chars: usize) -> String {
        if self.entries.is_empty() {
            return "(no attachments)".to_string();
        }
        self.entries
            .iter()
            .map(|(a, _)| {
                let kind = a.kind();
                let head = format!("- {} ({}, {} bytes)", a.name, kind, a.content.len());
                if kind.is_text() {
                    let text = String::from_utf8_lossy(&a.content);
                    let preview: String = text.chars().take(max_chars).collect();
                    format!("{head}\n```\n{}\n```", preview.trim_end())
                } else {
                    head
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 同名文件追加 `_2`、`_3`…（比较时忽略大小写），保留扩展名
fn unique_name(file_name: String, used: &mut HashSet<String>) -> String {
    let mut candidate = file_name.clone();
    let mut n = 1;
    while !used.insert(candidate.to_lowercase()) {
        n += 1;
        let path = Path::new(&file_name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(&file_name);
        candidate = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
    }
    candidate
}

fn stem_lower(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase()
}
