//! 执行上下文：步骤结果（StepResult）、按插入顺序累积的命名结果（ExecutionContext）、
//! 修正日志（ExecutionLog）与单次任务运行（TaskRun）。
//!
//! 上下文只增不减；每个步骤可读取之前任意步骤的结果。

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::core::{AgentError, RunPhase};
use crate::plan::PlanStep;

/// 沙箱与 Rust 之间传递结构化值时使用的类型标记键
pub const WIRE_KIND_KEY: &str = "__kind__";

/// 列类型（由列中非空值推断）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl ColumnType {
    /// 推断单列类型：全整数 -> Integer；整数/浮点混合 -> Float；全布尔 -> Boolean；其余 -> Text
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut seen: Option<ColumnType> = None;
        for v in values {
            let t = match v {
                Value::Null => continue,
                Value::Bool(_) => ColumnType::Boolean,
                Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Integer,
                Value::Number(_) => ColumnType::Float,
                _ => ColumnType::Text,
            };
            seen = Some(match (seen, t) {
                (None, t) => t,
                (Some(a), b) if a == b => a,
                (Some(ColumnType::Integer), ColumnType::Float)
                | (Some(ColumnType::Float), ColumnType::Integer) => ColumnType::Float,
                _ => return ColumnType::Text,
            });
        }
        seen.unwrap_or(ColumnType::Text)
    }

    /// 从 pandas / numpy dtype 名称映射
    pub fn from_dtype(dtype: &str) -> Self {
        let d = dtype.to_lowercase();
        if d.starts_with("int") || d.starts_with("uint") {
            ColumnType::Integer
        } else if d.starts_with("float") || d.starts_with("double") || d.starts_with("decimal") {
            ColumnType::Float
        } else if d.starts_with("bool") {
            ColumnType::Boolean
        } else {
            ColumnType::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
}

/// 行列表格：具名、带类型的列 + 行（每行长度与列数一致）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// 由列名与行构造；不足的单元格补 Null，多余的截断；列类型自动推断
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = names.len();
        let rows: Vec<Vec<Value>> = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, Value::Null);
                r
            })
            .collect();
        let columns = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Column {
                name,
                dtype: ColumnType::infer(rows.iter().map(|r| &r[i])),
            })
            .collect();
        Self { columns, rows }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// 前 n 行的 Markdown 预览
    pub fn to_markdown(&self, max_rows: usize) -> String {
        let header = self.column_names().join(" | ");
        let sep = vec!["---"; self.columns.len()].join(" | ");
        let mut out = format!("| {} |\n| {} |\n", header, sep);
        for row in self.rows.iter().take(max_rows) {
            let cells: Vec<String> = row.iter().map(cell_text).collect();
            out.push_str(&format!("| {} |\n", cells.join(" | ")));
        }
        if self.rows.len() > max_rows {
            out.push_str(&format!("... ({} rows total)\n", self.rows.len()));
        }
        out
    }

    pub fn to_wire(&self) -> Value {
        json!({
            WIRE_KIND_KEY: "table",
            "columns": self.columns,
            "rows": self.rows,
        })
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.replace('|', "\\|"),
        other => other.to_string(),
    }
}

/// 单个步骤的结果（封闭的带标签联合）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StepResult {
    Table(Table),
    Text(String),
    /// 复合结果：嵌套的 map / list / 原始值
    Structured(Value),
    /// 二进制负载，已在边界处规范化为 `data:<mime>;base64,<payload>`
    Binary(String),
}

impl StepResult {
    pub fn kind_name(&self) -> &'static str {
        match self {
            StepResult::Table(_) => "table",
            StepResult::Text(_) => "text",
            StepResult::Structured(_) => "structured",
            StepResult::Binary(_) => "binary",
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            StepResult::Table(t) => Some(t),
            _ => None,
        }
    }

    /// 传入沙箱的表示：表格带类型标记，其余为普通 JSON
    pub fn to_wire(&self) -> Value {
        match self {
            StepResult::Table(t) => t.to_wire(),
            StepResult::Text(s) | StepResult::Binary(s) => Value::String(s.clone()),
            StepResult::Structured(v) => v.clone(),
        }
    }

    /// 供 prompt 使用的简短预览
    pub fn preview(&self, max_rows: usize, max_chars: usize) -> String {
        let text = match self {
            StepResult::Table(t) => format!(
                "table with {} rows, columns {:?}\n{}",
                t.row_count(),
                t.columns.iter().map(|c| format!("{}:{:?}", c.name, c.dtype)).collect::<Vec<_>>(),
                t.to_markdown(max_rows)
            ),
            StepResult::Text(s) => s.clone(),
            StepResult::Structured(v) => v.to_string(),
            StepResult::Binary(uri) => {
                let head = uri.split(',').next().unwrap_or("data:");
                format!("{head},... ({} chars)", uri.len())
            }
        };
        truncate_chars(&text, max_chars)
    }
}

pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

/// 按插入顺序保存的「步骤名 -> 结果」；同名键不可覆盖
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionContext {
    entries: IndexMap<String, StepResult>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, result: StepResult) -> Result<(), AgentError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(AgentError::PlanMalformed(format!(
                "step name '{name}' produced twice in one run"
            )));
        }
        self.entries.insert(name, result);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&StepResult> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StepResult)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<(&String, &StepResult)> {
        self.entries.last()
    }

    /// 整个上下文的沙箱表示：`{name: wire_value}`，保持插入顺序
    pub fn to_wire(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_wire()))
            .collect();
        Value::Object(map)
    }

    /// 供 prompt 使用的上下文预览
    pub fn preview(&self, max_rows: usize, max_chars: usize) -> String {
        if self.entries.is_empty() {
            return "(no previous results)".to_string();
        }
        self.entries
            .iter()
            .map(|(name, r)| {
                format!(
                    "context[\"{}\"] ({}):\n{}",
                    name,
                    r.kind_name(),
                    r.preview(max_rows, max_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// 一次「失败后修正」的记录，仅用于诊断
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionRecord {
    pub step: String,
    pub attempt: u32,
    pub error: String,
    pub failed_script: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionLog {
    records: Vec<CorrectionRecord>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: &str, attempt: u32, error: &str, failed_script: &str) {
        self.records.push(CorrectionRecord {
            step: step.to_string(),
            attempt,
            error: error.to_string(),
            failed_script: failed_script.to_string(),
            at: Utc::now(),
        });
    }

    pub fn records(&self) -> &[CorrectionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn extend(&mut self, other: ExecutionLog) {
        self.records.extend(other.records);
    }
}

/// 单次任务运行；整体重试时创建新的 TaskRun，仅共享原始任务文本
#[derive(Debug, Clone, Serialize)]
pub struct TaskRun {
    pub id: Uuid,
    pub original_task: String,
    pub reasoning: String,
    pub plan: Vec<PlanStep>,
    pub context: ExecutionContext,
    pub final_result: Option<StepResult>,
    pub error: Option<String>,
    pub log: ExecutionLog,
    pub phase: RunPhase,
}

impl TaskRun {
    pub fn new(original_task: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_task: original_task.into(),
            reasoning: String::new(),
            plan: Vec::new(),
            context: ExecutionContext::new(),
            final_result: None,
            error: None,
            log: ExecutionLog::new(),
            phase: RunPhase::Planning,
        }
    }

    /// 所有表格结果的 Markdown 预览
    pub fn table_previews(&self, max_rows: usize) -> String {
        self.context
            .iter()
            .filter_map(|(name, r)| r.as_table().map(|t| format!("### {}\n{}", name, t.to_markdown(max_rows))))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        Table::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec![json!(1), json!(2.5)],
                vec![json!(2), json!(3)],
                vec![json!(3), Value::Null],
            ],
        )
    }

    #[test]
    fn test_column_type_inference() {
        let t = sample_table();
        assert_eq!(t.columns[0].dtype, ColumnType::Integer);
        assert_eq!(t.columns[1].dtype, ColumnType::Float);
        assert_eq!(ColumnType::infer([&json!("x"), &json!(1)]), ColumnType::Text);
        assert_eq!(ColumnType::infer([&json!(true), &Value::Null]), ColumnType::Boolean);
        assert_eq!(ColumnType::from_dtype("int64"), ColumnType::Integer);
        assert_eq!(ColumnType::from_dtype("object"), ColumnType::Text);
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let t = Table::from_rows(vec!["x".into(), "y".into()], vec![vec![json!(1)]]);
        assert_eq!(t.rows[0], vec![json!(1), Value::Null]);
    }

    #[test]
    fn test_context_preserves_insertion_order() {
        let mut ctx = ExecutionContext::new();
        ctx.insert("zeta", StepResult::Text("z".into())).unwrap();
        ctx.insert("alpha", StepResult::Table(sample_table())).unwrap();
        ctx.insert("mid", StepResult::Structured(json!({"k": 1}))).unwrap();
        assert_eq!(ctx.names(), vec!["zeta", "alpha", "mid"]);
        let wire = ctx.to_wire();
        let keys: Vec<&String> = wire.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(wire["alpha"][WIRE_KIND_KEY], "table");
    }

    #[test]
    fn test_context_rejects_duplicate_names() {
        let mut ctx = ExecutionContext::new();
        ctx.insert("data", StepResult::Text("a".into())).unwrap();
        assert!(ctx.insert("data", StepResult::Text("b".into())).is_err());
        assert_eq!(ctx.get("data"), Some(&StepResult::Text("a".into())));
    }

    #[test]
    fn test_markdown_preview_truncates_rows() {
        let md = sample_table().to_markdown(2);
        assert!(md.starts_with("| a | b |"));
        assert!(md.contains("(3 rows total)"));
    }

    #[test]
    fn test_step_result_serializes_with_tag() {
        let v = serde_json::to_value(StepResult::Text("hi".into())).unwrap();
        assert_eq!(v, json!({"type": "text", "value": "hi"}));
    }
}
