//! 计划步骤与工具种类

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 固定的工具集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// 抓取网页表格
    Fetch,
    /// 用 DuckDB 查询大型列式 / 远程数据集
    Query,
    /// 从上传的附件中提取表格或文本
    Extract,
    /// 基于已有结果编写分析脚本
    Analyze,
    /// 为非技术读者总结已有结果
    Summarize,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::Fetch,
        ToolKind::Query,
        ToolKind::Extract,
        ToolKind::Analyze,
        ToolKind::Summarize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Fetch => "fetch",
            ToolKind::Query => "query",
            ToolKind::Extract => "extract",
            ToolKind::Analyze => "analyze",
            ToolKind::Summarize => "summarize",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 计划中的一步：名称在计划内唯一，作为 ExecutionContext 的键
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    pub name: String,
    pub tool: ToolKind,
    /// 工具参数：字符串，或 {url, file, query, task} 等字段的对象
    #[serde(default)]
    pub input: Value,
    /// 本步骤读取的先前步骤名
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl PlanStep {
    pub fn new(name: impl Into<String>, tool: ToolKind, input: Value) -> Self {
        Self {
            name: name.into(),
            tool,
            input,
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = names.into_iter().map(Into::into).collect();
        self
    }

    /// 读取输入中的字符串字段；输入本身是字符串时作为 `task` / `query` 字段
    pub fn input_str(&self, key: &str) -> Option<&str> {
        match &self.input {
            Value::String(s) if matches!(key, "task" | "query") => Some(s.as_str()),
            Value::Object(o) => o.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty()),
            _ => None,
        }
    }

    /// 本步骤的任务描述：task > query > 整个输入的 JSON 文本
    pub fn task_text(&self) -> String {
        self.input_str("task")
            .or_else(|| self.input_str("query"))
            .map(String::from)
            .unwrap_or_else(|| self.input.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_kind_parse() {
        assert_eq!(ToolKind::parse("Fetch"), Some(ToolKind::Fetch));
        assert_eq!(ToolKind::parse(" summarize "), Some(ToolKind::Summarize));
        assert_eq!(ToolKind::parse("scrape"), None);
        assert_eq!(serde_json::to_value(ToolKind::Query).unwrap(), json!("query"));
    }

    #[test]
    fn test_input_access() {
        let s = PlanStep::new("d", ToolKind::Fetch, json!({"url": "https://x", "task": "get it"}));
        assert_eq!(s.input_str("url"), Some("https://x"));
        assert_eq!(s.task_text(), "get it");
        let q = PlanStep::new("q", ToolKind::Query, json!("SELECT 1"));
        assert_eq!(q.input_str("query"), Some("SELECT 1"));
        assert_eq!(q.input_str("url"), None);
    }
}
