//! Planner：任务文本 -> 有序的命名步骤列表
//!
//! Oracle 输出 JSON（```json 代码块或裸 JSON）；解析失败或校验失败时把错误原因写回 prompt 重试，
//! 最多 `max_attempts` 次。校验包括：非空、工具名合法、名称唯一（缺省补 `step_<i>`）、
//! depends_on 只能引用更早的步骤。

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::core::{AgentError, TaskRun};
use crate::llm::Oracle;
use crate::plan::{plan_schema_json, PlanStep, ToolKind};

const TOOL_GUIDE: &str = r#"- fetch: scrape a table from a web page. input: {"url": "...", "task": "what to pull from the page"}
- query: query a large remote/columnar dataset (parquet, S3, CSV paths) with DuckDB. input: {"query": "what rows/columns to retrieve", "source": "path or URL if known"}
- extract: pull tables or text out of an attached file (csv, excel, json, pdf, image, ...). input: {"file": "attachment name", "task": "what to extract"}
- analyze: compute answers from earlier results (available as context["<step name>"]); never loads files or URLs. input: {"task": "questions to answer and answer format"}
- summarize: explain earlier results for a non-technical reader. input: {"task": "what to summarize"}"#;

pub struct Planner {
    oracle: Arc<Oracle>,
    max_attempts: u32,
}

impl Planner {
    pub fn new(oracle: Arc<Oracle>, max_attempts: u32) -> Self {
        Self {
            oracle,
            max_attempts: max_attempts.max(1),
        }
    }

    /// 为 run 生成计划：成功时写入 run.plan；run.reasoning 始终保存最后一次 Oracle 原始输出
    pub async fn plan(&self, run: &mut TaskRun, attachments: &str) -> Result<(), AgentError> {
        let base = planning_prompt(&run.original_task, attachments);
        let mut feedback: Option<String> = None;
        let mut last_err = AgentError::PlanMalformed("planner was not called".to_string());

        for attempt in 1..=self.max_attempts {
            let prompt = match &feedback {
                Some(f) => format!(
                    "{base}\n\nYour previous answer was rejected: {f}\nReturn the corrected plan as JSON only."
                ),
                None => base.clone(),
            };
            let raw = self.oracle.generate(&prompt).await;
            run.reasoning = raw.trim().to_string();

            let parsed = if Oracle::is_failure(&raw) {
                Err(AgentError::OracleUnusable(raw.trim().to_string()))
            } else {
                parse_plan(&raw)
            };
            match parsed {
                Ok((reasoning, steps)) => {
                    if !reasoning.is_empty() {
                        run.reasoning = reasoning;
                    }
                    tracing::info!(attempt, steps = steps.len(), "plan accepted");
                    run.plan = steps;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "plan rejected");
                    feedback = Some(e.to_string());
                    last_err = e;
                }
            }
        }

        Err(match last_err {
            AgentError::PlanMalformed(m) => AgentError::PlanMalformed(m),
            other => AgentError::PlanMalformed(other.to_string()),
        })
    }
}

fn planning_prompt(task: &str, attachments: &str) -> String {
    format!(
        r#"You plan data analysis tasks as a short sequence of tool calls.

TASK:
"""
{task}
"""

ATTACHED FILES:
{attachments}

TOOLS:
{tools}

RULES:
- Steps run strictly in order; a later step can read any earlier step's result by its name.
- Every step needs a unique snake_case "name".
- List the names a step reads in "depends_on"; only earlier steps may be listed.
- Retrieve data first (fetch / query / extract), then analyze. The last step's result is the final answer.

Answer with JSON matching this schema:
```json
{schema}
```"#,
        task = task.trim(),
        attachments = attachments,
        tools = TOOL_GUIDE,
        schema = plan_schema_json(),
    )
}

/// 从 Oracle 输出中取出 JSON 片段：```json 代码块优先，其次第一个 `{` / `[` 到最后一个 `}` / `]`
fn extract_json(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```json") {
        let rest = &raw[start + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }
    let start = raw.find(|c: char| c == '{' || c == '[')?;
    let close = if raw[start..].starts_with('{') { '}' } else { ']' };
    let end = raw.rfind(close)?;
    (end > start).then(|| &raw[start..=end])
}

/// 解析并校验计划，返回 (思路文本, 步骤)
pub fn parse_plan(raw: &str) -> Result<(String, Vec<PlanStep>), AgentError> {
    let json = extract_json(raw)
        .ok_or_else(|| AgentError::PlanMalformed("no JSON plan found in the response".to_string()))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| AgentError::PlanMalformed(format!("plan is not valid JSON: {e}")))?;

    let (reasoning, steps) = match value {
        Value::Array(steps) => (String::new(), steps),
        Value::Object(mut obj) => {
            let reasoning = obj
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            let steps = match obj.remove("steps").or_else(|| obj.remove("plan")) {
                Some(Value::Array(steps)) => steps,
                _ => {
                    return Err(AgentError::PlanMalformed(
                        "required key \"steps\" (a list) is missing".to_string(),
                    ))
                }
            };
            (reasoning, steps)
        }
        _ => return Err(AgentError::PlanMalformed("plan must be a JSON object or list".to_string())),
    };

    Ok((reasoning, validate_steps(steps)?))
}

/// 步骤校验；错误信息会原样作为反馈写回下一次规划 prompt
pub fn validate_steps(raw_steps: Vec<Value>) -> Result<Vec<PlanStep>, AgentError> {
    if raw_steps.is_empty() {
        return Err(AgentError::PlanMalformed("plan has no steps".to_string()));
    }
    let mut seen: HashSet<String> = HashSet::new();
    let mut steps = Vec::with_capacity(raw_steps.len());

    for (i, raw) in raw_steps.into_iter().enumerate() {
        let Value::Object(mut obj) = raw else {
            return Err(AgentError::PlanMalformed(format!("step {} is not an object", i + 1)));
        };
        let tool_name = obj.get("tool").and_then(Value::as_str).unwrap_or_default().to_string();
        let tool = ToolKind::parse(&tool_name).ok_or_else(|| {
            AgentError::PlanMalformed(format!(
                "step {} uses unknown tool '{}'; expected one of {}",
                i + 1,
                tool_name,
                ToolKind::ALL.map(|k| k.as_str()).join(", ")
            ))
        })?;
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("step_{}", i + 1));
        if seen.contains(&name) {
            return Err(AgentError::PlanMalformed(format!("duplicate step name '{name}'")));
        }

        let depends_on: Vec<String> = match obj.remove("depends_on") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(String::from).collect(),
            Some(Value::String(s)) => vec![s],
            _ => Vec::new(),
        };
        if let Some(missing) = depends_on.iter().find(|d| !seen.contains(*d)) {
            return Err(AgentError::PlanMalformed(format!(
                "step '{name}' depends on '{missing}', which is not produced by an earlier step"
            )));
        }

        let input = normalize_input(tool, obj.remove("input").unwrap_or(Value::Null));
        if tool == ToolKind::Fetch && input.get("url").and_then(Value::as_str).is_none() {
            return Err(AgentError::PlanMalformed(format!("fetch step '{name}' needs input.url")));
        }

        seen.insert(name.clone());
        steps.push(PlanStep {
            name,
            tool,
            input,
            depends_on,
        });
    }
    Ok(steps)
}

/// 字符串输入按工具改写为对象形式
fn normalize_input(tool: ToolKind, input: Value) -> Value {
    let Value::String(s) = input else {
        return input;
    };
    let key = match tool {
        ToolKind::Fetch if s.trim_start().starts_with("http") => "url",
        ToolKind::Extract => "file",
        ToolKind::Query => "query",
        _ => "task",
    };
    let mut m = Map::new();
    m.insert(key.to_string(), Value::String(s));
    Value::Object(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_plan() {
        let raw = r#"Thinking...
```json
{"reasoning": "scrape then analyze",
 "steps": [
   {"name": "data", "tool": "fetch", "input": {"url": "https://example.com/t", "task": "get table"}},
   {"tool": "analyze", "input": "sum b", "depends_on": ["data"]}
 ]}
```"#;
        let (reasoning, steps) = parse_plan(raw).unwrap();
        assert_eq!(reasoning, "scrape then analyze");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].name, "step_2");
        assert_eq!(steps[1].input, json!({"task": "sum b"}));
        assert_eq!(steps[1].depends_on, vec!["data"]);
    }

    #[test]
    fn test_bare_list_is_accepted() {
        let raw = r#"[{"name": "a", "tool": "summarize", "input": "explain"}]"#;
        let (_, steps) = parse_plan(raw).unwrap();
        assert_eq!(steps[0].tool, ToolKind::Summarize);
    }

    #[test]
    fn test_rejections() {
        let dup = json!([{"name": "a", "tool": "analyze"}, {"name": "a", "tool": "analyze"}]);
        assert!(validate_steps(dup.as_array().unwrap().clone()).is_err());

        let unknown = json!([{"name": "a", "tool": "visualize"}]);
        let err = validate_steps(unknown.as_array().unwrap().clone()).unwrap_err();
        assert!(err.to_string().contains("unknown tool 'visualize'"));

        let forward = json!([
            {"name": "a", "tool": "analyze", "depends_on": ["b"]},
            {"name": "b", "tool": "analyze"}
        ]);
        let err = validate_steps(forward.as_array().unwrap().clone()).unwrap_err();
        assert!(err.to_string().contains("depends on 'b'"));

        assert!(validate_steps(vec![]).is_err());
        assert!(parse_plan("no json here").is_err());
        assert!(parse_plan(r#"{"reasoning": "x"}"#).is_err());
    }

    #[tokio::test]
    async fn test_planner_retries_with_feedback() {
        let llm = Arc::new(MockLlmClient::with_responses([
            "I will just do it.",
            r#"{"reasoning": "r", "steps": [{"name": "s", "tool": "analyze", "input": "x"}]}"#,
        ]));
        let planner = Planner::new(Arc::new(Oracle::new(llm.clone(), 5)), 3);
        let mut run = TaskRun::new("task");
        planner.plan(&mut run, "(no attachments)").await.unwrap();
        assert_eq!(run.plan.len(), 1);
        assert_eq!(run.reasoning, "r");
        let prompts = llm.prompts();
        assert!(prompts[1].contains("previous answer was rejected"));
    }

    #[tokio::test]
    async fn test_planner_gives_up_after_budget() {
        let llm = Arc::new(MockLlmClient::with_responses(["nope", "nope", "nope", "nope"]));
        let planner = Planner::new(Arc::new(Oracle::new(llm.clone(), 5)), 3);
        let mut run = TaskRun::new("task");
        let err = planner.plan(&mut run, "").await.unwrap_err();
        assert!(matches!(err, AgentError::PlanMalformed(_)));
        assert_eq!(llm.call_count(), 3);
        assert_eq!(run.reasoning, "nope");
    }
}
