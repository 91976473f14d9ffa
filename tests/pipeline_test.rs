//! 端到端集成测试：脚本化的 MockLlmClient + 按脚本文本应答的假沙箱

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bee_analyst::config::AppConfig;
use bee_analyst::core::{AgentBuilder, AgentError, Orchestrator, RunPhase, ScriptFailure, StepResult};
use bee_analyst::llm::{LlmClient, Message, MockLlmClient};
use bee_analyst::sandbox::{CapabilitySet, Scope, ScriptSandbox};
use bee_analyst::submission::Attachment;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 按脚本文本应答：
/// - `good`：返回两列表格
/// - `sum_b`：对 context["t1"] 的第二列求和
/// - `chart`：返回一个二进制 PNG 标记
/// - `scalar`：返回数字
/// - `echo_file`：返回绑定的 `file_name`
/// - 其他：抛出 IOException
struct FakeSandbox {
    runs: Mutex<Vec<String>>,
}

impl FakeSandbox {
    fn new() -> Arc<Self> {
        Arc::new(Self { runs: Mutex::new(Vec::new()) })
    }

    fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptSandbox for FakeSandbox {
    async fn run(&self, script: &str, scope: Scope, _caps: &CapabilitySet) -> Result<Scope, AgentError> {
        self.runs.lock().unwrap().push(script.to_string());
        let result = match script {
            "good" => json!({"__kind__": "table", "columns": ["a", "b"], "rows": [[1, 10], [2, 20]]}),
            "sum_b" => {
                let rows = scope
                    .get("context")
                    .and_then(|c| c.get("t1"))
                    .and_then(|t| t.get("rows"))
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let total: i64 = rows.iter().filter_map(|r| r[1].as_i64()).sum();
                json!(total)
            }
            "chart" => json!({"__kind__": "binary", "mime": "image/png", "base64": "iVBORw0KGgo="}),
            "scalar" => json!(5),
            "echo_file" => scope.get("file_name").cloned().unwrap_or(Value::Null),
            _ => {
                return Err(AgentError::ScriptFailed(
                    ScriptFailure::new("IOException", "No files found that match the pattern")
                        .with_traceback("Traceback (most recent call last): ..."),
                ))
            }
        };
        Ok(scope.bind("result", result))
    }
}

fn code(script: &str) -> String {
    format!("```python\n{script}\n```")
}

/// 按顺序返回预置的成功或失败回复
struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies.into()) })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no reply left".to_string()))
    }
}

const TWO_TABLES: &str = "<html><body>\
<table><tr><th>x</th></tr><tr><td>1</td></tr></table>\
<table><tr><th>b</th></tr><tr><td>2</td></tr><tr><td>3</td></tr></table>\
</body></html>";

async fn serve_page(body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

fn fetch_plan(server: &MockServer) -> String {
    json!({"steps": [{"name": "data", "tool": "fetch",
        "input": {"url": format!("{}/page", server.uri()), "task": "get the table"}}]})
    .to_string()
}

fn orchestrator(
    llm: &Arc<MockLlmClient>,
    sandbox: &Arc<FakeSandbox>,
    max_run_retries: u32,
) -> Orchestrator {
    let mut cfg = AppConfig::default();
    cfg.agent.max_run_retries = max_run_retries;
    AgentBuilder::new(cfg)
        .with_llm(llm.clone())
        .with_sandbox(sandbox.clone())
        .build()
}

#[tokio::test]
async fn test_single_table_fast_path_skips_oracle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/table"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body><table><tr><th>Rank</th><th>Film</th><th>Gross</th></tr>\
             <tr><td>1</td><td>Avatar</td><td>$2,923,706,026</td></tr>\
             <tr><td>2</td><td>Titanic</td><td>$2,257,844,554</td></tr></table></body></html>",
        ))
        .mount(&server)
        .await;

    let plan = json!({"steps": [{"name": "data", "tool": "fetch",
        "input": {"url": format!("{}/table", server.uri()), "task": "get the table"}}]});
    let llm = Arc::new(MockLlmClient::with_responses([plan.to_string()]));
    let sandbox = FakeSandbox::new();

    let run = orchestrator(&llm, &sandbox, 2).run("Which film grossed most?", vec![]).await;

    assert_eq!(run.error, None);
    assert_eq!(run.phase, RunPhase::Success);
    // 只有规划调用了 Oracle
    assert_eq!(llm.call_count(), 1);
    assert!(sandbox.runs().is_empty());
    let table = run.context.get("data").and_then(StepResult::as_table).unwrap();
    assert_eq!(table.column_names(), vec!["Rank", "Film", "Gross"]);
    assert_eq!(table.row_count(), 2);
    assert_eq!(run.final_result.as_ref(), run.context.get("data"));
}

#[tokio::test]
async fn test_query_exhausting_retries_fails_the_run() {
    let plan = json!({"steps": [{"name": "data", "tool": "query",
        "input": {"source": "s3://bucket/x.parquet", "task": "load rows"}}]});
    let llm = Arc::new(MockLlmClient::with_responses([
        plan.to_string(),
        code("broken_1"),
        code("broken_2"),
        code("broken_3"),
    ]));
    let sandbox = FakeSandbox::new();

    let run = orchestrator(&llm, &sandbox, 1).run("count rows", vec![]).await;

    assert_eq!(run.phase, RunPhase::Failed);
    assert!(run.final_result.is_none());
    let error = run.error.unwrap();
    assert!(error.contains("'data' failed after 3 attempts"), "{error}");
    assert!(error.contains("IOException"));
    assert_eq!(sandbox.runs(), vec!["broken_1", "broken_2", "broken_3"]);
    assert_eq!(run.log.len(), 3);
    // 规划 1 次 + 生成 1 次 + 修正 2 次
    assert_eq!(llm.call_count(), 4);
    let prompts = llm.prompts();
    assert!(prompts[2].contains("broken_1"));
    assert!(prompts[2].contains("No files found"));
}

#[tokio::test]
async fn test_analysis_reads_context_and_file_access_is_corrected() {
    let plan = json!({"reasoning": "load then sum", "steps": [
        {"name": "t1", "tool": "query", "input": {"task": "load t1"}},
        {"name": "answer", "tool": "analyze", "input": "sum column b", "depends_on": ["t1"]}
    ]});
    let llm = Arc::new(MockLlmClient::with_responses([
        plan.to_string(),
        code("good"),
        code("df = pd.read_csv('t1.csv')\nresult = df.b.sum()"),
        code("sum_b"),
    ]));
    let sandbox = FakeSandbox::new();

    let run = orchestrator(&llm, &sandbox, 2).run("sum of b", vec![]).await;

    assert_eq!(run.error, None);
    assert_eq!(run.final_result, Some(StepResult::Structured(json!(30))));
    // 文件访问在执行前就被拒绝，沙箱只运行了两次
    assert_eq!(sandbox.runs(), vec!["good", "sum_b"]);
    assert_eq!(run.log.len(), 1);
    assert!(run.log.records()[0].error.contains("read_csv("));
    assert_eq!(run.reasoning, "load then sum");
}

#[tokio::test]
async fn test_missing_attachment_aborts_without_replanning() {
    let plan = json!({"steps": [{"name": "sales", "tool": "extract", "input": "sales.csv"}]});
    let llm = Arc::new(MockLlmClient::with_responses([plan.to_string(), plan.to_string()]));
    let sandbox = FakeSandbox::new();

    let run = orchestrator(&llm, &sandbox, 3).run("total sales", vec![]).await;

    assert_eq!(run.phase, RunPhase::Failed);
    assert!(run.error.unwrap().starts_with("Resolution failed"));
    assert_eq!(llm.call_count(), 1);
    assert!(sandbox.runs().is_empty());
}

#[tokio::test]
async fn test_single_attachment_resolves_by_fallback() {
    let plan = json!({"steps": [{"name": "sales", "tool": "extract",
        "input": {"file": "Quarterly_Sales.CSV", "task": "load it"}}]});
    let llm = Arc::new(MockLlmClient::with_responses([plan.to_string(), code("good")]));
    let sandbox = FakeSandbox::new();

    let run = orchestrator(&llm, &sandbox, 1)
        .run("total sales", vec![Attachment::new("data.csv", "a,b\n1,10\n2,20\n")])
        .await;

    assert_eq!(run.error, None);
    assert!(run.context.get("sales").and_then(StepResult::as_table).is_some());
    // 规划 prompt 中带有附件预览
    assert!(llm.prompts()[0].contains("data.csv"));
}

#[tokio::test]
async fn test_whole_run_retry_starts_from_empty_context() {
    let first = json!({"steps": [
        {"name": "a", "tool": "query", "input": "load a"},
        {"name": "b", "tool": "query", "input": "load b"}
    ]});
    let second = json!({"steps": [{"name": "c", "tool": "query", "input": "load c"}]});
    let llm = Arc::new(MockLlmClient::with_responses([
        first.to_string(),
        code("good"),
        code("bad"),
        code("bad"),
        code("bad"),
        second.to_string(),
        code("good"),
    ]));
    let sandbox = FakeSandbox::new();

    let run = orchestrator(&llm, &sandbox, 2).run("task", vec![]).await;

    assert_eq!(run.error, None);
    assert_eq!(run.context.names(), vec!["c"]);
    assert!(run.log.is_empty());
    assert_eq!(run.plan.len(), 1);
}

#[tokio::test]
async fn test_context_follows_plan_order() {
    let plan = json!({"steps": [
        {"name": "t1", "tool": "query", "input": "load"},
        {"name": "n", "tool": "analyze", "input": "count"},
        {"name": "report", "tool": "summarize", "input": "explain"}
    ]});
    let llm = Arc::new(MockLlmClient::with_responses([
        plan.to_string(),
        code("good"),
        code("scalar"),
        "There are 5 things.".to_string(),
    ]));
    let sandbox = FakeSandbox::new();

    let run = orchestrator(&llm, &sandbox, 1).run("task", vec![]).await;

    assert_eq!(run.error, None);
    assert_eq!(run.context.names(), vec!["t1", "n", "report"]);
    assert_eq!(run.final_result, Some(StepResult::Text("There are 5 things.".into())));
    assert!(run.table_previews(5).contains("| a | b |"));
}

#[tokio::test]
async fn test_unknown_dependency_is_rejected_before_execution() {
    let bad = json!({"steps": [{"name": "x", "tool": "analyze", "input": "plot", "depends_on": ["missing"]}]});
    let good = json!({"steps": [{"name": "x", "tool": "analyze", "input": "plot"}]});
    let llm = Arc::new(MockLlmClient::with_responses([bad.to_string(), good.to_string(), code("chart")]));
    let sandbox = FakeSandbox::new();

    let run = orchestrator(&llm, &sandbox, 1).run("draw a chart", vec![]).await;

    assert_eq!(run.error, None);
    assert_eq!(sandbox.runs(), vec!["chart"]);
    match run.final_result {
        Some(StepResult::Binary(uri)) => assert_eq!(uri, "data:image/png;base64,iVBORw0KGgo="),
        other => panic!("expected a data URI, got {other:?}"),
    }
}

#[tokio::test]
async fn test_multiple_tables_selected_by_one_oracle_call() {
    let server = serve_page(TWO_TABLES).await;
    let llm = Arc::new(MockLlmClient::with_responses([fetch_plan(&server), "The best table is 1.".to_string()]));
    let sandbox = FakeSandbox::new();

    let run = orchestrator(&llm, &sandbox, 1).run("task", vec![]).await;

    assert_eq!(run.error, None);
    assert_eq!(llm.call_count(), 2);
    assert!(llm.prompts()[1].contains("TABLE INDEX 1:"));
    assert!(sandbox.runs().is_empty());
    let table = run.context.get("data").and_then(StepResult::as_table).unwrap();
    assert_eq!(table.column_names(), vec!["b"]);
    assert_eq!(table.row_count(), 2);
}

#[tokio::test]
async fn test_failed_table_selection_falls_back_to_a_script() {
    let server = serve_page(TWO_TABLES).await;
    let llm = ScriptedLlm::new(vec![
        Ok(fetch_plan(&server)),
        Err("error sending request for url (https://api.openai.com/v1/chat/completions)".to_string()),
        Ok(code("good")),
    ]);
    let sandbox = FakeSandbox::new();
    let run = AgentBuilder::new(AppConfig::default())
        .with_llm(llm)
        .with_sandbox(sandbox.clone())
        .build()
        .run("task", vec![])
        .await;

    assert_eq!(run.error, None);
    // 失败回复中的数字不会被当作表格下标
    assert_eq!(sandbox.runs(), vec!["good"]);
    let table = run.context.get("data").and_then(StepResult::as_table).unwrap();
    assert_eq!(table.column_names(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_page_without_tables_generates_a_scraper() {
    let server = serve_page("<html><body><h1>Prices</h1><p>apples 3, pears 4</p></body></html>").await;
    let llm = Arc::new(MockLlmClient::with_responses([fetch_plan(&server), code("good")]));
    let sandbox = FakeSandbox::new();

    let run = orchestrator(&llm, &sandbox, 1).run("task", vec![]).await;

    assert_eq!(run.error, None);
    assert_eq!(sandbox.runs(), vec!["good"]);
    let prompt = &llm.prompts()[1];
    assert!(prompt.contains("No standard table could be taken"));
    assert!(prompt.contains("apples 3, pears 4"));
    assert!(run.context.get("data").and_then(StepResult::as_table).is_some());
}

#[tokio::test]
async fn test_image_attachment_goes_to_vision_without_sandbox() {
    let plan = json!({"steps": [{"name": "chart", "tool": "extract",
        "input": {"file": "chart.png", "task": "read the bar values"}}]});
    let llm = Arc::new(MockLlmClient::with_responses([plan.to_string(), "Bars: 3, 5, 7".to_string()]));
    let sandbox = FakeSandbox::new();

    let run = orchestrator(&llm, &sandbox, 1)
        .run("what do the bars show?", vec![Attachment::new("chart.png", vec![0x89, b'P', b'N', b'G', 0, 1])])
        .await;

    assert_eq!(run.error, None);
    assert!(sandbox.runs().is_empty());
    assert_eq!(llm.call_count(), 2);
    assert!(llm.prompts()[1].contains("[image: data:image/png;base64"));
    assert_eq!(run.final_result, Some(StepResult::Text("Bars: 3, 5, 7".into())));
}

#[tokio::test]
async fn test_attachment_reference_picks_the_matching_file() {
    let plan = json!({"steps": [{"name": "r", "tool": "extract", "input": {"file": "results", "task": "load"}}]});
    let llm = Arc::new(MockLlmClient::with_responses([plan.to_string(), code("echo_file")]));
    let sandbox = FakeSandbox::new();

    let run = orchestrator(&llm, &sandbox, 1)
        .run(
            "task",
            vec![Attachment::new("t.csv", "a\n1\n"), Attachment::new("results.csv", "b\n2\n")],
        )
        .await;

    assert_eq!(run.error, None);
    assert_eq!(run.final_result, Some(StepResult::Text("results.csv".into())));
}
