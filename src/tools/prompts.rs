//! 各工具的脚本生成 prompt 与脚本要求（修正 prompt 复用同一段要求）

use crate::executor::ResultShape;
use crate::sandbox::CapabilitySet;

/// 所有生成 prompt 共用的结尾
fn contract(shape: ResultShape, capabilities: &CapabilitySet) -> String {
    format!(
        r#"Available names (already imported, do not import others):
{caps}

Script rules:
- Top-level statements only; do not wrap the logic in a function or `if __name__ == "__main__"`.
- Assign the final value to a variable named `result`; it must be {shape}.
- Return ONLY the Python code in a single ```python block."#,
        caps = capabilities.describe(),
        shape = shape.describe(),
    )
}

pub const FETCH_INSTRUCTIONS: &str = "- `html` holds the page source and `url` its address; parse with `BeautifulSoup(html, \"html.parser\")`.\n- Return the raw table; do not analyze it.";

pub fn fetch_prompt(
    task: &str,
    step_task: &str,
    url: &str,
    html_snippet: &str,
    readable: &str,
    capabilities: &CapabilitySet,
) -> String {
    format!(
        r#"No standard table could be taken from {url}, so write a scraping script.

FULL TASK:
{task}

WHAT TO EXTRACT:
{step_task}

HTML SNIPPET:
---
{html_snippet}
---

READABLE TEXT:
---
{readable}
---

{instructions}
{contract}"#,
        instructions = FETCH_INSTRUCTIONS,
        contract = contract(ResultShape::Table, capabilities),
    )
}

pub fn table_selection_prompt(task: &str, step_task: &str, previews: &[String]) -> String {
    let mut prompt = format!(
        "I extracted {} tables from a web page. Which table index (0, 1, 2, ...) is the most relevant?\n\nUSER TASK:\n\"{}\"\n\nSTEP:\n\"{}\"\n\nTABLE PREVIEWS:\n---\n",
        previews.len(),
        task.trim(),
        step_task.trim()
    );
    for (i, p) in previews.iter().enumerate() {
        prompt.push_str(&format!("TABLE INDEX {i}:\n{p}\n---\n"));
    }
    prompt.push_str("Return ONLY the integer index of the most relevant table.");
    prompt
}

pub const QUERY_INSTRUCTIONS: &str = "- Use `duckdb` (e.g. `con = duckdb.connect()`; run `INSTALL httpfs; LOAD httpfs;` for s3:// or https:// sources) and fetch the result with `.df()`.\n- `source` holds the dataset location if one was given; earlier results are in `context`.\n- Only retrieve data; no analysis or plotting.";

pub fn query_prompt(
    task: &str,
    step_task: &str,
    source: Option<&str>,
    context_preview: &str,
    capabilities: &CapabilitySet,
) -> String {
    format!(
        r#"You are a data engineer. Write a Python script that retrieves data with DuckDB.

FULL TASK (for paths and schema hints):
---
{task}
---

DATA TO RETRIEVE:
{step_task}

SOURCE:
{source}

EARLIER RESULTS:
{context_preview}

{instructions}
{contract}"#,
        source = source.unwrap_or("(see the task)"),
        instructions = QUERY_INSTRUCTIONS,
        contract = contract(ResultShape::Table, capabilities),
    )
}

pub const EXTRACT_INSTRUCTIONS: &str = "- `file_path` is the local path of the attachment, `file_name` its original name and `file_kind` its detected type.\n- Tabular content (csv, excel sheets, tables in documents) becomes DataFrames; use a dict of name -> DataFrame for several sheets or tables.\n- Free text becomes a str.";

pub fn extract_prompt(
    task: &str,
    step_task: &str,
    file_name: &str,
    file_kind: &str,
    capabilities: &CapabilitySet,
) -> String {
    format!(
        r#"Write a Python script that extracts content from an attached file.

FULL TASK:
{task}

FILE: {file_name} ({file_kind})

WHAT TO EXTRACT:
{step_task}

{instructions}
{contract}"#,
        instructions = EXTRACT_INSTRUCTIONS,
        contract = contract(ResultShape::TablesOrText, capabilities),
    )
}

pub fn vision_prompt(task: &str, step_task: &str) -> String {
    format!(
        "Look at the attached image.\n\nFULL TASK:\n{}\n\nWHAT TO EXTRACT:\n{}\n\nDescribe exactly what is asked; transcribe any tables as markdown.",
        task.trim(),
        step_task.trim()
    )
}

pub const ANALYZE_INSTRUCTIONS: &str = "- `context` is a dict of earlier step results by step name (tables are pandas DataFrames). Read data ONLY from `context`.\n- Do not open files, read paths or URLs, or fetch anything over the network.\n- For charts, build a matplotlib figure and assign the figure (or a `data:image/png;base64,...` string) inside `result`.\n- If the task does not say what form the answer takes, make `result` a list of strings.";

pub fn analyze_prompt(
    task: &str,
    step_task: &str,
    context_preview: &str,
    capabilities: &CapabilitySet,
) -> String {
    format!(
        r#"You are an expert Python data analyst.

FULL TASK:
---
{task}
---

THIS STEP:
{step_task}

CONTEXT (earlier results):
{context_preview}

{instructions}
{contract}"#,
        instructions = ANALYZE_INSTRUCTIONS,
        contract = contract(ResultShape::Any, capabilities),
    )
}

pub fn summarize_prompt(task: &str, step_task: &str, context_preview: &str) -> String {
    format!(
        "Summarize the following findings for a non-technical audience.\n\nORIGINAL TASK:\n{}\n\nFOCUS:\n{}\n\nFINDINGS:\n{}\n",
        task.trim(),
        step_task.trim(),
        context_preview
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::Capability;

    #[test]
    fn test_prompts_carry_contract_and_capabilities() {
        let caps = CapabilitySet::new().with(Capability::Sql);
        let p = query_prompt("task", "rows", Some("s3://bucket/x.parquet"), "(none)", &caps);
        assert!(p.contains("s3://bucket/x.parquet"));
        assert!(p.contains("`duckdb`"));
        assert!(p.contains("must be a pandas DataFrame"));

        let p = table_selection_prompt("t", "s", &["a".into(), "b".into()]);
        assert!(p.contains("TABLE INDEX 1:\nb"));
    }
}
