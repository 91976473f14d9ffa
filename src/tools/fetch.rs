//! fetch：抓取网页中的表格
//!
//! 1. GET 页面（超时、浏览器 UA、可选域名白名单）
//! 2. 只找到一张表：直接返回，不调用 Oracle
//! 3. 多张表：一次 Oracle 调用选出下标（回复中的第一个整数）
//! 4. 没有表或下标无效：生成抓取脚本，进入自修正循环

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

use crate::config::FetchSection;
use crate::core::{AgentError, ExecutionLog, StepResult, Table};
use crate::executor::{InitialScript, ResultShape, ScriptJob, StepExecutor};
use crate::llm::Oracle;
use crate::plan::ToolKind;
use crate::sandbox::{CapabilitySet, Scope};
use crate::tools::html_table::extract_tables;
use crate::tools::{prompts, PreviewLimits, ToolAdapter, ToolCall};

static INDEX_RE: OnceLock<Regex> = OnceLock::new();

pub struct FetchTool {
    client: Client,
    executor: Arc<StepExecutor>,
    capabilities: CapabilitySet,
    allowed_domains: HashSet<String>,
    max_html_chars: usize,
    preview: PreviewLimits,
}

/// 从 URL 中提取 host（小写，不含端口）
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    Some(host.to_lowercase())
}

/// html2text 失败时的回退：去标签并合并空白
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

impl FetchTool {
    pub fn new(
        executor: Arc<StepExecutor>,
        capabilities: CapabilitySet,
        cfg: &FetchSection,
        preview: PreviewLimits,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(cfg.user_agent.as_str())
            .default_headers({
                use reqwest::header::{HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
                let mut h = reqwest::header::HeaderMap::new();
                h.insert(
                    ACCEPT,
                    HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                );
                h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
                h
            })
            .build()
            .unwrap_or_default();
        Self {
            client,
            executor,
            capabilities,
            allowed_domains: cfg.allowed_domains.iter().map(|d| d.to_lowercase()).collect(),
            max_html_chars: cfg.max_html_chars,
            preview,
        }
    }

    fn is_allowed(&self, url: &str) -> Result<(), AgentError> {
        let domain = extract_domain(url).ok_or_else(|| AgentError::Fetch(format!("invalid URL '{url}'")))?;
        if self.allowed_domains.is_empty() || self.allowed_domains.contains(&domain) {
            return Ok(());
        }
        Err(AgentError::Fetch(format!("domain not in allowlist: {domain}")))
    }

    async fn get(&self, url: &str) -> Result<String, AgentError> {
        self.is_allowed(url)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AgentError::Fetch(format!("request to {url} failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(AgentError::Fetch(format!("{url} returned HTTP {}", resp.status())));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| AgentError::Fetch(format!("reading body of {url}: {e}")))?;
        Ok(body.trim_start_matches('\u{FEFF}').to_string())
    }

    fn readable_text(&self, html: &str) -> String {
        let text = match html2text::from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        };
        truncate(&text, self.max_html_chars)
    }

    /// 多表时请 Oracle 选择；Oracle 失败或回复无效返回 None
    async fn select_table(&self, task: &str, step_task: &str, tables: &[Table]) -> Option<usize> {
        let previews: Vec<String> = tables.iter().map(|t| t.to_markdown(self.preview.rows)).collect();
        let reply = self
            .executor
            .oracle()
            .generate(&prompts::table_selection_prompt(task, step_task, &previews))
            .await;
        if Oracle::is_failure(&reply) {
            return None;
        }
        let re = INDEX_RE.get_or_init(|| Regex::new(r"\d+").unwrap());
        let index = re.find(&reply)?.as_str().parse::<usize>().ok()?;
        (index < tables.len()).then_some(index)
    }
}

#[async_trait]
impl ToolAdapter for FetchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Fetch
    }

    async fn invoke(&self, call: ToolCall<'_>, log: &mut ExecutionLog) -> Result<StepResult, AgentError> {
        let step = call.step;
        let url = step
            .input_str("url")
            .ok_or_else(|| AgentError::PlanMalformed(format!("fetch step '{}' has no url", step.name)))?;
        let step_task = step.task_text();
        tracing::info!(step = %step.name, url = %url, "fetching page");

        let html = self.get(url).await?;
        let mut tables = extract_tables(&html);
        tracing::info!(step = %step.name, tables = tables.len(), "tables found");

        match tables.len() {
            1 => return Ok(StepResult::Table(tables.remove(0))),
            n if n > 1 => {
                if let Some(i) = self.select_table(call.task, &step_task, &tables).await {
                    tracing::info!(step = %step.name, index = i, "table selected");
                    return Ok(StepResult::Table(tables.swap_remove(i)));
                }
                tracing::warn!(step = %step.name, "table selection unusable, generating a scraper");
            }
            _ => {}
        }

        let snippet = truncate(&html, self.max_html_chars);
        let prompt = prompts::fetch_prompt(
            call.task,
            &step_task,
            url,
            &snippet,
            &self.readable_text(&html),
            &self.capabilities,
        );
        let job = ScriptJob::new(&step.name, &step_task, ResultShape::Table, InitialScript::Generate(prompt))
            .scope(
                Scope::new()
                    .bind("html", html.clone().into())
                    .bind("url", url.into()),
            )
            .capabilities(self.capabilities.clone())
            .data_preview(format!("page {url}, {} chars of HTML in `html`", html.len()))
            .instructions(prompts::FETCH_INSTRUCTIONS);
        self.executor.execute(&job, log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_allowlist() {
        assert_eq!(extract_domain("https://En.Wikipedia.org:443/wiki/X"), Some("en.wikipedia.org".into()));
        assert_eq!(extract_domain("ftp://x"), None);
        assert_eq!(strip_html_tags("<p>a</p><b>b</b>"), "a b");
    }
}
