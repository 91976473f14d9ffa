//! 从 Oracle 回复中提取脚本正文

use regex::Regex;
use std::sync::OnceLock;

static FENCE_RE: OnceLock<Regex> = OnceLock::new();

/// 取第一个 ```python / ``` 代码块；没有代码块时返回去除首尾空白的原文
pub fn extract_code(response: &str) -> String {
    let re = FENCE_RE.get_or_init(|| Regex::new(r"(?s)```(?:python|py)?[ \t]*\r?\n(.*?)```").unwrap());
    match re.captures(response).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim_end().to_string(),
        None => response.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_fence() {
        let r = "Here you go:\n```python\nresult = 1\n```\nthanks";
        assert_eq!(extract_code(r), "result = 1");
    }

    #[test]
    fn test_bare_fence_and_first_block_wins() {
        let r = "```\nresult = 2\n```\n```python\nresult = 3\n```";
        assert_eq!(extract_code(r), "result = 2");
    }

    #[test]
    fn test_no_fence_is_trimmed_text() {
        assert_eq!(extract_code("  result = 4\n"), "result = 4");
    }
}
