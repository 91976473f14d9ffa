//! 从 HTML 中提取 `<table>`：表头取首行（含 `<th>` 或位于 `<thead>` 时），
//! 单元格去标签、解实体、合并空白；数值单元格（允许千分位逗号）转为数字；colspan 展开。

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Number, Value};

use crate::core::Table;

static TABLE_TAG_RE: OnceLock<Regex> = OnceLock::new();
static ROW_RE: OnceLock<Regex> = OnceLock::new();
static CELL_RE: OnceLock<Regex> = OnceLock::new();
static TAG_RE: OnceLock<Regex> = OnceLock::new();
static COLSPAN_RE: OnceLock<Regex> = OnceLock::new();
static NUMBER_RE: OnceLock<Regex> = OnceLock::new();

/// 页面中所有含数据行的顶层表格（按出现顺序）；嵌套表格并入所在单元格的文本
pub fn extract_tables(html: &str) -> Vec<Table> {
    top_level_tables(html)
        .into_iter()
        .filter_map(|(_, inner)| parse_table(&flatten_nested(&html[inner])))
        .collect()
}

/// 按深度配对 `<table>` / `</table>`，返回顶层表格的（整体范围，内容范围）；未闭合的表格延伸到文末
fn top_level_tables(html: &str) -> Vec<(Range<usize>, Range<usize>)> {
    let tag_re = TABLE_TAG_RE.get_or_init(|| Regex::new(r"(?i)<(/?)table\b[^>]*>").unwrap());
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<(usize, usize)> = None;
    for tag in tag_re.captures_iter(html) {
        let Some(whole) = tag.get(0) else {
            continue;
        };
        let closing = tag.get(1).map_or(false, |m| !m.as_str().is_empty());
        if !closing {
            if depth == 0 {
                open = Some((whole.start(), whole.end()));
            }
            depth += 1;
        } else if depth > 0 {
            depth -= 1;
            if depth == 0 {
                if let Some((start, content)) = open.take() {
                    spans.push((start..whole.end(), content..whole.start()));
                }
            }
        }
    }
    if let Some((start, content)) = open {
        spans.push((start..html.len(), content..html.len()));
    }
    spans
}

/// 把内容中的嵌套表格替换为其纯文本
fn flatten_nested(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut pos = 0;
    for (outer, _) in top_level_tables(inner) {
        out.push_str(&inner[pos..outer.start]);
        out.push(' ');
        out.push_str(&cell_text(&inner[outer.clone()]));
        out.push(' ');
        pos = outer.end;
    }
    out.push_str(&inner[pos..]);
    out
}

fn parse_table(inner: &str) -> Option<Table> {
    let row_re = ROW_RE.get_or_init(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").unwrap());
    let cell_re = CELL_RE.get_or_init(|| Regex::new(r"(?is)<(td|th)\b([^>]*)>(.*?)</(?:td|th)>").unwrap());
    let colspan_re = COLSPAN_RE.get_or_init(|| Regex::new(r#"(?i)colspan\s*=\s*["']?(\d+)"#).unwrap());

    let thead_end = inner.to_lowercase().find("</thead>");
    let mut header: Option<Vec<String>> = None;
    let mut rows: Vec<Vec<Value>> = Vec::new();

    for row in row_re.captures_iter(inner) {
        let (Some(whole), Some(body)) = (row.get(0), row.get(1)) else {
            continue;
        };
        let mut cells: Vec<String> = Vec::new();
        let mut all_th = true;
        for cell in cell_re.captures_iter(body.as_str()) {
            let tag = cell.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
            all_th &= tag == "th";
            let span = cell
                .get(2)
                .and_then(|a| colspan_re.captures(a.as_str()))
                .and_then(|c| c.get(1))
                .and_then(|n| n.as_str().parse::<usize>().ok())
                .unwrap_or(1)
                .clamp(1, 64);
            let text = cell_text(cell.get(3).map(|m| m.as_str()).unwrap_or_default());
            cells.extend(std::iter::repeat(text).take(span));
        }
        if cells.is_empty() {
            continue;
        }
        let in_thead = thead_end.map_or(false, |end| whole.start() < end);
        if header.is_none() && rows.is_empty() && (all_th || in_thead) {
            header = Some(cells);
        } else {
            rows.push(cells.into_iter().map(typed_cell).collect());
        }
    }

    if rows.is_empty() {
        return None;
    }
    let width = rows
        .iter()
        .map(Vec::len)
        .chain(header.iter().map(Vec::len))
        .max()
        .unwrap_or(0);
    let mut names = header.unwrap_or_default();
    for (i, name) in names.iter_mut().enumerate() {
        if name.is_empty() {
            *name = format!("col_{i}");
        }
    }
    for i in names.len()..width {
        names.push(format!("col_{i}"));
    }
    dedupe(&mut names);
    Some(Table::from_rows(names, rows))
}

/// 重复列名追加 `_2`、`_3`…，原名保持不变
fn dedupe(names: &mut [String]) {
    for i in 1..names.len() {
        let base = names[i].clone();
        let mut n = 1;
        while names[..i].contains(&names[i]) {
            n += 1;
            names[i] = format!("{base}_{n}");
        }
    }
}

fn cell_text(raw: &str) -> String {
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap());
    let text = tag_re.replace_all(raw, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn typed_cell(text: String) -> Value {
    let number_re = NUMBER_RE.get_or_init(|| Regex::new(r"^-?\d{1,3}(,\d{3})+(\.\d+)?$|^-?\d+(\.\d+)?$").unwrap());
    if text.is_empty() {
        return Value::Null;
    }
    if number_re.is_match(&text) {
        let plain = text.replace(',', "");
        if let Ok(i) = plain.parse::<i64>() {
            return Value::Number(i.into());
        }
        if let Some(n) = plain.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnType;
    use serde_json::json;

    const PAGE: &str = r#"
<html><body>
<table class="wikitable">
  <thead><tr><th>Rank</th><th>Film</th><th>Gross</th></tr></thead>
  <tbody>
    <tr><td>1</td><td><a href="/a">Avatar</a></td><td>$2,923,706,026</td></tr>
    <tr><td>2</td><td>Avengers: Endgame&nbsp;</td><td>2,797,501,328</td></tr>
  </tbody>
</table>
<table><tr><td>only</td><td>cells</td></tr></table>
<table><tr><th>empty</th></tr></table>
</body></html>"#;

    #[test]
    fn test_extracts_data_tables() {
        let tables = extract_tables(PAGE);
        assert_eq!(tables.len(), 2);
        let t = &tables[0];
        assert_eq!(t.column_names(), vec!["Rank", "Film", "Gross"]);
        assert_eq!(t.rows[0], vec![json!(1), json!("Avatar"), json!("$2,923,706,026")]);
        assert_eq!(t.rows[1][2], json!(2797501328i64));
        assert_eq!(t.columns[0].dtype, ColumnType::Integer);
        assert_eq!(tables[1].column_names(), vec!["col_0", "col_1"]);
    }

    #[test]
    fn test_colspan_and_duplicate_headers() {
        let html = r#"<table><tr><th>a</th><th>a</th></tr><tr><td colspan="2">x</td></tr></table>"#;
        let t = &extract_tables(html)[0];
        assert_eq!(t.column_names(), vec!["a", "a_2"]);
        assert_eq!(t.rows[0], vec![json!("x"), json!("x")]);
    }

    #[test]
    fn test_numeric_duplicate_headers_keep_their_text() {
        let html = "<table><tr><th>2019</th><th>2019</th><th>2019</th></tr><tr><td>1</td><td>2</td><td>3</td></tr></table>";
        let t = &extract_tables(html)[0];
        assert_eq!(t.column_names(), vec!["2019", "2019_2", "2019_3"]);
    }

    #[test]
    fn test_nested_table_stays_inside_its_cell() {
        let html = r#"<table>
<tr><th>k</th><th>v</th></tr>
<tr><td>A</td><td>x<table><tr><td>inner</td><td>9</td></tr></table></td></tr>
<tr><td>B</td><td>y</td></tr>
<tr><td>C</td><td>z</td></tr>
</table>
<table><tr><td>second</td></tr></table>"#;
        let tables = extract_tables(html);
        assert_eq!(tables.len(), 2);
        let t = &tables[0];
        assert_eq!(t.column_names(), vec!["k", "v"]);
        assert_eq!(t.row_count(), 3);
        assert_eq!(t.rows[0], vec![json!("A"), json!("x inner 9")]);
        assert_eq!(t.rows[2], vec![json!("C"), json!("z")]);
    }

    #[test]
    fn test_no_tables() {
        assert!(extract_tables("<p>nothing</p>").is_empty());
    }
}
