//! 结果契约与规范化
//!
//! 沙箱返回的 `result` 是带 `__kind__` 标记的 JSON；在进入 ExecutionContext 之前，
//! 必须按工具声明的 [`ResultShape`] 收敛为封闭的 [`StepResult`]。
//! 二进制负载一律改写为 `data:<mime>;base64,<payload>`，无法传输的对象（opaque）视为契约违反。

use base64::Engine;
use serde_json::{Map, Value};

use crate::core::{AgentError, ColumnType, StepResult, Table, WIRE_KIND_KEY};

/// 工具对 `result` 的形状要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// 必须是单张表
    Table,
    /// 单张表，或「名称 -> 表」映射（多工作表 / 多表文档）
    TableOrTables,
    /// 单张表、表映射，或纯文本
    TablesOrText,
    /// 任意非空值
    Any,
}

impl ResultShape {
    /// 写入 prompt 的契约描述
    pub fn describe(&self) -> &'static str {
        match self {
            ResultShape::Table => "a pandas DataFrame",
            ResultShape::TableOrTables => {
                "a pandas DataFrame, or a dict mapping names to DataFrames when there are several tables"
            }
            ResultShape::TablesOrText => {
                "a pandas DataFrame (or a dict of name -> DataFrame) for tabular content, or a str for free text"
            }
            ResultShape::Any => {
                "whatever the task asks for (number, string, list, dict, DataFrame, figure); a list of strings if unspecified"
            }
        }
    }

    /// 校验并规范化：成功时返回值一定满足本形状
    pub fn coerce(&self, value: Value) -> Result<StepResult, AgentError> {
        if value.is_null() {
            return Err(AgentError::ContractViolation(
                "no result produced: assign the answer to `result`".to_string(),
            ));
        }
        if let Some(kind) = opaque_type(&value) {
            return Err(AgentError::ContractViolation(format!(
                "result is a `{kind}` object that cannot be returned; convert it to plain values"
            )));
        }

        match self {
            ResultShape::Table => table_from_value(&value)
                .map(StepResult::Table)
                .ok_or_else(|| mismatch(self, &value)),
            ResultShape::TableOrTables => tables(&value).ok_or_else(|| mismatch(self, &value)),
            ResultShape::TablesOrText => match &value {
                Value::String(s) => Ok(StepResult::Text(s.clone())),
                _ => tables(&value).ok_or_else(|| mismatch(self, &value)),
            },
            ResultShape::Any => any(value),
        }
    }
}

fn mismatch(shape: &ResultShape, value: &Value) -> AgentError {
    AgentError::ContractViolation(format!(
        "result must be {}, got {}",
        shape.describe(),
        describe_value(value)
    ))
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(_) => "a bool".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a str".to_string(),
        Value::Array(a) => format!("a list of {} items", a.len()),
        Value::Object(o) => match o.get(WIRE_KIND_KEY).and_then(Value::as_str) {
            Some(kind) => format!("a {kind} value"),
            None => format!("a dict with keys {:?}", o.keys().take(8).collect::<Vec<_>>()),
        },
    }
}

fn marker(value: &Value) -> Option<&str> {
    value.as_object()?.get(WIRE_KIND_KEY)?.as_str()
}

fn opaque_type(value: &Value) -> Option<String> {
    (marker(value) == Some("opaque")).then(|| {
        value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("object")
            .to_string()
    })
}

/// 识别三种表格表示：带标记的表、无标记的 {columns, rows}、记录列表
pub fn table_from_value(value: &Value) -> Option<Table> {
    match value {
        Value::Object(o) if marker(value) == Some("table") || is_plain_table(o) => {
            let mut dtypes = Vec::new();
            let names: Vec<String> = o
                .get("columns")?
                .as_array()?
                .iter()
                .map(|c| match c {
                    Value::String(s) => {
                        dtypes.push(None);
                        Some(s.clone())
                    }
                    Value::Object(col) => {
                        dtypes.push(col.get("dtype").and_then(Value::as_str).map(ColumnType::from_dtype));
                        col.get("name").map(value_to_name)
                    }
                    other => {
                        dtypes.push(None);
                        Some(value_to_name(other))
                    }
                })
                .collect::<Option<_>>()?;
            let rows: Vec<Vec<Value>> = o
                .get("rows")?
                .as_array()?
                .iter()
                .map(|r| r.as_array().cloned())
                .collect::<Option<_>>()?;
            let rows = rows
                .into_iter()
                .map(|r| r.into_iter().map(normalize_nested).collect::<Result<Vec<_>, _>>())
                .collect::<Result<Vec<_>, _>>()
                .ok()?;
            let mut table = Table::from_rows(names, rows);
            // 声明的数值 / 布尔类型优先于推断
            for (col, declared) in table.columns.iter_mut().zip(dtypes) {
                if let Some(t) = declared.filter(|t| *t != ColumnType::Text) {
                    col.dtype = t;
                }
            }
            Some(table)
        }
        Value::Array(items) if !items.is_empty() && items.iter().all(|i| i.is_object() && marker(i).is_none()) => {
            let mut names: Vec<String> = Vec::new();
            for item in items {
                for k in item.as_object()?.keys() {
                    if !names.contains(k) {
                        names.push(k.clone());
                    }
                }
            }
            let rows = items
                .iter()
                .map(|item| {
                    names
                        .iter()
                        .map(|n| normalize_nested(item.get(n).cloned().unwrap_or(Value::Null)))
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()
                .ok()?;
            Some(Table::from_rows(names, rows))
        }
        _ => None,
    }
}

fn is_plain_table(o: &Map<String, Value>) -> bool {
    o.len() == 2
        && o.get("columns").map_or(false, Value::is_array)
        && o.get("rows")
            .and_then(Value::as_array)
            .map_or(false, |rows| rows.iter().all(Value::is_array))
}

fn value_to_name(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn tables(value: &Value) -> Option<StepResult> {
    if let Some(t) = table_from_value(value) {
        return Some(StepResult::Table(t));
    }
    let obj = value.as_object()?;
    if obj.is_empty() || marker(value).is_some() {
        return None;
    }
    let mut out = Map::new();
    for (name, v) in obj {
        out.insert(name.clone(), table_from_value(v)?.to_wire());
    }
    Some(StepResult::Structured(Value::Object(out)))
}

fn any(value: Value) -> Result<StepResult, AgentError> {
    if let Some(t) = table_from_value(&value).filter(|_| !value.is_array()) {
        return Ok(StepResult::Table(t));
    }
    match normalize_nested(value)? {
        Value::String(s) if is_data_uri(&s) => Ok(StepResult::Binary(s)),
        Value::String(s) => Ok(StepResult::Text(s)),
        other => Ok(StepResult::Structured(other)),
    }
}

/// 递归规范化：二进制标记 -> data URI 字符串；opaque -> 契约违反；其余原样保留
pub fn normalize_nested(value: Value) -> Result<Value, AgentError> {
    match marker(&value) {
        Some("binary") => return binary_to_uri(&value).map(Value::String),
        Some("opaque") => {
            return Err(AgentError::ContractViolation(format!(
                "result contains a `{}` object that cannot be returned; convert it to plain values",
                opaque_type(&value).unwrap_or_default()
            )))
        }
        _ => {}
    }
    match value {
        Value::Array(items) => Ok(Value::Array(
            items.into_iter().map(normalize_nested).collect::<Result<_, _>>()?,
        )),
        Value::Object(map) => Ok(Value::Object(
            map.into_iter()
                .map(|(k, v)| normalize_nested(v).map(|v| (k, v)))
                .collect::<Result<_, _>>()?,
        )),
        other => Ok(other),
    }
}

fn binary_to_uri(value: &Value) -> Result<String, AgentError> {
    let mime = value
        .get("mime")
        .and_then(Value::as_str)
        .unwrap_or("application/octet-stream");
    let payload = value.get("base64").and_then(Value::as_str).unwrap_or_default();
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| AgentError::ContractViolation(format!("binary result is not valid base64: {e}")))?;
    Ok(format!("data:{mime};base64,{payload}"))
}

/// 编码原始字节为 data URI
pub fn bytes_to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

pub fn is_data_uri(s: &str) -> bool {
    s.starts_with("data:") && s.contains(";base64,")
}
