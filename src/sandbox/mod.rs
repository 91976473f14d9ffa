//! 脚本沙箱：在显式给定的命名绑定（Scope）上执行不可信脚本，返回执行后的 Scope
//!
//! 约定：
//! - 脚本是顶层语句，不能包装成函数（沙箱不会调用任何嵌套的可调用对象）
//! - `result` 是调用方检查的结果槽位；缺失或类型不符由调用方处理
//! - 运行期异常以结构化失败（类型 + 消息 + 堆栈）返回，不吞掉

pub mod capability;
pub mod process;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

pub use capability::{Capability, CapabilitySet};
pub use process::ProcessSandbox;

/// 结果槽位名
pub const RESULT_SLOT: &str = "result";

/// 命名绑定集合（按插入顺序）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    bindings: IndexMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.bindings.keys().map(String::as_str).collect()
    }

    /// 取出结果槽位；`None` 与缺失同样视为「未产生结果」
    pub fn take_result(&mut self) -> Option<Value> {
        match self.bindings.shift_remove(RESULT_SLOT) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        }
    }
}

/// 沙箱 trait：run(script, scope, capabilities) -> 执行后的 scope
#[async_trait]
pub trait ScriptSandbox: Send + Sync {
    async fn run(
        &self,
        script: &str,
        scope: Scope,
        capabilities: &CapabilitySet,
    ) -> Result<Scope, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_take_result_treats_null_as_missing() {
        let mut scope = Scope::new().bind("x", json!(1)).bind(RESULT_SLOT, Value::Null);
        assert_eq!(scope.take_result(), None);
        let mut scope = Scope::new().bind(RESULT_SLOT, json!([1, 2]));
        assert_eq!(scope.take_result(), Some(json!([1, 2])));
        assert!(scope.get(RESULT_SLOT).is_none());
    }

    #[test]
    fn test_scope_serializes_as_plain_object() {
        let scope = Scope::new().bind("b", json!(2)).bind("a", json!(1));
        assert_eq!(serde_json::to_string(&scope).unwrap(), r#"{"b":2,"a":1}"#);
    }
}
