//! 能力集：授予某次脚本执行的库能力（显式枚举，通过参数传入沙箱，不使用全局注入）

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 单项能力；每项对应沙箱 prelude 中的一组绑定
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// 表格运算：pd、np
    Tabular,
    /// 列式数据查询：duckdb
    Sql,
    /// HTML 解析：BeautifulSoup
    Html,
    /// 绘图：plt、sns
    Plotting,
    /// 统计：stats、LinearRegression
    Stats,
    /// 文档解析：pypdf / PyPDF2 / openpyxl / docx
    Documents,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Tabular => "tabular",
            Capability::Sql => "sql",
            Capability::Html => "html",
            Capability::Plotting => "plotting",
            Capability::Stats => "stats",
            Capability::Documents => "documents",
        }
    }

    /// 供 prompt 使用：脚本中可直接使用的名字
    pub fn bindings(&self) -> &'static str {
        match self {
            Capability::Tabular => "`pd` (pandas), `np` (numpy)",
            Capability::Sql => "`duckdb`",
            Capability::Html => "`BeautifulSoup` (bs4)",
            Capability::Plotting => "`plt` (matplotlib.pyplot, Agg backend), `sns` (seaborn, if installed)",
            Capability::Stats => "`stats` (scipy.stats), `LinearRegression` (sklearn, if installed)",
            Capability::Documents => "`pypdf` / `PyPDF2`, `openpyxl`, `docx` (whichever are installed)",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 始终可用的标准库绑定
pub const BASE_BINDINGS: &str = "`re`, `json`, `math`, `io`, `base64`";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    caps: BTreeSet<Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, cap: Capability) -> Self {
        self.caps.insert(cap);
        self
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.caps.contains(&cap)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.caps.iter().copied()
    }

    /// 传给子进程的编码：逗号分隔
    pub fn to_env_value(&self) -> String {
        self.caps.iter().map(Capability::as_str).collect::<Vec<_>>().join(",")
    }

    /// prompt 中「可用库」一段
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("- always: {}", BASE_BINDINGS)];
        lines.extend(self.caps.iter().map(|c| format!("- {}: {}", c, c.bindings())));
        lines.join("\n")
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            caps: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = &'a Capability>>(iter: I) -> Self {
        iter.into_iter().copied().collect()
    }
}
