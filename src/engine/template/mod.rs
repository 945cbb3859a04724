//! 动作模板渲染
//!
//! 兼容 Go `text/template` 的一个子集，对 JSON 上下文求值：
//! - `{{ .A.B }}`、`{{ . }}`、`{{ $.A }}` 取值，字段名可写成 `FirstSeen` 匹配 `first_seen`
//! - 字符串 / 数字 / 布尔 / nil 字面量、函数调用、括号子管道与 `|` 管道
//! - `if` / `else if` / `else`、`range`、`with` 以及 `{{-` `-}}` 与 `{{/* */}}`
//!
//! 顶层打印缺失的键输出 `<no value>`。

mod exec;
mod funcs;
mod lexer;
mod parser;

use serde_json::Value;

use crate::errors::Result;

pub use exec::{NO_VALUE, to_snake_case};
pub use funcs::{ssf_event_type, truncate};

/// 解析后的模板，可对不同上下文重复渲染
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<parser::Node>,
}

impl Template {
    pub fn parse(src: &str) -> Result<Self> {
        Ok(Self {
            nodes: parser::Parser::parse(src)?,
        })
    }

    pub fn render(&self, context: &Value) -> Result<String> {
        exec::Executor::new(context).run(&self.nodes)
    }
}

/// 解析并渲染；空模板直接返回空串
pub fn render(src: &str, context: &Value) -> Result<String> {
    if src.is_empty() {
        return Ok(String::new());
    }
    Template::parse(src)?.render(context)
}
