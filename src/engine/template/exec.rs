//! 语法树求值

use serde_json::Value;

use super::funcs;
use super::lexer::template_error;
use super::parser::{Command, Node, Operand, Pipeline};
use crate::errors::Result;

/// 顶层打印缺失值时的输出
pub const NO_VALUE: &str = "<no value>";

const MAX_DEPTH: usize = 100;

pub struct Executor<'a> {
    root: &'a Value,
    out: String,
    depth: usize,
}

impl<'a> Executor<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self {
            root,
            out: String::new(),
            depth: 0,
        }
    }

    pub fn run(mut self, nodes: &[Node]) -> Result<String> {
        self.walk(nodes, self.root)?;
        Ok(self.out)
    }

    fn walk(&mut self, nodes: &[Node], dot: &Value) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(template_error(0, "exceeded maximum template depth"));
        }
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action(pipe) => {
                    let value = self.eval_pipeline(pipe, dot)?;
                    match value {
                        Value::Null => self.out.push_str(NO_VALUE),
                        other => self.out.push_str(&funcs::display(&other)),
                    }
                }
                Node::If {
                    branches,
                    else_body,
                } => {
                    let mut taken = false;
                    for (cond, body) in branches {
                        if funcs::truthy(&self.eval_pipeline(cond, dot)?) {
                            self.walk(body, dot)?;
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        self.walk(else_body, dot)?;
                    }
                }
                Node::With {
                    pipe,
                    body,
                    else_body,
                } => {
                    let value = self.eval_pipeline(pipe, dot)?;
                    if funcs::truthy(&value) {
                        self.walk(body, &value)?;
                    } else {
                        self.walk(else_body, dot)?;
                    }
                }
                Node::Range {
                    pipe,
                    body,
                    else_body,
                } => {
                    let value = self.eval_pipeline(pipe, dot)?;
                    match &value {
                        Value::Array(items) if !items.is_empty() => {
                            for item in items {
                                self.walk(body, item)?;
                            }
                        }
                        Value::Object(map) if !map.is_empty() => {
                            let mut keys: Vec<&String> = map.keys().collect();
                            keys.sort();
                            for key in keys {
                                self.walk(body, &map[key])?;
                            }
                        }
                        Value::Array(_) | Value::Object(_) | Value::Null => {
                            self.walk(else_body, dot)?;
                        }
                        other => {
                            return Err(template_error(
                                pipe.line,
                                format!("range can't iterate over {}", funcs::display(other)),
                            ));
                        }
                    }
                }
            }
        }
        self.depth -= 1;
        Ok(())
    }

    fn eval_pipeline(&self, pipe: &Pipeline, dot: &Value) -> Result<Value> {
        let mut piped: Option<Value> = None;
        for command in &pipe.commands {
            piped = Some(self.eval_command(command, dot, piped.take(), pipe.line)?);
        }
        Ok(piped.unwrap_or(Value::Null))
    }

    fn eval_command(
        &self,
        command: &Command,
        dot: &Value,
        piped: Option<Value>,
        line: usize,
    ) -> Result<Value> {
        let (first, rest) = command
            .args
            .split_first()
            .ok_or_else(|| template_error(line, "empty command"))?;

        if let Operand::Func(name) = first {
            let mut args = Vec::with_capacity(rest.len() + 1);
            for arg in rest {
                args.push(self.eval_operand(arg, dot, line)?);
            }
            if let Some(value) = piped {
                args.push(value);
            }
            return funcs::call(name, args)
                .map_err(|e| template_error(line, format!("error calling {}: {}", name, e)));
        }

        if !rest.is_empty() || piped.is_some() {
            return Err(template_error(
                line,
                "can't give argument to non-function",
            ));
        }
        self.eval_operand(first, dot, line)
    }

    fn eval_operand(&self, operand: &Operand, dot: &Value, line: usize) -> Result<Value> {
        match operand {
            Operand::Field(chain) => lookup(dot, chain, line),
            Operand::Root(chain) => lookup(self.root, chain, line),
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Func(name) => funcs::call(name, Vec::new())
                .map_err(|e| template_error(line, format!("error calling {}: {}", name, e))),
            Operand::Sub(pipe, chain) => {
                let value = self.eval_pipeline(pipe, dot)?;
                lookup(&value, chain, line)
            }
        }
    }
}

/// 字段查找：先精确匹配，再尝试 snake_case；null 上取字段仍为 null
fn lookup(value: &Value, chain: &[String], line: usize) -> Result<Value> {
    let mut current = value;
    for key in chain {
        match current {
            Value::Object(map) => {
                let found = map.get(key).or_else(|| map.get(&to_snake_case(key)));
                match found {
                    Some(next) => current = next,
                    None => return Ok(Value::Null),
                }
            }
            Value::Null => return Ok(Value::Null),
            other => {
                return Err(template_error(
                    line,
                    format!(
                        "can't evaluate field {} in type {}",
                        key,
                        match other {
                            Value::Bool(_) => "bool",
                            Value::Number(_) => "number",
                            Value::String(_) => "string",
                            _ => "array",
                        }
                    ),
                ));
            }
        }
    }
    Ok(current.clone())
}

/// `FirstSeen` -> `first_seen`，`IssueID` -> `issue_id`
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("FirstSeen"), "first_seen");
        assert_eq!(to_snake_case("IssueID"), "issue_id");
        assert_eq!(to_snake_case("HTTPStatus"), "http_status");
        assert_eq!(to_snake_case("message"), "message");
        assert_eq!(to_snake_case("RiskScore"), "risk_score");
    }
}
