//! 递归下降解析：片段 -> 语法树

use serde_json::{Number, Value};

use super::funcs;
use super::lexer::{Segment, Token, TokenKind, split, template_error};
use crate::errors::Result;

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Text(String),
    Action(Pipeline),
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        else_body: Vec<Node>,
    },
    Range {
        pipe: Pipeline,
        body: Vec<Node>,
        else_body: Vec<Node>,
    },
    With {
        pipe: Pipeline,
        body: Vec<Node>,
        else_body: Vec<Node>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub args: Vec<Operand>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// 相对当前 `.` 的字段链，空链即 `.` 本身
    Field(Vec<String>),
    /// 相对根上下文 `$` 的字段链
    Root(Vec<String>),
    Func(String),
    Literal(Value),
    /// `( pipeline ).Field`
    Sub(Box<Pipeline>, Vec<String>),
}

/// 解析停在哪个控制动作上
enum Stop {
    Eof,
    End,
    Else { tokens: Vec<Token>, line: usize },
}

pub struct Parser {
    segments: Vec<Segment>,
    pos: usize,
}

impl Parser {
    pub fn parse(src: &str) -> Result<Vec<Node>> {
        let mut parser = Self {
            segments: split(src)?,
            pos: 0,
        };
        let (nodes, stop) = parser.parse_list()?;
        match stop {
            Stop::Eof => Ok(nodes),
            Stop::End => Err(template_error(parser.current_line(), "unexpected {{end}}")),
            Stop::Else { line, .. } => Err(template_error(line, "unexpected {{else}}")),
        }
    }

    fn current_line(&self) -> usize {
        self.segments[..self.pos.min(self.segments.len())]
            .iter()
            .rev()
            .find_map(|s| match s {
                Segment::Action { line, .. } => Some(*line),
                Segment::Text(_) => None,
            })
            .unwrap_or(1)
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, Stop)> {
        let mut nodes = Vec::new();
        while self.pos < self.segments.len() {
            let segment = self.segments[self.pos].clone();
            self.pos += 1;
            match segment {
                Segment::Text(text) => nodes.push(Node::Text(text)),
                Segment::Action { tokens, line } => match tokens[0].kind {
                    TokenKind::End => {
                        if tokens.len() > 1 {
                            return Err(template_error(line, "unexpected token after end"));
                        }
                        return Ok((nodes, Stop::End));
                    }
                    TokenKind::Else => {
                        return Ok((
                            nodes,
                            Stop::Else {
                                tokens: tokens[1..].to_vec(),
                                line,
                            },
                        ));
                    }
                    TokenKind::If => nodes.push(self.parse_if(&tokens[1..], line)?),
                    TokenKind::Range => {
                        let pipe = parse_pipeline(&tokens[1..], line, "range")?;
                        let (body, else_body) = self.parse_block_tail("range", line)?;
                        nodes.push(Node::Range {
                            pipe,
                            body,
                            else_body,
                        });
                    }
                    TokenKind::With => {
                        let pipe = parse_pipeline(&tokens[1..], line, "with")?;
                        let (body, else_body) = self.parse_block_tail("with", line)?;
                        nodes.push(Node::With {
                            pipe,
                            body,
                            else_body,
                        });
                    }
                    _ => nodes.push(Node::Action(parse_pipeline(&tokens, line, "command")?)),
                },
            }
        }
        Ok((nodes, Stop::Eof))
    }

    fn parse_if(&mut self, cond: &[Token], line: usize) -> Result<Node> {
        let mut branches = vec![(parse_pipeline(cond, line, "if")?, Vec::new())];
        loop {
            let (body, stop) = self.parse_list()?;
            if let Some(last) = branches.last_mut() {
                last.1 = body;
            }
            match stop {
                Stop::End => {
                    return Ok(Node::If {
                        branches,
                        else_body: Vec::new(),
                    });
                }
                Stop::Eof => return Err(template_error(line, "unexpected EOF: unclosed if")),
                Stop::Else { tokens, line } => {
                    if tokens.first().is_some_and(|t| t.kind == TokenKind::If) {
                        branches.push((parse_pipeline(&tokens[1..], line, "if")?, Vec::new()));
                        continue;
                    }
                    if !tokens.is_empty() {
                        return Err(template_error(line, "unexpected token after else"));
                    }
                    let (else_body, stop) = self.parse_list()?;
                    return match stop {
                        Stop::End => Ok(Node::If {
                            branches,
                            else_body,
                        }),
                        Stop::Else { line, .. } => {
                            Err(template_error(line, "expected end; found {{else}}"))
                        }
                        Stop::Eof => Err(template_error(line, "unexpected EOF: unclosed if")),
                    };
                }
            }
        }
    }

    /// range / with 的主体和可选 else
    fn parse_block_tail(&mut self, keyword: &str, line: usize) -> Result<(Vec<Node>, Vec<Node>)> {
        let (body, stop) = self.parse_list()?;
        match stop {
            Stop::End => Ok((body, Vec::new())),
            Stop::Eof => Err(template_error(
                line,
                format!("unexpected EOF: unclosed {}", keyword),
            )),
            Stop::Else { tokens, line } => {
                if !tokens.is_empty() {
                    return Err(template_error(line, "unexpected token after else"));
                }
                let (else_body, stop) = self.parse_list()?;
                match stop {
                    Stop::End => Ok((body, else_body)),
                    Stop::Else { line, .. } => {
                        Err(template_error(line, "expected end; found {{else}}"))
                    }
                    Stop::Eof => Err(template_error(
                        line,
                        format!("unexpected EOF: unclosed {}", keyword),
                    )),
                }
            }
        }
    }
}

fn parse_pipeline(tokens: &[Token], line: usize, context: &str) -> Result<Pipeline> {
    if tokens.is_empty() {
        return Err(template_error(line, format!("missing value for {}", context)));
    }
    let mut parser = PipeParser {
        tokens,
        pos: 0,
        line,
    };
    let pipe = parser.pipeline()?;
    if parser.pos < tokens.len() {
        return Err(template_error(
            line,
            format!("unexpected {} in operand", tokens[parser.pos].kind),
        ));
    }
    Ok(pipe)
}

/// 动作内部 token 的解析器
struct PipeParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
}

impl PipeParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// 解析到 `)` 或结尾为止
    fn pipeline(&mut self) -> Result<Pipeline> {
        let mut commands = Vec::new();
        loop {
            commands.push(self.command()?);
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Pipe) => self.pos += 1,
                _ => break,
            }
        }
        Ok(Pipeline {
            commands,
            line: self.line,
        })
    }

    fn command(&mut self) -> Result<Command> {
        let mut args = Vec::new();
        while let Some(token) = self.peek() {
            if matches!(token.kind, TokenKind::Pipe | TokenKind::RightParen) {
                break;
            }
            args.push(self.operand()?);
        }
        if args.is_empty() {
            return Err(template_error(self.line, "missing value for command"));
        }
        Ok(Command { args })
    }

    fn operand(&mut self) -> Result<Operand> {
        let Some(token) = self.peek().cloned() else {
            return Err(template_error(self.line, "missing value for command"));
        };
        self.pos += 1;
        let operand = match token.kind {
            TokenKind::Field => Operand::Field(split_chain(&token.text)),
            TokenKind::Dot => Operand::Field(Vec::new()),
            TokenKind::Root => Operand::Root(split_chain(&token.text)),
            TokenKind::Identifier => {
                if !funcs::is_defined(&token.text) {
                    return Err(template_error(
                        self.line,
                        format!("function {:?} not defined", token.text),
                    ));
                }
                Operand::Func(token.text)
            }
            TokenKind::Str => Operand::Literal(Value::String(token.text)),
            TokenKind::Bool => Operand::Literal(Value::Bool(token.text == "true")),
            TokenKind::Nil => Operand::Literal(Value::Null),
            TokenKind::Number => Operand::Literal(parse_number(&token.text, self.line)?),
            TokenKind::LeftParen => {
                let inner = self.pipeline()?;
                match self.peek() {
                    Some(t) if t.kind == TokenKind::RightParen => self.pos += 1,
                    _ => return Err(template_error(self.line, "unclosed left paren")),
                }
                let chain = match self.peek() {
                    Some(t) if t.kind == TokenKind::Field && !t.spaced => {
                        let chain = split_chain(&t.text);
                        self.pos += 1;
                        chain
                    }
                    _ => Vec::new(),
                };
                Operand::Sub(Box::new(inner), chain)
            }
            other => {
                return Err(template_error(
                    self.line,
                    format!("unexpected {} in operand", other),
                ));
            }
        };
        Ok(operand)
    }
}

fn split_chain(text: &str) -> Vec<String> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('.').map(str::to_string).collect()
    }
}

fn parse_number(text: &str, line: usize) -> Result<Value> {
    let clean = text.replace('_', "");
    if let Ok(i) = clean.parse::<i64>() {
        return Ok(Value::Number(i.into()));
    }
    clean
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| template_error(line, format!("bad number syntax: {:?}", text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pipeline_with_function() {
        let nodes = Parser::parse(r#"{{ .Name | default "x" }}"#).unwrap();
        match &nodes[0] {
            Node::Action(pipe) => {
                assert_eq!(pipe.commands.len(), 2);
                assert_eq!(pipe.commands[0].args, vec![Operand::Field(vec!["Name".into()])]);
                assert_eq!(pipe.commands[1].args[0], Operand::Func("default".into()));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_else_chain() {
        let nodes = Parser::parse("{{if .A}}a{{else if .B}}b{{else}}c{{end}}").unwrap();
        match &nodes[0] {
            Node::If {
                branches,
                else_body,
            } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(else_body, &vec![Node::Text("c".into())]);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_unknown_function() {
        let err = Parser::parse("{{ nope .A }}").unwrap_err();
        assert!(err.message().contains("function \"nope\" not defined"));
    }

    #[test]
    fn test_unbalanced_blocks() {
        assert!(Parser::parse("{{if .A}}x").is_err());
        assert!(Parser::parse("x{{end}}").is_err());
        assert!(Parser::parse("{{range .Items}}{{else}}{{else}}{{end}}").is_err());
        assert!(Parser::parse("{{ (len .A }}").is_err());
    }

    #[test]
    fn test_paren_field_chain() {
        let nodes = Parser::parse("{{ (index .Items 0).Name }}").unwrap();
        match &nodes[0] {
            Node::Action(pipe) => match &pipe.commands[0].args[0] {
                Operand::Sub(_, chain) => assert_eq!(chain, &vec!["Name".to_string()]),
                other => panic!("unexpected operand {:?}", other),
            },
            other => panic!("unexpected node {:?}", other),
        }
    }
}
