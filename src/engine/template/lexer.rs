//! 模板词法分析
//!
//! 先把源文本切成文本段与 `{{ }}` 动作段（处理 trim 标记与注释），
//! 再把每个动作段切成 token。

use crate::errors::{EngineError, Result};

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";

/// 切分后的源文本片段
#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    Text(String),
    Action { tokens: Vec<Token>, line: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 前面是否有空白；`(...).Field` 依赖它区分链式取值
    pub spaced: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // 关键字
    If,
    Else,
    End,
    Range,
    With,

    Identifier,
    /// `.A.B`，text 为去掉首个点之后的 `A.B`
    Field,
    /// 单独的 `.`
    Dot,
    /// `$` 或 `$.A.B`，text 为字段链
    Root,
    Str,
    Number,
    Bool,
    Nil,

    Pipe,
    LeftParen,
    RightParen,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::If => "if",
            Self::Else => "else",
            Self::End => "end",
            Self::Range => "range",
            Self::With => "with",
            Self::Identifier => "identifier",
            Self::Field => "field",
            Self::Dot => "dot",
            Self::Root => "variable",
            Self::Str => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Nil => "nil",
            Self::Pipe => "|",
            Self::LeftParen => "(",
            Self::RightParen => ")",
        };
        write!(f, "{}", s)
    }
}

pub(crate) fn template_error(line: usize, message: impl std::fmt::Display) -> EngineError {
    EngineError::template(format!("template: action:{}: {}", line, message))
}

fn is_trim_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// 把源文本切成片段
pub fn split(src: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = src;
    let mut line = 1;
    let mut trim_next_text = false;

    while !rest.is_empty() {
        let Some(start) = rest.find(LEFT_DELIM) else {
            push_text(&mut segments, rest, trim_next_text, false);
            break;
        };

        let text = &rest[..start];
        let after_delim = &rest[start + LEFT_DELIM.len()..];
        let trim_left = after_delim.starts_with('-')
            && after_delim[1..].chars().next().is_some_and(is_trim_space);
        push_text(&mut segments, text, trim_next_text, trim_left);
        line += text.matches('\n').count();

        let body_start = if trim_left { 1 } else { 0 };
        let end = find_action_end(&after_delim[body_start..])
            .ok_or_else(|| template_error(line, "unclosed action"))?;
        let raw = &after_delim[body_start..body_start + end];

        let (raw, trim_right) = match raw.strip_suffix('-') {
            Some(stripped) if stripped.ends_with(is_trim_space) => (stripped, true),
            _ => (raw, false),
        };
        trim_next_text = trim_right;

        let content = raw.trim_matches(is_trim_space);
        if content.starts_with("/*") {
            if !content.ends_with("*/") || content.len() < 4 {
                return Err(template_error(line, "unclosed comment"));
            }
        } else {
            let tokens = Lexer::new(content, line).tokenize()?;
            if tokens.is_empty() {
                return Err(template_error(line, "missing value for command"));
            }
            segments.push(Segment::Action { tokens, line });
        }

        line += raw.matches('\n').count();
        let consumed = start + LEFT_DELIM.len() + body_start + end + RIGHT_DELIM.len();
        rest = &rest[consumed..];
    }

    Ok(segments)
}

fn push_text(segments: &mut Vec<Segment>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start_matches(is_trim_space);
    }
    if trim_end {
        text = text.trim_end_matches(is_trim_space);
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
}

/// 找到动作结束的 `}}`，跳过字符串字面量里的内容
fn find_action_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// 单个动作内部的词法分析器
struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    fn new(input: &str, line: usize) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line,
        }
    }

    fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let spaced = self.skip_whitespace();
            let Some(ch) = self.peek() else {
                break;
            };
            let (kind, text) = self.next_token(ch)?;
            tokens.push(Token { kind, text, spaced });
        }
        Ok(tokens)
    }

    fn next_token(&mut self, ch: char) -> Result<(TokenKind, String)> {
        match ch {
            '|' => {
                self.pos += 1;
                Ok((TokenKind::Pipe, "|".into()))
            }
            '(' => {
                self.pos += 1;
                Ok((TokenKind::LeftParen, "(".into()))
            }
            ')' => {
                self.pos += 1;
                Ok((TokenKind::RightParen, ")".into()))
            }
            '"' => self.read_quoted(),
            '`' => self.read_raw(),
            '.' => {
                if self.peek_at(1).is_some_and(is_ident_start) {
                    Ok((TokenKind::Field, self.read_field_chain()))
                } else if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                    self.read_number()
                } else {
                    self.pos += 1;
                    Ok((TokenKind::Dot, ".".into()))
                }
            }
            '$' => {
                self.pos += 1;
                if self.peek().is_some_and(is_ident_start) {
                    let name = self.read_identifier();
                    return Err(template_error(
                        self.line,
                        format!("undefined variable \"${}\"", name),
                    ));
                }
                let chain = if self.peek() == Some('.') && self.peek_at(1).is_some_and(is_ident_start) {
                    self.read_field_chain()
                } else {
                    String::new()
                };
                Ok((TokenKind::Root, chain))
            }
            c if c.is_ascii_digit() => self.read_number(),
            '-' | '+' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit() || c == '.') => {
                self.read_number()
            }
            c if is_ident_start(c) => {
                let word = self.read_identifier();
                let kind = match word.as_str() {
                    "if" => TokenKind::If,
                    "else" => TokenKind::Else,
                    "end" => TokenKind::End,
                    "range" => TokenKind::Range,
                    "with" => TokenKind::With,
                    "true" | "false" => TokenKind::Bool,
                    "nil" => TokenKind::Nil,
                    _ => TokenKind::Identifier,
                };
                Ok((kind, word))
            }
            ':' if self.peek_at(1) == Some('=') => Err(template_error(
                self.line,
                "variable declarations are not supported",
            )),
            _ => Err(template_error(
                self.line,
                format!("unexpected {:?} in command", ch),
            )),
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        word
    }

    /// `.A.B.C` -> `A.B.C`
    fn read_field_chain(&mut self) -> String {
        let mut parts = Vec::new();
        while self.peek() == Some('.') && self.peek_at(1).is_some_and(is_ident_start) {
            self.pos += 1;
            parts.push(self.read_identifier());
        }
        parts.join(".")
    }

    fn read_number(&mut self) -> Result<(TokenKind, String)> {
        let mut text = String::new();
        if let Some(sign @ ('-' | '+')) = self.peek() {
            text.push(sign);
            self.pos += 1;
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '_' {
                text.push(c);
                self.pos += 1;
            } else if (c == '-' || c == '+') && text.ends_with(['e', 'E']) {
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if text.replace('_', "").parse::<f64>().is_err() {
            return Err(template_error(self.line, format!("bad number syntax: {:?}", text)));
        }
        Ok((TokenKind::Number, text))
    }

    fn read_raw(&mut self) -> Result<(TokenKind, String)> {
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.peek() {
                Some('`') => {
                    self.pos += 1;
                    return Ok((TokenKind::Str, text));
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
                None => return Err(template_error(self.line, "unterminated raw quoted string")),
            }
        }
    }

    fn read_quoted(&mut self) -> Result<(TokenKind, String)> {
        self.pos += 1;
        let mut text = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(template_error(self.line, "unterminated quoted string"));
            };
            self.pos += 1;
            match c {
                '"' => return Ok((TokenKind::Str, text)),
                '\\' => text.push(self.read_escape()?),
                _ => text.push(c),
            }
        }
    }

    fn read_escape(&mut self) -> Result<char> {
        let Some(c) = self.peek() else {
            return Err(template_error(self.line, "unterminated quoted string"));
        };
        self.pos += 1;
        let decoded = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\u{07}',
            'b' => '\u{08}',
            'f' => '\u{0C}',
            'v' => '\u{0B}',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            'x' => self.read_hex_escape(2)?,
            'u' => self.read_hex_escape(4)?,
            'U' => self.read_hex_escape(8)?,
            other => {
                return Err(template_error(
                    self.line,
                    format!("invalid escape sequence \\{}", other),
                ));
            }
        };
        Ok(decoded)
    }

    fn read_hex_escape(&mut self, digits: usize) -> Result<char> {
        let end = self.pos + digits;
        if end > self.input.len() {
            return Err(template_error(self.line, "invalid escape sequence"));
        }
        let hex: String = self.input[self.pos..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| template_error(self.line, format!("invalid escape sequence {}", hex)))
    }

    /// 跳过空白，返回是否跳过了内容
    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(segment: &Segment) -> Vec<TokenKind> {
        match segment {
            Segment::Action { tokens, .. } => tokens.iter().map(|t| t.kind.clone()).collect(),
            Segment::Text(_) => Vec::new(),
        }
    }

    #[test]
    fn test_split_text_and_actions() {
        let segments = split("Hello {{ .Name }}!").unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Segment::Text("Hello ".into()));
        assert_eq!(kinds(&segments[1]), vec![TokenKind::Field]);
        assert_eq!(segments[2], Segment::Text("!".into()));
    }

    #[test]
    fn test_trim_markers() {
        let segments = split("a  \n {{- .X -}} \n b").unwrap();
        assert_eq!(segments[0], Segment::Text("a".into()));
        assert_eq!(segments[2], Segment::Text("b".into()));
    }

    #[test]
    fn test_negative_number_is_not_trim() {
        let segments = split("{{-3}}").unwrap();
        match &segments[0] {
            Segment::Action { tokens, .. } => {
                assert_eq!(tokens[0].kind, TokenKind::Number);
                assert_eq!(tokens[0].text, "-3");
            }
            other => panic!("unexpected segment {:?}", other),
        }
    }

    #[test]
    fn test_comment_is_dropped() {
        let segments = split("x{{/* note */}}y").unwrap();
        assert_eq!(
            segments,
            vec![Segment::Text("x".into()), Segment::Text("y".into())]
        );
    }

    #[test]
    fn test_delimiter_inside_string() {
        let segments = split(r#"{{ print "}}" }}"#).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(kinds(&segments[0]), vec![TokenKind::Identifier, TokenKind::Str]);
    }

    #[test]
    fn test_unclosed_action() {
        let err = split("Hello {{ .Name").unwrap_err();
        assert!(err.message().contains("unclosed action"));
    }

    #[test]
    fn test_field_chain_and_root() {
        let segments = split("{{ $.A.B }}{{ .C.D }}").unwrap();
        match (&segments[0], &segments[1]) {
            (Segment::Action { tokens: a, .. }, Segment::Action { tokens: b, .. }) => {
                assert_eq!(a[0].kind, TokenKind::Root);
                assert_eq!(a[0].text, "A.B");
                assert_eq!(b[0].kind, TokenKind::Field);
                assert_eq!(b[0].text, "C.D");
            }
            other => panic!("unexpected segments {:?}", other),
        }
    }

    #[test]
    fn test_string_escapes() {
        let segments = split(r#"{{ "a\"b\né" }}"#).unwrap();
        match &segments[0] {
            Segment::Action { tokens, .. } => assert_eq!(tokens[0].text, "a\"b\né"),
            other => panic!("unexpected segment {:?}", other),
        }
    }
}
