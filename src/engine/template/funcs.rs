//! 模板函数
//!
//! 内建函数与动作模板专用函数（default、jsonescape、marshal、truncate、ssf_event_type）。
//! 值的字符串形式与 Go 的 `%v` 保持一致：null 为 `<nil>`，数组为 `[a b]`，对象为 `map[k:v]`。

use serde_json::Value;

const RISC_PREFIX: &str = "https://schemas.openid.net/secevent/risc/event-type/";
const CAEP_PREFIX: &str = "https://schemas.openid.net/secevent/caep/event-type/";

const FUNCTIONS: &[&str] = &[
    "default",
    "jsonescape",
    "marshal",
    "truncate",
    "ssf_event_type",
    "len",
    "index",
    "eq",
    "ne",
    "lt",
    "le",
    "gt",
    "ge",
    "and",
    "or",
    "not",
    "print",
    "printf",
    "urlquery",
    "lower",
    "upper",
];

pub fn is_defined(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

type FuncResult = std::result::Result<Value, String>;

/// 调用函数；错误信息由调用方补上行号
pub fn call(name: &str, args: Vec<Value>) -> FuncResult {
    match name {
        "default" => {
            let [def, value] = exact::<2>(args)?;
            Ok(Value::String(default_of(&def, &value)))
        }
        "jsonescape" => {
            let [value] = exact::<1>(args)?;
            Ok(Value::String(json_escape(&value)))
        }
        "marshal" => {
            let [value] = exact::<1>(args)?;
            Ok(Value::String(marshal(&value)))
        }
        "truncate" => {
            let [length, value] = exact::<2>(args)?;
            let length = as_int(&length)?;
            Ok(Value::String(truncate(length, &display(&value))))
        }
        "ssf_event_type" => {
            let [issue_type] = exact::<1>(args)?;
            Ok(Value::String(ssf_event_type(&display(&issue_type))))
        }
        "len" => {
            let [value] = exact::<1>(args)?;
            length_of(&value).map(|n| Value::from(n as i64))
        }
        "index" => index(args),
        "eq" => {
            if args.len() < 2 {
                return Err("missing argument for comparison".to_string());
            }
            let (first, rest) = args.split_at(1);
            for other in rest {
                if basic_eq(&first[0], other)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "ne" => {
            let [a, b] = exact::<2>(args)?;
            Ok(Value::Bool(!basic_eq(&a, &b)?))
        }
        "lt" | "le" | "gt" | "ge" => {
            let [a, b] = exact::<2>(args)?;
            let ordering = compare(&a, &b)?;
            let result = match name {
                "lt" => ordering.is_lt(),
                "le" => ordering.is_le(),
                "gt" => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        "and" => {
            if args.is_empty() {
                return Err("wrong number of args for and: want at least 1 got 0".to_string());
            }
            let mut last = Value::Null;
            for arg in args {
                if !truthy(&arg) {
                    return Ok(arg);
                }
                last = arg;
            }
            Ok(last)
        }
        "or" => {
            if args.is_empty() {
                return Err("wrong number of args for or: want at least 1 got 0".to_string());
            }
            let mut last = Value::Null;
            for arg in args {
                if truthy(&arg) {
                    return Ok(arg);
                }
                last = arg;
            }
            Ok(last)
        }
        "not" => {
            let [value] = exact::<1>(args)?;
            Ok(Value::Bool(!truthy(&value)))
        }
        "print" => Ok(Value::String(sprint(&args))),
        "printf" => {
            let Some((format, rest)) = args.split_first() else {
                return Err("wrong number of args for printf: want at least 1 got 0".to_string());
            };
            let Value::String(format) = format else {
                return Err("printf format must be a string".to_string());
            };
            Ok(Value::String(sprintf(format, rest)))
        }
        "urlquery" => {
            let joined = sprint(&args);
            Ok(Value::String(
                url::form_urlencoded::byte_serialize(joined.as_bytes()).collect(),
            ))
        }
        "lower" => {
            let [value] = exact::<1>(args)?;
            Ok(Value::String(display(&value).to_lowercase()))
        }
        "upper" => {
            let [value] = exact::<1>(args)?;
            Ok(Value::String(display(&value).to_uppercase()))
        }
        other => Err(format!("function {:?} not defined", other)),
    }
}

fn exact<const N: usize>(args: Vec<Value>) -> std::result::Result<[Value; N], String> {
    let got = args.len();
    args.try_into()
        .map_err(|_| format!("wrong number of args: want {} got {}", N, got))
}

fn as_int(value: &Value) -> std::result::Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| format!("expected integer; found {}", n)),
        other => Err(format!("expected integer; found {}", display(other))),
    }
}

/// Go 模板的真值判断
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// `%v` 形式
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => "<nil>".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(display).collect();
            format!("[{}]", parts.join(" "))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", k, display(&map[k])))
                .collect();
            format!("map[{}]", parts.join(" "))
        }
    }
}

fn format_number(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => format!("{}", f),
        None => n.to_string(),
    }
}

fn default_of(def: &Value, value: &Value) -> String {
    if value.is_null() {
        return display(def);
    }
    let s = display(value);
    if s.is_empty() || s == "<nil>" {
        display(def)
    } else {
        s
    }
}

/// 与 Go 的 json.Marshal 一致，转义 HTML 敏感字符
fn html_escape_json(json: String) -> String {
    if !json.contains(['<', '>', '&', '\u{2028}', '\u{2029}']) {
        return json;
    }
    let mut out = String::with_capacity(json.len() + 16);
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out
}

fn json_escape(value: &Value) -> String {
    if value.is_null() {
        return String::new();
    }
    let quoted = serde_json::to_string(&display(value)).unwrap_or_default();
    let escaped = html_escape_json(quoted);
    if escaped.len() >= 2 {
        escaped[1..escaped.len() - 1].to_string()
    } else {
        escaped
    }
}

fn marshal(value: &Value) -> String {
    html_escape_json(serde_json::to_string(value).unwrap_or_default())
}

/// 按字符截断，长度大于 3 时以 `...` 结尾
pub fn truncate(length: i64, s: &str) -> String {
    let length = length.max(0) as usize;
    if s.chars().count() <= length {
        return s.to_string();
    }
    if length > 3 {
        let head: String = s.chars().take(length - 3).collect();
        format!("{}...", head)
    } else {
        s.chars().take(length).collect()
    }
}

/// 问题类型到 RISC / CAEP 事件类型的映射
pub fn ssf_event_type(issue_type: &str) -> String {
    let event = match issue_type.to_lowercase().as_str() {
        "compromised user"
        | "compromised password"
        | "suspected ad brute-force attack"
        | "suspected identity brute-force attack"
        | "suspected ad golden ticket attack"
        | "suspected ad pass-the-ticket attack"
        | "suspected directory/idp bot attack" => return format!("{}account-compromised", RISC_PREFIX),
        "weak password"
        | "password hash length"
        | "password salt"
        | "md4 related issues"
        | "md5 related issues"
        | "sha-1 related issues" => return format!("{}credential-change-required", RISC_PREFIX),
        "shadow access" | "shadow identity systems" | "unused identities" => {
            return format!("{}account-disabled", RISC_PREFIX);
        }
        "lack of mfa" | "assets with no mfa configured" => "assurance-level-change",
        "exposed assets" | "shadow assets" | "repeated ad login attempts from invalid device" => {
            "device-compliance-change"
        }
        _ => "session-revoked",
    };
    format!("{}{}", CAEP_PREFIX, event)
}

fn length_of(value: &Value) -> std::result::Result<usize, String> {
    match value {
        Value::String(s) => Ok(s.len()),
        Value::Array(a) => Ok(a.len()),
        Value::Object(o) => Ok(o.len()),
        Value::Null => Err("len of nil pointer".to_string()),
        other => Err(format!("len of type {}", type_name(other))),
    }
}

fn index(args: Vec<Value>) -> FuncResult {
    let mut iter = args.into_iter();
    let Some(mut item) = iter.next() else {
        return Err("wrong number of args for index: want at least 1 got 0".to_string());
    };
    for key in iter {
        item = match (&item, &key) {
            (Value::Array(items), Value::Number(_)) => {
                let i = as_int(&key)?;
                if i < 0 || i as usize >= items.len() {
                    return Err(format!("index out of range: {}", i));
                }
                items[i as usize].clone()
            }
            (Value::Object(map), Value::String(k)) => map.get(k).cloned().unwrap_or(Value::Null),
            (Value::Null, _) => return Err("index of untyped nil".to_string()),
            (other, _) => {
                return Err(format!(
                    "can't index item of type {} with {}",
                    type_name(other),
                    type_name(&key)
                ));
            }
        };
    }
    Ok(item)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

/// 不同基本类型之间比较视为不相等
fn basic_eq(a: &Value, b: &Value) -> std::result::Result<bool, String> {
    match (a, b) {
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => Err(
            format!("non-comparable types {} and {}", type_name(a), type_name(b)),
        ),
        (Value::Number(x), Value::Number(y)) => Ok(match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        }),
        _ => Ok(a == b),
    }
}

fn compare(a: &Value, b: &Value) -> std::result::Result<std::cmp::Ordering, String> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y)
                .ok_or_else(|| "incomparable numbers".to_string())
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(format!(
            "incompatible types for comparison: {} and {}",
            type_name(a),
            type_name(b)
        )),
    }
}

/// fmt.Sprint：相邻两个操作数都不是字符串时以空格分隔
pub fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !arg.is_string() && !args[i - 1].is_string() {
            out.push(' ');
        }
        out.push_str(&display(arg));
    }
    out
}

/// fmt.Sprintf 的常用子集：%v %s %d %f %q %t %x %%，支持宽度与精度
pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut left_align = false;
        let mut zero_pad = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left_align = true,
                '0' => zero_pad = true,
                '+' | ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                p.push(d);
                chars.next();
            }
            precision = Some(p.parse().unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }

        let Some(arg) = args.get(next_arg) else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        next_arg += 1;

        let formatted = match verb {
            'v' | 's' => {
                let s = display(arg);
                match precision {
                    Some(p) if verb == 's' => s.chars().take(p).collect(),
                    _ => s,
                }
            }
            'd' => match arg {
                Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
                _ => format!("%!d({}={})", type_name(arg), display(arg)),
            },
            'f' => match arg.as_f64() {
                Some(f) => format!("{:.*}", precision.unwrap_or(6), f),
                None => format!("%!f({}={})", type_name(arg), display(arg)),
            },
            'q' => serde_json::to_string(&display(arg)).unwrap_or_default(),
            't' => match arg {
                Value::Bool(b) => b.to_string(),
                _ => format!("%!t({}={})", type_name(arg), display(arg)),
            },
            'x' => match arg {
                Value::Number(n) if n.is_i64() => format!("{:x}", n.as_i64().unwrap_or(0)),
                _ => display(arg).bytes().map(|b| format!("{:02x}", b)).collect(),
            },
            other => format!("%!{}({}={})", other, type_name(arg), display(arg)),
        };

        let width: usize = width.parse().unwrap_or(0);
        let len = formatted.chars().count();
        if len >= width {
            out.push_str(&formatted);
        } else if left_align {
            out.push_str(&formatted);
            out.push_str(&" ".repeat(width - len));
        } else {
            let pad = if zero_pad && arg.is_number() { '0' } else { ' ' };
            out.push_str(&pad.to_string().repeat(width - len));
            out.push_str(&formatted);
        }
    }

    if next_arg < args.len() {
        let extra: Vec<String> = args[next_arg..]
            .iter()
            .map(|a| format!("{}={}", type_name(a), display(a)))
            .collect();
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default() {
        assert_eq!(default_of(&json!("n/a"), &Value::Null), "n/a");
        assert_eq!(default_of(&json!("n/a"), &json!("")), "n/a");
        assert_eq!(default_of(&json!("n/a"), &json!("<nil>")), "n/a");
        assert_eq!(default_of(&json!("n/a"), &json!("bob")), "bob");
        assert_eq!(default_of(&json!("n/a"), &json!(0)), "0");
    }

    #[test]
    fn test_jsonescape() {
        assert_eq!(json_escape(&json!("a \"b\"\nc")), r#"a \"b\"\nc"#);
        assert_eq!(json_escape(&json!("<x>")), r"\u003cx\u003e");
        assert_eq!(json_escape(&Value::Null), "");
        assert_eq!(json_escape(&json!(12)), "12");
    }

    #[test]
    fn test_marshal() {
        assert_eq!(marshal(&json!({"b": 1, "a": [true, null]})), r#"{"a":[true,null],"b":1}"#);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate(5, "abcdefgh"), "ab...");
        assert_eq!(truncate(3, "abcdefgh"), "abc");
        assert_eq!(truncate(10, "short"), "short");
        assert_eq!(truncate(4, "日本語テキスト"), "日...");
    }

    #[test]
    fn test_ssf_event_type() {
        assert_eq!(
            ssf_event_type("Compromised User"),
            "https://schemas.openid.net/secevent/risc/event-type/account-compromised"
        );
        assert_eq!(
            ssf_event_type("weak password"),
            "https://schemas.openid.net/secevent/risc/event-type/credential-change-required"
        );
        assert_eq!(
            ssf_event_type("Unused Identities"),
            "https://schemas.openid.net/secevent/risc/event-type/account-disabled"
        );
        assert_eq!(
            ssf_event_type("Lack of MFA"),
            "https://schemas.openid.net/secevent/caep/event-type/assurance-level-change"
        );
        assert_eq!(
            ssf_event_type("Shadow Assets"),
            "https://schemas.openid.net/secevent/caep/event-type/device-compliance-change"
        );
        assert_eq!(
            ssf_event_type("Something New"),
            "https://schemas.openid.net/secevent/caep/event-type/session-revoked"
        );
    }

    #[test]
    fn test_display_matches_go_formatting() {
        assert_eq!(display(&json!(5.0)), "5");
        assert_eq!(display(&json!(2.5)), "2.5");
        assert_eq!(display(&json!([1, "a"])), "[1 a]");
        assert_eq!(display(&json!({"b": 2, "a": 1})), "map[a:1 b:2]");
        assert_eq!(display(&Value::Null), "<nil>");
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call("eq", vec![json!("a"), json!("b"), json!("a")]).unwrap(), json!(true));
        assert_eq!(call("eq", vec![json!(1), json!(1.0)]).unwrap(), json!(true));
        assert_eq!(call("ne", vec![json!(1), json!(2)]).unwrap(), json!(true));
        assert_eq!(call("lt", vec![json!(1), json!(2)]).unwrap(), json!(true));
        assert_eq!(call("ge", vec![json!("b"), json!("a")]).unwrap(), json!(true));
        assert!(call("lt", vec![json!(1), json!("a")]).is_err());
        assert!(call("eq", vec![json!([1]), json!([1])]).is_err());
    }

    #[test]
    fn test_and_or_return_operands() {
        assert_eq!(call("and", vec![json!(1), json!(""), json!(2)]).unwrap(), json!(""));
        assert_eq!(call("or", vec![json!(""), json!("x")]).unwrap(), json!("x"));
        assert_eq!(call("not", vec![json!(0)]).unwrap(), json!(true));
    }

    #[test]
    fn test_sprint_and_sprintf() {
        assert_eq!(sprint(&[json!("a"), json!(1), json!(2), json!("b")]), "a1 2b");
        assert_eq!(sprintf("%s has %d items", &[json!("x"), json!(3)]), "x has 3 items");
        assert_eq!(sprintf("%.2f%%", &[json!(12.345)]), "12.35%");
        assert_eq!(sprintf("%5s|%-3d|", &[json!("ab"), json!(7)]), "   ab|7  |");
        assert_eq!(sprintf("%q", &[json!("hi")]), "\"hi\"");
        assert_eq!(sprintf("%s", &[]), "%!s(MISSING)");
    }

    #[test]
    fn test_index_and_len() {
        let data = json!({"items": [10, 20], "m": {"k": "v"}});
        assert_eq!(call("index", vec![data["items"].clone(), json!(1)]).unwrap(), json!(20));
        assert_eq!(call("index", vec![data["m"].clone(), json!("k")]).unwrap(), json!("v"));
        assert_eq!(call("index", vec![data["m"].clone(), json!("x")]).unwrap(), Value::Null);
        assert!(call("index", vec![data["items"].clone(), json!(5)]).is_err());
        assert_eq!(call("len", vec![data["items"].clone()]).unwrap(), json!(2));
        assert!(call("len", vec![Value::Null]).is_err());
    }

    #[test]
    fn test_urlquery() {
        assert_eq!(call("urlquery", vec![json!("a b&c")]).unwrap(), json!("a+b%26c"));
    }
}
