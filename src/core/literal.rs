use std::fmt;

use serde::{Deserialize, Serialize};

/// A Python source literal: a parameter default, an option value, or a bound
/// argument. `Expr` keeps the verbatim text of anything that is not a plain
/// literal (`np.nan`, `datetime.now()`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Expr(String),
}

impl Literal {
    pub fn is_none(&self) -> bool {
        matches!(self, Literal::None)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Best-effort coercion used for `default:` doc attributes and option items.
    pub fn coerce(text: &str) -> Literal {
        let value = text.trim();
        match value.to_lowercase().as_str() {
            "none" => return Literal::None,
            "true" => return Literal::Bool(true),
            "false" => return Literal::Bool(false),
            _ => {}
        }
        if let Some(number) = Self::parse_number(value) {
            return number;
        }
        Literal::Str(strip_quotes(value).to_string())
    }

    /// Integer first, then float; `None` when the text is not numeric.
    pub fn parse_number(text: &str) -> Option<Literal> {
        let cleaned = text.trim().replace('_', "");
        if cleaned.is_empty() {
            return None;
        }
        if !cleaned.contains(['.', 'e', 'E']) {
            if let Ok(i) = cleaned.parse::<i64>() {
                return Some(Literal::Int(i));
            }
        }
        // Rust accepts "inf"/"nan" spellings that Python source does not
        if cleaned.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
            return None;
        }
        cleaned.parse::<f64>().ok().map(Literal::Float)
    }

    /// Convert a JSON value (a form binding) into a literal.
    pub fn from_json(value: &serde_json::Value) -> Literal {
        match value {
            serde_json::Value::Null => Literal::None,
            serde_json::Value::Bool(b) => Literal::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Literal::Int)
                .or_else(|| n.as_f64().map(Literal::Float))
                .unwrap_or_else(|| Literal::Expr(n.to_string())),
            serde_json::Value::String(s) => Literal::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Literal::List(items.iter().map(Literal::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let pairs: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", Literal::Str(k.clone()), Literal::from_json(v)))
                    .collect();
                Literal::Expr(format!("{{{}}}", pairs.join(", ")))
            }
        }
    }

    /// JSON view of the value. Expressions keep their source text.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::None => serde_json::Value::Null,
            Literal::Bool(b) => serde_json::Value::Bool(*b),
            Literal::Int(i) => serde_json::Value::from(*i),
            Literal::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Literal::Str(s) | Literal::Expr(s) => serde_json::Value::String(s.clone()),
            Literal::List(items) | Literal::Tuple(items) => {
                serde_json::Value::Array(items.iter().map(Literal::to_json).collect())
            }
        }
    }
}

/// Remove one layer of matching single or double quotes.
pub fn strip_quotes(text: &str) -> &str {
    let text = text.trim();
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

/// Render a string the way Python's `repr` does for simple text.
pub fn python_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn join(items: &[Literal]) -> String {
    items.iter().map(|item| item.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => write!(f, "None"),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) if x.is_nan() => write!(f, "float('nan')"),
            Literal::Float(x) if x.is_infinite() => {
                if *x > 0.0 {
                    write!(f, "float('inf')")
                } else {
                    write!(f, "float('-inf')")
                }
            }
            Literal::Float(x) => write!(f, "{:?}", x),
            Literal::Str(s) => write!(f, "{}", python_string(s)),
            Literal::List(items) => write!(f, "[{}]", join(items)),
            Literal::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Literal::Tuple(items) => write!(f, "({})", join(items)),
            Literal::Expr(text) => write!(f, "{}", text),
        }
    }
}
