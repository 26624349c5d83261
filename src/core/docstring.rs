use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::languages::parse_literal;
use super::literal::{strip_quotes, Literal};
use super::model::{Priority, Role, Widget};

const IDENTITY_HEADER: &str = "Identity:";
const PARAMETERS_HEADER: &str = "Parameters:";
const RETURNS_HEADER: &str = "Returns:";

/// The `Identity:` block of a doc comment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityBlock {
    pub name: Option<String>,
    pub category: Option<String>,
    pub prompt: Option<String>,
    pub imports: Option<Vec<String>>,

    /// Keys this version does not interpret, kept verbatim
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Per-parameter details from the `Parameters:` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocParam {
    pub name: String,
    pub type_name: Option<String>,
    pub description: String,
    pub label: Option<String>,
    pub widget: Option<Widget>,
    pub priority: Option<Priority>,
    pub options: Option<Vec<Literal>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub ignore: bool,
    pub role: Option<Role>,
    pub default: Option<Literal>,
}

impl DocParam {
    fn new(name: &str, type_name: Option<&str>, description: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            description: description.trim().to_string(),
            ..Self::default()
        }
    }

    fn apply(&mut self, attr: ParamAttr) {
        match attr {
            ParamAttr::Label(label) => self.label = Some(label),
            ParamAttr::Widget(widget) => self.widget = Some(widget),
            ParamAttr::Priority(priority) => self.priority = priority,
            ParamAttr::Options(options) => self.options = Some(options),
            ParamAttr::Min(min) => self.min = Some(min),
            ParamAttr::Max(max) => self.max = Some(max),
            ParamAttr::Step(step) => self.step = Some(step),
            ParamAttr::Ignore(ignore) => self.ignore = ignore,
            ParamAttr::Role(role) => self.role = role,
            ParamAttr::Default(default) => self.default = Some(default),
        }
    }

    fn continue_description(&mut self, text: &str) {
        if self.description.is_empty() {
            self.description = text.to_string();
        } else {
            self.description.push(' ');
            self.description.push_str(text);
        }
    }
}

/// One line of the `Returns:` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocReturn {
    pub name: Option<String>,
    pub type_name: String,
    pub description: String,
}

/// An attribute line attached to a parameter, already typed
#[derive(Debug, Clone, PartialEq)]
pub enum ParamAttr {
    Label(String),
    Widget(Widget),
    /// `None` when the value names no known priority
    Priority(Option<Priority>),
    Options(Vec<Literal>),
    Min(f64),
    Max(f64),
    Step(f64),
    Ignore(bool),
    Role(Option<Role>),
    Default(Literal),
}

impl ParamAttr {
    /// Type a raw `key: value` pair. Unknown keys and unusable numbers yield `None`.
    pub fn parse(key: &str, value: &str) -> Option<Self> {
        let value = value.trim();
        let attr = match key {
            "label" => ParamAttr::Label(value.to_string()),
            "widget" => ParamAttr::Widget(Widget::from(value)),
            "priority" => ParamAttr::Priority(Priority::parse(value)),
            "options" => ParamAttr::Options(parse_options(value)),
            "min" => ParamAttr::Min(parse_bound(key, value)?),
            "max" => ParamAttr::Max(parse_bound(key, value)?),
            "step" => ParamAttr::Step(parse_bound(key, value)?),
            "ignore" => ParamAttr::Ignore(value.eq_ignore_ascii_case("true")),
            "role" => ParamAttr::Role(Role::parse(value)),
            "default" => ParamAttr::Default(parse_default(value)),
            _ => return None,
        };
        Some(attr)
    }
}

fn parse_bound(key: &str, value: &str) -> Option<f64> {
    let bound = Literal::parse_number(value).and_then(|n| n.as_f64());
    if bound.is_none() {
        debug!("Dropping non-numeric {} attribute: {}", key, value);
    }
    bound
}

/// A bracketed Python literal when it parses cleanly, else a comma-split list
/// of integers, floats, or quote-stripped strings.
fn parse_options(value: &str) -> Vec<Literal> {
    if value.starts_with('[') && value.ends_with(']') {
        if let Some(Literal::List(items)) = parse_literal(value) {
            if !items.iter().any(|item| matches!(item, Literal::Expr(_))) {
                return items;
            }
        }
    }

    let inner = value.trim_start_matches('[').trim_end_matches(']').trim();
    if inner.is_empty() {
        return Vec::new();
    }
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();

    if let Some(ints) = parts
        .iter()
        .map(|p| p.parse::<i64>().ok().map(Literal::Int))
        .collect::<Option<Vec<_>>>()
    {
        return ints;
    }
    if let Some(floats) = parts
        .iter()
        .map(|p| match Literal::parse_number(p) {
            Some(Literal::Int(i)) => Some(Literal::Float(i as f64)),
            other => other,
        })
        .collect::<Option<Vec<_>>>()
    {
        return floats;
    }
    parts
        .iter()
        .map(|p| Literal::Str(strip_quotes(p).to_string()))
        .collect()
}

fn parse_default(value: &str) -> Literal {
    let bracketed = (value.starts_with('[') && value.ends_with(']'))
        || (value.starts_with('(') && value.ends_with(')'));
    if bracketed {
        if let Some(literal @ (Literal::List(_) | Literal::Tuple(_))) = parse_literal(value) {
            return literal;
        }
    }
    Literal::coerce(value)
}

/// Structured view of one doc comment. Each section is `None` when its
/// header is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocComment {
    pub description: String,
    pub identity: Option<IdentityBlock>,
    pub parameters: Option<Vec<DocParam>>,
    pub returns: Option<Vec<DocReturn>>,
}

impl ParsedDocComment {
    pub fn parameter(&self, name: &str) -> Option<&DocParam> {
        self.parameters.as_ref()?.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Identity,
    Parameters,
    Returns,
    Other,
}

/// Parser for the `Identity:` / `Parameters:` / `Returns:` doc-comment grammar
pub struct DocCommentParser {
    /// Any other section header, e.g. `Example:` or `See Also:`
    other_header_regex: Regex,

    /// `key: value` inside the identity block
    identity_regex: Regex,

    /// `name (type): description`, type optional
    param_regex: Regex,

    /// Typed attribute line under a parameter
    attr_regex: Regex,

    /// `name (type): description` in the returns block
    named_return_regex: Regex,

    /// `type: description` in the returns block
    unnamed_return_regex: Regex,
}

impl DocCommentParser {
    pub fn new() -> Self {
        Self {
            other_header_regex: Regex::new(r"^[A-Z][A-Za-z]*(?: [A-Z][A-Za-z]*)*:$")
                .expect("Invalid header regex"),
            identity_regex: Regex::new(r"^(\w+)\s*:\s*(.+)$")
                .expect("Invalid identity regex"),
            param_regex: Regex::new(r"^(\w+)\s*(?:\((.*?)\))?\s*:\s*(.*)$")
                .expect("Invalid parameter regex"),
            attr_regex: Regex::new(
                r"^(label|widget|priority|options|min|max|step|ignore|role|default)\s*:\s*(.*)$",
            )
            .expect("Invalid attribute regex"),
            named_return_regex: Regex::new(r"^(\w+)\s*\((.+?)\)\s*:\s*(.*)$")
                .expect("Invalid named return regex"),
            unnamed_return_regex: Regex::new(r"^([^:]+):\s*(.*)$")
                .expect("Invalid return regex"),
        }
    }

    /// Whether the text carries an identity block, the scanner's candidate filter
    pub fn has_identity_section(&self, text: &str) -> bool {
        text.lines().any(|line| line.trim() == IDENTITY_HEADER)
    }

    /// Parse a doc comment. Total over all inputs: malformed sections come
    /// back empty rather than failing.
    pub fn parse(&self, text: &str) -> ParsedDocComment {
        let mut parsed = ParsedDocComment::default();
        let mut description: Vec<&str> = Vec::new();
        let mut section = Section::Preamble;

        let mut current_param: Option<usize> = None;
        let mut base_indent: Option<usize> = None;
        let mut returns_done = false;

        for line in text.lines() {
            let stripped = line.trim();
            if stripped.is_empty() {
                continue;
            }

            if let Some(next) = self.section_header(stripped) {
                section = next;
                match section {
                    Section::Identity => {
                        parsed.identity.get_or_insert_with(IdentityBlock::default);
                    }
                    Section::Parameters => {
                        parsed.parameters.get_or_insert_with(Vec::new);
                        current_param = None;
                        base_indent = None;
                    }
                    Section::Returns => {
                        parsed.returns.get_or_insert_with(Vec::new);
                    }
                    Section::Preamble | Section::Other => {}
                }
                continue;
            }

            match section {
                Section::Preamble => description.push(stripped),
                Section::Identity => {
                    if let Some(identity) = parsed.identity.as_mut() {
                        self.parse_identity_line(identity, stripped);
                    }
                }
                Section::Parameters => {
                    if let Some(params) = parsed.parameters.as_mut() {
                        let indent = line.len() - line.trim_start().len();
                        self.parse_parameter_line(
                            params,
                            &mut current_param,
                            &mut base_indent,
                            indent,
                            stripped,
                        );
                    }
                }
                Section::Returns => {
                    if returns_done {
                        continue;
                    }
                    if let Some(returns) = parsed.returns.as_mut() {
                        returns_done = self.parse_return_line(returns, stripped);
                    }
                }
                Section::Other => {}
            }
        }

        parsed.description = description.join(" ");
        parsed
    }

    fn section_header(&self, stripped: &str) -> Option<Section> {
        match stripped {
            IDENTITY_HEADER => Some(Section::Identity),
            PARAMETERS_HEADER => Some(Section::Parameters),
            RETURNS_HEADER => Some(Section::Returns),
            _ if self.other_header_regex.is_match(stripped) => Some(Section::Other),
            _ => None,
        }
    }

    fn parse_identity_line(&self, identity: &mut IdentityBlock, stripped: &str) {
        let Some(caps) = self.identity_regex.captures(stripped) else {
            return;
        };
        let key = &caps[1];
        let value = caps[2].trim().to_string();

        match key {
            "name" => identity.name = Some(value),
            "category" => identity.category = Some(value),
            "prompt" => identity.prompt = Some(value),
            "imports" => {
                identity.imports = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|import| !import.is_empty())
                        .map(str::to_string)
                        .collect(),
                );
            }
            _ => {
                identity.extra.insert(key.to_string(), value);
            }
        }
    }

    fn parse_parameter_line(
        &self,
        params: &mut Vec<DocParam>,
        current: &mut Option<usize>,
        base_indent: &mut Option<usize>,
        indent: usize,
        stripped: &str,
    ) {
        let at_base = base_indent.map_or(true, |base| indent <= base);
        if at_base {
            if let Some(caps) = self.param_regex.captures(stripped) {
                base_indent.get_or_insert(indent);
                let param = DocParam::new(
                    &caps[1],
                    caps.get(2).map(|m| m.as_str()),
                    caps.get(3).map_or("", |m| m.as_str()),
                );
                match params.iter().position(|p| p.name == param.name) {
                    Some(position) => {
                        params[position] = param;
                        *current = Some(position);
                    }
                    None => {
                        params.push(param);
                        *current = Some(params.len() - 1);
                    }
                }
                return;
            }
        }

        let Some(param) = current.and_then(|index| params.get_mut(index)) else {
            return;
        };

        if !at_base {
            let attr = self
                .attr_regex
                .captures(stripped)
                .and_then(|caps| ParamAttr::parse(&caps[1], &caps[2]));
            if let Some(attr) = attr {
                param.apply(attr);
                return;
            }
        }
        param.continue_description(stripped);
    }

    /// Returns true once the single return entry has been read
    fn parse_return_line(&self, returns: &mut Vec<DocReturn>, stripped: &str) -> bool {
        if stripped == "None" {
            return true;
        }

        if let Some(caps) = self.named_return_regex.captures(stripped) {
            returns.push(DocReturn {
                name: Some(caps[1].trim().to_string()),
                type_name: caps[2].trim().to_string(),
                description: caps[3].trim().to_string(),
            });
            return true;
        }

        if let Some(caps) = self.unnamed_return_regex.captures(stripped) {
            returns.push(DocReturn {
                name: None,
                type_name: caps[1].trim().to_string(),
                description: caps[2].trim().to_string(),
            });
            return true;
        }

        false
    }
}

impl Default for DocCommentParser {
    fn default() -> Self {
        Self::new()
    }
}
