// src/core/model.rs
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::literal::Literal;

/// Value kind of a parameter or port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Int,
    Float,
    Bool,
    #[serde(rename = "string")]
    Str,
    List,
    #[serde(rename = "dataframe")]
    DataFrame,
    Any,
}

impl ParamKind {
    /// Keyword match on a doc-comment type string (`pandas.DataFrame`,
    /// `List[str]`, `int`, ...). Unmatched strings defer to the signature.
    pub fn from_doc_type(type_name: &str) -> Option<Self> {
        let lower = type_name.to_lowercase();
        if lower.contains("list") {
            Some(ParamKind::List)
        } else if lower.contains("int") {
            Some(ParamKind::Int)
        } else if lower.contains("float") {
            Some(ParamKind::Float)
        } else if lower.contains("bool") {
            Some(ParamKind::Bool)
        } else if lower.contains("dataframe") {
            Some(ParamKind::DataFrame)
        } else {
            None
        }
    }

    /// Map a signature annotation. Unknown annotations are `Any`.
    pub fn from_annotation(annotation: &str) -> Self {
        let text = unwrap_optional(annotation.trim());
        if text.contains("DataFrame") {
            return ParamKind::DataFrame;
        }
        let head = text.split('[').next().unwrap_or(text).trim();
        let head = head.rsplit('.').next().unwrap_or(head);
        match head {
            "int" => ParamKind::Int,
            "float" => ParamKind::Float,
            "bool" => ParamKind::Bool,
            "str" => ParamKind::Str,
            "list" | "List" => ParamKind::List,
            _ => ParamKind::Any,
        }
    }

    /// Infer from a default value; `None` when the value says nothing.
    pub fn from_default(default: &Literal) -> Option<Self> {
        match default {
            Literal::Int(_) => Some(ParamKind::Int),
            Literal::Float(_) => Some(ParamKind::Float),
            Literal::Bool(_) => Some(ParamKind::Bool),
            Literal::List(_) => Some(ParamKind::List),
            _ => None,
        }
    }

    /// Empty value substituted when the signature declares no default
    pub fn empty_default(self) -> Option<Literal> {
        match self {
            ParamKind::Int => Some(Literal::Int(0)),
            ParamKind::Float => Some(Literal::Float(0.0)),
            ParamKind::Bool => Some(Literal::Bool(false)),
            ParamKind::List => Some(Literal::List(Vec::new())),
            ParamKind::Str => Some(Literal::Str(String::new())),
            ParamKind::DataFrame | ParamKind::Any => None,
        }
    }

    /// Annotation text used in generated signatures and doc comments
    pub fn python_type(self) -> &'static str {
        match self {
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Bool => "bool",
            ParamKind::Str => "str",
            ParamKind::List => "list",
            ParamKind::DataFrame => "pd.DataFrame",
            ParamKind::Any => "Any",
        }
    }

    /// Default-constructed expression for a stub return value
    pub fn placeholder_value(self) -> &'static str {
        match self {
            ParamKind::Int => "0",
            ParamKind::Float => "0.0",
            ParamKind::Bool => "False",
            ParamKind::List => "[]",
            ParamKind::Str => "''",
            ParamKind::DataFrame => "pd.DataFrame()",
            ParamKind::Any => "None",
        }
    }

    pub fn is_tabular(self) -> bool {
        self == ParamKind::DataFrame
    }
}

/// Strip `Optional[...]` wrappers from an annotation.
pub(crate) fn unwrap_optional(annotation: &str) -> &str {
    let mut text = annotation.trim();
    loop {
        let inner = text
            .strip_prefix("Optional[")
            .or_else(|| text.strip_prefix("typing.Optional["))
            .and_then(|rest| rest.strip_suffix(']'));
        match inner {
            Some(inner) => text = inner.trim(),
            None => return text,
        }
    }
}

/// UI-control hint attached to a parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Widget {
    Select,
    ColumnSelector,
    VariableSelector,
    FileSelector,
    ColorPicker,
    Checkbox,
    InputNumber,
    InputText,
    Custom(String),
}

impl Widget {
    pub fn as_str(&self) -> &str {
        match self {
            Widget::Select => "select",
            Widget::ColumnSelector => "column-selector",
            Widget::VariableSelector => "variable-selector",
            Widget::FileSelector => "file-selector",
            Widget::ColorPicker => "color-picker",
            Widget::Checkbox => "checkbox",
            Widget::InputNumber => "input-number",
            Widget::InputText => "input-text",
            Widget::Custom(name) => name,
        }
    }

    /// Controls that pick from a list of values
    pub fn is_selection(&self) -> bool {
        matches!(
            self,
            Widget::Select | Widget::ColumnSelector | Widget::VariableSelector
        )
    }
}

impl From<&str> for Widget {
    fn from(name: &str) -> Self {
        match name.trim() {
            "select" => Widget::Select,
            "column-selector" => Widget::ColumnSelector,
            "variable-selector" => Widget::VariableSelector,
            "file-selector" => Widget::FileSelector,
            "color-picker" => Widget::ColorPicker,
            "checkbox" => Widget::Checkbox,
            "input-number" => Widget::InputNumber,
            "input-text" => Widget::InputText,
            other => Widget::Custom(other.to_string()),
        }
    }
}

impl From<String> for Widget {
    fn from(name: String) -> Self {
        Widget::from(name.as_str())
    }
}

impl From<Widget> for String {
    fn from(widget: Widget) -> Self {
        widget.as_str().to_string()
    }
}

impl fmt::Display for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Critical,
    NonCritical,
}

impl Priority {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "critical" | "high" => Some(Priority::Critical),
            "non-critical" | "low" | "optional" => Some(Priority::NonCritical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::NonCritical => "non-critical",
        }
    }
}

/// How a parameter is bound: tabular input, named output slot, or a scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Input,
    Output,
    Parameter,
}

impl Role {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "input" => Some(Role::Input),
            "output" => Some(Role::Output),
            "parameter" => Some(Role::Parameter),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Input => "input",
            Role::Output => "output",
            Role::Parameter => "parameter",
        }
    }
}

/// One formal parameter of a catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Literal>,
    /// No default came from the signature, the doc comment or an override
    pub required: bool,
    pub label: String,
    pub description: String,
    pub widget: Widget,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Literal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    pub priority: Priority,
    pub role: Role,
}

/// A named input or output slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub description: String,
}

impl PortSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
        }
    }
}

/// One discovered function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Unqualified function name, unique catalog-wide
    pub id: String,
    pub display_name: String,
    pub category: String,
    pub description: String,
    pub ai_prompt_template: Option<String>,
    pub source_template: String,
    pub imports: Vec<String>,
    pub parameters: Vec<ParameterSpec>,
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
    /// Module that defined the winning declaration of `id`
    pub module: String,
}

impl CatalogEntry {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn input(&self, name: &str) -> Option<&PortSpec> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Whether the entry consumes or produces tabular data
    pub fn uses_tabular_data(&self) -> bool {
        self.inputs.iter().chain(self.outputs.iter()).any(|p| p.kind.is_tabular())
            || self.parameters.iter().any(|p| p.kind.is_tabular())
    }
}

/// Category key to display label lookup
pub trait CategoryLabels {
    fn label(&self, key: &str) -> Option<&str>;
}

impl CategoryLabels for BTreeMap<String, String> {
    fn label(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl CategoryLabels for HashMap<String, String> {
    fn label(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

/// Entries grouped by category key and indexed by id. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Catalog {
    categories: BTreeMap<String, Vec<CatalogEntry>>,
    #[serde(skip)]
    index: HashMap<String, (String, usize)>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry unless its id is already present. Returns whether it was added.
    pub fn insert(&mut self, entry: CatalogEntry) -> bool {
        if self.index.contains_key(&entry.id) {
            return false;
        }
        let bucket = self.categories.entry(entry.category.clone()).or_default();
        self.index
            .insert(entry.id.clone(), (entry.category.clone(), bucket.len()));
        bucket.push(entry);
        true
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        let (category, position) = self.index.get(id)?;
        self.categories.get(category)?.get(*position)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn category(&self, key: &str) -> &[CatalogEntry] {
        self.categories.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &[CatalogEntry])> {
        self.categories
            .iter()
            .map(|(key, entries)| (key.as_str(), entries.as_slice()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.categories.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Re-key by display label, falling back to the raw key
    pub fn with_labels(&self, labels: &dyn CategoryLabels) -> BTreeMap<String, Vec<CatalogEntry>> {
        let mut labeled: BTreeMap<String, Vec<CatalogEntry>> = BTreeMap::new();
        for (key, entries) in &self.categories {
            let label = labels.label(key).unwrap_or(key).to_string();
            labeled.entry(label).or_default().extend(entries.iter().cloned());
        }
        labeled
    }
}

/// Title-case a snake_case name: `n_bkps` becomes `N Bkps`.
pub fn title_case(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut out = String::with_capacity(spaced.len());
    let mut previous_cased = false;
    for c in spaced.chars() {
        if c.is_alphabetic() {
            if previous_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_cased = true;
        } else {
            out.push(c);
            previous_cased = false;
        }
    }
    out.trim().to_string()
}
