use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use super::descriptor::{FunctionDescriptor, SignatureParam};
use super::docstring::{DocParam, DocReturn, ParsedDocComment};
use super::languages::PythonParser;
use super::literal::Literal;
use super::model::{
    title_case, unwrap_optional, ParamKind, ParameterSpec, PortSpec, Priority, Role, Widget,
};

/// Caller-supplied values for one parameter. Every field set here beats
/// both the doc comment and inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterOverride {
    #[serde(rename = "type")]
    pub kind: Option<ParamKind>,
    pub default: Option<Literal>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub widget: Option<Widget>,
    pub options: Option<Vec<Literal>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub priority: Option<Priority>,
    pub role: Option<Role>,
}

/// Overrides for one entry, keyed by parameter name
pub type ParameterOverrides = BTreeMap<String, ParameterOverride>;

/// Reconciles a function signature with its doc comment
pub struct SignatureExtractor {
    parser: PythonParser,
}

impl SignatureExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            parser: PythonParser::new()?,
        })
    }

    /// Normalized import statements in order of first appearance
    pub fn extract_imports(&mut self, source: &str) -> Vec<String> {
        self.parser.extract_imports(source)
    }

    /// Body of the first function in `source`, docstring excluded
    pub fn function_body(&mut self, source: &str) -> Option<String> {
        self.parser.function_body(source)
    }

    /// Build the parameter model for every declared parameter, in order.
    /// Parameters marked `ignore: true` are dropped.
    pub fn extract(
        &self,
        function: &FunctionDescriptor,
        doc: &ParsedDocComment,
        overrides: &ParameterOverrides,
    ) -> Vec<ParameterSpec> {
        function
            .params
            .iter()
            .filter_map(|param| {
                let doc_param = doc.parameter(&param.name);
                if doc_param.map_or(false, |d| d.ignore) {
                    return None;
                }
                let fallback = ParameterOverride::default();
                let ov = overrides.get(&param.name).unwrap_or(&fallback);
                Some(resolve_parameter(param, doc_param, ov))
            })
            .collect()
    }

    /// Output ports from the doc comment's `Returns:` block, or inferred
    /// from the return annotation when that block is absent.
    pub fn infer_outputs(&self, function: &FunctionDescriptor, doc: &ParsedDocComment) -> Vec<PortSpec> {
        match &doc.returns {
            Some(returns) => ports_from_returns(returns),
            None => function
                .return_annotation
                .as_deref()
                .map(ports_from_annotation)
                .unwrap_or_default(),
        }
    }
}

fn resolve_parameter(
    param: &SignatureParam,
    doc: Option<&DocParam>,
    ov: &ParameterOverride,
) -> ParameterSpec {
    let name = param.name.as_str();

    let mut kind = ov
        .kind
        .or_else(|| doc.and_then(|d| d.type_name.as_deref()).and_then(ParamKind::from_doc_type))
        .or_else(|| param.annotation.as_deref().map(ParamKind::from_annotation))
        .or_else(|| param.default.as_ref().and_then(ParamKind::from_default))
        .unwrap_or(ParamKind::Str);

    let role = ov
        .role
        .or_else(|| doc.and_then(|d| d.role))
        .unwrap_or_else(|| infer_role(name, kind));
    if role == Role::Input {
        kind = ParamKind::DataFrame;
    }

    let declared_default = ov
        .default
        .clone()
        .or_else(|| doc.and_then(|d| d.default.clone()))
        .or_else(|| param.default.clone());
    let required = declared_default.is_none();
    let default = declared_default.or_else(|| kind.empty_default());

    let priority = ov
        .priority
        .or_else(|| doc.and_then(|d| d.priority))
        .unwrap_or(if required { Priority::Critical } else { Priority::NonCritical });

    let options = ov
        .options
        .clone()
        .or_else(|| doc.and_then(|d| d.options.clone()))
        .unwrap_or_default();

    let mut widget = ov
        .widget
        .clone()
        .or_else(|| doc.and_then(|d| d.widget.clone()))
        .unwrap_or_else(|| infer_widget(name, kind, &options));
    if !options.is_empty() && !widget.is_selection() {
        widget = Widget::Select;
    }

    ParameterSpec {
        name: name.to_string(),
        kind,
        default,
        required,
        label: ov
            .label
            .clone()
            .or_else(|| doc.and_then(|d| d.label.clone()))
            .unwrap_or_else(|| title_case(name)),
        description: ov
            .description
            .clone()
            .or_else(|| doc.map(|d| d.description.clone()))
            .unwrap_or_default(),
        widget,
        options,
        min: ov.min.or_else(|| doc.and_then(|d| d.min)),
        max: ov.max.or_else(|| doc.and_then(|d| d.max)),
        step: ov.step.or_else(|| doc.and_then(|d| d.step)),
        priority,
        role,
    }
}

fn infer_role(name: &str, kind: ParamKind) -> Role {
    if name == "df" || kind.is_tabular() {
        Role::Input
    } else if name == "output_var" {
        Role::Output
    } else {
        Role::Parameter
    }
}

/// Pick a UI control from options, name substrings, then kind
pub fn infer_widget(name: &str, kind: ParamKind, options: &[Literal]) -> Widget {
    if !options.is_empty() {
        return Widget::Select;
    }

    let lower = name.to_lowercase();
    if lower.contains("file") || lower.contains("path") {
        return Widget::FileSelector;
    }
    if lower.contains("column") {
        return Widget::ColumnSelector;
    }
    if lower.contains("color") {
        return Widget::ColorPicker;
    }

    match kind {
        ParamKind::Bool => Widget::Checkbox,
        ParamKind::Int | ParamKind::Float => Widget::InputNumber,
        _ => Widget::InputText,
    }
}

/// Unnamed returns become `result`; unrecognized types become `any`
pub fn ports_from_returns(returns: &[DocReturn]) -> Vec<PortSpec> {
    returns
        .iter()
        .map(|ret| PortSpec {
            name: ret.name.clone().unwrap_or_else(|| "result".to_string()),
            kind: ParamKind::from_doc_type(&ret.type_name).unwrap_or(ParamKind::Any),
            description: ret.description.clone(),
        })
        .collect()
}

/// A single tabular return gives `result`; a tuple of tabular values gives
/// `df_out_1..n`. Anything else gives no ports.
pub fn ports_from_annotation(annotation: &str) -> Vec<PortSpec> {
    let text = unwrap_optional(annotation);

    let tuple_items = ["Tuple[", "tuple[", "typing.Tuple["]
        .iter()
        .find_map(|prefix| text.strip_prefix(prefix))
        .and_then(|rest| rest.strip_suffix(']'));

    match tuple_items {
        Some(items) => {
            let elements = split_top_level(items);
            let all_tabular = !elements.is_empty()
                && elements.iter().all(|element| element.contains("DataFrame"));
            if !all_tabular {
                return Vec::new();
            }
            (1..=elements.len())
                .map(|i| PortSpec::new(format!("df_out_{}", i), ParamKind::DataFrame))
                .collect()
        }
        None if text.contains("DataFrame") => vec![PortSpec::new("result", ParamKind::DataFrame)],
        None => Vec::new(),
    }
}

/// Split on commas that are not nested inside brackets
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

/// Remove repeated import lines, keeping the first occurrence
pub fn dedupe_imports<I, S>(imports: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    imports
        .into_iter()
        .map(Into::into)
        .map(|import: String| import.trim().to_string())
        .filter(|import| !import.is_empty() && seen.insert(import.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::docstring::DocCommentParser;

    fn descriptor(params: Vec<SignatureParam>, return_annotation: Option<&str>) -> FunctionDescriptor {
        FunctionDescriptor {
            name: "f".to_string(),
            module: "pkg.mod".to_string(),
            params,
            return_annotation: return_annotation.map(str::to_string),
            docstring: None,
            source: String::new(),
            module_imports: vec![],
        }
    }

    fn extract(function: &FunctionDescriptor, doc: &str) -> Vec<ParameterSpec> {
        let parsed = DocCommentParser::new().parse(doc);
        SignatureExtractor::new()
            .unwrap()
            .extract(function, &parsed, &ParameterOverrides::new())
    }

    #[test]
    fn test_window_scenario() {
        let function = descriptor(
            vec![
                SignatureParam::new("df"),
                SignatureParam::new("window").annotated("int").with_default(Literal::Int(5)),
            ],
            None,
        );
        let specs = extract(&function, "Parameters:\nwindow (int): size\n    min: 1\n    max: 10");

        let window = specs.iter().find(|p| p.name == "window").unwrap();
        assert_eq!(window.kind, ParamKind::Int);
        assert_eq!(window.default, Some(Literal::Int(5)));
        assert_eq!(window.priority, Priority::NonCritical);
        assert_eq!(window.min, Some(1.0));
        assert_eq!(window.max, Some(10.0));
        assert_eq!(window.widget, Widget::InputNumber);
        assert_eq!(window.description, "size");

        let df = specs.iter().find(|p| p.name == "df").unwrap();
        assert_eq!(df.role, Role::Input);
        assert_eq!(df.kind, ParamKind::DataFrame);
        assert!(df.required);
        assert_eq!(df.priority, Priority::Critical);
    }

    #[test]
    fn test_ignore_beats_signature_default() {
        let function = descriptor(
            vec![
                SignatureParam::new("seed").with_default(Literal::Int(42)),
                SignatureParam::new("alpha").with_default(Literal::Float(0.5)),
            ],
            None,
        );
        let specs = extract(&function, "Parameters:\nseed (int): Random seed\n    ignore: true");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "alpha");
        assert_eq!(specs[0].kind, ParamKind::Float);
        assert_eq!(specs[0].label, "Alpha");
    }

    #[test]
    fn test_kind_precedence_and_empty_defaults() {
        let function = descriptor(
            vec![
                SignatureParam::new("count").annotated("float"),
                SignatureParam::new("flag").with_default(Literal::Bool(true)),
                SignatureParam::new("name"),
                SignatureParam::new("value_column").annotated("str"),
            ],
            None,
        );
        let specs = extract(&function, "Parameters:\ncount (int): how many");

        assert_eq!(specs[0].kind, ParamKind::Int);
        assert_eq!(specs[0].default, Some(Literal::Int(0)));
        assert!(specs[0].required);
        assert_eq!(specs[1].kind, ParamKind::Bool);
        assert_eq!(specs[1].widget, Widget::Checkbox);
        assert_eq!(specs[2].kind, ParamKind::Str);
        assert_eq!(specs[2].default, Some(Literal::Str(String::new())));
        assert_eq!(specs[3].widget, Widget::ColumnSelector);
    }

    #[test]
    fn test_options_force_selection_widget() {
        let function = descriptor(
            vec![
                SignatureParam::new("method").with_default(Literal::Str("mean".into())),
                SignatureParam::new("target_column").with_default(Literal::None),
            ],
            None,
        );
        let doc = "Parameters:\nmethod (str): Aggregation\n    widget: input-text\n    options: mean, median\ntarget_column (str): Column\n    widget: column-selector\n    options: [a, b]";
        let specs = extract(&function, doc);

        assert_eq!(specs[0].widget, Widget::Select);
        assert_eq!(specs[0].options.len(), 2);
        assert_eq!(specs[1].widget, Widget::ColumnSelector);
    }

    #[test]
    fn test_override_precedence() {
        let function = descriptor(
            vec![SignatureParam::new("threshold").with_default(Literal::Float(0.5))],
            None,
        );
        let parsed = DocCommentParser::new()
            .parse("Parameters:\nthreshold (float): Cutoff\n    label: Cutoff\n    max: 1.0");

        let mut overrides = ParameterOverrides::new();
        overrides.insert(
            "threshold".to_string(),
            ParameterOverride {
                label: Some("Threshold".to_string()),
                default: Some(Literal::Float(0.9)),
                ..ParameterOverride::default()
            },
        );

        let specs = SignatureExtractor::new()
            .unwrap()
            .extract(&function, &parsed, &overrides);
        assert_eq!(specs[0].label, "Threshold");
        assert_eq!(specs[0].default, Some(Literal::Float(0.9)));
        assert_eq!(specs[0].max, Some(1.0));
    }

    #[test]
    fn test_output_inference() {
        let single = ports_from_annotation("pd.DataFrame");
        assert_eq!(single, vec![PortSpec::new("result", ParamKind::DataFrame)]);

        let pair = ports_from_annotation("Tuple[pd.DataFrame, Optional[pd.DataFrame]]");
        let names: Vec<&str> = pair.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["df_out_1", "df_out_2"]);

        assert!(ports_from_annotation("Tuple[pd.DataFrame, int]").is_empty());
        assert!(ports_from_annotation("None").is_empty());
    }

    #[test]
    fn test_doc_returns_beat_annotation() {
        let function = descriptor(vec![], Some("pd.DataFrame"));
        let extractor = SignatureExtractor::new().unwrap();
        let parser = DocCommentParser::new();

        let documented = parser.parse("Returns:\n    pandas.DataFrame: Smoothed");
        let ports = extractor.infer_outputs(&function, &documented);
        assert_eq!(ports[0].name, "result");
        assert_eq!(ports[0].description, "Smoothed");

        let none = parser.parse("Returns:\n    None");
        assert!(extractor.infer_outputs(&function, &none).is_empty());
    }

    #[test]
    fn test_dedupe_imports_keeps_first() {
        let imports = dedupe_imports(vec!["import pandas as pd", "import numpy as np", " import pandas as pd"]);
        assert_eq!(imports, vec!["import pandas as pd", "import numpy as np"]);
    }
}
