use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};

use crate::config::SynthesisConfig;
use crate::error::{AlgodocError, Result};
use super::extractor::dedupe_imports;
use super::languages::PythonParser;
use super::literal::{python_string, Literal};
use super::model::{CatalogEntry, ParamKind, ParameterSpec, Role};

const DEFINITION_TEMPLATE_NAME: &str = "definition.py";

const DEFINITION_TEMPLATE: &str = r#"{% for statement in imports %}{{ statement }}
{% endfor %}{% if imports %}
{% endif %}def {{ id }}({{ signature }}) -> {{ return_annotation }}:
    """
{% for line in doc_lines %}{% if line %}    {{ line }}{% endif %}
{% endfor %}    """
{{ body }}
"#;

#[derive(Serialize)]
struct DefinitionContext<'a> {
    imports: Vec<String>,
    id: &'a str,
    signature: String,
    return_annotation: String,
    doc_lines: Vec<String>,
    body: String,
}

/// Generates Python source from catalog entries
pub struct CodeSynthesizer {
    tera: Tera,
    parser: PythonParser,
    tabular_import: String,
}

impl CodeSynthesizer {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template(DEFINITION_TEMPLATE_NAME, DEFINITION_TEMPLATE)?;

        Ok(Self {
            tera,
            parser: PythonParser::new()?,
            tabular_import: config.tabular_import.clone(),
        })
    }

    /// Rebuild a complete function definition: imports, signature, doc
    /// comment and body. `original_source` contributes its imports;
    /// `body_override` replaces the default stub.
    pub fn generate_definition(
        &mut self,
        entry: &CatalogEntry,
        body_override: Option<&str>,
        original_source: Option<&str>,
    ) -> Result<String> {
        check_entry(entry)?;

        let mut imports = match original_source {
            Some(source) => {
                let mut merged = self.parser.extract_imports(source);
                merged.extend(entry.imports.iter().cloned());
                dedupe_imports(merged)
            }
            None => dedupe_imports(entry.imports.iter().cloned()),
        };
        if entry.uses_tabular_data() {
            imports.retain(|statement| statement != &self.tabular_import);
            imports.insert(0, self.tabular_import.clone());
        }
        if let Some(typing) = typing_import(entry, &imports) {
            imports.push(typing);
        }

        let body = match body_override {
            Some(body) => body.trim_end().to_string(),
            None => default_body(entry),
        };

        let context = DefinitionContext {
            imports,
            id: &entry.id,
            signature: build_signature(entry),
            return_annotation: return_annotation(entry),
            doc_lines: doc_lines(entry),
            body,
        };

        let rendered = self.tera.render(
            DEFINITION_TEMPLATE_NAME,
            &Context::from_serialize(&context)?,
        )?;
        let mut code = rendered.trim_start_matches('\n').trim_end().to_string();
        code.push('\n');
        Ok(code)
    }

    /// Import lines, the entry's source template, then a call bound to
    /// `values`. With output names the result is assigned and the first
    /// name ends the text so a notebook displays it.
    pub fn generate_call(
        &self,
        entry: &CatalogEntry,
        values: &BTreeMap<String, Value>,
        output_names: &[String],
    ) -> Result<String> {
        check_entry(entry)?;
        for name in output_names {
            if !is_identifier(name) {
                return Err(synthesis_error(entry, format!("'{}' is not a valid output name", name)));
            }
        }

        let mut args = Vec::with_capacity(values.len());
        let mut used: HashSet<&str> = HashSet::new();

        for input in &entry.inputs {
            if let Some(value) = values.get(&input.name) {
                args.push(format!("{}={}", input.name, format_input(value)));
                used.insert(&input.name);
            }
        }
        for param in &entry.parameters {
            if let Some(value) = values.get(&param.name) {
                let formatted = if param.role == Role::Input {
                    format_input(value)
                } else {
                    format_value(value)
                };
                args.push(format!("{}={}", param.name, formatted));
                used.insert(&param.name);
            }
        }
        for (name, value) in values {
            if !used.contains(name.as_str()) {
                args.push(format!("{}={}", name, format_value(value)));
            }
        }

        let call = format!("{}({})", entry.id, args.join(", "));

        let mut lines: Vec<String> = entry.imports.clone();
        lines.push(entry.source_template.trim_end().to_string());
        match output_names.first() {
            Some(first) => {
                lines.push(format!("{} = {}", output_names.join(", "), call));
                lines.push(first.clone());
            }
            None => lines.push(call),
        }

        Ok(lines.join("\n"))
    }

    /// Body of the first function in `source`, for regenerating a
    /// definition around existing code.
    pub fn function_body(&mut self, source: &str) -> Option<String> {
        self.parser.function_body(source)
    }
}

/// Render a bound value as a Python literal.
///
/// Booleans and numbers render bare; strings shaped like list, dict or
/// tuple literals pass through; `"None"` stays bare; everything else is
/// quoted with backslashes and control characters escaped, so file paths
/// keep their separators.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            if looks_like_container(trimmed) || trimmed == "None" {
                return trimmed.to_string();
            }
            python_string(trimmed)
        }
        other => Literal::from_json(other).to_string(),
    }
}

/// Input values name variables and are never quoted
fn format_input(value: &Value) -> String {
    match value {
        Value::String(name) => name.trim().to_string(),
        other => format_value(other),
    }
}

fn looks_like_container(text: &str) -> bool {
    [('[', ']'), ('{', '}'), ('(', ')')]
        .iter()
        .any(|(open, close)| text.starts_with(*open) && text.ends_with(*close))
}

fn synthesis_error(entry: &CatalogEntry, reason: String) -> AlgodocError {
    AlgodocError::Synthesis {
        id: entry.id.clone(),
        reason,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {
            chars.all(|c| c == '_' || c.is_alphanumeric())
        }
        _ => false,
    }
}

fn check_entry(entry: &CatalogEntry) -> Result<()> {
    if entry.id.is_empty() {
        return Err(synthesis_error(entry, "entry has no id".to_string()));
    }
    if !is_identifier(&entry.id) {
        return Err(synthesis_error(entry, "id is not a valid identifier".to_string()));
    }

    let mut seen = HashSet::new();
    let names = entry
        .inputs
        .iter()
        .map(|port| port.name.as_str())
        .chain(entry.parameters.iter().map(|param| param.name.as_str()));
    for name in names {
        if !is_identifier(name) {
            return Err(synthesis_error(entry, format!("'{}' is not a valid parameter name", name)));
        }
        if !seen.insert(name) {
            return Err(synthesis_error(entry, format!("duplicate parameter '{}'", name)));
        }
    }

    let mut outputs = HashSet::new();
    for port in &entry.outputs {
        if !outputs.insert(port.name.as_str()) {
            return Err(synthesis_error(entry, format!("duplicate output '{}'", port.name)));
        }
    }
    Ok(())
}

/// `from typing import ...` for the names the signature needs and the
/// imports do not already provide
fn typing_import(entry: &CatalogEntry, imports: &[String]) -> Option<String> {
    let mut needed = BTreeSet::new();
    if !entry.outputs.is_empty() {
        needed.insert("Optional");
    }
    if entry.outputs.len() > 1 {
        needed.insert("Tuple");
    }
    let uses_any = entry.inputs.iter().map(|p| p.kind)
        .chain(entry.parameters.iter().map(|p| p.kind))
        .chain(entry.outputs.iter().map(|p| p.kind))
        .any(|kind| kind == ParamKind::Any);
    if uses_any {
        needed.insert("Any");
    }

    let imported: HashSet<&str> = imports
        .iter()
        .filter_map(|statement| statement.strip_prefix("from typing import "))
        .flat_map(|names| names.split(','))
        .map(|name| name.trim())
        .collect();

    let missing: Vec<&str> = needed.into_iter().filter(|name| !imported.contains(name)).collect();
    if missing.is_empty() {
        None
    } else {
        Some(format!("from typing import {}", missing.join(", ")))
    }
}

/// Inputs, then required parameters, then parameters with defaults
fn build_signature(entry: &CatalogEntry) -> String {
    let inputs = entry
        .inputs
        .iter()
        .map(|port| format!("{}: {}", port.name, port.kind.python_type()));

    let (required, optional): (Vec<&ParameterSpec>, Vec<&ParameterSpec>) = entry
        .parameters
        .iter()
        .partition(|param| param.required || param.default.is_none());

    let required = required
        .into_iter()
        .map(|param| format!("{}: {}", param.name, param.kind.python_type()));
    let optional = optional.into_iter().map(|param| {
        let default = param.default.as_ref().map(Literal::to_string).unwrap_or_default();
        format!("{}: {} = {}", param.name, param.kind.python_type(), default)
    });

    inputs.chain(required).chain(optional).collect::<Vec<_>>().join(", ")
}

fn return_annotation(entry: &CatalogEntry) -> String {
    match entry.outputs.as_slice() {
        [] => "None".to_string(),
        [single] => format!("Optional[{}]", single.kind.python_type()),
        many => {
            let items: Vec<String> = many
                .iter()
                .map(|port| format!("Optional[{}]", port.kind.python_type()))
                .collect();
            format!("Tuple[{}]", items.join(", "))
        }
    }
}

fn default_body(entry: &CatalogEntry) -> String {
    let first_input = entry.inputs.first().map(|port| port.name.clone());
    let values: Vec<String> = entry
        .outputs
        .iter()
        .enumerate()
        .map(|(i, port)| match (&first_input, i) {
            (Some(input), 0) => input.clone(),
            _ => port.kind.placeholder_value().to_string(),
        })
        .collect();

    if values.is_empty() {
        "    # Implementation\n    pass".to_string()
    } else {
        format!("    # Implementation\n    return {}", values.join(", "))
    }
}

fn labeled_line(name: &str, kind: ParamKind, description: &str) -> String {
    if description.is_empty() {
        format!("{} ({}):", name, kind.python_type())
    } else {
        format!("{} ({}): {}", name, kind.python_type(), description)
    }
}

fn format_bound(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// The doc comment that reads back into the same entry
fn doc_lines(entry: &CatalogEntry) -> Vec<String> {
    let mut lines = Vec::new();
    if !entry.description.is_empty() {
        lines.push(entry.description.clone());
        lines.push(String::new());
    }

    lines.push("Identity:".to_string());
    lines.push(format!("    name: {}", entry.display_name));
    lines.push(format!("    category: {}", entry.category));
    if let Some(prompt) = entry.ai_prompt_template.as_deref().filter(|p| !p.is_empty()) {
        lines.push(format!("    prompt: {}", prompt));
    }
    if !entry.imports.is_empty() {
        lines.push(format!("    imports: {}", entry.imports.join(", ")));
    }

    lines.push(String::new());
    lines.push("Parameters:".to_string());
    for input in &entry.inputs {
        lines.push(labeled_line(&input.name, input.kind, &input.description));
        lines.push("    role: input".to_string());
    }
    for param in &entry.parameters {
        lines.push(labeled_line(&param.name, param.kind, &param.description));
        lines.push(format!("    label: {}", param.label));
        lines.push(format!("    widget: {}", param.widget));
        if !param.options.is_empty() {
            lines.push(format!("    options: {}", Literal::List(param.options.clone())));
        }
        for (key, bound) in [("min", param.min), ("max", param.max), ("step", param.step)] {
            if let Some(bound) = bound {
                lines.push(format!("    {}: {}", key, format_bound(bound)));
            }
        }
        lines.push(format!("    priority: {}", param.priority.as_str()));
        lines.push(format!("    role: {}", param.role.as_str()));
    }

    // The reader keeps one return line; several outputs come back from the
    // tuple annotation instead
    match entry.outputs.as_slice() {
        [] => {
            lines.push(String::new());
            lines.push("Returns:".to_string());
            lines.push("None".to_string());
        }
        [output] => {
            lines.push(String::new());
            lines.push("Returns:".to_string());
            lines.push(labeled_line(&output.name, output.kind, &output.description));
        }
        _ => {}
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{PortSpec, Priority, Widget};
    use serde_json::json;

    fn param(name: &str, kind: ParamKind, default: Option<Literal>) -> ParameterSpec {
        ParameterSpec {
            name: name.to_string(),
            kind,
            required: default.is_none(),
            default,
            label: crate::core::model::title_case(name),
            description: String::new(),
            widget: Widget::InputText,
            options: vec![],
            min: None,
            max: None,
            step: None,
            priority: Priority::NonCritical,
            role: Role::Parameter,
        }
    }

    fn entry() -> CatalogEntry {
        let mut window = param("window", ParamKind::Int, Some(Literal::Int(5)));
        window.widget = Widget::InputNumber;
        window.min = Some(1.0);
        window.description = "Window size".to_string();

        let mut path = param("out_path", ParamKind::Str, Some(Literal::Str(String::new())));
        path.widget = Widget::FileSelector;

        CatalogEntry {
            id: "rolling_mean".to_string(),
            display_name: "Rolling Mean".to_string(),
            category: "data_preprocessing".to_string(),
            description: "Smooth a series.".to_string(),
            ai_prompt_template: None,
            source_template: "# Rolling Mean\ndef rolling_mean(df, window=5):\n    return df".to_string(),
            imports: vec!["import numpy as np".to_string()],
            parameters: vec![window, param("column", ParamKind::Str, None), path],
            inputs: vec![PortSpec::new("df", ParamKind::DataFrame)],
            outputs: vec![PortSpec::new("result", ParamKind::DataFrame)],
            module: "algorithm.preprocess".to_string(),
        }
    }

    fn synthesizer() -> CodeSynthesizer {
        CodeSynthesizer::new(&SynthesisConfig::default()).unwrap()
    }

    #[test]
    fn test_literal_formatting() {
        assert_eq!(format_value(&json!(true)), "True");
        assert_eq!(format_value(&json!(false)), "False");
        assert_eq!(format_value(&json!(3)), "3");
        assert_eq!(format_value(&json!(3.5)), "3.5");
        assert_eq!(format_value(&json!("[1, 2]")), "[1, 2]");
        assert_eq!(format_value(&json!("None")), "None");
        assert_eq!(format_value(&json!("abc")), "'abc'");
        assert_eq!(format_value(&json!(null)), "None");
        assert_eq!(format_value(&json!(["a", 1])), "['a', 1]");
    }

    #[test]
    fn test_quoted_strings_stay_valid_python() {
        assert_eq!(format_value(&json!("C:\\data\\x.csv")), "'C:\\\\data\\\\x.csv'");
        assert_eq!(format_value(&json!("it's")), "'it\\'s'");

        let mut parser = PythonParser::new().unwrap();
        for raw in ["C:\\tmp\\", "line\rbreak", "tab\tand\nnewline", "quote ' and \\'"] {
            let rendered = format_value(&json!(raw));
            assert_eq!(
                parser.parse_literal(&rendered),
                Some(Literal::Str(raw.to_string())),
                "{}",
                rendered
            );
        }
    }

    #[test]
    fn test_call_with_trailing_backslash_parses() {
        let mut values = BTreeMap::new();
        values.insert("out_path".to_string(), json!("C:\\exports\\"));
        let code = synthesizer()
            .generate_call(&entry(), &values, &[])
            .unwrap();
        assert!(code.ends_with("\nrolling_mean(out_path='C:\\\\exports\\\\')"), "{}", code);
    }

    #[test]
    fn test_generate_call_with_outputs() {
        let mut values = BTreeMap::new();
        values.insert("window".to_string(), json!(7));
        values.insert("df".to_string(), json!("sales"));
        values.insert("extra".to_string(), json!("x"));

        let code = synthesizer()
            .generate_call(&entry(), &values, &["smoothed".to_string()])
            .unwrap();

        assert_eq!(
            code,
            "import numpy as np\n# Rolling Mean\ndef rolling_mean(df, window=5):\n    return df\nsmoothed = rolling_mean(df=sales, window=7, extra='x')\nsmoothed"
        );
    }

    #[test]
    fn test_generate_call_without_outputs_ends_with_call() {
        let code = synthesizer()
            .generate_call(&entry(), &BTreeMap::new(), &[])
            .unwrap();
        assert!(code.ends_with("\nrolling_mean()"));

        let pair = synthesizer()
            .generate_call(&entry(), &BTreeMap::new(), &["a".to_string(), "b".to_string()])
            .unwrap();
        assert!(pair.ends_with("\na, b = rolling_mean()\na"));
    }

    #[test]
    fn test_generate_definition_layout() {
        let code = synthesizer().generate_definition(&entry(), None, None).unwrap();

        let expected_head = "import pandas as pd\nimport numpy as np\nfrom typing import Optional\n\ndef rolling_mean(df: pd.DataFrame, column: str, window: int = 5, out_path: str = '') -> Optional[pd.DataFrame]:\n    \"\"\"\n    Smooth a series.\n\n    Identity:\n        name: Rolling Mean\n";
        assert!(code.starts_with(expected_head), "{}", code);
        assert!(code.contains("    window (int): Window size\n        label: Window\n        widget: input-number\n        min: 1\n"));
        assert!(code.contains("    Returns:\n    result (pd.DataFrame):\n    \"\"\"\n    # Implementation\n    return df\n"));
    }

    #[test]
    fn test_generate_definition_merges_original_imports_and_body() {
        let original = "import scipy.stats as st\nimport numpy as np\n\ndef rolling_mean(df):\n    \"\"\"Doc.\"\"\"\n    return st.zscore(df)\n";
        let mut synthesizer = synthesizer();
        let body = synthesizer.function_body(original).unwrap();
        let code = synthesizer
            .generate_definition(&entry(), Some(&body), Some(original))
            .unwrap();

        assert!(code.starts_with("import pandas as pd\nimport scipy.stats as st\nimport numpy as np\nfrom typing import Optional\n"));
        assert_eq!(code.matches("import numpy as np").count(), 1);
        assert!(code.ends_with("    \"\"\"\n    return st.zscore(df)\n"));
    }

    #[test]
    fn test_precondition_failures_name_the_entry() {
        let mut broken = entry();
        broken.parameters.push(param("window", ParamKind::Int, None));
        let err = synthesizer().generate_call(&broken, &BTreeMap::new(), &[]).unwrap_err();
        assert!(matches!(err, AlgodocError::Synthesis { ref id, .. } if id == "rolling_mean"));

        let mut unnamed = entry();
        unnamed.id = String::new();
        assert!(synthesizer().generate_definition(&unnamed, None, None).is_err());

        let err = synthesizer()
            .generate_call(&entry(), &BTreeMap::new(), &["not valid".to_string()])
            .unwrap_err();
        assert!(matches!(err, AlgodocError::Synthesis { .. }));
    }

    #[test]
    fn test_multi_output_stub_and_typing() {
        let mut entry = entry();
        entry.inputs.clear();
        entry.outputs = vec![
            PortSpec::new("df_out_1", ParamKind::DataFrame),
            PortSpec::new("df_out_2", ParamKind::Any),
        ];
        let code = synthesizer().generate_definition(&entry, None, None).unwrap();
        assert!(code.contains("from typing import Any, Optional, Tuple\n"));
        assert!(code.contains("-> Tuple[Optional[pd.DataFrame], Optional[Any]]:"));
        assert!(code.contains("    return pd.DataFrame(), None\n"));
    }

    #[test]
    fn test_tuple_outputs_survive_reparse() {
        use crate::core::docstring::DocCommentParser;
        use crate::core::extractor::SignatureExtractor;

        let mut entry = entry();
        entry.outputs = vec![
            PortSpec::new("df_out_1", ParamKind::DataFrame),
            PortSpec::new("df_out_2", ParamKind::DataFrame),
        ];
        let code = synthesizer().generate_definition(&entry, None, None).unwrap();
        assert!(!code.contains("Returns:"));

        let mut parser = PythonParser::new().unwrap();
        let module = parser.parse_module(&code, "regen").unwrap();
        let function = &module.functions[0];
        let doc = DocCommentParser::new().parse(function.docstring.as_deref().unwrap());
        assert!(doc.returns.is_none());

        let outputs = SignatureExtractor::new().unwrap().infer_outputs(function, &doc);
        let names: Vec<&str> = outputs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["df_out_1", "df_out_2"]);
    }
}
