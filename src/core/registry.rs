use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::model::{Catalog, CatalogEntry, ParamKind, ParameterSpec, PortSpec};

/// A callable exposed to tool-using agents, described by JSON schemas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub returns: Value,
}

impl ToolSpec {
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        let description = if entry.description.is_empty() {
            entry.display_name.clone()
        } else {
            entry.description.clone()
        };

        Self {
            name: entry.id.clone(),
            description,
            parameters: parameters_schema(entry),
            returns: returns_schema(&entry.outputs),
        }
    }
}

/// Tool specifications by name. Constructed explicitly and passed to
/// whoever needs it.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One tool per catalog entry
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut registry = Self::new();
        for entry in catalog.entries() {
            registry.register(ToolSpec::from_entry(entry));
        }
        registry
    }

    /// Add a tool, replacing any tool of the same name
    pub fn register(&mut self, spec: ToolSpec) {
        if self.tools.contains_key(&spec.name) {
            warn!("Tool '{}' already registered, overwriting", spec.name);
        }
        debug!("Registered tool: {}", spec.name);
        self.tools.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn specs(&self) -> Vec<&ToolSpec> {
        self.tools.values().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn clear(&mut self) {
        self.tools.clear();
    }
}

fn json_type(kind: ParamKind) -> &'static str {
    match kind {
        ParamKind::Int => "integer",
        ParamKind::Float => "number",
        ParamKind::Bool => "boolean",
        ParamKind::Str => "string",
        ParamKind::List => "array",
        ParamKind::DataFrame | ParamKind::Any => "object",
    }
}

fn port_schema(port: &PortSpec) -> Value {
    let mut schema = Map::new();
    schema.insert("type".to_string(), json!(json_type(port.kind)));
    if !port.description.is_empty() {
        schema.insert("description".to_string(), json!(port.description));
    }
    Value::Object(schema)
}

fn parameter_schema(param: &ParameterSpec) -> Value {
    let mut schema = Map::new();
    schema.insert("type".to_string(), json!(json_type(param.kind)));

    let description = if param.description.is_empty() {
        &param.label
    } else {
        &param.description
    };
    schema.insert("description".to_string(), json!(description));

    if !param.required {
        if let Some(default) = &param.default {
            schema.insert("default".to_string(), default.to_json());
        }
    }
    if !param.options.is_empty() {
        let options: Vec<Value> = param.options.iter().map(|option| option.to_json()).collect();
        schema.insert("enum".to_string(), Value::Array(options));
    }
    if let Some(min) = param.min {
        schema.insert("minimum".to_string(), json!(min));
    }
    if let Some(max) = param.max {
        schema.insert("maximum".to_string(), json!(max));
    }

    Value::Object(schema)
}

fn parameters_schema(entry: &CatalogEntry) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for input in &entry.inputs {
        properties.insert(input.name.clone(), port_schema(input));
        required.push(json!(input.name));
    }
    for param in &entry.parameters {
        properties.insert(param.name.clone(), parameter_schema(param));
        if param.required {
            required.push(json!(param.name));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn returns_schema(outputs: &[PortSpec]) -> Value {
    match outputs {
        [] => json!({ "type": "null" }),
        [single] => port_schema(single),
        many => {
            let items: Vec<Value> = many.iter().map(port_schema).collect();
            json!({
                "type": "array",
                "items": items,
                "minItems": many.len(),
                "maxItems": many.len(),
            })
        }
    }
}
