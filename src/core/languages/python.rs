use tree_sitter::{Node, Parser, Tree};

use crate::error::{AlgodocError, Result};
use super::super::descriptor::{FunctionDescriptor, LoadedModule, ModuleLoader, ModuleRef, SignatureParam};
use super::super::literal::Literal;

/// Python parser using Tree-sitter
pub struct PythonParser {
    parser: Parser,
}

/// A free-standing function snippet (an edited notebook cell)
#[derive(Debug, Clone)]
pub struct CodeSnippet {
    /// Source up to the end of the first function definition
    pub code: String,

    /// Whether non-comment code followed the function and was dropped
    pub has_trailing_code: bool,

    pub function: FunctionDescriptor,
    pub imports: Vec<String>,
}

impl PythonParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let python_language = tree_sitter_python::language();
        parser.set_language(&python_language)
            .map_err(|e| AlgodocError::Parser(format!("Failed to set Python language: {}", e)))?;

        Ok(Self { parser })
    }

    fn parse_tree(&mut self, source: &str) -> Result<Tree> {
        self.parser.parse(source, None)
            .ok_or_else(|| AlgodocError::Parser("Failed to parse Python code".to_string()))
    }

    /// Parse a module into the descriptors of its top-level functions.
    /// A syntax error anywhere fails the module, the same way importing it would.
    pub fn parse_module(&mut self, source: &str, module: &str) -> Result<LoadedModule> {
        let tree = self.parse_tree(source)?;
        let root = tree.root_node();

        if root.has_error() {
            return Err(AlgodocError::Parser(format!(
                "syntax error near line {}",
                first_error_line(root).unwrap_or(1)
            )));
        }

        let imports = collect_imports(root, source);
        let mut functions = Vec::new();

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            if let Some((definition, outer)) = function_nodes(child) {
                if let Some(descriptor) = describe_function(definition, outer, source, module, &imports) {
                    functions.push(descriptor);
                }
            }
        }

        Ok(LoadedModule {
            name: module.to_string(),
            functions,
            imports,
        })
    }

    /// Structural scan for import statements anywhere in the source, in
    /// order of first appearance. Unparseable regions are skipped.
    pub fn extract_imports(&mut self, source: &str) -> Vec<String> {
        match self.parse_tree(source) {
            Ok(tree) => collect_imports(tree.root_node(), source),
            Err(_) => Vec::new(),
        }
    }

    /// Keep a snippet up to the end of its first function and describe that function.
    pub fn parse_snippet(&mut self, code: &str, module: &str) -> Option<CodeSnippet> {
        let end_row = {
            let tree = self.parser.parse(code, None)?;
            let root = tree.root_node();
            if root.has_error() {
                return None;
            }
            let mut cursor = root.walk();
            let outer = root
                .named_children(&mut cursor)
                .find_map(function_nodes)
                .map(|(_, outer)| outer)?;
            last_row(outer)
        };

        let lines: Vec<&str> = code.lines().collect();
        let keep = (end_row + 1).min(lines.len());
        let has_trailing_code = lines[keep..].iter().any(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        });

        let mut kept: Vec<&str> = lines[..keep].to_vec();
        while kept.last().map_or(false, |line| line.trim().is_empty()) {
            kept.pop();
        }
        let cleaned = kept.join("\n");

        let parsed = self.parse_module(&cleaned, module).ok()?;
        let function = parsed.functions.into_iter().next()?;

        Some(CodeSnippet {
            code: cleaned,
            has_trailing_code,
            function,
            imports: parsed.imports,
        })
    }

    /// Body of the first function in `source`, without its docstring.
    pub fn function_body(&mut self, source: &str) -> Option<String> {
        let tree = self.parser.parse(source, None)?;
        let root = tree.root_node();
        let mut cursor = root.walk();
        let (definition, _) = root.named_children(&mut cursor).find_map(function_nodes)?;
        let body = definition.child_by_field_name("body")?;

        let start_row = match docstring_node(definition) {
            Some(doc) => doc.end_position().row + 1,
            None => first_statement(body)?.start_position().row,
        };
        let end_row = last_row(definition);

        let lines: Vec<&str> = source.lines().collect();
        if start_row > end_row || start_row >= lines.len() {
            return None;
        }
        let end = (end_row + 1).min(lines.len());
        let mut body_lines = lines[start_row..end].to_vec();
        while body_lines.last().map_or(false, |line| line.trim().is_empty()) {
            body_lines.pop();
        }
        Some(body_lines.join("\n"))
    }

    /// Parse a single Python literal expression (`[1, 'a']`, `-3.5`, `None`).
    pub fn parse_literal(&mut self, text: &str) -> Option<Literal> {
        let tree = self.parser.parse(text, None)?;
        let root = tree.root_node();
        if root.has_error() {
            return None;
        }

        let mut cursor = root.walk();
        let statements: Vec<Node> = root
            .named_children(&mut cursor)
            .filter(|node| node.kind() != "comment")
            .collect();
        if statements.len() != 1 || statements[0].kind() != "expression_statement" {
            return None;
        }

        let statement = statements[0];
        if statement.named_child_count() != 1 {
            return None;
        }
        let expression = statement.named_child(0)?;
        Some(literal_from_node(expression, text))
    }
}

/// Parse a Python literal with a throwaway parser.
pub fn parse_literal(text: &str) -> Option<Literal> {
    PythonParser::new().ok()?.parse_literal(text)
}

/// Reads module files from disk through [`PythonParser`].
pub struct PythonSourceLoader {
    parser: PythonParser,
    max_file_size: usize,
}

impl PythonSourceLoader {
    pub fn new(max_file_size: usize) -> Result<Self> {
        Ok(Self {
            parser: PythonParser::new()?,
            max_file_size,
        })
    }
}

impl ModuleLoader for PythonSourceLoader {
    fn load(&mut self, module: &ModuleRef) -> Result<LoadedModule> {
        let import_error = |reason: String| AlgodocError::ModuleImport {
            module: module.name.clone(),
            reason,
        };

        let source = std::fs::read_to_string(&module.path)
            .map_err(|e| import_error(format!("{}: {}", module.path.display(), e)))?;

        if source.len() > self.max_file_size {
            return Err(import_error(format!(
                "{} exceeds maximum size limit",
                module.path.display()
            )));
        }

        self.parser
            .parse_module(&source, &module.name)
            .map_err(|e| import_error(e.to_string()))
    }
}

/// `inspect.cleandoc` semantics: strip the first line, remove the common
/// indentation of the rest, drop blank leading and trailing lines.
pub fn clean_docstring(doc: &str) -> String {
    let expanded = doc.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    let margin = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    cleaned.push(lines[0].trim_start().to_string());
    for line in &lines[1..] {
        let dedented = line.get(margin..).unwrap_or_else(|| line.trim_start());
        cleaned.push(dedented.to_string());
    }

    while cleaned.last().map_or(false, |line| line.trim().is_empty()) {
        cleaned.pop();
    }
    while cleaned.first().map_or(false, |line| line.trim().is_empty()) {
        cleaned.remove(0);
    }

    cleaned.join("\n")
}

/// Strip prefix and quotes from a Python string token and resolve escapes.
pub fn unquote_string(raw: &str) -> String {
    let raw = raw.trim();
    let prefix_len = raw.find(['\'', '"']).unwrap_or(0);
    let (prefix, body) = raw.split_at(prefix_len);
    let is_raw = prefix.contains(['r', 'R']);

    let inner = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|quote| {
            body.strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        })
        .unwrap_or(body);

    if is_raw {
        inner.to_string()
    } else {
        unescape(inner)
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Convert an expression node into a literal; non-literals become `Expr`.
pub fn literal_from_node(node: Node, source: &str) -> Literal {
    let text = node_text(node, source);
    match node.kind() {
        "integer" => parse_int(text)
            .map(Literal::Int)
            .unwrap_or_else(|| Literal::Expr(text.to_string())),
        "float" => match Literal::parse_number(text) {
            Some(Literal::Int(i)) => Literal::Float(i as f64),
            Some(number) => number,
            None => Literal::Expr(text.to_string()),
        },
        "true" => Literal::Bool(true),
        "false" => Literal::Bool(false),
        "none" => Literal::None,
        "string" => {
            if has_named_child(node, "interpolation") {
                Literal::Expr(text.to_string())
            } else {
                Literal::Str(unquote_string(text))
            }
        }
        "concatenated_string" => {
            let mut joined = String::new();
            let mut cursor = node.walk();
            for part in node.named_children(&mut cursor) {
                match literal_from_node(part, source) {
                    Literal::Str(s) => joined.push_str(&s),
                    _ => return Literal::Expr(text.to_string()),
                }
            }
            Literal::Str(joined)
        }
        "list" => Literal::List(element_literals(node, source)),
        "tuple" | "expression_list" => Literal::Tuple(element_literals(node, source)),
        "parenthesized_expression" => {
            let mut cursor = node.walk();
            let inner = node
                .named_children(&mut cursor)
                .find(|child| child.kind() != "comment");
            match inner {
                Some(inner) => literal_from_node(inner, source),
                None => Literal::Expr(text.to_string()),
            }
        }
        "unary_operator" => {
            let operator = node.child_by_field_name("operator").map(|op| node_text(op, source));
            let argument = node.child_by_field_name("argument").map(|arg| literal_from_node(arg, source));
            match (operator, argument) {
                (Some("-"), Some(Literal::Int(i))) => Literal::Int(-i),
                (Some("-"), Some(Literal::Float(f))) => Literal::Float(-f),
                (Some("+"), Some(number @ (Literal::Int(_) | Literal::Float(_)))) => number,
                _ => Literal::Expr(text.to_string()),
            }
        }
        _ => Literal::Expr(text.to_string()),
    }
}

fn element_literals(node: Node, source: &str) -> Vec<Literal> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .map(|child| literal_from_node(child, source))
        .collect()
}

fn has_named_child(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).any(|child| child.kind() == kind);
    found
}

fn parse_int(text: &str) -> Option<i64> {
    let cleaned = text.replace('_', "").to_lowercase();
    if let Some(hex) = cleaned.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(octal) = cleaned.strip_prefix("0o") {
        i64::from_str_radix(octal, 8).ok()
    } else if let Some(binary) = cleaned.strip_prefix("0b") {
        i64::from_str_radix(binary, 2).ok()
    } else {
        cleaned.parse().ok()
    }
}

/// Extract text content of a node
fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

/// Collapse whitespace inside dotted names (`os . path` -> `os.path`)
fn squash(text: &str) -> String {
    text.split_whitespace().collect()
}

/// A top-level function definition and the node spanning its decorators
fn function_nodes(node: Node) -> Option<(Node, Node)> {
    match node.kind() {
        "function_definition" => Some((node, node)),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .filter(|definition| definition.kind() == "function_definition")
            .map(|definition| (definition, node)),
        _ => None,
    }
}

/// Last row holding text of the node; a block may end at column 0 of the next line
fn last_row(node: Node) -> usize {
    let end = node.end_position();
    if end.column == 0 && end.row > node.start_position().row {
        end.row - 1
    } else {
        end.row
    }
}

fn first_statement(body: Node) -> Option<Node> {
    let mut cursor = body.walk();
    let statement = body
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment");
    statement
}

/// The string literal that opens a function body, if any
fn docstring_node(definition: Node) -> Option<Node> {
    let body = definition.child_by_field_name("body")?;
    let statement = first_statement(body)?;
    if statement.kind() != "expression_statement" {
        return None;
    }
    statement.named_child(0).filter(|expr| expr.kind() == "string")
}

fn describe_function(
    definition: Node,
    outer: Node,
    source: &str,
    module: &str,
    imports: &[String],
) -> Option<FunctionDescriptor> {
    let name = node_text(definition.child_by_field_name("name")?, source).to_string();

    let params = definition
        .child_by_field_name("parameters")
        .map(|parameters| signature_params(parameters, source))
        .unwrap_or_default();

    let return_annotation = definition
        .child_by_field_name("return_type")
        .map(|annotation| node_text(annotation, source).trim().to_string());

    let docstring = docstring_node(definition)
        .map(|doc| clean_docstring(&unquote_string(node_text(doc, source))));

    Some(FunctionDescriptor {
        name,
        module: module.to_string(),
        params,
        return_annotation,
        docstring,
        source: node_text(outer, source).to_string(),
        module_imports: imports.to_vec(),
    })
}

fn signature_params(parameters: Node, source: &str) -> Vec<SignatureParam> {
    let mut params = Vec::new();
    let mut cursor = parameters.walk();
    for child in parameters.named_children(&mut cursor) {
        if let Some(param) = signature_param(child, source) {
            params.push(param);
        }
    }
    params
}

/// `*args`, `**kwargs` and bare separators yield nothing
fn signature_param(node: Node, source: &str) -> Option<SignatureParam> {
    let annotation = || {
        node.child_by_field_name("type")
            .map(|annotation| node_text(annotation, source).trim().to_string())
    };
    let default = || {
        node.child_by_field_name("value")
            .map(|value| literal_from_node(value, source))
    };

    match node.kind() {
        "identifier" => Some(SignatureParam::new(node_text(node, source))),
        "typed_parameter" => {
            let name = node.named_child(0).filter(|first| first.kind() == "identifier")?;
            Some(SignatureParam {
                name: node_text(name, source).to_string(),
                annotation: annotation(),
                default: None,
            })
        }
        "default_parameter" | "typed_default_parameter" => {
            let name = node
                .child_by_field_name("name")
                .filter(|name| name.kind() == "identifier")?;
            Some(SignatureParam {
                name: node_text(name, source).to_string(),
                annotation: annotation(),
                default: default(),
            })
        }
        _ => None,
    }
}

fn collect_imports(root: Node, source: &str) -> Vec<String> {
    let mut imports = Vec::new();
    visit_imports(root, source, &mut imports);

    let mut seen = std::collections::HashSet::new();
    imports.retain(|import| seen.insert(import.clone()));
    imports
}

fn visit_imports(node: Node, source: &str, imports: &mut Vec<String>) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                imports.push(format!("import {}", imported_name(name, source)));
            }
        }
        "import_from_statement" | "future_import_statement" => {
            let module = node
                .child_by_field_name("module_name")
                .map(|module| squash(node_text(module, source)))
                .unwrap_or_else(|| "__future__".to_string());

            let mut cursor = node.walk();
            let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
            if names.is_empty() && has_named_child(node, "wildcard_import") {
                imports.push(format!("from {} import *", module));
            }
            for name in names {
                imports.push(format!("from {} import {}", module, imported_name(name, source)));
            }
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                visit_imports(child, source, imports);
            }
        }
    }
}

fn imported_name(name: Node, source: &str) -> String {
    if name.kind() == "aliased_import" {
        let target = name
            .child_by_field_name("name")
            .map(|target| squash(node_text(target, source)))
            .unwrap_or_default();
        match name.child_by_field_name("alias") {
            Some(alias) => format!("{} as {}", target, node_text(alias, source)),
            None => target,
        }
    } else {
        squash(node_text(name, source))
    }
}

fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    let line = node
        .children(&mut cursor)
        .filter(|child| child.has_error())
        .find_map(first_error_line);
    line
}
