// src/core/mod.rs
mod descriptor;
mod docstring;
mod engine;
mod extractor;
mod literal;
mod model;
mod registry;
mod scanner;
mod store;
mod synthesizer;

// Language-specific parsers
mod languages;

pub use descriptor::{FunctionDescriptor, LoadedModule, ModuleLoader, ModuleRef, SignatureParam};
pub use docstring::{DocCommentParser, DocParam, DocReturn, IdentityBlock, ParamAttr, ParsedDocComment};
pub use extractor::{
    dedupe_imports, infer_widget, ports_from_annotation, ports_from_returns, ParameterOverride,
    ParameterOverrides, SignatureExtractor,
};
pub use languages::{clean_docstring, parse_literal, CodeSnippet, PythonParser, PythonSourceLoader};
pub use literal::{python_string, strip_quotes, Literal};
pub use model::{
    title_case, Catalog, CatalogEntry, CategoryLabels, ParamKind, ParameterSpec, PortSpec, Priority,
    Role, Widget,
};
pub use registry::{ToolRegistry, ToolSpec};
pub use scanner::{discover_modules, LibraryScanner, SnippetEntry};
pub use store::CatalogStore;
pub use synthesizer::{format_value, CodeSynthesizer};

// Export the main engine
pub use engine::Engine;
