// src/core/descriptor.rs
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use super::literal::Literal;

/// One declared parameter as it appears in a function signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureParam {
    pub name: String,

    /// Annotation text, e.g. `int` or `pd.DataFrame`
    pub annotation: Option<String>,

    pub default: Option<Literal>,
}

impl SignatureParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: None,
            default: None,
        }
    }

    pub fn annotated(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    pub fn with_default(mut self, default: Literal) -> Self {
        self.default = Some(default);
        self
    }
}

/// Everything the pipeline needs to know about a function, gathered from
/// its host module without executing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,

    /// Dotted path of the module that defines the function
    pub module: String,

    pub params: Vec<SignatureParam>,

    pub return_annotation: Option<String>,

    /// Cleaned documentation text (common indentation removed)
    pub docstring: Option<String>,

    /// The function's own source, decorators included
    pub source: String,

    /// Import statements of the enclosing module
    pub module_imports: Vec<String>,
}

impl FunctionDescriptor {
    pub fn qualified_name(&self) -> String {
        if self.module.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.module, self.name)
        }
    }
}

/// A leaf module discovered under the scanned root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModuleRef {
    /// Dotted module path, e.g. `algorithm.eda.summary`
    pub name: String,
    pub path: PathBuf,
}

/// The members of one imported module
#[derive(Debug, Clone, Default)]
pub struct LoadedModule {
    pub name: String,
    pub functions: Vec<FunctionDescriptor>,
    pub imports: Vec<String>,
}

/// Turns a discovered module into function descriptors. Failures are
/// per-module; the scanner logs them and moves on.
pub trait ModuleLoader {
    fn load(&mut self, module: &ModuleRef) -> Result<LoadedModule>;
}
