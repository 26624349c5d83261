//! Source-language front ends.
//!
//! Only Python is read today: catalog libraries are Python packages, and the
//! parser turns their modules into [`FunctionDescriptor`](super::descriptor::FunctionDescriptor)s
//! without importing or executing them.

mod python;

pub use python::{clean_docstring, parse_literal, CodeSnippet, PythonParser, PythonSourceLoader};
