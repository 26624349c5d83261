//! Catalog extraction and code synthesis for documented Python function
//! libraries.
//!
//! A library is a package of modules whose functions carry a structured doc
//! comment (`Identity:`, `Parameters:`, `Returns:`). [`core::LibraryScanner`]
//! reads the package into a [`core::Catalog`]; [`core::CodeSynthesizer`]
//! turns a catalog entry back into a function definition or a bound call.

pub mod config;
pub mod core;
pub mod error;

pub use config::Config;
pub use error::{AlgodocError, Result};
