use thiserror::Error;

/// Main error type for algodoc operations
#[derive(Error, Debug)]
pub enum AlgodocError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Not a package directory: {0}")]
    NotAPackage(String),

    #[error("Failed to import module {module}: {reason}")]
    ModuleImport { module: String, reason: String },

    #[error("Cannot synthesize code for '{id}': {reason}")]
    Synthesis { id: String, reason: String },

    #[error("Unknown catalog entry: {0}")]
    UnknownEntry(String),
}

pub type Result<T> = std::result::Result<T, AlgodocError>;
