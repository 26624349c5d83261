use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use algodoc::core::Engine;

#[derive(Parser)]
#[command(name = "algodoc")]
#[command(about = "Catalog documented Python functions and generate code from them")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the catalog grouped by category
    Scan {
        /// Library root (defaults to scan.root from the configuration)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Group by category label instead of key
        #[arg(long)]
        labels: bool,

        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Regenerate the full definition of an entry
    Define {
        /// Entry id (the function name)
        id: String,

        /// Keep the existing function body instead of a stub
        #[arg(long)]
        keep_body: bool,
    },

    /// Generate call code bound to parameter values
    Call {
        /// Entry id (the function name)
        id: String,

        /// Bind a value, e.g. --set window=7 (repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// Variable receiving the result (repeatable)
        #[arg(short, long = "output", value_name = "NAME")]
        outputs: Vec<String>,
    },

    /// Print JSON tool specifications for every entry
    Tools,
}

impl Cli {
    pub fn execute(self, mut engine: Engine) -> Result<()> {
        let output = match self.command {
            Commands::Scan { root, labels, json } => {
                engine.scan_report(root.as_deref(), labels, json)?
            }
            Commands::Define { id, keep_body } => {
                engine.definition(&id, keep_body)?
            }
            Commands::Call { id, set, outputs } => {
                engine.call_code(&id, &set, &outputs)?
            }
            Commands::Tools => {
                engine.tools_json()?
            }
        };

        println!("{}", output.trim_end());
        Ok(())
    }
}
