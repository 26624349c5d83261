// src/core/engine.rs
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::AlgodocError;
use super::{Catalog, CatalogEntry, CatalogStore, CodeSynthesizer, LibraryScanner, ToolRegistry};

/// Orchestrates scanning, lookup and synthesis for the command line
pub struct Engine {
    config: Config,
    scanner: LibraryScanner,
    synthesizer: CodeSynthesizer,
    store: CatalogStore,
}

impl Engine {
    /// Create a new engine from a configuration file (or the defaults)
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        debug!("Loaded configuration: {:?}", config);
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let scanner = LibraryScanner::new(&config.scan)?.with_overrides(config.overrides.clone());
        let synthesizer = CodeSynthesizer::new(&config.synthesis)?;

        Ok(Self {
            config,
            scanner,
            synthesizer,
            store: CatalogStore::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rescan the library and publish the new catalog
    pub fn refresh(&self, root: Option<&Path>) -> Result<Arc<Catalog>> {
        let root: PathBuf = root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.scan.root.clone());
        info!("Scanning library at {}", root.display());

        let catalog = self
            .store
            .refresh(|| self.scanner.scan(&root))
            .with_context(|| format!("Failed to scan {}", root.display()))?;
        Ok(catalog)
    }

    /// The current catalog, scanning the configured root on first use
    pub fn catalog(&self) -> Result<Arc<Catalog>> {
        let snapshot = self.store.snapshot();
        if snapshot.is_empty() {
            return self.refresh(None);
        }
        Ok(snapshot)
    }

    pub fn entry(&self, id: &str) -> Result<CatalogEntry> {
        let catalog = self.catalog()?;
        let entry = catalog
            .get(id)
            .cloned()
            .ok_or_else(|| AlgodocError::UnknownEntry(id.to_string()))?;
        Ok(entry)
    }

    /// Human-readable or JSON listing of the catalog
    pub fn scan_report(&self, root: Option<&Path>, labels: bool, json: bool) -> Result<String> {
        let catalog = self.refresh(root)?;

        let grouped: BTreeMap<String, Vec<CatalogEntry>> = if labels {
            catalog.with_labels(&self.config.categories.labels)
        } else {
            catalog
                .categories()
                .map(|(key, entries)| (key.to_string(), entries.to_vec()))
                .collect()
        };

        if json {
            return Ok(serde_json::to_string_pretty(&grouped)?);
        }

        let mut report = String::new();
        for (category, entries) in &grouped {
            writeln!(report, "{} ({})", category, entries.len())?;
            for entry in entries {
                writeln!(report, "  {:<28} {:<32} [{}]", entry.id, entry.display_name, entry.module)?;
            }
        }
        writeln!(report, "{} entries in {} categories", catalog.len(), grouped.len())?;
        Ok(report)
    }

    /// Regenerate the definition of an entry, optionally keeping its body
    pub fn definition(&mut self, id: &str, keep_body: bool) -> Result<String> {
        let entry = self.entry(id)?;

        if !keep_body {
            return Ok(self.synthesizer.generate_definition(&entry, None, None)?);
        }

        let source = function_source(&entry);
        let body = self.synthesizer.function_body(source);
        if body.is_none() {
            debug!("No body found for '{}', using a stub", id);
        }
        Ok(self
            .synthesizer
            .generate_definition(&entry, body.as_deref(), Some(source))?)
    }

    /// Call code for an entry bound to `name=value` assignments
    pub fn call_code(&self, id: &str, assignments: &[String], outputs: &[String]) -> Result<String> {
        let entry = self.entry(id)?;

        let mut values = BTreeMap::new();
        for assignment in assignments {
            let (name, value) = parse_assignment(assignment)?;
            values.insert(name, value);
        }

        Ok(self.synthesizer.generate_call(&entry, &values, outputs)?)
    }

    /// JSON tool specifications for every entry
    pub fn tools_json(&self) -> Result<String> {
        let catalog = self.catalog()?;
        let registry = ToolRegistry::from_catalog(&catalog);
        info!("Registered {} tools", registry.len());
        Ok(serde_json::to_string_pretty(&registry.specs())?)
    }
}

/// The function text inside a source template (after the `# name` line)
fn function_source(entry: &CatalogEntry) -> &str {
    let template = entry.source_template.as_str();
    match template.split_once('\n') {
        Some((first, rest)) if first.starts_with("# ") => rest,
        _ => template,
    }
}

/// `name=value`; the value is read as JSON when it parses, else as text
fn parse_assignment(assignment: &str) -> Result<(String, Value)> {
    let (name, raw) = assignment
        .split_once('=')
        .with_context(|| format!("Expected name=value, got '{}'", assignment))?;

    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Missing parameter name in '{}'", assignment);
    }

    let value = serde_json::from_str(raw.trim())
        .unwrap_or_else(|_| Value::String(raw.trim().to_string()));
    Ok((name.to_string(), value))
}
