// src/core/scanner.rs
use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::ScanConfig;
use crate::error::{AlgodocError, Result};
use super::descriptor::{FunctionDescriptor, LoadedModule, ModuleLoader, ModuleRef};
use super::docstring::DocCommentParser;
use super::extractor::{dedupe_imports, ParameterOverrides, SignatureExtractor};
use super::languages::{PythonParser, PythonSourceLoader};
use super::model::{Catalog, CatalogEntry, CategoryLabels, ParameterSpec, PortSpec, Role};

const DEFAULT_CATEGORY: &str = "uncategorized";

/// A catalog entry built from an edited code cell
#[derive(Debug, Clone)]
pub struct SnippetEntry {
    pub entry: CatalogEntry,

    /// Code after the function (test calls, prints) was dropped
    pub trailing_code_removed: bool,

    /// The snippet as kept, up to the end of the function
    pub code: String,
}

/// Walks a function library and builds its catalog
pub struct LibraryScanner {
    config: ScanConfig,
    doc_parser: DocCommentParser,
    extractor: SignatureExtractor,
    snippet_parser: PythonParser,
    overrides: BTreeMap<String, ParameterOverrides>,
}

impl LibraryScanner {
    pub fn new(config: &ScanConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            doc_parser: DocCommentParser::new(),
            extractor: SignatureExtractor::new()?,
            snippet_parser: PythonParser::new()?,
            overrides: BTreeMap::new(),
        })
    }

    /// Parameter overrides keyed by entry id
    pub fn with_overrides(mut self, overrides: BTreeMap<String, ParameterOverrides>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Scan a package directory, reading modules from disk
    pub fn scan<P: AsRef<Path>>(&self, root: P) -> Result<Catalog> {
        let mut loader = PythonSourceLoader::new(self.config.max_file_size)?;
        self.scan_with_loader(root, &mut loader)
    }

    /// Scan a package directory with a caller-provided loader
    pub fn scan_with_loader<P: AsRef<Path>>(
        &self,
        root: P,
        loader: &mut dyn ModuleLoader,
    ) -> Result<Catalog> {
        let modules = discover_modules(root.as_ref())?;
        Ok(self.scan_modules(modules, loader))
    }

    /// Load each module once, in lexicographic order, and keep the first
    /// entry seen for every id. Modules that fail to load are skipped.
    pub fn scan_modules(&self, mut modules: Vec<ModuleRef>, loader: &mut dyn ModuleLoader) -> Catalog {
        modules.sort();
        modules.dedup_by(|a, b| a.name == b.name);

        let mut catalog = Catalog::new();
        let mut failed = 0usize;

        for module in &modules {
            let loaded = match loader.load(module) {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!("Skipping module {}: {}", module.name, e);
                    failed += 1;
                    continue;
                }
            };

            for entry in self.scan_module(&loaded) {
                let id = entry.id.clone();
                if !catalog.insert(entry) {
                    debug!(
                        "Duplicate entry '{}' in {} ignored, first declared in {}",
                        id,
                        module.name,
                        catalog.get(&id).map(|e| e.module.as_str()).unwrap_or("?")
                    );
                }
            }
        }

        info!(
            "Scanned {} modules ({} failed): {} entries in {} categories",
            modules.len(),
            failed,
            catalog.len(),
            catalog.categories().count()
        );

        catalog
    }

    /// Scan and re-key the catalog by display label
    pub fn scan_with_labels<P: AsRef<Path>>(
        &self,
        root: P,
        labels: &dyn CategoryLabels,
    ) -> Result<BTreeMap<String, Vec<CatalogEntry>>> {
        Ok(self.scan(root)?.with_labels(labels))
    }

    /// Entries for the documented functions defined in one module, in definition order
    pub fn scan_module(&self, module: &LoadedModule) -> Vec<CatalogEntry> {
        module
            .functions
            .iter()
            .filter(|function| function.module == module.name)
            .filter(|function| self.config.include_private || !function.name.starts_with('_'))
            .filter_map(|function| self.entry_from_descriptor(function))
            .collect()
    }

    /// `None` unless the function's doc comment has an identity block
    pub fn entry_from_descriptor(&self, function: &FunctionDescriptor) -> Option<CatalogEntry> {
        let docstring = function.docstring.as_deref()?;
        if !self.doc_parser.has_identity_section(docstring) {
            return None;
        }
        Some(self.build_entry(function, docstring))
    }

    /// Build an entry from a free-standing snippet. The identity block is
    /// optional here but the function must be documented.
    pub fn entry_from_code(&mut self, code: &str) -> Result<SnippetEntry> {
        let snippet = self
            .snippet_parser
            .parse_snippet(code, "")
            .ok_or_else(|| AlgodocError::Parser("no function definition found in code".to_string()))?;

        let docstring = snippet.function.docstring.clone().ok_or_else(|| {
            AlgodocError::Parser(format!("function '{}' has no docstring", snippet.function.name))
        })?;

        if snippet.has_trailing_code {
            debug!("Dropped trailing code after '{}'", snippet.function.name);
        }

        Ok(SnippetEntry {
            entry: self.build_entry(&snippet.function, &docstring),
            trailing_code_removed: snippet.has_trailing_code,
            code: snippet.code,
        })
    }

    fn build_entry(&self, function: &FunctionDescriptor, docstring: &str) -> CatalogEntry {
        let parsed = self.doc_parser.parse(docstring);
        let identity = parsed.identity.clone().unwrap_or_default();

        let no_overrides = ParameterOverrides::new();
        let overrides = self.overrides.get(&function.name).unwrap_or(&no_overrides);
        let specs = self.extractor.extract(function, &parsed, overrides);
        let (inputs, parameters) = split_inputs(specs);
        let outputs = self.extractor.infer_outputs(function, &parsed);

        let imports = match identity.imports {
            Some(declared) if !declared.is_empty() => dedupe_imports(declared),
            _ => dedupe_imports(function.module_imports.iter().cloned()),
        };

        let display_name = identity.name.unwrap_or_else(|| function.name.clone());

        CatalogEntry {
            id: function.name.clone(),
            source_template: format!("# {}\n{}", display_name, function.source),
            display_name,
            category: identity.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            description: parsed.description,
            ai_prompt_template: identity.prompt,
            imports,
            parameters,
            inputs,
            outputs,
            module: function.module.clone(),
        }
    }
}

/// Input-role specs become input ports; the rest stay parameters
fn split_inputs(specs: Vec<ParameterSpec>) -> (Vec<PortSpec>, Vec<ParameterSpec>) {
    let (inputs, parameters): (Vec<_>, Vec<_>) =
        specs.into_iter().partition(|spec| spec.role == Role::Input);

    let ports = inputs
        .into_iter()
        .map(|spec| PortSpec {
            name: spec.name,
            kind: spec.kind,
            description: spec.description,
        })
        .collect();

    (ports, parameters)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.') || name == "__pycache__")
            .unwrap_or(true)
}

/// Every leaf module (`.py` file other than `__init__.py`) under `root`,
/// named by dotted path from the root package and sorted by that name.
pub fn discover_modules(root: &Path) -> Result<Vec<ModuleRef>> {
    if !root.is_dir() {
        return Err(AlgodocError::NotAPackage(root.display().to_string()));
    }

    let root = root
        .canonicalize()
        .map_err(|e| AlgodocError::FileSystem(format!("{}: {}", root.display(), e)))?;
    let package = root
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| AlgodocError::NotAPackage(root.display().to_string()))?
        .to_string();

    let mut modules = Vec::new();
    let walker = WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable path under {}: {}", root.display(), e);
                continue;
            }
        };
        let path = entry.path();

        if !entry.file_type().is_file()
            || path.extension().and_then(|ext| ext.to_str()) != Some("py")
            || entry.file_name() == "__init__.py"
        {
            continue;
        }

        let Ok(relative) = path.strip_prefix(&root) else {
            continue;
        };
        let mut parts = vec![package.clone()];
        for component in relative.with_extension("").components() {
            match component.as_os_str().to_str() {
                Some(part) => parts.push(part.to_string()),
                None => {
                    warn!("Skipping module with non UTF-8 path: {}", path.display());
                    parts.clear();
                    break;
                }
            }
        }
        if parts.is_empty() {
            continue;
        }

        modules.push(ModuleRef {
            name: parts.join("."),
            path: path.to_path_buf(),
        });
    }

    modules.sort();
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::literal::Literal;
    use crate::core::model::ParamKind;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Serves canned modules and records the load order
    struct FakeLoader {
        modules: HashMap<String, LoadedModule>,
        loaded: Vec<String>,
    }

    impl ModuleLoader for FakeLoader {
        fn load(&mut self, module: &ModuleRef) -> Result<LoadedModule> {
            self.loaded.push(module.name.clone());
            self.modules.get(&module.name).cloned().ok_or_else(|| AlgodocError::ModuleImport {
                module: module.name.clone(),
                reason: "boom".to_string(),
            })
        }
    }

    fn function(module: &str, name: &str, category: &str) -> FunctionDescriptor {
        FunctionDescriptor {
            name: name.to_string(),
            module: module.to_string(),
            params: vec![],
            return_annotation: None,
            docstring: Some(format!("Does {}.\n\nIdentity:\n    category: {}", name, category)),
            source: format!("def {}():\n    pass", name),
            module_imports: vec!["import numpy as np".to_string()],
        }
    }

    fn module_ref(name: &str) -> ModuleRef {
        ModuleRef {
            name: name.to_string(),
            path: format!("{}.py", name.replace('.', "/")).into(),
        }
    }

    fn scanner() -> LibraryScanner {
        LibraryScanner::new(&ScanConfig::default()).unwrap()
    }

    #[test]
    fn test_first_module_in_sorted_order_wins() {
        let mut modules = HashMap::new();
        modules.insert(
            "lib.b".to_string(),
            LoadedModule {
                name: "lib.b".to_string(),
                functions: vec![function("lib.b", "mean", "plotting")],
                imports: vec![],
            },
        );
        modules.insert(
            "lib.a".to_string(),
            LoadedModule {
                name: "lib.a".to_string(),
                functions: vec![function("lib.a", "mean", "eda"), function("lib.a", "median", "eda")],
                imports: vec![],
            },
        );

        let mut loader = FakeLoader { modules, loaded: vec![] };
        let catalog = scanner().scan_modules(
            vec![module_ref("lib.broken"), module_ref("lib.b"), module_ref("lib.a")],
            &mut loader,
        );

        assert_eq!(loader.loaded, vec!["lib.a", "lib.b", "lib.broken"]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("mean").unwrap().module, "lib.a");
        assert_eq!(catalog.get("mean").unwrap().category, "eda");
        assert!(catalog.category("plotting").is_empty());
    }

    #[test]
    fn test_candidate_filters() {
        let mut private = function("lib.a", "_helper", "eda");
        private.docstring = Some("Identity:\n    name: Helper".to_string());
        let mut undocumented = function("lib.a", "plain", "eda");
        undocumented.docstring = Some("Just a helper.".to_string());
        let reexported = function("lib.other", "foreign", "eda");

        let module = LoadedModule {
            name: "lib.a".to_string(),
            functions: vec![private, undocumented, reexported, function("lib.a", "kept", "eda")],
            imports: vec![],
        };

        let entries = scanner().scan_module(&module);
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["kept"]);

        let mut config = ScanConfig::default();
        config.include_private = true;
        let entries = LibraryScanner::new(&config).unwrap().scan_module(&module);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].display_name, "Helper");
        assert_eq!(entries[0].category, "uncategorized");
    }

    #[test]
    fn test_entry_fields_from_descriptor() {
        let mut function = function("lib.stats", "rolling", "eda");
        function.params = vec![
            crate::core::SignatureParam::new("df"),
            crate::core::SignatureParam::new("window").with_default(Literal::Int(3)),
        ];
        function.docstring = Some(
            "Rolling mean.\n\nIdentity:\n    name: Rolling\n    category: eda\n    prompt: Smooth {{VAR_NAME}}\n\nParameters:\ndf (pandas.DataFrame): Source table"
                .to_string(),
        );

        let entry = scanner().entry_from_descriptor(&function).unwrap();
        assert_eq!(entry.display_name, "Rolling");
        assert_eq!(entry.ai_prompt_template.as_deref(), Some("Smooth {{VAR_NAME}}"));
        assert_eq!(entry.imports, vec!["import numpy as np"]);
        assert_eq!(entry.source_template, "# Rolling\ndef rolling():\n    pass");
        assert_eq!(entry.inputs.len(), 1);
        assert_eq!(entry.inputs[0].kind, ParamKind::DataFrame);
        assert_eq!(entry.inputs[0].description, "Source table");
        assert_eq!(entry.parameters.len(), 1);
        assert_eq!(entry.parameters[0].name, "window");
    }

    #[test]
    fn test_discover_modules_names_and_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("algorithm");
        std::fs::create_dir_all(root.join("eda/__pycache__")).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        std::fs::write(root.join("__init__.py"), "").unwrap();
        std::fs::write(root.join("zeta.py"), "").unwrap();
        std::fs::write(root.join("eda/summary.py"), "").unwrap();
        std::fs::write(root.join("eda/__pycache__/summary.py"), "").unwrap();
        std::fs::write(root.join(".hidden/secret.py"), "").unwrap();
        std::fs::write(root.join("notes.txt"), "").unwrap();

        let names: Vec<String> = discover_modules(&root)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["algorithm.eda.summary", "algorithm.zeta"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_does_not_abort_discovery() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("algorithm");
        let locked = root.join("locked");
        std::fs::create_dir_all(&locked).unwrap();
        std::fs::write(root.join("open.py"), "").unwrap();
        std::fs::write(locked.join("hidden.py"), "").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let result = discover_modules(&root);
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        let names: Vec<String> = result.unwrap().into_iter().map(|m| m.name).collect();
        assert!(names.contains(&"algorithm.open".to_string()));
    }

    #[test]
    fn test_discover_requires_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("module.py");
        std::fs::write(&file, "").unwrap();
        assert!(matches!(discover_modules(&file), Err(AlgodocError::NotAPackage(_))));
    }

    #[test]
    fn test_entry_from_code() {
        let code = "import pandas as pd\n\ndef clip(df, upper=1.0):\n    \"\"\"Clip values.\n\n    Parameters:\n    upper (float): Upper bound\n    \"\"\"\n    return df.clip(upper=upper)\n\nclip(pd.DataFrame())\n";
        let mut scanner = scanner();
        let snippet = scanner.entry_from_code(code).unwrap();

        assert!(snippet.trailing_code_removed);
        assert!(!snippet.code.contains("clip(pd.DataFrame())"));
        assert_eq!(snippet.entry.id, "clip");
        assert_eq!(snippet.entry.category, "uncategorized");
        assert_eq!(snippet.entry.imports, vec!["import pandas as pd"]);
        assert_eq!(snippet.entry.parameter("upper").unwrap().description, "Upper bound");

        assert!(scanner.entry_from_code("x = 1\n").is_err());
        assert!(scanner.entry_from_code("def f():\n    pass\n").is_err());
    }
}
