//! Source Registry.
//!
//! Tracks every candidate source file under the project root, classifies
//! styling modules by filename, and records each file's import edges so the
//! watch layer can answer "who depends on this file" without re-reading the
//! tree.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{ExportNamedDeclaration, ImportDeclaration};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, VexError};

lazy_static! {
    /// Files whose execution produces stylesheet output.
    static ref CSS_FILE_FILTER: Regex = Regex::new(r"\.css\.(js|mjs|cjs|jsx|ts|tsx)$").unwrap();
    /// Any source file the registry should track.
    static ref SOURCE_FILE_FILTER: Regex = Regex::new(r"\.(js|mjs|cjs|jsx|ts|tsx)$").unwrap();
}

/// Whether the filename marks a styling module (`*.css.ts` and friends).
pub fn is_styling_path(path: &Path) -> bool {
    path.to_str().is_some_and(|s| CSS_FILE_FILTER.is_match(s))
}

pub fn is_source_path(path: &Path) -> bool {
    path.to_str().is_some_and(|s| SOURCE_FILE_FILTER.is_match(s))
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub is_styling: bool,
    /// Resolved paths of relative imports, in source order.
    pub imports: Vec<PathBuf>,
}

/// Registry of all known source files, keyed by absolute path.
#[derive(Debug)]
pub struct SourceRegistry {
    root_dir: PathBuf,
    files: HashMap<PathBuf, SourceFile>,
    excluded: Vec<PathBuf>,
}

impl SourceRegistry {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            files: HashMap::new(),
            excluded: Vec::new(),
        }
    }

    /// Skip a directory during scans. The output directory is excluded this
    /// way so generated javascript is never mistaken for a styling module.
    pub fn exclude(&mut self, dir: impl Into<PathBuf>) {
        self.excluded.push(dir.into());
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Recursively register every source file under `dir`. Returns the number
    /// of files registered. Unreadable entries are skipped with a warning.
    pub fn add_dir(&mut self, dir: &Path) -> Result<usize> {
        if !dir.exists() {
            return Err(VexError::NotFound(dir.to_path_buf()));
        }
        let mut count = 0;
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if self.excluded.iter().any(|ex| path.starts_with(ex)) {
                continue;
            }
            if path.is_file() && is_source_path(path) {
                self.register(path)?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Read and index a single file, replacing any previous entry.
    pub fn register(&mut self, path: &Path) -> Result<&SourceFile> {
        let source = fs::read_to_string(path).map_err(|e| VexError::io(path, e))?;
        let imports = self.scan_imports(path, &source);
        let file = SourceFile {
            path: path.to_path_buf(),
            is_styling: is_styling_path(path),
            imports,
        };
        tracing::debug!(path = %path.display(), styling = file.is_styling, "registered source file");
        Ok(self.files.entry(path.to_path_buf()).and_modify(|f| *f = file.clone()).or_insert(file))
    }

    pub fn refresh(&mut self, path: &Path) -> Result<&SourceFile> {
        self.register(path)
    }

    pub fn remove(&mut self, path: &Path) -> Option<SourceFile> {
        self.files.remove(path)
    }

    pub fn get(&self, path: &Path) -> Option<&SourceFile> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// All registered files, sorted for deterministic iteration.
    pub fn files(&self) -> Vec<&SourceFile> {
        let mut files: Vec<&SourceFile> = self.files.values().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// All registered styling modules, sorted for deterministic iteration.
    pub fn styling_modules(&self) -> Vec<&SourceFile> {
        let mut modules: Vec<&SourceFile> =
            self.files.values().filter(|f| f.is_styling).collect();
        modules.sort_by(|a, b| a.path.cmp(&b.path));
        modules
    }

    /// Files that directly import `path`.
    pub fn dependents(&self, path: &Path) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = self
            .files
            .values()
            .filter(|f| f.imports.iter().any(|i| i == path))
            .map(|f| f.path.clone())
            .collect();
        out.sort();
        out
    }

    /// Resolve a relative specifier against its importer by probing the
    /// extensions a styling project actually uses. `./shared.css` resolves to
    /// `shared.css.ts` on disk.
    pub fn resolve_relative(importer: &Path, specifier: &str) -> Option<PathBuf> {
        let base = importer.parent()?.join(specifier);
        let candidates = [
            base.clone(),
            with_appended_extension(&base, "ts"),
            with_appended_extension(&base, "tsx"),
            with_appended_extension(&base, "js"),
            base.join("index.ts"),
            base.join("index.js"),
        ];
        candidates
            .into_iter()
            .find(|c| c.is_file())
            .map(normalize_path)
    }

    fn scan_imports(&self, path: &Path, source: &str) -> Vec<PathBuf> {
        let allocator = Allocator::default();
        let source_type = SourceType::default()
            .with_typescript(true)
            .with_module(true);
        let ret = Parser::new(&allocator, source, source_type).parse();
        if !ret.errors.is_empty() {
            tracing::warn!(path = %path.display(), "parse errors while scanning imports");
            return Vec::new();
        }
        let mut collector = ImportCollector {
            specifiers: Vec::new(),
        };
        collector.visit_program(&ret.program);

        collector
            .specifiers
            .iter()
            .filter(|s| s.starts_with('.'))
            .filter_map(|s| Self::resolve_relative(path, s))
            .collect()
    }
}

/// Appends `ext` after the existing filename (`a.css` -> `a.css.ts`).
fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

/// Lexically remove `.` and `..` segments so map keys are stable.
pub fn normalize_path(path: PathBuf) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

struct ImportCollector {
    specifiers: Vec<String>,
}

impl<'a> Visit<'a> for ImportCollector {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        if !decl.import_kind.is_type() {
            self.specifiers.push(decl.source.value.to_string());
        }
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &decl.source {
            if !decl.export_kind.is_type() {
                self.specifiers.push(source.value.to_string());
            }
        }
    }
}
