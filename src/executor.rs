//! Module executor.
//!
//! Drives sandboxed evaluation of a styling module and its transitive
//! relative imports. The executor itself is the capability environment: it
//! resolves imports through the source registry, prepares modules through the
//! transform cache, and routes styling side effects into the collector under
//! the correct file scope. Exports are memoized per pass so a shared theme
//! module imported by several files executes exactly once.

use crate::adapter::{Composition, CssRecordKind, StyleAdapter, StyleCollector};
use crate::builtins;
use crate::cache::TransformCache;
use crate::discovery::{normalize_path, SourceRegistry};
use crate::error::{Result, VexError};
use crate::eval::{evaluate_module, ModuleLoader};
use crate::ident::IdentifierMode;
use crate::scope::FileScope;
use crate::value::{ObjectMap, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub struct Executor<'a> {
    registry: &'a mut SourceRegistry,
    cache: &'a mut TransformCache,
    collector: &'a mut StyleCollector,
    namespace: String,
    executed: HashMap<PathBuf, ObjectMap>,
    in_flight: HashSet<PathBuf>,
}

impl<'a> Executor<'a> {
    pub fn new(
        registry: &'a mut SourceRegistry,
        cache: &'a mut TransformCache,
        collector: &'a mut StyleCollector,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            cache,
            collector,
            namespace: namespace.into(),
            executed: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Execute the module at `path`, returning its export map.
    pub fn execute(&mut self, path: &Path) -> Result<ObjectMap> {
        let path = normalize_path(path.to_path_buf());
        self.execute_module(&path)
    }

    fn execute_module(&mut self, path: &Path) -> Result<ObjectMap> {
        if let Some(exports) = self.executed.get(path) {
            return Ok(exports.clone());
        }
        if !self.in_flight.insert(path.to_path_buf()) {
            return Err(VexError::execution(
                path,
                "circular import detected during module execution",
            ));
        }

        let root_dir = self.registry.root_dir().to_path_buf();
        let module = match self.cache.get_or_transform(path, &root_dir, &self.namespace) {
            Ok(module) => module,
            Err(e) => {
                self.in_flight.remove(path);
                return Err(e);
            }
        };

        let scoped = module.file_scope.clone();
        if let Some(scope) = scoped.clone() {
            self.collector.begin_scope(scope);
        }
        let result = evaluate_module(path, &module.source, self);
        // The scope must close even when evaluation fails.
        if scoped.is_some() {
            self.collector.end_scope();
        }
        self.in_flight.remove(path);
        let exports = result?;
        self.executed.insert(path.to_path_buf(), exports.clone());
        tracing::debug!(path = %path.display(), exports = exports.len(), "executed module");
        Ok(exports)
    }
}

impl ModuleLoader for Executor<'_> {
    fn load_module(&mut self, specifier: &str, importer: &Path) -> Result<Value> {
        if specifier == builtins::STYLE_PACKAGE {
            return Ok(builtins::namespace());
        }
        if !specifier.starts_with('.') {
            return Err(VexError::execution(
                importer,
                format!(
                    "cannot import '{}': only relative modules and the styling package are available",
                    specifier
                ),
            ));
        }
        let resolved = SourceRegistry::resolve_relative(importer, specifier).ok_or_else(|| {
            VexError::execution(
                importer,
                format!("unresolved import '{}'", specifier),
            )
        })?;
        if !self.registry.contains(&resolved) {
            self.registry.register(&resolved)?;
        }
        let exports = self.execute_module(&resolved)?;
        Ok(Value::Object(exports))
    }
}

impl StyleAdapter for Executor<'_> {
    fn append_css(&mut self, record: CssRecordKind) -> Result<()> {
        self.collector.append_css(record)
    }

    fn register_class_name(&mut self, name: &str) {
        self.collector.register_class_name(name);
    }

    fn register_composition(&mut self, composition: Composition) {
        self.collector.register_composition(composition);
    }

    fn mark_composition_used(&mut self, identifier: &str) {
        self.collector.mark_composition_used(identifier);
    }

    fn generate_scoped_identifier(&mut self, debug_id: Option<&str>) -> Result<String> {
        self.collector.generate_scoped_identifier(debug_id)
    }

    fn ident_mode(&self) -> &IdentifierMode {
        self.collector.ident_mode()
    }

    fn begin_scope(&mut self, scope: FileScope) {
        self.collector.begin_scope(scope);
    }

    fn end_scope(&mut self) {
        self.collector.end_scope();
    }

    fn current_scope(&self) -> Option<&FileScope> {
        self.collector.current_scope()
    }
}
