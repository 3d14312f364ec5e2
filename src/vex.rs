//! Compilation pipeline.
//!
//! `Vex` owns the long-lived compiler state (source registry, transform
//! cache, style collector) and drives the per-module pipeline: execute the
//! module in the sandbox, serialize each contributing scope's records to CSS,
//! prune unused compositions, and assemble the javascript and declaration
//! artifacts. `process_files` runs the whole project and reports progress
//! through build events.

use crate::adapter::{StyleAdapter, StyleCollector};
use crate::cache::{compute_hash, TransformCache};
use crate::css::CssSerializer;
use crate::discovery::{is_styling_path, normalize_path, SourceRegistry};
use crate::error::{Result, VexError};
use crate::executor::Executor;
use crate::ident::IdentifierMode;
use crate::output::{assemble_dts, assemble_js, Artifact, OutputPaths};
use crate::scope::FileScope;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CompilerOptions {
    pub root_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Suffix for stylesheet artifacts; defaults to `.vanilla.css`.
    pub css_ext: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VexOptions {
    /// Package namespace recorded in every file scope. Empty means none.
    pub namespace: String,
    pub identifier: IdentifierMode,
    /// Abort the pass on the first failing module instead of continuing.
    pub fail_fast: bool,
}

/// Progress events emitted during `process_files`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BuildEvent {
    Scan {
        files: usize,
        styling_modules: usize,
    },
    Transform {
        path: PathBuf,
        changed: bool,
    },
    FileStart {
        path: PathBuf,
    },
    FileComplete {
        path: PathBuf,
        artifacts: usize,
        duration_ms: u64,
    },
    FileError {
        path: PathBuf,
        message: String,
    },
    Done {
        succeeded: usize,
        failed: usize,
        errors: Vec<BuildError>,
        duration_ms: u64,
    },
}

/// One failed module in a build pass, as carried by the terminal event.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildError {
    pub path: PathBuf,
    pub message: String,
}

impl BuildEvent {
    /// NDJSON rendering for host tooling that streams build progress.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug)]
pub struct CompileResult {
    pub source: PathBuf,
    pub css: Artifact,
    pub js: Artifact,
    pub dts: Artifact,
    /// Stylesheets of foreign scopes that contributed records.
    pub extra_styles: Vec<Artifact>,
}

impl CompileResult {
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        [&self.css, &self.js, &self.dts]
            .into_iter()
            .chain(self.extra_styles.iter())
    }
}

#[derive(Debug, Default)]
pub struct ProcessSummary {
    pub results: Vec<CompileResult>,
    pub errors: Vec<BuildError>,
    pub total_duration: Duration,
}

pub struct Vex {
    options: VexOptions,
    paths: OutputPaths,
    registry: SourceRegistry,
    cache: TransformCache,
    collector: StyleCollector,
}

impl Vex {
    pub fn new(compiler: CompilerOptions, options: VexOptions) -> Self {
        let paths = OutputPaths::new(
            compiler.root_dir.clone(),
            compiler.out_dir,
            compiler.css_ext,
        );
        let collector = StyleCollector::new(options.identifier.clone());
        let mut registry = SourceRegistry::new(compiler.root_dir);
        registry.exclude(paths.out_dir.clone());
        Self {
            options,
            registry,
            cache: TransformCache::new(),
            collector,
            paths,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SourceRegistry {
        &mut self.registry
    }

    pub fn cache_mut(&mut self) -> &mut TransformCache {
        &mut self.cache
    }

    pub fn output_paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Register one source file without scanning the whole tree.
    pub fn add_source(&mut self, path: &Path) -> Result<()> {
        self.registry.register(path)?;
        Ok(())
    }

    /// Compile a single styling module into its artifact triple.
    pub fn compile_module(&mut self, path: &Path) -> Result<CompileResult> {
        let path = normalize_path(path.to_path_buf());
        if !is_styling_path(&path) {
            return Err(VexError::execution(&path, "not a styling module"));
        }
        if !self.registry.contains(&path) {
            self.registry.register(&path)?;
        }

        self.collector.reset();
        let mut executor = Executor::new(
            &mut self.registry,
            &mut self.cache,
            &mut self.collector,
            self.options.namespace.clone(),
        );
        let exports = executor.execute(&path)?;

        let own_scope = FileScope::for_module(&path, &self.paths.root_dir, &self.options.namespace);
        let own_key = own_scope.stringify();
        let source_rel = own_scope.file_path.clone();

        // Serialize every contributing scope, accumulating which compositions
        // selectors referenced across all of them.
        let contributing: Vec<String> = self.collector.scopes().map(str::to_string).collect();
        let mut used: HashSet<String> = HashSet::new();
        let mut own_css = String::new();
        let mut extra_styles = Vec::new();
        for scope_key in &contributing {
            let mut serializer = CssSerializer::new(
                self.collector.local_class_names(),
                self.collector.compositions(),
            );
            let css = serializer.serialize(self.collector.records_for(scope_key))?;
            used.extend(serializer.used_compositions());
            if *scope_key == own_key {
                own_css = css;
            } else {
                let scope = FileScope::parse(scope_key);
                extra_styles.push(Artifact {
                    path: self.paths.css_path(&scope.file_path),
                    contents: css,
                });
            }
        }
        for identifier in &used {
            self.collector.mark_composition_used(identifier);
        }
        let unused = self.collector.unused_compositions();

        // Every contributing scope must map back to a registered module.
        let registered: HashSet<String> = self
            .registry
            .files()
            .iter()
            .map(|f| self.paths.relative_source(&f.path))
            .collect();
        let js = assemble_js(
            &exports,
            &source_rel,
            &contributing,
            &unused,
            &registered,
            &self.paths,
        )?;
        let dts = assemble_dts(&exports);

        Ok(CompileResult {
            source: path,
            css: Artifact {
                path: self.paths.css_path(&source_rel),
                contents: own_css,
            },
            js: Artifact {
                path: self.paths.js_path(&source_rel),
                contents: js,
            },
            dts: Artifact {
                path: self.paths.dts_path(&source_rel),
                contents: dts,
            },
            extra_styles,
        })
    }

    /// Compile every styling module under the project root, writing artifacts
    /// to the output directory. Per-module failures are reported through
    /// `on_event` and collected in the summary unless `fail_fast` is set.
    pub fn process_files<F: FnMut(&BuildEvent)>(&mut self, mut on_event: F) -> Result<ProcessSummary> {
        let started = Instant::now();
        let root = self.paths.root_dir.clone();
        let files = self.registry.add_dir(&root)?;

        let modules: Vec<PathBuf> = self
            .registry
            .styling_modules()
            .iter()
            .map(|f| f.path.clone())
            .collect();
        on_event(&BuildEvent::Scan {
            files,
            styling_modules: modules.len(),
        });

        // Every discovered file goes through the transform phase, styling or
        // not. Hashing dominates, so it runs in parallel; the comparison
        // against the cache tells watchers what changed.
        let discovered: Vec<PathBuf> = self
            .registry
            .files()
            .iter()
            .map(|f| f.path.clone())
            .collect();
        let hashes: Vec<(PathBuf, Option<String>)> = discovered
            .par_iter()
            .map(|path| {
                let hash = fs::read_to_string(path).ok().map(|s| compute_hash(&s));
                (path.clone(), hash)
            })
            .collect();
        for (path, hash) in &hashes {
            let changed = match (hash, self.cache.get(path)) {
                (Some(hash), Some(entry)) => *hash != entry.hash,
                _ => true,
            };
            on_event(&BuildEvent::Transform {
                path: path.clone(),
                changed,
            });
        }

        let mut summary = ProcessSummary::default();
        for path in modules {
            on_event(&BuildEvent::FileStart { path: path.clone() });
            let file_started = Instant::now();
            match self.compile_module(&path) {
                Ok(result) => {
                    let count = result.artifacts().count();
                    write_artifacts(&result)?;
                    on_event(&BuildEvent::FileComplete {
                        path: path.clone(),
                        artifacts: count,
                        duration_ms: file_started.elapsed().as_millis() as u64,
                    });
                    summary.results.push(result);
                }
                Err(e) => {
                    let message = e.to_string();
                    on_event(&BuildEvent::FileError {
                        path: path.clone(),
                        message: message.clone(),
                    });
                    tracing::error!(path = %path.display(), error = %message, "module compilation failed");
                    if self.options.fail_fast {
                        return Err(e);
                    }
                    summary.errors.push(BuildError { path, message });
                }
            }
        }

        summary.total_duration = started.elapsed();
        on_event(&BuildEvent::Done {
            succeeded: summary.results.len(),
            failed: summary.errors.len(),
            errors: summary.errors.clone(),
            duration_ms: summary.total_duration.as_millis() as u64,
        });
        Ok(summary)
    }
}

pub(crate) fn write_artifacts(result: &CompileResult) -> Result<()> {
    for artifact in result.artifacts() {
        if let Some(parent) = artifact.path.parent() {
            fs::create_dir_all(parent).map_err(|e| VexError::io(parent, e))?;
        }
        fs::write(&artifact.path, &artifact.contents)
            .map_err(|e| VexError::io(&artifact.path, e))?;
    }
    Ok(())
}
