//! # Vex Compiler
//!
//! Incremental build engine for typescript styling modules (`*.css.ts`).
//! Each styling module is executed in a sandbox and compiled into an
//! artifact triple: a stylesheet, a javascript module re-exporting the
//! evaluated bindings, and a typescript declaration file.
//!
//! ## Pipeline Invariants
//!
//! 1. **Capability injection**: executed modules can only reach the style
//!    adapter and the module loader. There is no ambient filesystem, network,
//!    or clock access inside the sandbox.
//! 2. **Scoped identifiers**: every generated class name, variable, container
//!    and font family is derived from a hash of the owning file scope plus a
//!    per-scope counter. Recompiling the same file yields the same names no
//!    matter which module triggered its execution.
//! 3. **First-encounter ordering**: contributing scopes appear in stylesheet
//!    imports and CSS output in the order their first record was collected.
//!    Imported scopes therefore precede the importing module's own scope.
//! 4. **Deterministic artifacts**: exports serialize sorted by name,
//!    conditional rules merge by condition text in first-encounter order, and
//!    object key order follows source insertion order. Byte-identical input
//!    produces byte-identical artifacts.
//! 5. **One pass, one collector**: the style collector is reset before each
//!    module compilation; a shared module imported several times within a
//!    pass executes exactly once.

mod adapter;
mod builtins;
mod cache;
mod css;
mod discovery;
mod error;
mod eval;
mod executor;
mod ident;
mod output;
mod scope;
mod value;
mod vex;
mod watch;

#[cfg(test)]
mod pipeline_tests;

pub use adapter::{Composition, CssRecordKind, StyleAdapter, StyleCollector};
pub use builtins::STYLE_PACKAGE;
pub use cache::{TransformCache, TransformedModule};
pub use discovery::{is_styling_path, SourceFile, SourceRegistry};
pub use error::{Result, VexError};
pub use eval::{evaluate_module, EvalEnv, ModuleLoader};
pub use executor::Executor;
pub use ident::{IdentParams, IdentifierMode};
pub use output::{Artifact, OutputPaths, DEFAULT_CSS_EXT};
pub use scope::FileScope;
pub use value::{ObjectMap, Value};
pub use vex::{BuildError, BuildEvent, CompileResult, CompilerOptions, ProcessSummary, Vex, VexOptions};
pub use watch::{ChangeKind, EventBuffer, WatchSession};
