//! Artifact assembly.
//!
//! Each compiled styling module yields a triple: the stylesheet, a javascript
//! module re-exporting the evaluated bindings, and a declaration file typed
//! from the export shapes. The javascript module imports the stylesheet of
//! every scope that contributed records during execution, in first-encounter
//! order, so bundlers pull in transitively required CSS.

use crate::error::{Result, VexError};
use crate::scope::FileScope;
use crate::value::{format_number, ObjectMap, Value};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Default suffix appended to the source filename for the stylesheet
/// artifact (`button.css.ts` -> `button.css.ts.vanilla.css`).
pub const DEFAULT_CSS_EXT: &str = ".vanilla.css";

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: String,
}

/// Output path mapping for one project.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub root_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Custom stylesheet extension; `None` means the default suffix.
    pub css_ext: Option<String>,
}

impl OutputPaths {
    pub fn new(root_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>, css_ext: Option<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            out_dir: out_dir.into(),
            css_ext,
        }
    }

    /// Source path relative to the project root, forward slashes.
    pub fn relative_source(&self, source: &Path) -> String {
        source
            .strip_prefix(&self.root_dir)
            .unwrap_or(source)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Stylesheet path. By default the full source name keeps its language
    /// extension (`a.css.ts` -> `a.css.ts.vanilla.css`); a custom extension
    /// replaces the language extension instead (`a.css.ts` with
    /// `.generated.css` -> `a.css.generated.css`).
    pub fn css_path(&self, source_rel: &str) -> PathBuf {
        match &self.css_ext {
            Some(ext) => {
                let name = strip_last_extension(source_rel);
                let file = if name.ends_with(ext.as_str()) {
                    name.to_string()
                } else {
                    format!("{}{}", name, ext)
                };
                self.out_dir.join(file)
            }
            None => self
                .out_dir
                .join(format!("{}{}", source_rel, DEFAULT_CSS_EXT)),
        }
    }

    pub fn js_path(&self, source_rel: &str) -> PathBuf {
        self.out_dir.join(replace_last_extension(source_rel, "js"))
    }

    pub fn dts_path(&self, source_rel: &str) -> PathBuf {
        self.out_dir.join(replace_last_extension(source_rel, "d.ts"))
    }
}

/// `button.css.ts` -> `button.css.js` / `button.css.d.ts`.
fn replace_last_extension(source_rel: &str, ext: &str) -> String {
    format!("{}.{}", strip_last_extension(source_rel), ext)
}

fn strip_last_extension(source_rel: &str) -> &str {
    source_rel
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(source_rel)
}

/// Assemble the javascript module for one compiled styling file.
///
/// `contributing_scopes` are the serialized scopes that received records, in
/// first-encounter order; every scope must name a module in `registered`
/// (relative source paths). `unused_compositions` are composition identifiers
/// never referenced by a selector, pruned from exported class lists.
pub fn assemble_js(
    exports: &ObjectMap,
    source_rel: &str,
    contributing_scopes: &[String],
    unused_compositions: &[&str],
    registered: &HashSet<String>,
    paths: &OutputPaths,
) -> Result<String> {
    let mut lines = Vec::new();

    let js_dir = paths
        .js_path(source_rel)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    for serialized in contributing_scopes {
        let scope = FileScope::parse(serialized);
        if !registered.contains(&scope.file_path) {
            return Err(VexError::ScopeNotFound(serialized.clone()));
        }
        let css = paths.css_path(&scope.file_path);
        let rel = relative_to(&js_dir, &css);
        lines.push(format!("import '{}';", rel));
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }

    let pruner = composition_pruner(unused_compositions);
    let mut names: Vec<&str> = exports.keys().collect();
    names.sort_unstable();
    for name in names {
        let value = exports.get(name).ok_or_else(|| {
            VexError::Serialize(format!("export '{}' disappeared during assembly", name))
        })?;
        let mut literal = js_literal(value)?;
        if let Some(re) = &pruner {
            literal = re.replace_all(&literal, "").into_owned();
        }
        lines.push(format!("export var {} = {};", name, literal));
    }

    Ok(format!("{}\n", lines.join("\n")))
}

/// Assemble the declaration file: every export typed from its value shape.
pub fn assemble_dts(exports: &ObjectMap) -> String {
    let mut names: Vec<&str> = exports.keys().collect();
    names.sort_unstable();
    let mut lines = Vec::new();
    for name in names {
        if let Some(value) = exports.get(name) {
            lines.push(format!("export declare var {}: {};", name, dts_type(value, 1)));
        }
    }
    format!("{}\n", lines.join("\n"))
}

fn composition_pruner(unused: &[&str]) -> Option<Regex> {
    if unused.is_empty() {
        return None;
    }
    let alternatives: Vec<String> = unused.iter().map(|id| regex::escape(id)).collect();
    // Strip the identifier and its trailing separator from joined class lists.
    Regex::new(&format!("({})\\s", alternatives.join("|"))).ok()
}

fn js_literal(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok("null".to_string()),
        Value::Undefined => Ok("undefined".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(format_number(*n)),
        Value::Str(s) => Ok(quote_single(s)),
        Value::Array(items) => {
            let rendered: Result<Vec<String>> = items.iter().map(js_literal).collect();
            Ok(format!("[{}]", rendered?.join(", ")))
        }
        Value::Object(map) => {
            let mut parts = Vec::with_capacity(map.len());
            for (key, value) in map.iter() {
                parts.push(format!("{}: {}", quote_single(key), js_literal(value)?));
            }
            Ok(format!("{{{}}}", parts.join(", ")))
        }
        Value::Builtin(_) => Err(VexError::Serialize(
            "styling functions cannot be exported".to_string(),
        )),
    }
}

fn quote_single(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n");
    format!("'{}'", escaped)
}

fn dts_type(value: &Value, depth: usize) -> String {
    match value {
        Value::Str(_) => "string".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Object(map) => {
            let pad = "    ".repeat(depth);
            let closing = "    ".repeat(depth - 1);
            let mut out = String::from("{\n");
            for (key, value) in map.iter() {
                out.push_str(&format!(
                    "{}{}: {};\n",
                    pad,
                    dts_key(key),
                    dts_type(value, depth + 1)
                ));
            }
            out.push_str(&closing);
            out.push('}');
            out
        }
        _ => "any".to_string(),
    }
}

fn dts_key(key: &str) -> String {
    let plain = !key.is_empty()
        && !key.starts_with(|c: char| c.is_ascii_digit())
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if plain {
        key.to_string()
    } else {
        quote_single(key)
    }
}

/// Relative path from `from_dir` to `to`, forward slashes, with a leading
/// `./` unless it already climbs out of the directory.
pub fn relative_to(from_dir: &Path, to: &Path) -> String {
    let from: Vec<Component> = from_dir.components().collect();
    let target: Vec<Component> = to.components().collect();

    let mut shared = 0;
    while shared < from.len() && shared < target.len() && from[shared] == target[shared] {
        shared += 1;
    }

    let mut parts: Vec<String> = Vec::new();
    for _ in shared..from.len() {
        parts.push("..".to_string());
    }
    for component in &target[shared..] {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }

    let joined = parts.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{}", joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, Value)]) -> ObjectMap {
        let mut map = ObjectMap::new();
        for (k, v) in pairs {
            map.insert(*k, v.clone());
        }
        map
    }

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    fn paths() -> OutputPaths {
        OutputPaths::new("/proj", "/proj/out", None)
    }

    fn registered(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_artifact_paths() {
        let paths = paths();
        assert_eq!(
            paths.css_path("src/button.css.ts"),
            PathBuf::from("/proj/out/src/button.css.ts.vanilla.css")
        );
        assert_eq!(
            paths.js_path("src/button.css.ts"),
            PathBuf::from("/proj/out/src/button.css.js")
        );
        assert_eq!(
            paths.dts_path("src/button.css.ts"),
            PathBuf::from("/proj/out/src/button.css.d.ts")
        );
    }

    #[test]
    fn test_custom_extension_replaces_language_extension() {
        let paths = OutputPaths::new("/proj", "/proj/out", Some(".generated.css".to_string()));
        assert_eq!(
            paths.css_path("src/button.css.ts"),
            PathBuf::from("/proj/out/src/button.css.generated.css")
        );
        // A name already carrying the extension is not doubled.
        assert_eq!(
            paths.css_path("src/button.generated.css.ts"),
            PathBuf::from("/proj/out/src/button.generated.css")
        );
    }

    #[test]
    fn test_exports_sorted_and_quoted() {
        let exports = obj(&[
            ("zebra", s("z1")),
            ("apple", Value::Object(obj(&[("1/2", s("half")), ("full", s("f"))]))),
        ]);
        let js = assemble_js(&exports, "a.css.ts", &[], &[], &registered(&[]), &paths()).unwrap();
        assert_eq!(
            js,
            "export var apple = {'1/2': 'half', 'full': 'f'};\nexport var zebra = 'z1';\n"
        );
    }

    #[test]
    fn test_import_lines_for_contributing_scopes() {
        let scopes = vec![
            FileScope::new("shared.css.ts", None).stringify(),
            FileScope::new("button.css.ts", None).stringify(),
        ];
        let exports = obj(&[("button", s("b0"))]);
        let js = assemble_js(
            &exports,
            "button.css.ts",
            &scopes,
            &[],
            &registered(&["shared.css.ts", "button.css.ts"]),
            &paths(),
        )
        .unwrap();
        let expected = "\
import './shared.css.ts.vanilla.css';
import './button.css.ts.vanilla.css';

export var button = 'b0';
";
        assert_eq!(js, expected);
    }

    #[test]
    fn test_unregistered_scope_module_is_error() {
        let scopes = vec![FileScope::new("ghost.css.ts", None).stringify()];
        let result = assemble_js(
            &obj(&[]),
            "a.css.ts",
            &scopes,
            &[],
            &registered(&["a.css.ts"]),
            &paths(),
        );
        assert!(matches!(result, Err(VexError::ScopeNotFound(_))));
    }

    #[test]
    fn test_unused_composition_pruned_from_class_list() {
        let exports = obj(&[
            ("composed", s("dead0 base1 extra2")),
            ("kept", s("base1")),
        ]);
        let js = assemble_js(
            &exports,
            "a.css.ts",
            &[],
            &["dead0"],
            &registered(&[]),
            &paths(),
        )
        .unwrap();
        assert_eq!(
            js,
            "export var composed = 'base1 extra2';\nexport var kept = 'base1';\n"
        );
    }

    #[test]
    fn test_dts_shapes() {
        let exports = obj(&[
            ("cls", s("a0")),
            (
                "vars",
                Value::Object(obj(&[(
                    "color",
                    Value::Object(obj(&[("brand", s("var(--x)"))])),
                )])),
            ),
        ]);
        let dts = assemble_dts(&exports);
        let expected = "\
export declare var cls: string;
export declare var vars: {
    color: {
        brand: string;
    };
};
";
        assert_eq!(dts, expected);
    }

    #[test]
    fn test_relative_path_climbs_directories() {
        assert_eq!(
            relative_to(Path::new("/out/a/b"), Path::new("/out/c.css")),
            "../../c.css"
        );
        assert_eq!(
            relative_to(Path::new("/out"), Path::new("/out/c.css")),
            "./c.css"
        );
    }
}
