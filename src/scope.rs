//! File scopes.
//!
//! A scope is the (module path, optional package name) pair under which a
//! style record is filed. Scopes are serialized to a single string key when
//! bucketing collector output; the serialization escapes the separator so
//! that paths or package names containing `$` round-trip unambiguously.

use serde::{Deserialize, Serialize};
use std::path::Path;

const SEPARATOR: &str = "$$$";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileScope {
    pub file_path: String,
    pub package_name: Option<String>,
}

impl FileScope {
    pub fn new(file_path: impl Into<String>, package_name: Option<String>) -> Self {
        Self {
            file_path: file_path.into(),
            package_name,
        }
    }

    /// Build the scope for a module: path relative to the project root
    /// (forward slashes), package name from the configured namespace.
    pub fn for_module(path: &Path, root_dir: &Path, namespace: &str) -> Self {
        let relative = path.strip_prefix(root_dir).unwrap_or(path);
        let file_path = relative.to_string_lossy().replace('\\', "/");
        let package_name = if namespace.is_empty() {
            None
        } else {
            Some(namespace.to_string())
        };
        Self {
            file_path,
            package_name,
        }
    }

    pub fn stringify(&self) -> String {
        match &self.package_name {
            Some(pkg) => format!("{}{}{}", escape(&self.file_path), SEPARATOR, escape(pkg)),
            None => escape(&self.file_path),
        }
    }

    pub fn parse(serialized: &str) -> Self {
        match serialized.split_once(SEPARATOR) {
            Some((path, pkg)) => Self {
                file_path: unescape(path),
                package_name: Some(unescape(pkg)),
            },
            None => Self {
                file_path: unescape(serialized),
                package_name: None,
            },
        }
    }
}

fn escape(component: &str) -> String {
    component.replace('%', "%25").replace('$', "%24")
}

fn unescape(component: &str) -> String {
    component.replace("%24", "$").replace("%25", "%")
}
