//! Transform Cache.
//!
//! Memoizes the per-file preparation work (read, content hash, file scope
//! computation) so unchanged modules are not re-read between compilations.
//! Entries are `Arc`-shared; the executor holds them across a pass while the
//! watch layer may invalidate concurrently-discovered stale paths.

use crate::error::{Result, VexError};
use crate::scope::FileScope;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A source module prepared for execution.
#[derive(Debug, Clone)]
pub struct TransformedModule {
    pub path: PathBuf,
    pub hash: String,
    /// `Some` for styling modules; plain helper modules carry no scope.
    pub file_scope: Option<FileScope>,
    pub source: String,
}

pub fn compute_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Default)]
pub struct TransformCache {
    entries: HashMap<PathBuf, Arc<TransformedModule>>,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the prepared module for `path`, re-reading only when the cached
    /// content hash no longer matches the file on disk.
    pub fn get_or_transform(
        &mut self,
        path: &Path,
        root_dir: &Path,
        namespace: &str,
    ) -> Result<Arc<TransformedModule>> {
        let source = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VexError::NotFound(path.to_path_buf())
            } else {
                VexError::io(path, e)
            }
        })?;
        let hash = compute_hash(&source);

        if let Some(entry) = self.entries.get(path) {
            if entry.hash == hash {
                return Ok(Arc::clone(entry));
            }
            tracing::debug!(path = %path.display(), "transform cache stale, re-preparing");
        }

        let file_scope = crate::discovery::is_styling_path(path)
            .then(|| FileScope::for_module(path, root_dir, namespace));
        let module = Arc::new(TransformedModule {
            path: path.to_path_buf(),
            hash,
            file_scope,
            source,
        });
        self.entries.insert(path.to_path_buf(), Arc::clone(&module));
        Ok(module)
    }

    pub fn get(&self, path: &Path) -> Option<Arc<TransformedModule>> {
        self.entries.get(path).map(Arc::clone)
    }

    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_hit_reuses_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.css.ts");
        fs::write(&path, "export const x = 1;").unwrap();

        let mut cache = TransformCache::new();
        let first = cache.get_or_transform(&path, dir.path(), "").unwrap();
        let second = cache.get_or_transform(&path, dir.path(), "").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_changed_content_reprepares() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.css.ts");
        fs::write(&path, "export const x = 1;").unwrap();

        let mut cache = TransformCache::new();
        let first = cache.get_or_transform(&path, dir.path(), "").unwrap();
        fs::write(&path, "export const x = 2;").unwrap();
        let second = cache.get_or_transform(&path, dir.path(), "").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.hash, second.hash);
    }

    #[test]
    fn test_scope_only_for_styling_modules() {
        let dir = TempDir::new().unwrap();
        let styling = dir.path().join("a.css.ts");
        let helper = dir.path().join("util.ts");
        fs::write(&styling, "").unwrap();
        fs::write(&helper, "").unwrap();

        let mut cache = TransformCache::new();
        let styled = cache.get_or_transform(&styling, dir.path(), "pkg").unwrap();
        let plain = cache.get_or_transform(&helper, dir.path(), "pkg").unwrap();
        assert!(styled.file_scope.is_some());
        assert!(plain.file_scope.is_none());
        assert_eq!(
            styled.file_scope.as_ref().unwrap().package_name.as_deref(),
            Some("pkg")
        );
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let mut cache = TransformCache::new();
        let result = cache.get_or_transform(Path::new("/missing.css.ts"), Path::new("/"), "");
        assert!(matches!(result, Err(VexError::NotFound(_))));
    }

    #[test]
    fn test_invalidate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.css.ts");
        fs::write(&path, "export const x = 1;").unwrap();

        let mut cache = TransformCache::new();
        cache.get_or_transform(&path, dir.path(), "").unwrap();
        assert!(cache.invalidate(&path));
        assert!(!cache.invalidate(&path));
        assert!(cache.is_empty());
    }
}
