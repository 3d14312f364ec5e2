//! Identifier generation for scoped class names, CSS variables, containers
//! and font families.
//!
//! Every generated identifier is derived from a hash of the originating file
//! scope plus a per-scope counter, so recompiling the same file always yields
//! the same names regardless of which module triggered its execution.

use crate::scope::FileScope;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Parameters handed to a custom identifier function.
#[derive(Debug, Clone)]
pub struct IdentParams {
    pub hash: String,
    pub file_path: String,
    pub debug_id: Option<String>,
    pub package_name: Option<String>,
}

#[derive(Clone)]
pub enum IdentifierMode {
    /// Short hashed identifiers (`bvos4v0`).
    Short,
    /// Readable identifiers carrying the file stem and debug id.
    Debug,
    /// Caller-supplied identifier function.
    Custom(Arc<dyn Fn(&IdentParams) -> String + Send + Sync>),
}

impl fmt::Debug for IdentifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierMode::Short => f.write_str("Short"),
            IdentifierMode::Debug => f.write_str("Debug"),
            IdentifierMode::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Default for IdentifierMode {
    fn default() -> Self {
        IdentifierMode::Short
    }
}

/// Hash of the serialized scope, base36-encoded, six characters.
pub fn scope_hash(scope: &FileScope) -> String {
    let mut hasher = Sha256::new();
    if let Some(pkg) = &scope.package_name {
        hasher.update(pkg.as_bytes());
    }
    hasher.update(scope.file_path.as_bytes());
    let digest = hasher.finalize();
    let mut seed = 0u64;
    for byte in &digest[..8] {
        seed = (seed << 8) | u64::from(*byte);
    }
    to_base36(seed % 36u64.pow(6), 6)
}

/// Pads to `width` but never truncates, so counter values past the base
/// cannot collide.
fn to_base36(mut n: u64, width: usize) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    while out.len() < width {
        out.push(b'0');
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

/// Generate the identifier for the `index`-th registration in `scope`.
pub fn generate_identifier(
    mode: &IdentifierMode,
    scope: &FileScope,
    index: u32,
    debug_id: Option<&str>,
) -> String {
    let hash = format!("{}{}", scope_hash(scope), to_base36(u64::from(index), 1));

    let ident = match mode {
        IdentifierMode::Short => hash,
        IdentifierMode::Debug => {
            let stem = file_stem(&scope.file_path);
            match debug_id {
                Some(debug) => format!("{}_{}__{}", stem, debug, hash),
                None => format!("{}__{}", stem, hash),
            }
        }
        IdentifierMode::Custom(f) => f(&IdentParams {
            hash: hash.clone(),
            file_path: scope.file_path.clone(),
            debug_id: debug_id.map(str::to_string),
            package_name: scope.package_name.clone(),
        }),
    };

    // CSS identifiers must not start with a digit.
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", ident)
    } else {
        ident
    }
}

fn file_stem(file_path: &str) -> String {
    let name = file_path.rsplit('/').next().unwrap_or(file_path);
    name.split('.').next().unwrap_or(name).to_string()
}
