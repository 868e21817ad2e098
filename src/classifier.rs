//! Path safety classification for `rm` targets.
//!
//! Each path argument lands in one of three buckets, first match wins:
//!
//! 1. [`Classification::AlwaysDangerous`]: root, home, the working directory
//!    and its parent, bare globs, and the top-level system directories. No
//!    configuration can move a path out of this bucket.
//! 2. [`Classification::WhitelistedSafe`]: disposable build/cache output,
//!    disposable files, and anything under a configured trusted root.
//! 3. [`Classification::Unknown`]: everything else. Callers treat it exactly
//!    like `AlwaysDangerous`.
//!
//! The rule lists live in [`ClassifierRules`] so that the hook, the CLI and
//! the tests all classify with the same data.

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use tracing::trace;

/// Literal arguments that always resolve to something catastrophic.
const DANGEROUS_LITERALS: &[&str] = &[
    "/", "/*", "/.", "/..", "~", "~/", "~/*", "$HOME", "$HOME/", "$HOME/*", "${HOME}", "${HOME}/",
    "${HOME}/*", ".", "./", "./*", "..", "../", "../*", "*", ".*",
];

/// Top-level system directories, blocked with or without sub-paths.
pub const DEFAULT_SYSTEM_DIRECTORIES: &[&str] = &[
    "usr", "etc", "var", "boot", "sys", "proc", "bin", "sbin", "lib", "lib64", "dev",
];

/// Directory names whose contents are regenerable build or cache output.
pub const DEFAULT_SAFE_DIRECTORIES: &[&str] = &[
    "node_modules",
    "build",
    "dist",
    "target",
    ".next",
    ".nuxt",
    "tmp",
    "temp",
    "cache",
    "logs",
    ".cache",
    "coverage",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".gradle",
    ".turbo",
    ".parcel-cache",
    ".ruff_cache",
    ".tox",
    ".nyc_output",
    ".svelte-kit",
    ".vite",
];

/// Extensions of files that are safe to delete.
pub const DEFAULT_DISPOSABLE_EXTENSIONS: &[&str] = &["log", "tmp", "cache", "temp"];

/// Rotated log files such as `app.log.3`.
static ROTATED_LOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.log\.\d+$").expect("rotated log regex compiles"));

/// Outcome of classifying one path argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    AlwaysDangerous,
    WhitelistedSafe,
    Unknown,
}

impl Classification {
    /// `Unknown` blocks exactly like `AlwaysDangerous`.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        !matches!(self, Self::WhitelistedSafe)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AlwaysDangerous => "always-dangerous",
            Self::WhitelistedSafe => "whitelisted-safe",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Rule data used by [`ClassifierRules::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierRules {
    safe_directories: Vec<String>,
    disposable_extensions: Vec<String>,
    system_directories: Vec<String>,
    protected_paths: Vec<String>,
    home: Option<PathBuf>,
    project_roots: Vec<PathBuf>,
    trusted_roots: Vec<PathBuf>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            safe_directories: to_strings(DEFAULT_SAFE_DIRECTORIES),
            disposable_extensions: to_strings(DEFAULT_DISPOSABLE_EXTENSIONS),
            system_directories: to_strings(DEFAULT_SYSTEM_DIRECTORIES),
            protected_paths: Vec::new(),
            home: dirs::home_dir(),
            project_roots: Vec::new(),
            trusted_roots: Vec::new(),
        }
    }
}

impl ClassifierRules {
    /// Use `home` as the home directory instead of the one detected at startup.
    #[must_use]
    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    #[must_use]
    pub fn with_project_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.project_roots = roots;
        self
    }

    /// Roots under which every path is whitelisted.
    #[must_use]
    pub fn with_trusted_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.trusted_roots = roots;
        self
    }

    #[must_use]
    pub fn with_extra_safe_directories(mut self, extra: &[String]) -> Self {
        extend_unique(&mut self.safe_directories, extra);
        self
    }

    #[must_use]
    pub fn with_extra_disposable_extensions(mut self, extra: &[String]) -> Self {
        let trimmed: Vec<String> = extra
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_string())
            .collect();
        extend_unique(&mut self.disposable_extensions, &trimmed);
        self
    }

    /// Extra exact paths that are always dangerous (e.g. `/srv`, `/opt/data`).
    #[must_use]
    pub fn with_protected_paths(mut self, extra: &[String]) -> Self {
        let trimmed: Vec<String> = extra.iter().map(|p| trim_trailing_slashes(p)).collect();
        extend_unique(&mut self.protected_paths, &trimmed);
        self
    }

    #[must_use]
    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    #[must_use]
    pub fn safe_directories(&self) -> &[String] {
        &self.safe_directories
    }

    #[must_use]
    pub fn project_roots(&self) -> &[PathBuf] {
        &self.project_roots
    }

    #[must_use]
    pub fn trusted_roots(&self) -> &[PathBuf] {
        &self.trusted_roots
    }

    /// Classify a single, already unquoted, path argument.
    #[must_use]
    pub fn classify(&self, path: &str) -> Classification {
        let path = path.trim();
        let result = if self.is_always_dangerous(path) {
            Classification::AlwaysDangerous
        } else if self.is_whitelisted(path) {
            Classification::WhitelistedSafe
        } else {
            Classification::Unknown
        };
        trace!(path, classification = %result, "classified path");
        result
    }

    fn is_always_dangerous(&self, path: &str) -> bool {
        if DANGEROUS_LITERALS.contains(&path) {
            return true;
        }
        // "//", "///" and friends.
        if !path.is_empty() && path.bytes().all(|b| b == b'/') {
            return true;
        }

        if path.starts_with('/') {
            let first = path
                .split('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or_default();
            if self.system_directories.iter().any(|d| d == first) {
                return true;
            }
        }

        let trimmed = trim_trailing_slashes(path);
        if self.protected_paths.iter().any(|p| *p == trimmed) {
            return true;
        }

        // The home directory itself, however it is spelled.
        if let (Some(home), Some(expanded)) = (self.home.as_deref(), self.expand_home(path)) {
            if expanded.as_path() == home {
                return true;
            }
        }

        false
    }

    fn is_whitelisted(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }

        match self.expand_home(path) {
            Some(absolute) => self.is_whitelisted_absolute(&absolute),
            None if is_relative_literal(path) => self.is_whitelisted_relative(path),
            None => false,
        }
    }

    /// Relative paths: optional single leading `./` or `../`, then plain names.
    fn is_whitelisted_relative(&self, path: &str) -> bool {
        let mut names = Vec::new();
        for (idx, component) in Path::new(path).components().enumerate() {
            match component {
                Component::CurDir | Component::ParentDir if idx == 0 => {}
                Component::Normal(name) => names.push(name.to_string_lossy()),
                _ => return false,
            }
        }
        let Some(last) = names.last() else {
            return false;
        };

        names.iter().any(|n| self.is_safe_directory(n)) || self.is_disposable_file(last)
    }

    fn is_whitelisted_absolute(&self, path: &Path) -> bool {
        if has_parent_component(path) {
            return false;
        }

        if self
            .trusted_roots
            .iter()
            .any(|root| path != root.as_path() && path.starts_with(root))
        {
            return true;
        }

        if let Some(home) = self.home.as_deref() {
            if let Ok(rest) = path.strip_prefix(home) {
                let names = normal_names(rest);
                // A safe directory directly in $HOME is too broad; require at
                // least one directory in between.
                let nested_safe_dir = names
                    .iter()
                    .skip(1)
                    .any(|n| self.is_safe_directory(n));
                let disposable = names.last().is_some_and(|n| self.is_disposable_file(n));
                if nested_safe_dir || disposable {
                    return true;
                }
            }
        }

        self.project_roots.iter().any(|root| {
            path.strip_prefix(root).is_ok_and(|rest| {
                let names = normal_names(rest);
                names.iter().any(|n| self.is_safe_directory(n))
                    || names.last().is_some_and(|n| self.is_disposable_file(n))
            })
        })
    }

    fn is_safe_directory(&self, name: &str) -> bool {
        self.safe_directories.iter().any(|d| d == name)
    }

    fn is_disposable_file(&self, name: &str) -> bool {
        if ROTATED_LOG.is_match(name) {
            return true;
        }
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.disposable_extensions.iter().any(|d| d == ext))
    }

    /// Absolute form of `path` when it is absolute or home-relative.
    fn expand_home(&self, path: &str) -> Option<PathBuf> {
        if path.starts_with('/') {
            return Some(PathBuf::from(path));
        }
        let home = self.home.as_deref()?;
        for prefix in ["~", "$HOME", "${HOME}"] {
            if let Some(rest) = path.strip_prefix(prefix) {
                if rest.is_empty() {
                    return Some(home.to_path_buf());
                }
                if let Some(rest) = rest.strip_prefix('/') {
                    return Some(home.join(rest));
                }
            }
        }
        None
    }
}

/// Not absolute, not home-relative, and no variable expansion.
fn is_relative_literal(path: &str) -> bool {
    !path.starts_with('/') && !path.starts_with('~') && !path.contains('$')
}

fn has_parent_component(path: &Path) -> bool {
    path.components().any(|c| c == Component::ParentDir)
}

fn normal_names(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

fn trim_trailing_slashes(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

fn extend_unique(target: &mut Vec<String>, extras: &[String]) {
    for extra in extras {
        let extra = extra.trim();
        if !extra.is_empty() && !target.iter().any(|t| t == extra) {
            target.push(extra.to_string());
        }
    }
}
