//! Configuration system for tool-guard.
//!
//! Supports layered configuration from multiple sources:
//! 1. Environment variables (highest priority)
//! 2. Project config (.tool-guard.toml in repo root)
//! 3. User config (~/.config/tool-guard/config.toml)
//! 4. System config (/etc/tool-guard/config.toml)
//! 5. Compiled defaults (lowest priority)
//!
//! Rule lists only ever extend the built-in defaults. No layer can remove a
//! built-in dangerous path or safe-tool entry.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::audit::DEFAULT_AUDIT_LOG_PATH;
use crate::classifier::ClassifierRules;
use crate::error::GuardError;
use crate::extractor::CommandRules;
use crate::hook::DEFAULT_MAX_HOOK_INPUT_BYTES;
use crate::policy::DangerPolicy;
use crate::sensitive::{DEFAULT_ALLOWED_SUFFIX, DEFAULT_MARKER, SensitiveFileGuard};

/// Environment variable prefix for all config options.
pub const ENV_PREFIX: &str = "TOOL_GUARD";

/// Explicit config file; replaces the system/user/project file layers.
pub const ENV_CONFIG_PATH: &str = "TOOL_GUARD_CONFIG";

/// Default config file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name under the system and user config roots.
const CONFIG_DIR_NAME: &str = "tool-guard";

/// Project-level config file name.
pub const PROJECT_CONFIG_NAME: &str = ".tool-guard.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,

    /// Audit log settings.
    pub audit: AuditConfig,

    /// Directory scoping for the path classifier.
    pub paths: PathsConfig,

    /// Additions to the built-in rule lists.
    pub rules: RulesConfig,

    /// Secrets-file guard settings.
    pub sensitive: SensitiveConfig,
}

/// General configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Color output mode: "auto", "always", "never".
    pub color: String,

    /// Whether to show verbose output (enables debug logging).
    pub verbose: bool,

    /// Tracing filter directive (e.g. "debug", "tool_guard=trace").
    pub log_level: Option<String>,

    /// Write diagnostics here instead of stderr.
    pub log_file: Option<String>,

    /// Maximum hook input size in bytes.
    pub max_hook_input_bytes: Option<usize>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            color: "auto".to_string(),
            verbose: false,
            log_level: None,
            log_file: None,
            max_hook_input_bytes: None,
        }
    }
}

impl GeneralConfig {
    #[must_use]
    pub fn max_hook_input_bytes(&self) -> usize {
        self.max_hook_input_bytes
            .unwrap_or(DEFAULT_MAX_HOOK_INPUT_BYTES)
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Record every invocation.
    pub enabled: bool,

    /// Log path; relative paths resolve against the working directory.
    pub path: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: DEFAULT_AUDIT_LOG_PATH.to_string(),
        }
    }
}

/// Directory scoping for the path classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Home directory override (defaults to the detected home).
    pub home: Option<String>,

    /// Roots whose disposable sub-directories are safe even when shallow.
    pub project_roots: Vec<String>,

    /// Roots under which every path is safe to delete.
    pub trusted_roots: Vec<String>,
}

/// Extensions to the built-in rule lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub extra_safe_directories: Vec<String>,
    pub extra_disposable_extensions: Vec<String>,
    pub extra_protected_paths: Vec<String>,
    pub extra_safe_tools: Vec<String>,
    pub extra_indirection_prefixes: Vec<String>,
}

/// Secrets-file guard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitiveConfig {
    /// Substring marking a protected file.
    pub marker: String,

    /// Paths ending in this suffix stay accessible.
    pub allowed_suffix: String,

    pub extra_file_tools: Vec<String>,
    pub extra_shell_tools: Vec<String>,
}

impl Default for SensitiveConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            allowed_suffix: DEFAULT_ALLOWED_SUFFIX.to_string(),
            extra_file_tools: Vec::new(),
            extra_shell_tools: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from all sources, merging them in priority order.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project config (.tool-guard.toml)
    /// 3. User config (~/.config/tool-guard/config.toml)
    /// 4. System config (/etc/tool-guard/config.toml)
    /// 5. Compiled defaults
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(explicit) = Self::load_explicit_config() {
            config.merge(explicit);
        } else {
            // Load system config (lowest priority of file configs)
            if let Some(system_config) = Self::load_system_config() {
                config.merge(system_config);
            }

            // Load user config
            if let Some(user_config) = Self::load_user_config() {
                config.merge(user_config);
            }

            // Load project config (if in a git repo)
            if let Some(project_config) = Self::load_project_config() {
                config.merge(project_config);
            }
        }

        // Apply environment variable overrides (highest priority)
        config.apply_env_overrides(|name| env::var(name).ok());

        config
    }

    /// Load configuration from a specific file. Missing or invalid files
    /// yield `None`.
    #[must_use]
    pub fn load_from_file(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        toml::from_str(&content).ok()
    }

    fn load_explicit_config() -> Option<Self> {
        let value = env::var(ENV_CONFIG_PATH).ok()?;
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self::load_from_file(Path::new(value)).unwrap_or_default())
    }

    /// Path of the system-wide config file.
    #[must_use]
    pub fn system_config_path() -> PathBuf {
        PathBuf::from("/etc")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Path of the user config file, if a config directory is known.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        Some(
            dirs::config_dir()?
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        )
    }

    fn load_system_config() -> Option<Self> {
        Self::load_from_file(&Self::system_config_path())
    }

    fn load_user_config() -> Option<Self> {
        Self::load_from_file(&Self::user_config_path()?)
    }

    fn load_project_config() -> Option<Self> {
        let cwd = env::current_dir().ok()?;
        Self::load_from_file(&find_project_config(&cwd)?)
    }

    /// Merge another config into this one (other takes priority).
    pub(crate) fn merge(&mut self, other: Self) {
        let defaults = Self::default();

        // Merge general settings
        if other.general.color != defaults.general.color {
            self.general.color = other.general.color;
        }
        if other.general.verbose {
            self.general.verbose = true;
        }
        if other.general.log_level.is_some() {
            self.general.log_level = other.general.log_level;
        }
        if other.general.log_file.is_some() {
            self.general.log_file = other.general.log_file;
        }
        if other.general.max_hook_input_bytes.is_some() {
            self.general.max_hook_input_bytes = other.general.max_hook_input_bytes;
        }

        // Audit: scalars override when they differ from the defaults
        if !other.audit.enabled {
            self.audit.enabled = false;
        }
        if other.audit.path != defaults.audit.path {
            self.audit.path = other.audit.path;
        }

        // Paths and rules append, never replace
        if other.paths.home.is_some() {
            self.paths.home = other.paths.home;
        }
        self.paths.project_roots.extend(other.paths.project_roots);
        self.paths.trusted_roots.extend(other.paths.trusted_roots);

        self.rules
            .extra_safe_directories
            .extend(other.rules.extra_safe_directories);
        self.rules
            .extra_disposable_extensions
            .extend(other.rules.extra_disposable_extensions);
        self.rules
            .extra_protected_paths
            .extend(other.rules.extra_protected_paths);
        self.rules.extra_safe_tools.extend(other.rules.extra_safe_tools);
        self.rules
            .extra_indirection_prefixes
            .extend(other.rules.extra_indirection_prefixes);

        if other.sensitive.marker != defaults.sensitive.marker {
            self.sensitive.marker = other.sensitive.marker;
        }
        if other.sensitive.allowed_suffix != defaults.sensitive.allowed_suffix {
            self.sensitive.allowed_suffix = other.sensitive.allowed_suffix;
        }
        self.sensitive
            .extra_file_tools
            .extend(other.sensitive.extra_file_tools);
        self.sensitive
            .extra_shell_tools
            .extend(other.sensitive.extra_shell_tools);
    }

    /// Apply environment variable overrides using `lookup` to read variables.
    pub(crate) fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}_{suffix}"));

        // TOOL_GUARD_AUDIT_LOG=/var/log/agent/pre_tool_use.json
        if let Some(path) = var("AUDIT_LOG").filter(|p| !p.trim().is_empty()) {
            self.audit.path = path;
        }

        // TOOL_GUARD_NO_AUDIT=1
        if var("NO_AUDIT").is_some() {
            self.audit.enabled = false;
        }

        // TOOL_GUARD_PROJECT_ROOTS="/srv/app,/srv/api"
        if let Some(roots) = var("PROJECT_ROOTS") {
            self.paths.project_roots.extend(split_list(&roots));
        }

        // TOOL_GUARD_TRUSTED_ROOTS="/home/me/Library/Projects"
        if let Some(roots) = var("TRUSTED_ROOTS") {
            self.paths.trusted_roots.extend(split_list(&roots));
        }

        // TOOL_GUARD_VERBOSE=1
        if var("VERBOSE").is_some() {
            self.general.verbose = true;
        }

        // TOOL_GUARD_COLOR=never
        if let Some(color) = var("COLOR") {
            self.general.color = color;
        }

        // TOOL_GUARD_LOG=debug
        if let Some(level) = var("LOG").filter(|l| !l.trim().is_empty()) {
            self.general.log_level = Some(level);
        }
    }

    /// Check if the bypass flag is set (escape hatch).
    #[must_use]
    pub fn is_bypassed() -> bool {
        env::var(format!("{ENV_PREFIX}_BYPASS")).is_ok()
    }

    /// Effective home directory for path classification.
    #[must_use]
    pub fn home_dir(&self) -> Option<PathBuf> {
        match self.paths.home.as_deref() {
            Some(home) if !home.trim().is_empty() => Some(PathBuf::from(home.trim())),
            _ => dirs::home_dir(),
        }
    }

    /// Path classifier rules with this config's additions.
    #[must_use]
    pub fn classifier_rules(&self) -> ClassifierRules {
        let home = self.home_dir();
        let expand = |roots: &[String]| -> Vec<PathBuf> {
            roots
                .iter()
                .filter(|r| !r.trim().is_empty())
                .map(|r| expand_tilde_with(r.trim(), home.as_deref()))
                .collect()
        };

        ClassifierRules::default()
            .with_home(home.clone())
            .with_project_roots(expand(&self.paths.project_roots))
            .with_trusted_roots(expand(&self.paths.trusted_roots))
            .with_extra_safe_directories(&self.rules.extra_safe_directories)
            .with_extra_disposable_extensions(&self.rules.extra_disposable_extensions)
            .with_protected_paths(&self.rules.extra_protected_paths)
    }

    /// Command-name rules with this config's additions.
    #[must_use]
    pub fn command_rules(&self) -> CommandRules {
        CommandRules::with_extras(
            &self.rules.extra_safe_tools,
            &self.rules.extra_indirection_prefixes,
        )
    }

    /// The `rm -rf` policy described by this config.
    #[must_use]
    pub fn danger_policy(&self) -> DangerPolicy {
        DangerPolicy::new(self.command_rules(), self.classifier_rules())
    }

    /// The secrets-file guard described by this config.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured marker is empty or its patterns
    /// fail to compile.
    pub fn sensitive_guard(&self) -> Result<SensitiveFileGuard, GuardError> {
        Ok(
            SensitiveFileGuard::new(&self.sensitive.marker, &self.sensitive.allowed_suffix)?
                .with_file_tools(&self.sensitive.extra_file_tools)
                .with_shell_tools(&self.sensitive.extra_shell_tools),
        )
    }

    /// Resolved audit log path for a hook running in `cwd`.
    #[must_use]
    pub fn audit_log_path(&self, cwd: &Path) -> PathBuf {
        let path = expand_tilde_with(self.audit.path.trim(), self.home_dir().as_deref());
        if path.is_absolute() {
            path
        } else {
            cwd.join(path)
        }
    }

    /// Generate a sample configuration string with comments.
    #[must_use]
    pub fn generate_sample_config() -> String {
        r#"# tool-guard configuration

[general]
# Color output: "auto" | "always" | "never"
color = "auto"

# Enable debug diagnostics
verbose = false

# Tracing filter directive; overridden by TOOL_GUARD_LOG
# log_level = "info"

# Write diagnostics to a file instead of stderr
# log_file = "~/.local/share/tool-guard/guard.log"

# Payloads larger than this are allowed without inspection
# max_hook_input_bytes = 262144

[audit]
# Record every tool invocation presented to the guard
enabled = true

# Relative paths resolve against the hook's working directory
path = "logs/pre_tool_use.json"

#─────────────────────────────────────────────────────────────
# PATH SCOPING
#─────────────────────────────────────────────────────────────

[paths]
# home = "/home/me"

# Disposable directories directly under these roots are safe to delete
project_roots = [
    # "~/work/webapp",
]

# Everything under these roots is safe to delete
trusted_roots = [
    # "~/Library/Projects",
]

#─────────────────────────────────────────────────────────────
# RULE EXTENSIONS (built-in lists cannot be reduced)
#─────────────────────────────────────────────────────────────

[rules]
extra_safe_directories = [
    # "out",
]
extra_disposable_extensions = [
    # "bak",
]
extra_protected_paths = [
    # "/srv",
]
extra_safe_tools = [
    # "kubectl",
]
extra_indirection_prefixes = [
    # "watch",
]

[sensitive]
marker = ".env"
allowed_suffix = ".env.sample"
extra_file_tools = [
    # "NotebookEdit",
]
extra_shell_tools = []
"#
        .to_string()
    }
}

/// Walk up from `start` looking for the project config. The search stops at
/// the first directory holding `.git`.
#[must_use]
pub fn find_project_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(PROJECT_CONFIG_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        // Stop at the repository root
        if current.join(".git").exists() {
            return None;
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Expand a leading `~/` against `home`.
#[must_use]
pub fn expand_tilde_with(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if path == "~" => home.map_or_else(|| PathBuf::from(path), Path::to_path_buf),
        _ => PathBuf::from(path),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.color, "auto");
        assert!(config.audit.enabled);
        assert_eq!(config.audit.path, "logs/pre_tool_use.json");
        assert_eq!(config.sensitive.marker, ".env");
        assert_eq!(config.general.max_hook_input_bytes(), 256 * 1024);
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::generate_sample_config();
        let parsed: Config = toml::from_str(&sample).expect("sample config parses");
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str("[rules]\nextra_safe_tools = [\"kubectl\"]\n").unwrap();
        assert_eq!(parsed.rules.extra_safe_tools, vec!["kubectl".to_string()]);
        assert!(parsed.audit.enabled);
        assert_eq!(parsed.sensitive.allowed_suffix, ".env.sample");
    }

    #[test]
    fn test_config_merge_appends_lists() {
        let mut base = Config::default();
        base.paths.trusted_roots.push("/a".to_string());
        let mut other = Config::default();
        other.paths.trusted_roots.push("/b".to_string());
        other.general.color = "never".to_string();
        other.audit.enabled = false;

        base.merge(other);
        assert_eq!(base.paths.trusted_roots, vec!["/a", "/b"]);
        assert_eq!(base.general.color, "never");
        assert!(!base.audit.enabled);
    }

    #[test]
    fn test_merge_of_defaults_changes_nothing() {
        let mut base = Config::default();
        base.general.color = "always".to_string();
        base.audit.path = "/tmp/audit.json".to_string();
        let before = base.clone();
        base.merge(Config::default());
        assert_eq!(base, before);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(env_from(&[
            ("TOOL_GUARD_AUDIT_LOG", "/var/log/audit.json"),
            ("TOOL_GUARD_PROJECT_ROOTS", "/srv/a, /srv/b,"),
            ("TOOL_GUARD_TRUSTED_ROOTS", "/opt/scratch"),
            ("TOOL_GUARD_VERBOSE", "1"),
            ("TOOL_GUARD_COLOR", "never"),
            ("TOOL_GUARD_LOG", "debug"),
        ]));

        assert_eq!(config.audit.path, "/var/log/audit.json");
        assert_eq!(config.paths.project_roots, vec!["/srv/a", "/srv/b"]);
        assert_eq!(config.paths.trusted_roots, vec!["/opt/scratch"]);
        assert!(config.general.verbose);
        assert_eq!(config.general.color, "never");
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_env_disables_audit() {
        let mut config = Config::default();
        config.apply_env_overrides(env_from(&[("TOOL_GUARD_NO_AUDIT", "1")]));
        assert!(!config.audit.enabled);
    }

    #[test]
    fn test_load_from_file_rejects_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[general]\nverbose = \n").unwrap();
        assert!(Config::load_from_file(&path).is_none());
        assert!(Config::load_from_file(&dir.path().join("missing.toml")).is_none());
    }

    #[test]
    fn test_find_project_config_walks_up_to_repo_root() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        let nested = repo.join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(repo.join(".git")).unwrap();
        assert!(find_project_config(&nested).is_none());

        fs::write(repo.join(PROJECT_CONFIG_NAME), "").unwrap();
        assert_eq!(
            find_project_config(&nested),
            Some(repo.join(PROJECT_CONFIG_NAME))
        );
    }

    #[test]
    fn test_audit_log_path_resolution() {
        let mut config = Config::default();
        config.paths.home = Some("/home/dev".to_string());
        let cwd = Path::new("/work/project");

        assert_eq!(
            config.audit_log_path(cwd),
            PathBuf::from("/work/project/logs/pre_tool_use.json")
        );
        config.audit.path = "~/audit/log.json".to_string();
        assert_eq!(
            config.audit_log_path(cwd),
            PathBuf::from("/home/dev/audit/log.json")
        );
        config.audit.path = "/var/tmp/log.json".to_string();
        assert_eq!(config.audit_log_path(cwd), PathBuf::from("/var/tmp/log.json"));
    }

    #[test]
    fn test_trusted_roots_reach_the_classifier() {
        let mut config = Config::default();
        config.paths.home = Some("/home/dev".to_string());
        config.paths.trusted_roots.push("~/Library/Projects".to_string());

        let rules = config.classifier_rules();
        assert_eq!(
            rules.classify("/home/dev/Library/Projects/site/src"),
            Classification::WhitelistedSafe
        );
        assert_eq!(rules.classify("/"), Classification::AlwaysDangerous);
    }

    #[test]
    fn test_rule_extensions_reach_the_policy() {
        let mut config = Config::default();
        config.paths.home = Some("/home/dev".to_string());
        config.rules.extra_safe_directories.push("out".to_string());
        config.rules.extra_safe_tools.push("kubectl".to_string());

        let policy = config.danger_policy();
        assert!(!policy.must_block("rm -rf out"));
        assert!(policy.must_block("rm -rf /"));
    }

    #[test]
    fn test_sensitive_guard_from_config() {
        let mut config = Config::default();
        assert!(config.sensitive_guard().is_ok());
        config.sensitive.marker = String::new();
        assert!(config.sensitive_guard().is_err());
    }

    #[test]
    fn test_expand_tilde_with() {
        let home = Path::new("/home/dev");
        assert_eq!(expand_tilde_with("~/x", Some(home)), PathBuf::from("/home/dev/x"));
        assert_eq!(expand_tilde_with("~", Some(home)), PathBuf::from("/home/dev"));
        assert_eq!(expand_tilde_with("~/x", None), PathBuf::from("~/x"));
        assert_eq!(expand_tilde_with("/abs", Some(home)), PathBuf::from("/abs"));
    }
}
