//! Secrets-file guard.
//!
//! Blocks file tools pointed at a protected secrets file (`.env` by default)
//! and shell commands that read, write, copy or move one. A single template
//! variant (`.env.sample`) stays reachable so agents can still maintain it.
//!
//! Shell commands are matched with `fancy_regex` because the template
//! exemption needs a negative lookahead.

use crate::error::GuardError;
use crate::hook::ToolInvocation;
use fancy_regex::Regex;
use tracing::debug;

pub const DEFAULT_MARKER: &str = ".env";
pub const DEFAULT_ALLOWED_SUFFIX: &str = ".env.sample";
pub const DEFAULT_FILE_TOOLS: &[&str] = &["Read", "Edit", "MultiEdit", "Write"];
pub const DEFAULT_SHELL_TOOLS: &[&str] = &["Bash"];

/// Command shapes that touch a secrets file, most specific first. The
/// trailing `reference` entry matches any mention at all.
const COMMAND_SHAPES: &[(&str, &str)] = &[
    ("cat", r"cat\s+.*"),
    ("echo-redirect", r"echo\s+.*>\s*"),
    ("touch", r"touch\s+.*"),
    ("cp", r"cp\s+.*"),
    ("mv", r"mv\s+.*"),
    ("reference", ""),
];

/// What matched a protected invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitiveMatch {
    /// A file tool's `file_path`.
    FilePath,
    /// A shell command, with the name of the matching shape.
    Command(&'static str),
}

#[derive(Debug)]
struct CommandPattern {
    name: &'static str,
    regex: Regex,
}

/// Guard against secrets-file access.
#[derive(Debug)]
pub struct SensitiveFileGuard {
    marker: String,
    allowed_suffix: String,
    file_tools: Vec<String>,
    shell_tools: Vec<String>,
    patterns: Vec<CommandPattern>,
}

impl SensitiveFileGuard {
    /// Build a guard for `marker`, exempting paths that end in `allowed_suffix`.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidRule`] for an empty marker and
    /// [`GuardError::Pattern`] if a generated pattern fails to compile.
    pub fn new(marker: &str, allowed_suffix: &str) -> Result<Self, GuardError> {
        let marker = marker.trim();
        let allowed_suffix = allowed_suffix.trim();
        if marker.is_empty() {
            return Err(GuardError::InvalidRule(
                "sensitive marker must not be empty".to_string(),
            ));
        }

        let tail = marker_tail(marker, allowed_suffix);
        let patterns = COMMAND_SHAPES
            .iter()
            .map(|&(name, prefix)| {
                let source = format!("{prefix}{tail}");
                Regex::new(&source)
                    .map(|regex| CommandPattern { name, regex })
                    .map_err(|e| GuardError::pattern(&source, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            marker: marker.to_string(),
            allowed_suffix: allowed_suffix.to_string(),
            file_tools: DEFAULT_FILE_TOOLS.iter().map(ToString::to_string).collect(),
            shell_tools: DEFAULT_SHELL_TOOLS.iter().map(ToString::to_string).collect(),
            patterns,
        })
    }

    /// Guard with the built-in marker and template suffix.
    ///
    /// # Errors
    ///
    /// Only fails if the built-in patterns fail to compile.
    pub fn builtin() -> Result<Self, GuardError> {
        Self::new(DEFAULT_MARKER, DEFAULT_ALLOWED_SUFFIX)
    }

    /// Treat these additional tools as file tools.
    #[must_use]
    pub fn with_file_tools(mut self, extra: &[String]) -> Self {
        extend_unique(&mut self.file_tools, extra);
        self
    }

    /// Treat these additional tools as shell tools.
    #[must_use]
    pub fn with_shell_tools(mut self, extra: &[String]) -> Self {
        extend_unique(&mut self.shell_tools, extra);
        self
    }

    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    #[must_use]
    pub fn allowed_suffix(&self) -> &str {
        &self.allowed_suffix
    }

    #[must_use]
    pub fn is_file_tool(&self, tool_name: &str) -> bool {
        self.file_tools.iter().any(|t| t == tool_name)
    }

    #[must_use]
    pub fn is_shell_tool(&self, tool_name: &str) -> bool {
        self.shell_tools.iter().any(|t| t == tool_name)
    }

    /// Fixed, human-readable reason reported for every block.
    #[must_use]
    pub fn block_reason(&self) -> String {
        let mut reason = format!(
            "BLOCKED: Access to {} files containing sensitive data is prohibited",
            self.marker
        );
        if !self.allowed_suffix.is_empty() {
            reason.push_str(&format!(
                "\nUse {} for template files instead",
                self.allowed_suffix
            ));
        }
        reason
    }

    /// Whether a file tool may not touch `path`.
    #[must_use]
    pub fn path_is_protected(&self, path: &str) -> bool {
        path.contains(&self.marker)
            && (self.allowed_suffix.is_empty() || !path.ends_with(&self.allowed_suffix))
    }

    /// Name of the first command shape matching `command`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Pattern`] if the regex engine gives up (for
    /// example on its backtracking limit).
    pub fn command_match(&self, command: &str) -> Result<Option<&'static str>, GuardError> {
        for pattern in &self.patterns {
            let hit = pattern
                .regex
                .is_match(command)
                .map_err(|e| GuardError::pattern(pattern.regex.as_str(), e))?;
            if hit {
                return Ok(Some(pattern.name));
            }
        }
        Ok(None)
    }

    /// Check one invocation.
    ///
    /// # Errors
    ///
    /// Propagates [`GuardError::Pattern`] from [`Self::command_match`].
    pub fn check(&self, invocation: &ToolInvocation) -> Result<Option<SensitiveMatch>, GuardError> {
        let tool = invocation.tool_name.as_str();

        if self.is_file_tool(tool) {
            let hit = invocation
                .file_path()
                .is_some_and(|path| self.path_is_protected(path));
            if hit {
                debug!(tool, "file tool targets a protected file");
                return Ok(Some(SensitiveMatch::FilePath));
            }
            return Ok(None);
        }

        if self.is_shell_tool(tool) {
            if let Some(command) = invocation.command() {
                if let Some(name) = self.command_match(command)? {
                    debug!(tool, shape = name, "shell command touches a protected file");
                    return Ok(Some(SensitiveMatch::Command(name)));
                }
            }
        }

        Ok(None)
    }
}

/// `<marker>\b(?!<rest of suffix>)`, with the boundary only when the marker
/// ends in a word character and the lookahead only when the suffix extends
/// the marker.
fn marker_tail(marker: &str, allowed_suffix: &str) -> String {
    let mut tail = regex::escape(marker);
    if marker
        .chars()
        .last()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
    {
        tail.push_str(r"\b");
    }
    if let Some(rest) = allowed_suffix.strip_prefix(marker) {
        if !rest.is_empty() {
            tail.push_str(&format!("(?!{})", regex::escape(rest)));
        }
    }
    tail
}

fn extend_unique(target: &mut Vec<String>, extras: &[String]) {
    for extra in extras {
        let extra = extra.trim();
        if !extra.is_empty() && !target.iter().any(|t| t == extra) {
            target.push(extra.to_string());
        }
    }
}
