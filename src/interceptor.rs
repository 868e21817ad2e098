//! Per-invocation decision and audit.
//!
//! The secrets-file guard runs first. Shell tools that pass it are then
//! checked against the `rm -rf` policy. Every decided invocation is appended
//! to the audit log, and audit failures never change the decision.

use crate::audit::AuditLog;
use crate::config::Config;
use crate::error::GuardError;
use crate::hook::ToolInvocation;
use crate::policy::{DangerPolicy, DangerousTarget};
use crate::sensitive::{SensitiveFileGuard, SensitiveMatch};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

/// Reason reported for a destructive `rm` block.
pub const DESTRUCTIVE_BLOCK_REASON: &str = "BLOCKED: Dangerous rm command detected and prevented";

/// Which check blocked an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    SensitiveFile,
    DestructiveCommand,
}

impl BlockKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SensitiveFile => "sensitive-file",
            Self::DestructiveCommand => "destructive-command",
        }
    }
}

/// Outcome for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    /// Human-readable reason; set only when blocked.
    pub reason: Option<String>,
    pub kind: Option<BlockKind>,
    /// The offending `rm` target, for destructive blocks.
    pub target: Option<DangerousTarget>,
}

impl PolicyDecision {
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            kind: None,
            target: None,
        }
    }

    #[must_use]
    pub fn block(kind: BlockKind, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            kind: Some(kind),
            target: None,
        }
    }

    #[must_use]
    fn with_target(mut self, target: DangerousTarget) -> Self {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        !self.allowed
    }
}

/// Combines both checks and the audit log.
#[derive(Debug)]
pub struct Interceptor {
    sensitive: SensitiveFileGuard,
    policy: DangerPolicy,
    audit: Option<AuditLog>,
}

impl Interceptor {
    /// Interceptor without an audit log.
    #[must_use]
    pub const fn new(sensitive: SensitiveFileGuard, policy: DangerPolicy) -> Self {
        Self {
            sensitive,
            policy,
            audit: None,
        }
    }

    #[must_use]
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build from configuration for a hook running in `cwd`.
    ///
    /// Unusable secrets-file settings fall back to the built-in marker; they
    /// never disable the `rm` policy or the audit log.
    ///
    /// # Errors
    ///
    /// Returns an error only if the built-in secrets-file patterns fail to
    /// compile.
    pub fn from_config(config: &Config, cwd: &Path) -> Result<Self, GuardError> {
        let sensitive = match config.sensitive_guard() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "invalid sensitive-file settings; using built-in marker");
                SensitiveFileGuard::builtin()?
                    .with_file_tools(&config.sensitive.extra_file_tools)
                    .with_shell_tools(&config.sensitive.extra_shell_tools)
            }
        };
        let interceptor = Self::new(sensitive, config.danger_policy());
        if config.audit.enabled {
            Ok(interceptor.with_audit(AuditLog::new(config.audit_log_path(cwd))))
        } else {
            Ok(interceptor)
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &DangerPolicy {
        &self.policy
    }

    #[must_use]
    pub const fn sensitive_guard(&self) -> &SensitiveFileGuard {
        &self.sensitive
    }

    #[must_use]
    pub const fn audit_log(&self) -> Option<&AuditLog> {
        self.audit.as_ref()
    }

    /// Decide one invocation without touching the audit log.
    #[must_use]
    pub fn decide(&self, invocation: &ToolInvocation) -> PolicyDecision {
        match self.sensitive.check(invocation) {
            Ok(Some(hit)) => {
                if let SensitiveMatch::Command(shape) = hit {
                    debug!(shape, "sensitive command shape matched");
                }
                return PolicyDecision::block(
                    BlockKind::SensitiveFile,
                    self.sensitive.block_reason(),
                );
            }
            Ok(None) => {}
            Err(e) => {
                // A pattern that cannot run is skipped, not enforced.
                warn!(error = %e, "sensitive-file check failed; continuing");
            }
        }

        if !self.sensitive.is_shell_tool(&invocation.tool_name) {
            return PolicyDecision::allow();
        }
        let Some(command) = invocation.command() else {
            return PolicyDecision::allow();
        };

        match self.policy.find_dangerous_target(command) {
            Some(target) => {
                PolicyDecision::block(BlockKind::DestructiveCommand, DESTRUCTIVE_BLOCK_REASON)
                    .with_target(target)
            }
            None => PolicyDecision::allow(),
        }
    }

    /// Decide one invocation and record `raw` in the audit log.
    #[must_use]
    pub fn intercept(&self, invocation: &ToolInvocation, raw: &Value) -> PolicyDecision {
        let decision = self.decide(invocation);

        if let Some(kind) = decision.kind {
            info!(
                tool = %invocation.tool_name,
                kind = kind.label(),
                path = decision.target.as_ref().map(|t| t.path.as_str()),
                "blocked"
            );
        }

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.append(raw) {
                warn!(path = %audit.path().display(), error = %e, "failed to write audit log");
            }
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classification, ClassifierRules};
    use crate::extractor::CommandRules;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn interceptor() -> Interceptor {
        let paths = ClassifierRules::default().with_home(Some(PathBuf::from("/home/dev")));
        Interceptor::new(
            SensitiveFileGuard::builtin().unwrap(),
            DangerPolicy::new(CommandRules::default(), paths),
        )
    }

    fn bash(command: &str) -> ToolInvocation {
        ToolInvocation::new("Bash", json!({ "command": command }))
    }

    #[test]
    fn destructive_rm_is_blocked() {
        let decision = interceptor().decide(&bash("rm -rf /"));
        assert!(decision.is_blocked());
        assert_eq!(decision.kind, Some(BlockKind::DestructiveCommand));
        assert_eq!(decision.reason.as_deref(), Some(DESTRUCTIVE_BLOCK_REASON));
        let target = decision.target.unwrap();
        assert_eq!(target.path, "/");
        assert_eq!(target.classification, Classification::AlwaysDangerous);
    }

    #[test]
    fn safe_rm_and_ordinary_commands_are_allowed() {
        let i = interceptor();
        for command in ["rm -rf node_modules", "ls -la", "git rm -rf src", "rm file.txt"] {
            assert_eq!(i.decide(&bash(command)), PolicyDecision::allow(), "{command}");
        }
    }

    #[test]
    fn sensitive_check_runs_before_rm_policy() {
        let decision = interceptor().decide(&bash("rm -rf / && cat .env"));
        assert_eq!(decision.kind, Some(BlockKind::SensitiveFile));
        assert!(decision.target.is_none());
    }

    #[test]
    fn file_tools_only_get_the_sensitive_check() {
        let i = interceptor();
        let read = ToolInvocation::new("Read", json!({ "file_path": "/app/.env" }));
        assert_eq!(i.decide(&read).kind, Some(BlockKind::SensitiveFile));

        let write = ToolInvocation::new(
            "Write",
            json!({ "file_path": "/app/a.rs", "command": "rm -rf /" }),
        );
        assert!(i.decide(&write).allowed);
    }

    #[test]
    fn missing_command_is_allowed() {
        let inv = ToolInvocation::new("Bash", json!({}));
        assert!(interceptor().decide(&inv).allowed);
    }

    #[test]
    fn intercept_records_allowed_and_blocked_calls() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::in_dir(dir.path());
        let i = interceptor().with_audit(log.clone());

        let allowed = json!({"tool_name": "Bash", "tool_input": {"command": "ls"}});
        let blocked = json!({"tool_name": "Bash", "tool_input": {"command": "rm -rf ~"}});
        assert!(i.intercept(&ToolInvocation::from_value(&allowed).unwrap(), &allowed).allowed);
        assert!(i.intercept(&ToolInvocation::from_value(&blocked).unwrap(), &blocked).is_blocked());

        assert_eq!(log.load().unwrap(), vec![allowed, blocked]);
    }

    #[test]
    fn audit_failure_does_not_change_decision() {
        let dir = TempDir::new().unwrap();
        // A directory where the log file should be makes every append fail.
        let log_path = dir.path().join("audit.json");
        std::fs::create_dir_all(&log_path).unwrap();
        let i = interceptor().with_audit(AuditLog::new(log_path));

        let raw = json!({"tool_name": "Bash", "tool_input": {"command": "rm -rf /etc"}});
        let decision = i.intercept(&ToolInvocation::from_value(&raw).unwrap(), &raw);
        assert!(decision.is_blocked());
    }

    #[test]
    fn from_config_honors_audit_switch() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        let i = Interceptor::from_config(&config, dir.path()).unwrap();
        assert_eq!(
            i.audit_log().map(AuditLog::path),
            Some(dir.path().join("logs/pre_tool_use.json").as_path())
        );

        config.audit.enabled = false;
        let i = Interceptor::from_config(&config, dir.path()).unwrap();
        assert!(i.audit_log().is_none());
    }

    #[test]
    fn empty_marker_falls_back_to_builtin_guard() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.home = Some("/home/dev".to_string());
        config.sensitive.marker = String::new();

        let i = Interceptor::from_config(&config, dir.path()).unwrap();
        assert_eq!(i.sensitive_guard().marker(), ".env");
        assert!(i.audit_log().is_some());
        assert_eq!(
            i.decide(&bash("rm -rf /")).kind,
            Some(BlockKind::DestructiveCommand)
        );
        let read = ToolInvocation::new("Read", json!({ "file_path": "/app/.env" }));
        assert_eq!(i.decide(&read).kind, Some(BlockKind::SensitiveFile));
    }

    mod proptest_invariants {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(128))]

            #[test]
            fn decide_is_deterministic(command in "[a-z ./~*&|;-]{0,40}") {
                let i = interceptor();
                let inv = bash(&command);
                prop_assert_eq!(i.decide(&inv), i.decide(&inv));
            }

            #[test]
            fn blocked_decisions_carry_reason(command in "(rm -rf |cat |ls )[a-z./~ ]{0,20}") {
                let decision = interceptor().decide(&bash(&command));
                prop_assert_eq!(decision.allowed, decision.reason.is_none());
                prop_assert_eq!(decision.allowed, decision.kind.is_none());
            }
        }
    }
}
