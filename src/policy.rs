//! Whole-command verdicts for recursive forced deletion.
//!
//! Ties the tokenizer, the `rm` extractor and the path classifier together:
//! a command is blocked when any of its `rm` segments carries both a
//! recursive and a force flag and names a path that is not whitelisted.

use crate::classifier::{Classification, ClassifierRules};
use crate::extractor::{CommandRules, is_rm_word};
use crate::tokenizer::split_command_segments;
use tracing::debug;

/// Recursive/force flags seen on one `rm` invocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RmFlags {
    pub recursive: bool,
    pub force: bool,
}

impl RmFlags {
    #[must_use]
    pub const fn is_recursive_force(self) -> bool {
        self.recursive && self.force
    }

    fn observe(&mut self, flag: &str) {
        if let Some(long) = flag.strip_prefix("--") {
            // GNU getopt accepts any unambiguous prefix of a long option, and
            // no other rm option starts with `r` or `f`.
            if long.is_empty() {
                return;
            }
            if "recursive".starts_with(long) {
                self.recursive = true;
            } else if "force".starts_with(long) {
                self.force = true;
            }
            return;
        }
        for c in flag.trim_start_matches('-').chars() {
            match c {
                'r' | 'R' => self.recursive = true,
                'f' => self.force = true,
                _ => {}
            }
        }
    }
}

/// Launchers that feed `rm` its operands from stdin.
const STDIN_OPERAND_LAUNCHERS: &[&str] = &["xargs", "parallel"];

/// Placeholder path reported when operands arrive on stdin.
pub const STDIN_OPERANDS: &str = "<stdin>";

/// Flags and path operands of one `rm` segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RmArguments {
    pub flags: RmFlags,
    pub paths: Vec<String>,
    /// `rm` runs under `xargs`/`parallel`, so more operands come from stdin.
    pub stdin_operands: bool,
}

/// Why a command was judged destructive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DangerousTarget {
    /// The segment containing the offending `rm`.
    pub segment: String,
    /// The path argument that failed classification.
    pub path: String,
    pub classification: Classification,
}

/// Decides whether a shell command must be blocked for `rm -rf` danger.
#[derive(Debug, Clone, Default)]
pub struct DangerPolicy {
    commands: CommandRules,
    paths: ClassifierRules,
}

impl DangerPolicy {
    #[must_use]
    pub const fn new(commands: CommandRules, paths: ClassifierRules) -> Self {
        Self { commands, paths }
    }

    #[must_use]
    pub const fn command_rules(&self) -> &CommandRules {
        &self.commands
    }

    #[must_use]
    pub const fn classifier(&self) -> &ClassifierRules {
        &self.paths
    }

    /// `true` when `command` must not run.
    #[must_use]
    pub fn must_block(&self, command: &str) -> bool {
        self.find_dangerous_target(command).is_some()
    }

    /// First offending path in `command`, if any.
    #[must_use]
    pub fn find_dangerous_target(&self, command: &str) -> Option<DangerousTarget> {
        // Quick reject before any tokenizing.
        if !crate::extractor::mentions_rm(command) {
            return None;
        }

        let segments = split_command_segments(command);
        for segment in self.commands.extract_rm_segments(&segments) {
            let Some(args) = parse_rm_arguments(segment) else {
                continue;
            };
            if !args.flags.is_recursive_force() {
                continue;
            }
            if args.stdin_operands {
                // Operands are decided at run time; nothing to whitelist.
                debug!(segment, "rm -rf fed from stdin");
                return Some(DangerousTarget {
                    segment: segment.to_string(),
                    path: STDIN_OPERANDS.to_string(),
                    classification: Classification::Unknown,
                });
            }
            if args.paths.is_empty() {
                debug!(segment, "rm -rf without operands");
                continue;
            }

            for path in &args.paths {
                let classification = self.paths.classify(path);
                if classification.is_blocking() {
                    debug!(segment, path, %classification, "blocking rm target");
                    return Some(DangerousTarget {
                        segment: segment.to_string(),
                        path: path.clone(),
                        classification,
                    });
                }
            }
        }

        None
    }
}

/// Split an `rm` segment into its flags and path operands.
///
/// Returns `None` when no `rm` word is present. Flags may appear anywhere
/// before a `--` terminator; everything after `--` is an operand.
#[must_use]
pub fn parse_rm_arguments(segment: &str) -> Option<RmArguments> {
    let tokens = shell_words(segment);
    let rm_idx = tokens.iter().position(|t| is_rm_word(t))?;
    let stdin_operands = tokens[..rm_idx].iter().any(|t| {
        let name = t.rsplit('/').next().unwrap_or(t.as_str());
        STDIN_OPERAND_LAUNCHERS.contains(&name)
    });

    let mut flags = RmFlags::default();
    let mut paths = Vec::new();
    let mut options_ended = false;

    for token in tokens.into_iter().skip(rm_idx + 1) {
        if !options_ended {
            if token == "--" {
                options_ended = true;
                continue;
            }
            if token.starts_with('-') && token != "-" {
                flags.observe(&token);
                continue;
            }
        }
        paths.push(strip_outer_quotes(&token).to_string());
    }

    Some(RmArguments {
        flags,
        paths,
        stdin_operands,
    })
}

/// Shell-style word splitting; malformed quoting falls back to whitespace.
fn shell_words(segment: &str) -> Vec<String> {
    shlex::split(segment).unwrap_or_else(|| {
        segment
            .split_whitespace()
            .map(|t| strip_outer_quotes(t).to_string())
            .collect()
    })
}

fn strip_outer_quotes(token: &str) -> &str {
    let trimmed = token.trim_matches(|c| c == '"' || c == '\'');
    if trimmed.len() == token.len() {
        token
    } else {
        trimmed
    }
}
