//! Picks out the command segments that actually invoke `rm`.
//!
//! A segment mentioning `rm` is not necessarily a deletion: `git rm` and
//! `cargo rm` are sub-commands of tools that manage their own state, while
//! `sudo rm` and `xargs rm` reach the real binary through an indirection
//! prefix. Only genuine invocations are handed to the path policy.

use memchr::memmem;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Word-boundary match for `rm`, applied after the substring prefilter.
static RM_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\brm\b").expect("rm word regex compiles"));

/// Tools whose `rm` sub-command never reaches the filesystem `rm` binary.
pub const DEFAULT_SAFE_TOOLS: &[&str] = &[
    "git", "docker", "npm", "yarn", "cargo", "apt", "yum", "brew", "pip", "conda",
];

/// Commands that run their arguments as another command.
pub const DEFAULT_INDIRECTION_PREFIXES: &[&str] = &[
    "sudo", "env", "exec", "xargs", "parallel", "command", "builtin", "doas", "nohup", "nice",
    "time", "timeout",
];

/// Reserved words that may precede a command in a segment
/// (`if true; then rm -rf x; fi` yields the segment `then rm -rf x`).
const SHELL_KEYWORDS: &[&str] = &[
    "if", "then", "else", "elif", "while", "until", "do", "!", "{",
];

/// Options of a built-in prefix that consume the following word.
struct PrefixOptions {
    /// Short option letters taking a value (`-u root`).
    short: &'static str,
    /// Long option names taking a value (`--user root`).
    long: &'static [&'static str],
    /// Operands read before the command (`timeout 10 rm`).
    operands: usize,
}

const NO_OPTIONS: PrefixOptions = PrefixOptions {
    short: "",
    long: &[],
    operands: 0,
};

fn prefix_options(name: &str) -> PrefixOptions {
    match name {
        "sudo" => PrefixOptions {
            short: "ugCDhprtTU",
            long: &[
                "user",
                "group",
                "close-from",
                "chdir",
                "host",
                "prompt",
                "role",
                "type",
                "command-timeout",
                "other-user",
            ],
            operands: 0,
        },
        "doas" => PrefixOptions {
            short: "uC",
            long: &[],
            operands: 0,
        },
        "env" => PrefixOptions {
            short: "uCS",
            long: &["unset", "chdir", "split-string"],
            operands: 0,
        },
        "nice" => PrefixOptions {
            short: "n",
            long: &["adjustment"],
            operands: 0,
        },
        "timeout" => PrefixOptions {
            short: "sk",
            long: &["signal", "kill-after"],
            operands: 1,
        },
        "time" => PrefixOptions {
            short: "fo",
            long: &["format", "output"],
            operands: 0,
        },
        "exec" => PrefixOptions {
            short: "a",
            long: &[],
            operands: 0,
        },
        "xargs" => PrefixOptions {
            short: "aIdEeLlnPs",
            long: &[
                "arg-file",
                "delimiter",
                "eof",
                "replace",
                "max-lines",
                "max-args",
                "max-procs",
                "max-chars",
                "process-slot-var",
            ],
            operands: 0,
        },
        "parallel" => PrefixOptions {
            short: "jNnSIa",
            long: &["jobs", "sshlogin", "arg-file", "max-args", "joblog"],
            operands: 0,
        },
        _ => NO_OPTIONS,
    }
}

/// Index of the first word after the prefix at `idx` and its arguments.
fn skip_prefix_arguments(tokens: &[&str], idx: usize) -> usize {
    let options = prefix_options(command_basename(tokens[idx]));
    let mut operands = options.operands;
    let mut i = idx + 1;

    while i < tokens.len() {
        let token = tokens[i];
        if token == "--" {
            return i + 1;
        }
        if let Some(long) = token.strip_prefix("--") {
            i += 1;
            if !long.contains('=') && options.long.contains(&long) {
                i += 1;
            }
        } else if token.len() > 1 && token.starts_with('-') {
            i += 1;
            if short_cluster_takes_next(&token[1..], options.short) {
                i += 1;
            }
        } else if operands > 0 {
            operands -= 1;
            i += 1;
        } else {
            break;
        }
    }
    i
}

/// In `-Eu`, `u` takes the next word; in `-uroot` the value is attached.
fn short_cluster_takes_next(cluster: &str, value_letters: &str) -> bool {
    cluster
        .char_indices()
        .find(|&(_, c)| value_letters.contains(c))
        .is_some_and(|(pos, c)| pos + c.len_utf8() == cluster.len())
}

/// Command-name rules for deciding which segments invoke `rm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRules {
    safe_tools: Vec<String>,
    indirection_prefixes: Vec<String>,
}

impl Default for CommandRules {
    fn default() -> Self {
        Self {
            safe_tools: DEFAULT_SAFE_TOOLS.iter().map(ToString::to_string).collect(),
            indirection_prefixes: DEFAULT_INDIRECTION_PREFIXES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl CommandRules {
    /// Built-in rules plus the given extras. Extras can only widen the sets.
    #[must_use]
    pub fn with_extras(extra_safe_tools: &[String], extra_prefixes: &[String]) -> Self {
        let mut rules = Self::default();
        extend_unique(&mut rules.safe_tools, extra_safe_tools);
        extend_unique(&mut rules.indirection_prefixes, extra_prefixes);
        rules
    }

    #[must_use]
    pub fn safe_tools(&self) -> &[String] {
        &self.safe_tools
    }

    #[must_use]
    pub fn indirection_prefixes(&self) -> &[String] {
        &self.indirection_prefixes
    }

    fn is_safe_tool(&self, token: &str) -> bool {
        let name = command_basename(token);
        self.safe_tools.iter().any(|t| t == name)
    }

    fn is_indirection_prefix(&self, token: &str) -> bool {
        let name = command_basename(token);
        self.indirection_prefixes.iter().any(|p| p == name)
    }

    /// Whether `segment` is a real `rm` invocation that needs path scrutiny.
    #[must_use]
    pub fn invokes_rm(&self, segment: &str) -> bool {
        if !mentions_rm(segment) {
            return false;
        }

        let tokens: Vec<&str> = segment.split_whitespace().collect();
        let Some(command_idx) = self.command_word(&tokens, 0) else {
            return false;
        };
        let command = tokens[command_idx];

        if is_rm_word(command) {
            return true;
        }
        if self.is_safe_tool(command) {
            debug!(segment, tool = command, "rm belongs to a safe tool");
            return false;
        }

        // `time sudo rm ...` style chains further along the segment.
        (command_idx + 1..tokens.len()).any(|idx| {
            self.is_indirection_prefix(tokens[idx])
                && self
                    .command_word(&tokens, idx)
                    .is_some_and(|word| is_rm_word(tokens[word]))
        })
    }

    /// Index of the word that actually runs, starting at `start`. Shell
    /// keywords, `NAME=VALUE` assignments and indirection prefixes (with
    /// their own options and option values) are passed over.
    fn command_word(&self, tokens: &[&str], start: usize) -> Option<usize> {
        let mut idx = start;
        while idx < tokens.len() {
            let token = tokens[idx];
            if is_env_assignment(token) || SHELL_KEYWORDS.contains(&token) {
                idx += 1;
            } else if self.is_indirection_prefix(token) {
                idx = skip_prefix_arguments(tokens, idx);
            } else {
                return Some(idx);
            }
        }
        None
    }

    /// Filter `segments` down to the ones that invoke `rm`.
    #[must_use]
    pub fn extract_rm_segments<'a>(&self, segments: &[&'a str]) -> Vec<&'a str> {
        segments
            .iter()
            .copied()
            .filter(|segment| self.invokes_rm(segment))
            .collect()
    }
}

/// Cheap check for `rm` as a distinct word anywhere in `text`.
#[inline]
#[must_use]
pub fn mentions_rm(text: &str) -> bool {
    memmem::find(text.as_bytes(), b"rm").is_some() && RM_WORD.is_match(text)
}

/// `rm`, an absolute path to it, or the alias-bypassing `\rm`, quoted or not.
#[must_use]
pub fn is_rm_word(token: &str) -> bool {
    let token = strip_matching_quotes(token);
    let token = token.strip_prefix('\\').unwrap_or(token);
    token == "rm" || (token.starts_with('/') && token.ends_with("/rm"))
}

/// `NAME=VALUE` prefix assignment as accepted by POSIX shells.
#[must_use]
pub fn is_env_assignment(token: &str) -> bool {
    let Some((name, _)) = token.split_once('=') else {
        return false;
    };
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn command_basename(token: &str) -> &str {
    let token = strip_matching_quotes(token);
    token.rsplit('/').next().unwrap_or(token)
}

fn strip_matching_quotes(token: &str) -> &str {
    if token.len() >= 2
        && ((token.starts_with('"') && token.ends_with('"'))
            || (token.starts_with('\'') && token.ends_with('\'')))
    {
        return &token[1..token.len() - 1];
    }
    token
}

fn extend_unique(target: &mut Vec<String>, extras: &[String]) {
    for extra in extras {
        let extra = extra.trim();
        if !extra.is_empty() && !target.iter().any(|t| t == extra) {
            target.push(extra.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> CommandRules {
        CommandRules::default()
    }

    #[test]
    fn plain_rm_is_included() {
        assert!(rules().invokes_rm("rm -rf build"));
        assert!(rules().invokes_rm("rm file.txt"));
    }

    #[test]
    fn segments_without_rm_word_are_skipped() {
        let r = rules();
        assert!(!r.invokes_rm("ls -la"));
        assert!(!r.invokes_rm("echo firmware"));
        assert!(!r.invokes_rm("npm run format"));
        assert!(!r.invokes_rm("rmdir empty"));
    }

    #[test]
    fn safe_tool_subcommands_are_excluded() {
        let r = rules();
        assert!(!r.invokes_rm("git rm -rf somefile"));
        assert!(!r.invokes_rm("docker rm -f container"));
        assert!(!r.invokes_rm("cargo rm serde"));
        assert!(!r.invokes_rm("/usr/bin/git rm --cached x"));
    }

    #[test]
    fn indirection_prefixes_are_included() {
        let r = rules();
        assert!(r.invokes_rm("sudo rm -rf /"));
        assert!(r.invokes_rm("xargs rm -rf"));
        assert!(r.invokes_rm("exec rm -rf /tmp/x"));
        assert!(r.invokes_rm("parallel rm -rf ::: a b"));
        assert!(r.invokes_rm("env FOO=1 rm -rf /"));
        assert!(r.invokes_rm("sudo -u root rm -rf /"));
        assert!(r.invokes_rm("timeout 10 rm -rf /"));
        assert!(r.invokes_rm("sudo -g docker rm -rf /"));
        assert!(r.invokes_rm("sudo -u git rm -rf /etc"));
        assert!(r.invokes_rm("sudo --user git rm -rf /"));
        assert!(r.invokes_rm("sudo -Eu npm rm -rf /"));
        assert!(r.invokes_rm("timeout -s KILL 5 rm -rf /"));
        assert!(r.invokes_rm("nice -n 10 rm -rf /"));
        assert!(r.invokes_rm("env -u git rm -rf /"));
        assert!(r.invokes_rm("xargs -I cargo rm -rf cargo"));
        assert!(r.invokes_rm("sudo -- rm -rf /"));
    }

    #[test]
    fn attached_option_values_do_not_consume_the_command() {
        let r = rules();
        assert!(r.invokes_rm("sudo -uroot rm -rf /"));
        assert!(r.invokes_rm("sudo --user=git rm -rf /"));
        assert!(!r.invokes_rm("sudo -uroot git rm -rf x"));
        assert!(!r.invokes_rm("sudo -E git rm -rf x"));
    }

    #[test]
    fn later_prefix_chains_are_included() {
        let r = rules();
        assert!(r.invokes_rm("time sudo rm -rf /"));
        assert!(r.invokes_rm("echo go; sudo -g docker rm -rf /"));
        assert!(r.invokes_rm("watch sudo -u git rm -rf /"));
    }

    #[test]
    fn shell_keywords_are_transparent() {
        let r = rules();
        for segment in [
            "then rm -rf /",
            "do rm -rf /",
            "else rm -rf /",
            "{ rm -rf /",
            "! rm -rf /",
        ] {
            assert!(r.invokes_rm(segment), "{segment}");
        }
        assert!(!r.invokes_rm("then git rm -rf x"));
    }

    #[test]
    fn short_cluster_value_detection() {
        assert!(short_cluster_takes_next("u", "ug"));
        assert!(short_cluster_takes_next("Eu", "ug"));
        assert!(!short_cluster_takes_next("uroot", "ug"));
        assert!(!short_cluster_takes_next("E", "ug"));
        assert!(!short_cluster_takes_next("u", ""));
    }

    #[test]
    fn prefix_then_safe_tool_is_excluded() {
        assert!(!rules().invokes_rm("sudo git rm -rf somefile"));
        assert!(!rules().invokes_rm("sudo docker rm -f web"));
    }

    #[test]
    fn rm_as_plain_argument_is_excluded() {
        let r = rules();
        assert!(!r.invokes_rm("echo rm -rf /"));
        assert!(!r.invokes_rm("grep rm notes.txt"));
    }

    #[test]
    fn absolute_and_escaped_rm_are_recognized() {
        let r = rules();
        assert!(r.invokes_rm("/bin/rm -rf /"));
        assert!(r.invokes_rm(r"\rm -rf /"));
        assert!(r.invokes_rm("sudo /usr/bin/rm -rf /"));
    }

    #[test]
    fn leading_assignments_are_skipped() {
        assert!(rules().invokes_rm("LC_ALL=C rm -rf /"));
        assert!(!rules().invokes_rm("GIT_DIR=x git rm -rf y"));
    }

    #[test]
    fn extract_keeps_order_and_filters() {
        let segments = ["ls", "rm -rf dist", "git rm x", "sudo rm -rf /"];
        assert_eq!(
            rules().extract_rm_segments(&segments),
            vec!["rm -rf dist", "sudo rm -rf /"]
        );
    }

    #[test]
    fn configured_extras_extend_defaults() {
        let r = CommandRules::with_extras(&["kubectl".to_string()], &["doit".to_string()]);
        assert!(!r.invokes_rm("kubectl rm thing"));
        assert!(r.invokes_rm("doit rm -rf /"));
        assert!(r.safe_tools().iter().any(|t| t == "git"));
        assert!(r.indirection_prefixes().iter().any(|p| p == "sudo"));
    }

    #[test]
    fn env_assignment_detection() {
        assert!(is_env_assignment("FOO=bar"));
        assert!(is_env_assignment("_X1="));
        assert!(!is_env_assignment("--opt=1"));
        assert!(!is_env_assignment("1A=b"));
        assert!(!is_env_assignment("rm"));
    }
}
