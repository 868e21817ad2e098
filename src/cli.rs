//! CLI argument parsing and command handling.
//!
//! Without a subcommand the binary runs as a `PreToolUse` hook. The
//! subcommands below exercise the same checks interactively.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{Map, Value};

use crate::audit::AuditLog;
use crate::config::{Config, ENV_CONFIG_PATH, find_project_config};
use crate::hook::{BLOCK_EXIT_CODE, ToolInvocation};
use crate::interceptor::Interceptor;
use crate::logging::ENV_LOG_FILTER;
use crate::tokenizer::split_command_segments;

/// Pre-execution guard for AI coding-agent tool calls.
///
/// tool-guard blocks `rm -rf` against anything but known-disposable paths and
/// keeps agents away from `.env` secrets files.
#[derive(Parser, Debug)]
#[command(name = "tool-guard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run (omit to run in hook mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a tool invocation and print the decision
    #[command(name = "test")]
    Test {
        /// Shell command to evaluate
        command: Option<String>,

        /// Tool name presented to the guard
        #[arg(long, short = 't', default_value = "Bash")]
        tool: String,

        /// File path for file tools (Read, Edit, Write, ...)
        #[arg(long)]
        file_path: Option<String>,
    },

    /// Classify paths as rm -rf targets
    #[command(name = "classify")]
    Classify {
        /// Paths to classify
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Show how a command splits into segments
    #[command(name = "segments")]
    Segments {
        /// Shell command to split
        command: String,
    },

    /// Show current configuration
    #[command(name = "config")]
    Config,

    /// Generate a sample configuration file
    #[command(name = "init")]
    Init {
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Summarize the audit log
    #[command(name = "audit")]
    Audit {
        /// Audit log to read (defaults to the configured log)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Number of recent entries to list
        #[arg(long, short = 'n', default_value_t = 10)]
        limit: usize,
    },
}

/// Run a subcommand, returning the process exit code.
///
/// # Errors
///
/// Returns an error if the command cannot complete (unreadable log,
/// unwritable output file, invalid configuration).
pub fn run_command(command: Command) -> Result<i32, Box<dyn std::error::Error>> {
    let config = Config::load();
    let cwd = std::env::current_dir()?;

    match command {
        Command::Test {
            command,
            tool,
            file_path,
        } => test_command(&config, &cwd, command, &tool, file_path),
        Command::Classify { paths } => {
            classify_paths(&config, &paths);
            Ok(0)
        }
        Command::Segments { command } => {
            show_segments(&config, &command);
            Ok(0)
        }
        Command::Config => {
            show_config(&config, &cwd);
            Ok(0)
        }
        Command::Init { output, force } => {
            init_config(output, force)?;
            Ok(0)
        }
        Command::Audit { path, limit } => {
            let path = path.unwrap_or_else(|| config.audit_log_path(&cwd));
            show_audit(&AuditLog::new(path), limit)?;
            Ok(0)
        }
    }
}

/// Evaluate one invocation without recording it.
fn test_command(
    config: &Config,
    cwd: &Path,
    command: Option<String>,
    tool: &str,
    file_path: Option<String>,
) -> Result<i32, Box<dyn std::error::Error>> {
    if command.is_none() && file_path.is_none() {
        return Err("Nothing to test: pass a command or --file-path".into());
    }

    let mut input = Map::new();
    if let Some(command) = &command {
        input.insert("command".to_string(), Value::String(command.clone()));
    }
    if let Some(path) = &file_path {
        input.insert("file_path".to_string(), Value::String(path.clone()));
    }
    let invocation = ToolInvocation::new(tool, Value::Object(input));

    let mut audit_off = config.clone();
    audit_off.audit.enabled = false;
    let interceptor = Interceptor::from_config(&audit_off, cwd)?;
    let decision = interceptor.decide(&invocation);

    println!("Tool: {tool}");
    if let Some(command) = &command {
        println!("Command: {command}");
    }
    if let Some(path) = &file_path {
        println!("File: {path}");
    }
    println!();

    if decision.allowed {
        println!("Result: {}", "ALLOWED".green().bold());
        return Ok(0);
    }

    println!("Result: {}", "BLOCKED".red().bold());
    if let Some(kind) = decision.kind {
        println!("Check: {}", kind.label());
    }
    if let Some(target) = &decision.target {
        println!("Target: {} ({})", target.path, target.classification);
        println!("Segment: {}", target.segment);
    }
    if let Some(reason) = &decision.reason {
        println!("Reason:");
        for line in reason.lines() {
            println!("  {line}");
        }
    }
    Ok(BLOCK_EXIT_CODE)
}

fn classify_paths(config: &Config, paths: &[String]) {
    let rules = config.classifier_rules();
    let width = paths.iter().map(String::len).max().unwrap_or(0);

    for path in paths {
        let classification = rules.classify(path);
        let label = classification.label();
        let label = if classification.is_blocking() {
            label.red()
        } else {
            label.green()
        };
        println!("{path:<width$}  {label}");
    }
}

fn show_segments(config: &Config, command: &str) {
    let rules = config.command_rules();
    let segments = split_command_segments(command);
    if segments.is_empty() {
        println!("(no segments)");
        return;
    }

    for (index, segment) in segments.iter().enumerate() {
        let marker = if rules.invokes_rm(segment) {
            "rm".yellow().bold().to_string()
        } else {
            "  ".to_string()
        };
        println!("{index:>3}  {marker}  {segment}");
    }
}

/// Show the current configuration
fn show_config(config: &Config, cwd: &Path) {
    println!("Current configuration:");
    println!();
    println!("Config sources (lowest → highest priority):");
    if let Ok(value) = std::env::var(ENV_CONFIG_PATH) {
        let path = Path::new(value.trim());
        if path.exists() {
            println!("  - {ENV_CONFIG_PATH}: {}", path.display());
        } else {
            println!("  - {ENV_CONFIG_PATH}: {} (missing)", path.display());
        }
    } else {
        let system_cfg = Config::system_config_path();
        if system_cfg.exists() {
            println!("  - system: {}", system_cfg.display());
        }
        if let Some(user_cfg) = Config::user_config_path().filter(|p| p.exists()) {
            println!("  - user: {}", user_cfg.display());
        }
        if let Some(project_cfg) = find_project_config(cwd) {
            println!("  - project: {}", project_cfg.display());
        }
    }
    println!();

    println!("General:");
    println!("  Color: {}", config.general.color);
    println!("  Verbose: {}", config.general.verbose);
    println!(
        "  Log level: {} (override with {ENV_LOG_FILTER})",
        crate::logging::filter_directive(&config.general)
    );
    println!("  Log file: {:?}", config.general.log_file);
    println!(
        "  Max hook input: {} bytes",
        config.general.max_hook_input_bytes()
    );
    println!();

    println!("Audit:");
    println!("  Enabled: {}", config.audit.enabled);
    println!("  Path: {}", config.audit_log_path(cwd).display());
    println!();

    let classifier = config.classifier_rules();
    println!("Paths:");
    match classifier.home() {
        Some(home) => println!("  Home: {}", home.display()),
        None => println!("  Home: (unknown)"),
    }
    let display = |p: &PathBuf| p.display().to_string();
    print_list("Project roots", classifier.project_roots().iter().map(display));
    print_list("Trusted roots", classifier.trusted_roots().iter().map(display));
    print_list("Safe directories", classifier.safe_directories().iter().cloned());
    println!();

    let commands = config.command_rules();
    println!("Commands:");
    print_list("Safe tools", commands.safe_tools().iter().cloned());
    print_list("Indirection prefixes", commands.indirection_prefixes().iter().cloned());
    println!();

    println!("Sensitive files:");
    println!("  Marker: {}", config.sensitive.marker);
    println!("  Allowed suffix: {}", config.sensitive.allowed_suffix);
}

fn print_list(title: &str, items: impl Iterator<Item = String>) {
    let items: Vec<String> = items.collect();
    if items.is_empty() {
        println!("  {title}: (none)");
    } else {
        println!("  {title}: {}", items.join(", "));
    }
}

/// Generate a sample configuration
fn init_config(output: Option<String>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let sample = Config::generate_sample_config();

    match output {
        Some(path) => {
            let path = Path::new(&path);
            if path.exists() && !force {
                return Err(
                    format!("File exists: {}. Use --force to overwrite.", path.display()).into(),
                );
            }

            // Create parent directories if needed
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            std::fs::write(path, sample)?;
            println!("Configuration written to: {}", path.display());
        }
        None => {
            println!("{sample}");
        }
    }

    Ok(())
}

fn show_audit(log: &AuditLog, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let entries = log.load()?;

    println!("Audit log: {}", log.path().display());
    println!("Entries: {}", entries.len());
    if entries.is_empty() {
        return Ok(());
    }

    let mut by_tool: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in &entries {
        *by_tool.entry(entry_tool(entry)).or_default() += 1;
    }
    println!();
    println!("By tool:");
    for (tool, count) in &by_tool {
        println!("  {tool}: {count}");
    }

    let skip = entries.len().saturating_sub(limit);
    if limit > 0 {
        println!();
        println!("Most recent:");
        for entry in &entries[skip..] {
            println!("  {:<10} {}", entry_tool(entry), entry_subject(entry));
        }
    }
    Ok(())
}

fn entry_tool(entry: &Value) -> &str {
    entry
        .get("tool_name")
        .and_then(Value::as_str)
        .unwrap_or("(unknown)")
}

/// The command or file path an entry acted on.
fn entry_subject(entry: &Value) -> &str {
    let input = entry.get("tool_input");
    ["command", "file_path"]
        .iter()
        .find_map(|key| input.and_then(|i| i.get(*key)).and_then(Value::as_str))
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_hook_mode() {
        let cli = Cli::try_parse_from(["tool-guard"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_subcommand_defaults_to_bash() {
        let cli = Cli::try_parse_from(["tool-guard", "test", "rm -rf /"]).unwrap();
        match cli.command {
            Some(Command::Test { command, tool, file_path }) => {
                assert_eq!(command.as_deref(), Some("rm -rf /"));
                assert_eq!(tool, "Bash");
                assert!(file_path.is_none());
            }
            other => unreachable!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn classify_requires_a_path() {
        assert!(Cli::try_parse_from(["tool-guard", "classify"]).is_err());
    }

    #[test]
    fn audit_limit_parses() {
        let cli = Cli::try_parse_from(["tool-guard", "audit", "-n", "3"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Audit { limit: 3, path: None })));
    }

    #[test]
    fn entry_helpers_tolerate_odd_entries() {
        assert_eq!(entry_tool(&json!({})), "(unknown)");
        assert_eq!(entry_subject(&json!({"tool_input": "x"})), "");
        assert_eq!(
            entry_subject(&json!({"tool_input": {"file_path": "/a/.env"}})),
            "/a/.env"
        );
        assert_eq!(
            entry_subject(&json!({"tool_input": {"command": "ls", "file_path": "x"}})),
            "ls"
        );
    }
}
