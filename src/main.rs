#![forbid(unsafe_code)]
//! tool-guard: `PreToolUse` hook for AI coding agents.
//!
//! Reads one tool invocation as JSON from stdin and decides whether it may
//! run. Blocks `rm -rf` aimed at anything not known to be disposable, and any
//! access to `.env` secrets files.
//!
//! Exit behavior:
//!   - Exit 2 with the reason on stderr = block
//!   - Exit 0 = allow
//!
//! Anything that goes wrong before a decision (unreadable or oversized input,
//! malformed JSON, a panic) allows the invocation. Argument errors exit 1.

use std::panic;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tool_guard::cli::{self, Cli};
use tool_guard::config::Config;
use tool_guard::hook::{self, BLOCK_EXIT_CODE, HookReadError, ToolInvocation};
use tool_guard::interceptor::Interceptor;
use tool_guard::logging;
use tracing::{debug, warn};

fn main() {
    // Parse CLI arguments. Argument errors must not look like a block, so
    // they exit 1 rather than clap's default 2.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    // If there's a subcommand, handle it and exit.
    if let Some(command) = cli.command {
        let config = Config::load();
        hook::configure_colors(&config.general.color);
        logging::init_logging(&config.general);
        match cli::run_command(command) {
            Ok(code) => process::exit(code),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }

    // Hook mode: a panic anywhere below allows the invocation.
    panic::set_hook(Box::new(|_| {}));
    let block_reason = panic::catch_unwind(run_hook).unwrap_or(None);

    if let Some(reason) = block_reason {
        hook::print_block_message(&reason);
        process::exit(BLOCK_EXIT_CODE);
    }
}

/// Evaluate the invocation on stdin. Returns the block reason, if any.
fn run_hook() -> Option<String> {
    let config = Config::load();
    hook::configure_colors(&config.general.color);
    logging::init_logging(&config.general);

    // Check if bypass is requested (escape hatch)
    if Config::is_bypassed() {
        debug!("bypass requested; allowing");
        return None;
    }

    let max_input_bytes = config.general.max_hook_input_bytes();
    let raw = match hook::read_hook_input(max_input_bytes) {
        Ok(raw) => raw,
        Err(HookReadError::InputTooLarge(len)) => {
            eprintln!(
                "[tool-guard] Warning: stdin input ({len} bytes) exceeds limit ({max_input_bytes} bytes); allowing (fail-open)"
            );
            return None;
        }
        Err(e) => {
            debug!(error = %e, "unreadable hook input; allowing");
            return None;
        }
    };

    // Payloads that are not an invocation object are allowed unrecorded.
    let invocation = match ToolInvocation::from_value(&raw) {
        Ok(invocation) => invocation,
        Err(e) => {
            debug!(error = %e, "hook input is not a tool invocation; allowing");
            return None;
        }
    };

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let interceptor = match Interceptor::from_config(&config, &cwd) {
        Ok(interceptor) => interceptor,
        Err(e) => {
            warn!(error = %e, "invalid guard configuration; allowing");
            return None;
        }
    };

    let decision = interceptor.intercept(&invocation, &raw);
    if decision.is_blocked() {
        decision.reason
    } else {
        None
    }
}
