#![forbid(unsafe_code)]
//! tool-guard library.
//!
//! Pre-execution checks for tool invocations requested by an AI coding agent.
//! Two independent guards run on every invocation: a secrets-file guard for
//! file tools and shell commands, and an `rm -rf` policy for shell commands.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Configuration                             │
//! │  (env vars → project config → user config → system → defaults)  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Interceptor                              │
//! │  hook JSON → ToolInvocation → decision → audit log              │
//! └─────────────────────────────────────────────────────────────────┘
//!                 │                                 │
//!                 ▼                                 ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │     SensitiveFileGuard       │  │        DangerPolicy          │
//! │  file_path / command shapes  │  │  tokenizer → rm extractor    │
//! │                              │  │  → flags → path classifier   │
//! └──────────────────────────────┘  └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use tool_guard::DangerPolicy;
//!
//! let policy = DangerPolicy::default();
//! assert!(policy.must_block("rm -rf /"));
//! assert!(!policy.must_block("rm -rf node_modules"));
//! ```

pub mod audit;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod hook;
pub mod interceptor;
pub mod logging;
pub mod policy;
pub mod sensitive;
pub mod tokenizer;

pub use audit::{AuditError, AuditLog};
pub use classifier::{Classification, ClassifierRules};
pub use config::Config;
pub use error::GuardError;
pub use extractor::CommandRules;
pub use hook::{BLOCK_EXIT_CODE, ToolInvocation};
pub use interceptor::{BlockKind, Interceptor, PolicyDecision};
pub use policy::{DangerPolicy, DangerousTarget};
pub use sensitive::{SensitiveFileGuard, SensitiveMatch};
pub use tokenizer::split_command_segments;
