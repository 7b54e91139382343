//! ai-permissions-layer: a decision engine that gates an agent's tool calls.
//!
//! Every tool call is checked before execution and receives one of three
//! decisions: [`eval::Decision::Allow`], [`eval::Decision::RequiresApproval`],
//! or [`eval::Decision::Block`]. Calls that need approval mint a one-use
//! request id; the human answers `approve <id>` or `deny <id>` in chat, and an
//! approved request lets exactly one identical retry through.
//!
//! # Architecture
//!
//! - **[`eval`]**: Decision engine (internal-tool bypass, path protection, rules, approvals).
//! - **[`rules`]**: Compiled rules, rule sources, and the matcher.
//! - **[`protect`]**: Path protection for file-writing tools.
//! - **[`approval`]**: One-use approval ledger, fingerprints, and chat command parsing.
//! - **[`compiler`]**: Plain-language rules to compiled rules via a language model.
//! - **[`config`]**: Configuration loading from embedded defaults + user overlay merge.
//! - **[`logging`]**: Decision logging to `~/.local/share/ai-permissions-layer/decisions.log`.

/// One-use approval ledger and approve/deny command parsing.
pub mod approval;
/// Rule compiler front end (prompt, reply parsing, rules-file writing).
pub mod compiler;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Error type for the fallible edges of the crate.
pub mod error;
/// Decision engine: tool calls, decisions, and the evaluation pipeline.
pub mod eval;
/// File-based decision logging.
pub mod logging;
/// Protected-path checks for dangerous tools.
pub mod protect;
/// Compiled rules and rule matching.
pub mod rules;

pub use error::{Error, Result};

use eval::{Intent, RuleMatch, ToolCall};
use rules::RuleSet;

/// Match a call against `rules` using the default configuration's no-match
/// decision. Path protection and approvals are not involved.
///
/// This is the main entry point for tests and simple usage.
/// For the full pipeline, build an [`eval::DecisionEngine`].
pub fn evaluate(call: &ToolCall, intent: &Intent, rules: &RuleSet) -> RuleMatch {
    let config = config::Config::default_config();
    rules::match_rules(call, intent, rules, config.settings.default_when_no_match)
}
