pub mod context;
pub mod decision;
mod guard;

pub use context::{Intent, PATH_KEYS, ToolCall};
pub use decision::{Decision, Evaluation, RuleMatch};
pub use guard::Guarded;

use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use uuid::Uuid;

use crate::approval::{ApprovalCommand, ApprovalLedger, ExpiryPolicy, SystemClock, Verdict};
use crate::config::Config;
use crate::protect::{PROTECTED_PATH_REASON, PathProtection};
use crate::rules::{RuleAction, RuleFile, RuleSet, RuleSource, match_rules};

/// Reason reported when a previously granted approval lets a call through.
pub const APPROVAL_CONSUMED_REASON: &str = "Approved by user (one-use approval consumed)";

/// Framework tools that bypass policy (pairing, internal and host tools).
pub const DEFAULT_INTERNAL_TOOL_PATTERNS: &[&str] = &[
    r"^pairing$",
    r"^device[-_]?pair",
    r"^pair\b",
    r"internal",
    r"^openclaw\.",
];

/// Block message shown to the agent when a call needs a human decision.
pub fn approval_message(reason: &str, id: Uuid) -> String {
    format!(
        "[Approval required] {reason}\n\n\
         Request ID: {id}\n\n\
         Ask the user: Reply approve {id} to allow this action, or deny {id} to block it. \
         This is a one-use approval; after approving, retry the same action."
    )
}

/// Result of handling an approve/deny chat command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub command: ApprovalCommand,
    /// False when the id was unknown, expired, or already resolved.
    pub applied: bool,
}

/// The per-call decision pipeline: internal-tool bypass, path protection,
/// rule matching, then the approval ledger.
pub struct DecisionEngine {
    rules: Box<dyn RuleSource>,
    default_when_no_match: RuleAction,
    path_protection: Option<PathProtection>,
    internal_tools: Vec<Regex>,
    ledger: Arc<ApprovalLedger>,
}

impl DecisionEngine {
    /// Engine with default path protection and internal-tool patterns.
    pub fn new(rules: impl RuleSource + 'static, ledger: Arc<ApprovalLedger>) -> Self {
        Self {
            rules: Box::new(rules),
            default_when_no_match: RuleAction::default(),
            path_protection: Some(PathProtection::default()),
            internal_tools: compile_internal_patterns(DEFAULT_INTERNAL_TOOL_PATTERNS),
            ledger,
        }
    }

    /// Engine over a fixed, in-memory rule list.
    pub fn with_rules(rules: RuleSet, ledger: Arc<ApprovalLedger>) -> Self {
        Self::new(Arc::new(rules), ledger)
    }

    /// Build the engine from configuration, reading rules from `rules_path`.
    /// The rules file and the user overlay are always path-protected while
    /// protection is enabled.
    pub fn from_config(config: &Config, ledger: Arc<ApprovalLedger>) -> Self {
        let mut engine = Self::new(RuleFile::new(config.rules_path()), ledger);
        engine.default_when_no_match = config.settings.default_when_no_match;
        engine.path_protection = config
            .path_protection
            .enabled
            .then(|| PathProtection::new(&config.protection_config()));
        engine.internal_tools = compile_internal_patterns(&config.internal_tools.patterns);
        engine
    }

    /// A ledger on the system clock configured from `config`.
    pub fn ledger_from_config(config: &Config) -> Arc<ApprovalLedger> {
        Arc::new(ApprovalLedger::new(
            SystemClock,
            ExpiryPolicy {
                ttl: config.approvals.ttl(),
                expire_resolved: config.approvals.expire_resolved,
            },
        ))
    }

    pub fn set_default_when_no_match(&mut self, action: RuleAction) {
        self.default_when_no_match = action;
    }

    /// Replace (or with `None`, disable) path protection.
    pub fn set_path_protection(&mut self, protection: Option<PathProtection>) {
        self.path_protection = protection;
    }

    pub fn set_internal_tool_patterns<S: AsRef<str>>(&mut self, patterns: &[S]) {
        self.internal_tools = compile_internal_patterns(patterns);
    }

    pub fn ledger(&self) -> &Arc<ApprovalLedger> {
        &self.ledger
    }

    fn is_internal_tool(&self, tool_name: &str) -> bool {
        self.internal_tools.iter().any(|re| re.is_match(tool_name))
    }

    /// Decide whether the host may execute `call`.
    pub fn evaluate(&self, call: &ToolCall, intent: &Intent) -> Evaluation {
        if self.is_internal_tool(&call.tool_name) {
            return Evaluation::allow(format!("internal tool: {}", call.tool_name));
        }

        if let Some(protection) = &self.path_protection
            && protection.is_violation(call)
        {
            log::warn!("BLOCKED: protected path - {}", call.tool_name);
            return Evaluation::block(PROTECTED_PATH_REASON);
        }

        let rules = self.rules.load();
        let result = match_rules(call, intent, &rules, self.default_when_no_match);

        match result.decision {
            Decision::Block => {
                log::warn!("BLOCKED: {} ({})", call.tool_name, result.reason);
                Evaluation::block(result.reason)
            }
            Decision::RequiresApproval => {
                if self.ledger.consume_if_approved(&call.tool_name, &call.args) {
                    log::info!("ALLOWED: {} approved by user, one-use consumed", call.tool_name);
                    return Evaluation::allow(APPROVAL_CONSUMED_REASON);
                }
                let id = self.ledger.create(&call.tool_name, &call.args, &result.reason);
                log::warn!(
                    "REQUIRES_APPROVAL: {} ({}) request={id}",
                    call.tool_name,
                    result.reason
                );
                Evaluation {
                    decision: Decision::RequiresApproval,
                    reason: approval_message(&result.reason, id),
                    approval_id: Some(id),
                }
            }
            Decision::Allow => Evaluation::allow(result.reason),
        }
    }

    /// Apply an approve/deny command if `text` contains one. Unrelated
    /// messages return `None`.
    pub fn on_message(&self, text: &str) -> Option<Resolution> {
        let command = crate::approval::parse_approval_command(text)?;
        let applied = self.ledger.resolve(command.id, command.verdict);
        if applied {
            let verb = match command.verdict {
                Verdict::Approve => "approved",
                Verdict::Deny => "denied",
            };
            log::info!("user {verb} request {}", command.id);
        } else {
            log::debug!(
                "ignored {} for unknown or settled request {}",
                command.verdict.as_str(),
                command.id
            );
        }
        Some(Resolution { command, applied })
    }

    /// Sweep expired approval requests as of the ledger's clock.
    pub fn sweep_expired(&self) -> usize {
        self.ledger.sweep_expired(self.ledger.now())
    }
}

fn compile_internal_patterns<S: AsRef<str>>(patterns: &[S]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| {
            let p = p.as_ref();
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| log::warn!("ignoring invalid internal tool pattern {p:?}: {e}"))
                .ok()
        })
        .collect()
}
