use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rules::RuleAction;

/// Verdict for a single tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    RequiresApproval,
    Block,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::RequiresApproval => "require_approval",
            Decision::Block => "block",
        }
    }
}

impl From<RuleAction> for Decision {
    fn from(action: RuleAction) -> Self {
        match action {
            RuleAction::Allow => Decision::Allow,
            RuleAction::RequireApproval => Decision::RequiresApproval,
            RuleAction::Block => Decision::Block,
        }
    }
}

/// Outcome of running the rule matcher.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub decision: Decision,
    pub reason: String,
}

/// Outcome of the full engine pipeline for one tool call.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: Decision,
    pub reason: String,
    /// Set when a fresh approval request was minted for this call.
    pub approval_id: Option<Uuid>,
}

impl Evaluation {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Allow,
            reason: reason.into(),
            approval_id: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Block,
            reason: reason.into(),
            approval_id: None,
        }
    }

    /// The host must not execute the tool.
    pub fn is_blocked(&self) -> bool {
        self.decision != Decision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_maps_to_decision() {
        assert_eq!(Decision::from(RuleAction::Block), Decision::Block);
        assert_eq!(
            Decision::from(RuleAction::RequireApproval),
            Decision::RequiresApproval
        );
        assert_eq!(Decision::from(RuleAction::Allow), Decision::Allow);
    }

    #[test]
    fn only_allow_is_unblocked() {
        assert!(!Evaluation::allow("ok").is_blocked());
        assert!(Evaluation::block("no").is_blocked());
    }
}
