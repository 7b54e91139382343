//! Single-pass rule matching with block precedence.

use crate::eval::{Decision, Intent, RuleMatch, ToolCall};
use crate::rules::{RuleAction, RuleSet};

/// Reason reported when no rule is a candidate for the call.
pub const NO_MATCH_REASON: &str = "No matching rule";

/// Evaluate `rules` in order against a call.
///
/// The first candidate is kept unless a later candidate blocks: a `block`
/// candidate always wins and ends the scan. With no candidate, the decision
/// is `default_when_no_match`.
pub fn match_rules(
    call: &ToolCall,
    intent: &Intent,
    rules: &RuleSet,
    default_when_no_match: RuleAction,
) -> RuleMatch {
    let mut matched = None;

    for loaded in rules.iter() {
        if !loaded.is_candidate(call, intent) {
            continue;
        }
        let rule = loaded.rule();
        if rule.action == RuleAction::Block {
            matched = Some(rule);
            break;
        }
        if matched.is_none() {
            matched = Some(rule);
        }
    }

    match matched {
        None => RuleMatch {
            decision: default_when_no_match.into(),
            reason: NO_MATCH_REASON.into(),
        },
        Some(rule) => RuleMatch {
            decision: Decision::from(rule.action),
            reason: if rule.reason.is_empty() {
                "Rule matched".into()
            } else {
                rule.reason.clone()
            },
        },
    }
}
