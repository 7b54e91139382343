use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const UUID: &str = "[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}";

static APPROVE: LazyLock<Regex> = LazyLock::new(|| command_regex("approve"));
static DENY: LazyLock<Regex> = LazyLock::new(|| command_regex("deny"));

/// `approve <uuid>`, `/approve <uuid>` or `/approve approve <uuid>`, anywhere
/// in the message after whitespace.
fn command_regex(verb: &str) -> Regex {
    Regex::new(&format!(r"(?i)(?:^|\s)(?:/{verb}\s+)?/?{verb}\s+({UUID})"))
        .expect("approval command regex must compile")
}

/// The approver's verdict on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Deny,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Approve => "approve",
            Verdict::Deny => "deny",
        }
    }
}

/// An approve/deny command found in a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalCommand {
    pub id: Uuid,
    pub verdict: Verdict,
}

/// Look for an approval command in free text. Approve takes precedence when a
/// message somehow contains both.
pub fn parse_approval_command(text: &str) -> Option<ApprovalCommand> {
    let text = text.trim();
    [(&*APPROVE, Verdict::Approve), (&*DENY, Verdict::Deny)]
        .into_iter()
        .find_map(|(re, verdict)| {
            let caps = re.captures(text)?;
            let id = Uuid::parse_str(&caps[1].to_ascii_lowercase()).ok()?;
            Some(ApprovalCommand { id, verdict })
        })
}
