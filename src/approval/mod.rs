//! One-use human approvals.
//!
//! A call that needs approval mints a request id. The human answers with
//! `approve <id>` or `deny <id>` in chat; an approved request then authorizes
//! exactly one subsequent call with the same tool and parameters.

/// Injectable time source.
pub mod clock;
/// Canonical (tool, params) keys.
pub mod fingerprint;
/// The approval ledger and its background sweeper.
pub mod ledger;
/// Detection of approve/deny commands in chat messages.
pub mod message;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fingerprint::fingerprint;
pub use ledger::{
    ApprovalLedger, ApprovalStatus, ExpiryPolicy, PendingApproval, StatusOf, spawn_sweeper,
};
pub use message::{ApprovalCommand, Verdict, parse_approval_command};
