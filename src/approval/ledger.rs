use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::fingerprint::fingerprint;
use super::message::Verdict;

/// Default lifetime of an unresolved request.
pub const DEFAULT_TTL: TimeDelta = TimeDelta::hours(1);
/// Default period of the background sweeper.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

/// Ledger lookup result for a request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusOf {
    Pending,
    Approved,
    Denied,
    Unknown,
}

impl From<ApprovalStatus> for StatusOf {
    fn from(status: ApprovalStatus) -> Self {
        match status {
            ApprovalStatus::Pending => StatusOf::Pending,
            ApprovalStatus::Approved => StatusOf::Approved,
            ApprovalStatus::Denied => StatusOf::Denied,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingApproval {
    pub id: Uuid,
    pub tool_name: String,
    pub params: Map<String, Value>,
    pub status: ApprovalStatus,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    fingerprint: String,
}

/// Expiry policy for ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Pending entries strictly older than this are swept.
    pub ttl: TimeDelta,
    /// Also sweep approved/denied entries `ttl` after resolution.
    pub expire_resolved: bool,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            expire_resolved: true,
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    by_id: HashMap<Uuid, PendingApproval>,
    by_fingerprint: HashMap<String, Uuid>,
}

impl LedgerState {
    /// Remove an entry and, if it still owns it, its fingerprint mapping.
    fn remove(&mut self, id: &Uuid) -> Option<PendingApproval> {
        let entry = self.by_id.remove(id)?;
        if self.by_fingerprint.get(&entry.fingerprint) == Some(id) {
            self.by_fingerprint.remove(&entry.fingerprint);
        }
        Some(entry)
    }
}

/// One-use store of approval requests, keyed by id and by (tool, params)
/// fingerprint.
///
/// Every operation runs under a single lock, so an approval is consumed at
/// most once even when tool calls race on the same fingerprint.
pub struct ApprovalLedger {
    state: Mutex<LedgerState>,
    clock: Box<dyn Clock>,
    policy: ExpiryPolicy,
}

impl ApprovalLedger {
    pub fn new(clock: impl Clock + 'static, policy: ExpiryPolicy) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            clock: Box::new(clock),
            policy,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a new pending request and point the fingerprint at it.
    pub fn create(&self, tool_name: &str, params: &Map<String, Value>, reason: &str) -> Uuid {
        let id = Uuid::new_v4();
        let key = fingerprint(tool_name, params);
        let entry = PendingApproval {
            id,
            tool_name: tool_name.to_string(),
            params: params.clone(),
            status: ApprovalStatus::Pending,
            reason: reason.to_string(),
            created_at: self.clock.now(),
            resolved_at: None,
            fingerprint: key.clone(),
        };

        let mut state = self.state();
        state.by_id.insert(id, entry);
        state.by_fingerprint.insert(key, id);
        id
    }

    /// Move a pending request to approved or denied.
    ///
    /// Returns false without touching the ledger when the id is unknown or the
    /// request was already resolved. An approved request takes over its
    /// fingerprint so that it authorizes the next identical call even if a
    /// newer request for the same call was raised meanwhile.
    pub fn resolve(&self, id: Uuid, verdict: Verdict) -> bool {
        let now = self.clock.now();
        let mut state = self.state();
        let Some(entry) = state.by_id.get_mut(&id) else {
            return false;
        };
        if entry.status != ApprovalStatus::Pending {
            return false;
        }

        entry.resolved_at = Some(now);
        entry.status = match verdict {
            Verdict::Approve => ApprovalStatus::Approved,
            Verdict::Deny => ApprovalStatus::Denied,
        };
        if verdict == Verdict::Approve {
            let key = entry.fingerprint.clone();
            state.by_fingerprint.insert(key, id);
        }
        true
    }

    /// Consume the approval for this exact call, if one was granted.
    pub fn consume_if_approved(&self, tool_name: &str, params: &Map<String, Value>) -> bool {
        let key = fingerprint(tool_name, params);
        let mut state = self.state();
        let Some(id) = state.by_fingerprint.get(&key).copied() else {
            return false;
        };
        let approved = state
            .by_id
            .get(&id)
            .is_some_and(|e| e.status == ApprovalStatus::Approved);
        if !approved {
            return false;
        }
        state.remove(&id);
        true
    }

    pub fn status_of(&self, id: Uuid) -> StatusOf {
        self.state()
            .by_id
            .get(&id)
            .map_or(StatusOf::Unknown, |e| e.status.into())
    }

    /// Snapshot of a single entry.
    pub fn get(&self, id: Uuid) -> Option<PendingApproval> {
        self.state().by_id.get(&id).cloned()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.state().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries past their lifetime as of `now`. Returns how many were removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.policy.ttl;
        let expire_resolved = self.policy.expire_resolved;
        let mut state = self.state();

        let expired: Vec<Uuid> = state
            .by_id
            .values()
            .filter(|e| match (e.status, e.resolved_at) {
                (ApprovalStatus::Pending, _) => now - e.created_at > ttl,
                (_, Some(resolved_at)) => expire_resolved && now - resolved_at > ttl,
                (_, None) => false,
            })
            .map(|e| e.id)
            .collect();

        for id in &expired {
            state.remove(id);
        }
        if !expired.is_empty() {
            log::debug!("swept {} expired approval request(s)", expired.len());
        }
        expired.len()
    }
}

impl Default for ApprovalLedger {
    fn default() -> Self {
        Self::new(SystemClock, ExpiryPolicy::default())
    }
}

impl std::fmt::Debug for ApprovalLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalLedger")
            .field("entries", &self.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Sweep `ledger` every `interval` on a background thread for the life of the process.
pub fn spawn_sweeper(
    ledger: Arc<ApprovalLedger>,
    interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("approval-sweeper".into())
        .spawn(move || {
            loop {
                std::thread::sleep(interval);
                ledger.sweep_expired(ledger.now());
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ManualClock;
    use serde_json::json;

    fn params(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn ledger(expire_resolved: bool) -> (Arc<ManualClock>, ApprovalLedger) {
        let clock = Arc::new(ManualClock::default());
        let ledger = ApprovalLedger::new(
            Arc::clone(&clock),
            ExpiryPolicy {
                ttl: DEFAULT_TTL,
                expire_resolved,
            },
        );
        (clock, ledger)
    }

    #[test]
    fn sweeper_thread_removes_expired_requests() {
        let clock = Arc::new(ManualClock::default());
        let ledger = Arc::new(ApprovalLedger::new(Arc::clone(&clock), ExpiryPolicy::default()));
        let id = ledger.create("exec", &Map::new(), "ask");
        spawn_sweeper(Arc::clone(&ledger), Duration::from_millis(10)).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(ledger.status_of(id), StatusOf::Pending);

        clock.advance(DEFAULT_TTL + TimeDelta::minutes(1));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while ledger.status_of(id) != StatusOf::Unknown {
            assert!(std::time::Instant::now() < deadline, "sweeper never ran");
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn create_is_pending() {
        let (_, ledger) = ledger(true);
        let id = ledger.create("gmail.send", &Map::new(), "ask");
        assert_eq!(ledger.status_of(id), StatusOf::Pending);
        assert_eq!(id.get_version_num(), 4);
        let entry = ledger.get(id).unwrap();
        assert_eq!(entry.tool_name, "gmail.send");
        assert_eq!(entry.reason, "ask");
    }

    #[test]
    fn ids_are_unique() {
        let (_, ledger) = ledger(true);
        let a = ledger.create("t", &Map::new(), "");
        let b = ledger.create("t", &Map::new(), "");
        assert_ne!(a, b);
    }

    #[test]
    fn pending_is_not_consumable() {
        let (_, ledger) = ledger(true);
        ledger.create("t", &Map::new(), "");
        assert!(!ledger.consume_if_approved("t", &Map::new()));
    }

    #[test]
    fn consume_without_any_request() {
        let (_, ledger) = ledger(true);
        assert!(!ledger.consume_if_approved("t", &Map::new()));
    }

    #[test]
    fn approval_is_one_use() {
        let (_, ledger) = ledger(true);
        let p = params(json!({"to": "a@b.c", "body": "hi"}));
        let id = ledger.create("gmail.send", &p, "ask");
        assert!(ledger.resolve(id, Verdict::Approve));
        assert_eq!(ledger.status_of(id), StatusOf::Approved);

        let reordered = params(json!({"body": "hi", "to": "a@b.c"}));
        assert!(ledger.consume_if_approved("gmail.send", &reordered));
        assert!(!ledger.consume_if_approved("gmail.send", &p));
        assert_eq!(ledger.status_of(id), StatusOf::Unknown);
        assert!(ledger.is_empty());
    }

    #[test]
    fn approval_does_not_cover_other_params() {
        let (_, ledger) = ledger(true);
        let id = ledger.create("gmail.send", &params(json!({"to": "a"})), "");
        ledger.resolve(id, Verdict::Approve);
        assert!(!ledger.consume_if_approved("gmail.send", &params(json!({"to": "b"}))));
        assert!(!ledger.consume_if_approved("gmail.delete", &params(json!({"to": "a"}))));
    }

    #[test]
    fn denied_is_terminal() {
        let (_, ledger) = ledger(true);
        let id = ledger.create("t", &Map::new(), "");
        assert!(ledger.resolve(id, Verdict::Deny));
        assert_eq!(ledger.status_of(id), StatusOf::Denied);
        assert!(!ledger.consume_if_approved("t", &Map::new()));
        assert!(!ledger.resolve(id, Verdict::Approve));
        assert_eq!(ledger.status_of(id), StatusOf::Denied);
    }

    #[test]
    fn resolve_twice_fails_without_mutation() {
        let (_, ledger) = ledger(true);
        let id = ledger.create("t", &Map::new(), "");
        assert!(ledger.resolve(id, Verdict::Approve));
        let before = ledger.get(id).unwrap();
        assert!(!ledger.resolve(id, Verdict::Deny));
        let after = ledger.get(id).unwrap();
        assert_eq!(after.status, ApprovalStatus::Approved);
        assert_eq!(before.resolved_at, after.resolved_at);
    }

    #[test]
    fn resolve_unknown() {
        let (_, ledger) = ledger(true);
        assert!(!ledger.resolve(Uuid::new_v4(), Verdict::Approve));
        assert!(ledger.is_empty());
    }

    #[test]
    fn resolve_after_consume_fails() {
        let (_, ledger) = ledger(true);
        let id = ledger.create("t", &Map::new(), "");
        ledger.resolve(id, Verdict::Approve);
        assert!(ledger.consume_if_approved("t", &Map::new()));
        assert!(!ledger.resolve(id, Verdict::Approve));
    }

    #[test]
    fn newer_request_takes_fingerprint() {
        let (_, ledger) = ledger(true);
        let first = ledger.create("t", &Map::new(), "");
        let second = ledger.create("t", &Map::new(), "");
        assert!(ledger.resolve(second, Verdict::Approve));
        assert!(ledger.consume_if_approved("t", &Map::new()));
        assert!(!ledger.consume_if_approved("t", &Map::new()));
        assert_eq!(ledger.status_of(first), StatusOf::Pending);
    }

    #[test]
    fn approving_superseded_request_still_authorizes_once() {
        let (_, ledger) = ledger(true);
        let first = ledger.create("t", &Map::new(), "");
        let _second = ledger.create("t", &Map::new(), "");
        assert!(ledger.resolve(first, Verdict::Approve));
        assert!(ledger.consume_if_approved("t", &Map::new()));
        assert!(!ledger.consume_if_approved("t", &Map::new()));
    }

    #[test]
    fn sweep_removes_stale_pending() {
        let (clock, ledger) = ledger(false);
        let id = ledger.create("t", &Map::new(), "");
        clock.advance(TimeDelta::minutes(59));
        assert_eq!(ledger.sweep_expired(clock.now()), 0);
        clock.advance(TimeDelta::minutes(2));
        assert_eq!(ledger.sweep_expired(clock.now()), 1);
        assert_eq!(ledger.status_of(id), StatusOf::Unknown);
        assert!(!ledger.resolve(id, Verdict::Approve));
    }

    #[test]
    fn sweep_at_exact_ttl_keeps_entry() {
        let (clock, ledger) = ledger(false);
        let id = ledger.create("t", &Map::new(), "");
        clock.advance(DEFAULT_TTL);
        ledger.sweep_expired(clock.now());
        assert_eq!(ledger.status_of(id), StatusOf::Pending);
    }

    #[test]
    fn sweep_keeps_resolved_when_policy_off() {
        let (clock, ledger) = ledger(false);
        let id = ledger.create("t", &Map::new(), "");
        ledger.resolve(id, Verdict::Approve);
        clock.advance(TimeDelta::hours(5));
        assert_eq!(ledger.sweep_expired(clock.now()), 0);
        assert_eq!(ledger.status_of(id), StatusOf::Approved);
    }

    #[test]
    fn sweep_bounds_resolved_when_policy_on() {
        let (clock, ledger) = ledger(true);
        let id = ledger.create("t", &Map::new(), "");
        clock.advance(TimeDelta::minutes(50));
        ledger.resolve(id, Verdict::Approve);
        clock.advance(TimeDelta::minutes(30));
        assert_eq!(ledger.sweep_expired(clock.now()), 0);
        clock.advance(TimeDelta::minutes(31));
        assert_eq!(ledger.sweep_expired(clock.now()), 1);
        assert!(!ledger.consume_if_approved("t", &Map::new()));
    }

    #[test]
    fn sweeping_old_request_keeps_newer_fingerprint() {
        let (clock, ledger) = ledger(true);
        let old = ledger.create("t", &Map::new(), "");
        clock.advance(TimeDelta::minutes(45));
        let new = ledger.create("t", &Map::new(), "");
        clock.advance(TimeDelta::minutes(20));
        assert_eq!(ledger.sweep_expired(clock.now()), 1);
        assert_eq!(ledger.status_of(old), StatusOf::Unknown);
        assert!(ledger.resolve(new, Verdict::Approve));
        assert!(ledger.consume_if_approved("t", &Map::new()));
    }

    #[test]
    fn concurrent_consumers_win_once() {
        let ledger = Arc::new(ApprovalLedger::default());
        let id = ledger.create("t", &Map::new(), "");
        ledger.resolve(id, Verdict::Approve);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.consume_if_approved("t", &Map::new()))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
