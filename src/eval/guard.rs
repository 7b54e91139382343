use uuid::Uuid;

use super::{Decision, DecisionEngine, Evaluation, Intent, ToolCall};

/// Outcome of running a tool call through [`DecisionEngine::guard`].
#[derive(Debug)]
pub struct Guarded<T> {
    pub decision: Decision,
    pub reason: String,
    pub approval_id: Option<Uuid>,
    /// Executor output. `None` unless the call was allowed.
    pub output: Option<T>,
}

impl<T> Guarded<T> {
    pub fn executed(&self) -> bool {
        self.output.is_some()
    }
}

impl DecisionEngine {
    /// Evaluate `call` and run `execute` only when the decision is allow.
    ///
    /// Blocked calls and calls awaiting approval never reach the executor.
    pub fn guard<T>(
        &self,
        call: &ToolCall,
        intent: &Intent,
        execute: impl FnOnce(&ToolCall) -> T,
    ) -> Guarded<T> {
        let Evaluation {
            decision,
            reason,
            approval_id,
        } = self.evaluate(call, intent);
        let output = (decision == Decision::Allow).then(|| execute(call));
        Guarded {
            decision,
            reason,
            approval_id,
            output,
        }
    }
}
