use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal status of a logical request, as reported back to CloudFormation.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

/// Terminal outcome of an action, produced exactly once per logical request
/// regardless of how many invocations it spanned.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub output: Option<Value>,
    pub reason: Option<String>,
}

impl OperationResult {
    pub fn success(output: Option<Value>) -> Self {
        OperationResult {
            status: OperationStatus::Success,
            output,
            reason: None,
        }
    }

    pub fn success_with_reason(reason: impl Into<String>) -> Self {
        OperationResult {
            status: OperationStatus::Success,
            output: None,
            reason: Some(reason.into()),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        OperationResult {
            status: OperationStatus::Failed,
            output: None,
            reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }
}

/// One observation of an in-flight operation.
///
/// Actions only ever yield `Terminal` or `Pending`; `TimedOut` is synthesized
/// by the continuation engine when the execution budget runs out mid-wait.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Terminal(OperationResult),
    Pending,
    TimedOut,
}

/// The command actually executed after reconciling the declared intent with
/// the observed remote state. May differ from the requested kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectiveCommand {
    Create,
    Update,
    Delete,
    /// Nothing to do; report success with the given reason.
    NoOp { reason: String },
}
