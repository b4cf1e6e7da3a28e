pub mod diagnostics;

use async_trait::async_trait;
use model::{EffectiveCommand, Error, OperationResult, PollOutcome, ProvisioningEvent};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Identity and partial result of an operation that has been started but not
/// yet observed complete. This is everything a later invocation needs to
/// keep waiting.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    pub physical_id: String,
    pub data: Option<Value>,
}

impl OperationHandle {
    pub fn new(physical_id: impl Into<String>, data: Option<Value>) -> Self {
        OperationHandle {
            physical_id: physical_id.into(),
            data,
        }
    }
}

/// Result of initiating an operation.
#[derive(Debug)]
pub enum Begun {
    /// The remote operation was started and must be polled to completion.
    InProgress(OperationHandle),
    /// The operation finished within the initiating call.
    Done(OperationResult),
}

/// A short-circuit result produced before any reconciliation, carrying its
/// own physical id when the target was never materialised.
#[derive(Debug)]
pub struct Preflight {
    pub physical_id: Option<String>,
    pub result: OperationResult,
}

/// Domain logic for one custom resource kind.
///
/// The runtime and continuation engine drive implementations of this trait;
/// an implementation never reports results or reinvokes itself.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    /// Property keys that must be present before any remote call is made.
    fn required_properties(&self) -> &'static [&'static str] {
        &[]
    }

    /// Optional short-circuit evaluated before reconciliation.
    async fn preflight(&self, _event: &ProvisioningEvent) -> Result<Option<Preflight>, ActionError> {
        Ok(None)
    }

    /// Read-only existence probe for the target resource. Safe to repeat.
    async fn exists(&self, event: &ProvisioningEvent) -> Result<bool, ActionError>;

    /// Compare declared immutable properties against the observed remote
    /// configuration. A returned message fails the update before any
    /// mutation is attempted.
    async fn immutable_drift(
        &self,
        _event: &ProvisioningEvent,
    ) -> Result<Option<String>, ActionError> {
        Ok(None)
    }

    /// Issue the initiating remote call for the effective command.
    ///
    /// Called at most once per logical request; a resumed invocation goes
    /// straight back to `poll`.
    async fn begin(
        &self,
        command: &EffectiveCommand,
        event: &ProvisioningEvent,
    ) -> Result<Begun, ActionError>;

    /// Observe the current state of an in-flight operation.
    ///
    /// Never returns `PollOutcome::TimedOut`; that variant belongs to the
    /// engine's budget handling.
    async fn poll(
        &self,
        event: &ProvisioningEvent,
        handle: &OperationHandle,
    ) -> Result<PollOutcome, ActionError>;
}

/// Failures raised by action implementations.
#[derive(Debug)]
pub enum ActionError {
    /// The request was malformed before any remote call.
    Validation(String),
    /// An immutable property differs from the deployed resource.
    ImmutableChange(String),
    /// The remote control plane rejected or failed a call.
    Remote(Error),
}

impl ActionError {
    pub fn remote(err: impl Into<Error>) -> Self {
        ActionError::Remote(err.into())
    }
}

impl Display for ActionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionError::Validation(message) => write!(f, "{message}"),
            ActionError::ImmutableChange(message) => write!(f, "{message}"),
            ActionError::Remote(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ActionError {}
