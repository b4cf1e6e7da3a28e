//! Core of the custom resource framework: reconciliation of declared intent
//! against observed remote state, and a polling continuation that suspends
//! into a fresh invocation when the execution budget runs low.

pub mod decider;
pub mod engine;
pub mod runtime;

pub use decider::decide;
pub use engine::{ContinuationEngine, DriveError, Driven, EngineConfig};
pub use runtime::{Outcome, ProvisionerRuntime};

use action::Action;
use lambda_runtime::{LambdaEvent, tracing};
use model::{DeadlineBudget, Error, ProvisioningEvent};

/// Handler body for one Lambda invocation, for use with
/// `lambda_runtime::run(service_fn(..))`.
///
/// ```no_compile
/// let runtime: ProvisionerRuntime<StackAction> = ...;
///
/// lambda_runtime::run(service_fn(|event| provision_fn(&runtime, event)))
/// .await
/// ```
pub async fn provision_fn<A: Action>(
    runtime: &ProvisionerRuntime<A>,
    event: LambdaEvent<ProvisioningEvent>,
) -> Result<(), Error> {
    let budget = DeadlineBudget::new(event.context.deadline);
    let payload: ProvisioningEvent = event.payload;

    tracing::info!(
        request_id = %payload.request_id,
        kind = ?payload.request_type,
        resumed = payload.wait_complete,
        "Received provisioning event"
    );

    let outcome: Outcome = runtime.handle(&payload, &budget).await?;

    tracing::info!(request_id = %payload.request_id, "Invocation ended: {outcome:?}");

    Ok(())
}
