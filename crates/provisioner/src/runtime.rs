use crate::decider::decide;
use crate::engine::{ContinuationEngine, DriveError, Driven, EngineConfig};
use action::{Action, ActionError, Begun, OperationHandle, Preflight};
use callback::ResponseReporter;
use invoker::Reinvoker;
use lambda_runtime::tracing;
use model::budget::BudgetClock;
use model::{EffectiveCommand, Error, OperationResult, ProvisioningEvent};
use std::sync::Arc;

/// How one physical invocation ended, from the caller's perspective.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A terminal result was delivered to the callback URL.
    Reported,
    /// The logical request continues in a later invocation; nothing was
    /// reported.
    Suspended,
}

enum Flow {
    Done {
        physical_id: Option<String>,
        result: OperationResult,
    },
    Suspended,
}

/// Ties one action implementation to the continuation engine and the
/// callback reporter, guaranteeing exactly one terminal response per
/// logical request.
pub struct ProvisionerRuntime<A: Action> {
    action: A,
    engine: ContinuationEngine,
    reporter: Arc<dyn ResponseReporter>,
}

impl<A: Action> ProvisionerRuntime<A> {
    pub fn new(
        action: A,
        reporter: Arc<dyn ResponseReporter>,
        reinvoker: Arc<dyn Reinvoker>,
    ) -> Result<Self, Error> {
        ProvisionerRuntime::with_config(action, reporter, reinvoker, EngineConfig::default())
    }

    pub fn with_config(
        action: A,
        reporter: Arc<dyn ResponseReporter>,
        reinvoker: Arc<dyn Reinvoker>,
        config: EngineConfig,
    ) -> Result<Self, Error> {
        let engine = ContinuationEngine::new(config.validated()?, reinvoker);

        Ok(ProvisionerRuntime {
            action,
            engine,
            reporter,
        })
    }

    pub async fn handle(
        &self,
        event: &ProvisioningEvent,
        budget: &dyn BudgetClock,
    ) -> Result<Outcome, Error> {
        match self.execute(event, budget).await {
            Ok(Flow::Done {
                physical_id,
                result,
            }) => {
                self.reporter
                    .respond(event, physical_id.as_deref(), &result)
                    .await?;

                Ok(Outcome::Reported)
            }
            Ok(Flow::Suspended) => Ok(Outcome::Suspended),
            Err(DriveError::Action(err)) => {
                tracing::warn!(action = self.action.name(), "Request failed: {err}");

                let failure = OperationResult::failure(err.to_string());
                self.reporter.respond(event, None, &failure).await?;

                Ok(Outcome::Reported)
            }
            Err(DriveError::Reinvocation(err)) => {
                // The invoking environment itself is compromised, so the
                // report may not arrive either; attempt it and propagate.
                let failure = OperationResult::failure(format!(
                    "Could not schedule resumption invocation: {err}"
                ));
                if let Err(report_err) = self.reporter.respond(event, None, &failure).await {
                    tracing::error!("Final failure response was not delivered: {report_err}");
                }

                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        event: &ProvisioningEvent,
        budget: &dyn BudgetClock,
    ) -> Result<Flow, DriveError> {
        if event.wait_complete {
            return self.resume(event, budget).await;
        }

        self.validate(event)?;

        if let Some(Preflight {
            physical_id,
            result,
        }) = self.action.preflight(event).await?
        {
            return Ok(Flow::Done {
                physical_id,
                result,
            });
        }

        let exists: bool = self.action.exists(event).await?;
        let command: EffectiveCommand = decide(event.request_type, exists);

        tracing::info!(
            action = self.action.name(),
            requested = ?event.request_type,
            exists,
            "Reconciled to effective command {command:?}"
        );

        if let EffectiveCommand::NoOp { reason } = &command {
            return Ok(Flow::Done {
                physical_id: event.physical_resource_id.clone(),
                result: OperationResult::success_with_reason(reason.clone()),
            });
        }

        // Immutable properties are checked before any mutation so a drifted
        // update fails without touching the remote resource.
        if command == EffectiveCommand::Update {
            if let Some(drift) = self.action.immutable_drift(event).await? {
                return Err(ActionError::ImmutableChange(drift).into());
            }
        }

        // Polling judges terminal states per lifecycle kind, so the action
        // and any resumption payload must observe the kind actually
        // executed, not the declared one.
        let event: ProvisioningEvent = event.reconciled(&command);

        match self.action.begin(&command, &event).await? {
            Begun::Done(result) => Ok(Flow::Done {
                physical_id: event.physical_resource_id.clone(),
                result,
            }),
            Begun::InProgress(handle) => self.drive(&event, handle, budget).await,
        }
    }

    /// A resumed invocation goes straight back to polling; `begin` already
    /// ran in the invocation that established the physical id.
    async fn resume(
        &self,
        event: &ProvisioningEvent,
        budget: &dyn BudgetClock,
    ) -> Result<Flow, DriveError> {
        let physical_id: String = event.physical_resource_id.clone().ok_or_else(|| {
            ActionError::Validation("resumed request is missing its physical id".to_string())
        })?;
        let handle = OperationHandle::new(physical_id, event.data.clone());

        self.drive(event, handle, budget).await
    }

    async fn drive(
        &self,
        event: &ProvisioningEvent,
        handle: OperationHandle,
        budget: &dyn BudgetClock,
    ) -> Result<Flow, DriveError> {
        match self.engine.drive(&self.action, event, handle, budget).await? {
            Driven::Completed { handle, result } => Ok(Flow::Done {
                physical_id: Some(handle.physical_id),
                result,
            }),
            Driven::Suspended => Ok(Flow::Suspended),
        }
    }

    fn validate(&self, event: &ProvisioningEvent) -> Result<(), ActionError> {
        for key in self.action.required_properties() {
            if !event.resource_properties.contains(key) {
                return Err(ActionError::Validation(format!("{key} property missing")));
            }
        }

        Ok(())
    }
}
