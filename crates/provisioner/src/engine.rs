use action::{Action, ActionError, OperationHandle};
use invoker::Reinvoker;
use lambda_runtime::tracing;
use model::budget::BudgetClock;
use model::{Error, OperationResult, PollOutcome, ProvisioningEvent};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Pause between polls while budget remains. Bounds control-plane call
/// volume and the latency added by polling instead of event notification.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum remaining budget required to risk another poll-sleep cycle.
/// Must leave enough time to serialize resumption state and issue the
/// reinvocation call; dispatching an async Lambda invoke takes well under a
/// second, so 10 seconds is a wide margin.
pub const DEFAULT_LOW_WATER_MARK: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub low_water_mark: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            poll_interval: DEFAULT_POLL_INTERVAL,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
        }
    }
}

impl EngineConfig {
    /// The low-water mark must exceed the poll interval, otherwise the
    /// engine could decide to sleep when it no longer has time to safely
    /// suspend afterwards.
    pub fn validated(self) -> Result<Self, Error> {
        if self.low_water_mark <= self.poll_interval {
            return Err(format!(
                "low-water mark ({:?}) must exceed the poll interval ({:?})",
                self.low_water_mark, self.poll_interval
            )
            .into());
        }

        Ok(self)
    }
}

/// How one physical invocation of the wait loop ended.
#[derive(Debug)]
pub enum Driven {
    /// The operation reached a terminal state; report it.
    Completed {
        handle: OperationHandle,
        result: OperationResult,
    },
    /// Budget ran out; a resumption invocation has been scheduled and this
    /// invocation must end without reporting anything.
    Suspended,
}

#[derive(Debug)]
pub enum DriveError {
    Action(ActionError),
    /// The self-reinvocation call could not be issued. Fatal: no further
    /// invocation will occur for this logical request.
    Reinvocation(Error),
}

impl From<ActionError> for DriveError {
    fn from(err: ActionError) -> Self {
        DriveError::Action(err)
    }
}

impl Display for DriveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DriveError::Action(err) => write!(f, "{err}"),
            DriveError::Reinvocation(err) => {
                write!(f, "failed to schedule resumption invocation: {err}")
            }
        }
    }
}

impl std::error::Error for DriveError {}

/// Drives an in-flight operation to a terminal result, suspending into a
/// fresh invocation whenever the remaining budget is too small to keep
/// waiting safely.
pub struct ContinuationEngine {
    config: EngineConfig,
    reinvoker: Arc<dyn Reinvoker>,
}

impl ContinuationEngine {
    pub fn new(config: EngineConfig, reinvoker: Arc<dyn Reinvoker>) -> Self {
        ContinuationEngine { config, reinvoker }
    }

    pub async fn drive<A: Action + ?Sized>(
        &self,
        action: &A,
        event: &ProvisioningEvent,
        handle: OperationHandle,
        budget: &dyn BudgetClock,
    ) -> Result<Driven, DriveError> {
        let low_water_millis: u64 = self.config.low_water_mark.as_millis() as u64;

        loop {
            let observed: PollOutcome = action.poll(event, &handle).await?;

            // The budget is re-read every iteration; a cached reading could
            // miss the suspension window entirely.
            let remaining_millis: u64 = budget.remaining_millis();
            let outcome: PollOutcome = match observed {
                PollOutcome::Pending if remaining_millis < low_water_millis => {
                    PollOutcome::TimedOut
                }
                other => other,
            };

            match outcome {
                PollOutcome::Terminal(result) => {
                    tracing::info!(
                        physical_id = %handle.physical_id,
                        status = ?result.status,
                        "Operation reached terminal state"
                    );

                    return Ok(Driven::Completed { handle, result });
                }
                PollOutcome::TimedOut => {
                    tracing::info!(
                        physical_id = %handle.physical_id,
                        remaining_millis,
                        "Remaining budget below low-water mark, suspending"
                    );

                    let resumption: ProvisioningEvent =
                        event.resumption(&handle.physical_id, handle.data.clone());
                    self.reinvoker
                        .reinvoke(&resumption)
                        .await
                        .map_err(DriveError::Reinvocation)?;

                    return Ok(Driven::Suspended);
                }
                PollOutcome::Pending => {
                    tracing::debug!(
                        physical_id = %handle.physical_id,
                        remaining_millis,
                        "Operation pending, polling again in {:?}",
                        self.config.poll_interval
                    );

                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::RequestKind;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use test_utils::{FakeBudget, RecordingReinvoker, ScriptedAction, test_event};

    fn instant_config() -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::ZERO,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
        }
    }

    #[test]
    fn config_rejects_low_water_mark_not_above_poll_interval() {
        let config = EngineConfig {
            poll_interval: Duration::from_secs(10),
            low_water_mark: Duration::from_secs(10),
        };

        assert!(config.validated().is_err());
    }

    #[tokio::test]
    async fn completes_when_poll_reaches_terminal_state() {
        let action = ScriptedAction::new().polls(vec![
            PollOutcome::Pending,
            PollOutcome::Terminal(OperationResult::success(None)),
        ]);
        let reinvoker = Arc::new(RecordingReinvoker::new());
        let engine = ContinuationEngine::new(instant_config(), reinvoker.clone());

        let driven = engine
            .drive(
                &action,
                &test_event(RequestKind::Create),
                OperationHandle::new("id-1", None),
                &FakeBudget::plenty(),
            )
            .await
            .unwrap();

        match driven {
            Driven::Completed { handle, result } => {
                assert_eq!("id-1", handle.physical_id);
                assert!(result.is_success());
            }
            Driven::Suspended => panic!("should have completed"),
        }
        assert_eq!(0, reinvoker.count());
    }

    #[tokio::test]
    async fn suspends_once_budget_crosses_low_water_mark() {
        let action = ScriptedAction::new().polls(vec![
            PollOutcome::Pending,
            PollOutcome::Pending,
            PollOutcome::Pending,
        ]);
        let reinvoker = Arc::new(RecordingReinvoker::new());
        let engine = ContinuationEngine::new(instant_config(), reinvoker.clone());

        // Two readings above the 10s mark, then one below it.
        let budget = FakeBudget::sequence(&[30_000, 20_000, 8_000]);
        let handle = OperationHandle::new("id-1", Some(json!({"Partial": true})));

        let driven = engine
            .drive(&action, &test_event(RequestKind::Create), handle, &budget)
            .await
            .unwrap();

        assert!(matches!(driven, Driven::Suspended));
        assert_eq!(3, action.poll_calls.load(Ordering::SeqCst));

        let resumptions = reinvoker.events.lock().unwrap();
        assert_eq!(1, resumptions.len());
        assert!(resumptions[0].wait_complete);
        assert_eq!(Some("id-1".to_string()), resumptions[0].physical_resource_id);
        assert_eq!(Some(json!({"Partial": true})), resumptions[0].data);
    }

    #[tokio::test]
    async fn terminal_failure_is_returned_without_reinvocation() {
        let action = ScriptedAction::new().polls(vec![PollOutcome::Terminal(
            OperationResult::failure("resource rolled back"),
        )]);
        let reinvoker = Arc::new(RecordingReinvoker::new());
        let engine = ContinuationEngine::new(instant_config(), reinvoker.clone());

        // Low budget must not matter once the state is terminal.
        let driven = engine
            .drive(
                &action,
                &test_event(RequestKind::Create),
                OperationHandle::new("id-1", None),
                &FakeBudget::sequence(&[2_000]),
            )
            .await
            .unwrap();

        match driven {
            Driven::Completed { result, .. } => {
                assert!(!result.is_success());
                assert_eq!(Some("resource rolled back".to_string()), result.reason);
            }
            Driven::Suspended => panic!("terminal failure must not suspend"),
        }
        assert_eq!(0, reinvoker.count());
    }

    #[tokio::test]
    async fn reinvocation_failure_is_fatal() {
        let action = ScriptedAction::new().polls(vec![PollOutcome::Pending]);
        let engine = ContinuationEngine::new(
            instant_config(),
            Arc::new(RecordingReinvoker::failing()),
        );

        let result = engine
            .drive(
                &action,
                &test_event(RequestKind::Create),
                OperationHandle::new("id-1", None),
                &FakeBudget::sequence(&[5_000]),
            )
            .await;

        assert!(matches!(result, Err(DriveError::Reinvocation(_))));
    }
}
