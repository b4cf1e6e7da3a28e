use action::{Action, ActionError, Begun, OperationHandle};
use async_trait::async_trait;
use callback::{CfnResponse, ResponseReporter};
use invoker::Reinvoker;
use model::budget::BudgetClock;
use model::{
    EffectiveCommand, Error, OperationResult, PollOutcome, ProvisioningEvent, RequestKind,
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A provisioning event with plausible CloudFormation envelope fields.
pub fn test_event(kind: RequestKind) -> ProvisioningEvent {
    test_event_with_properties(kind, json!({}))
}

pub fn test_event_with_properties(kind: RequestKind, properties: Value) -> ProvisioningEvent {
    serde_json::from_value(json!({
        "RequestType": kind,
        "ResponseURL": "https://cloudformation.example/callback",
        "StackId": "arn:aws:cloudformation:eu-west-1:123:stack/parent/abc",
        "RequestId": "req-1",
        "LogicalResourceId": "Resource",
        "ResourceProperties": properties,
    }))
    .expect("test event should deserialize")
}

/// Budget returning a scripted sequence of readings; the final reading
/// repeats once the script is exhausted.
pub struct FakeBudget {
    readings: Mutex<VecDeque<u64>>,
    last: Mutex<u64>,
}

impl FakeBudget {
    pub fn sequence(readings: &[u64]) -> Self {
        FakeBudget {
            readings: Mutex::new(readings.iter().copied().collect()),
            last: Mutex::new(*readings.last().expect("at least one reading")),
        }
    }

    /// A budget that never approaches the low-water mark.
    pub fn plenty() -> Self {
        FakeBudget::sequence(&[900_000])
    }
}

impl BudgetClock for FakeBudget {
    fn remaining_millis(&self) -> u64 {
        match self.readings.lock().unwrap().pop_front() {
            Some(reading) => {
                *self.last.lock().unwrap() = reading;
                reading
            }
            None => *self.last.lock().unwrap(),
        }
    }
}

/// Records resumption payloads instead of re-invoking anything.
pub struct RecordingReinvoker {
    pub events: Mutex<Vec<ProvisioningEvent>>,
    fail: bool,
}

impl RecordingReinvoker {
    pub fn new() -> Self {
        RecordingReinvoker {
            events: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A reinvoker whose dispatch call always fails.
    pub fn failing() -> Self {
        RecordingReinvoker {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl Reinvoker for RecordingReinvoker {
    async fn reinvoke(&self, event: &ProvisioningEvent) -> Result<(), Error> {
        if self.fail {
            return Err("lambda invoke unavailable".into());
        }

        self.events.lock().unwrap().push(event.clone());

        Ok(())
    }
}

/// Records response documents instead of calling back to CloudFormation.
pub struct RecordingReporter {
    pub responses: Mutex<Vec<CfnResponse>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        RecordingReporter {
            responses: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    pub fn single(&self) -> CfnResponse {
        let responses = self.responses.lock().unwrap();
        assert_eq!(1, responses.len(), "expected exactly one response");

        responses[0].clone()
    }
}

#[async_trait]
impl ResponseReporter for RecordingReporter {
    async fn respond(
        &self,
        event: &ProvisioningEvent,
        physical_id: Option<&str>,
        result: &OperationResult,
    ) -> Result<(), Error> {
        self.responses
            .lock()
            .unwrap()
            .push(CfnResponse::assemble(event, physical_id, result));

        Ok(())
    }
}

enum BeginScript {
    InProgress { physical_id: String },
    Done(OperationResult),
}

/// An action whose probe, begin and poll behaviour is scripted up front,
/// with counters for asserting interaction patterns.
pub struct ScriptedAction {
    required: &'static [&'static str],
    exists: bool,
    drift: Option<String>,
    begin: BeginScript,
    poll_script: Mutex<VecDeque<PollOutcome>>,

    pub begin_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub exists_calls: AtomicUsize,
    pub begun_commands: Mutex<Vec<EffectiveCommand>>,
}

impl ScriptedAction {
    pub fn new() -> Self {
        ScriptedAction {
            required: &[],
            exists: false,
            drift: None,
            begin: BeginScript::InProgress {
                physical_id: "scripted-id".to_string(),
            },
            poll_script: Mutex::new(VecDeque::new()),
            begin_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            exists_calls: AtomicUsize::new(0),
            begun_commands: Mutex::new(Vec::new()),
        }
    }

    pub fn requires(mut self, keys: &'static [&'static str]) -> Self {
        self.required = keys;
        self
    }

    pub fn target_exists(mut self, exists: bool) -> Self {
        self.exists = exists;
        self
    }

    pub fn with_drift(mut self, message: &str) -> Self {
        self.drift = Some(message.to_string());
        self
    }

    pub fn begins_in_progress(mut self, physical_id: &str) -> Self {
        self.begin = BeginScript::InProgress {
            physical_id: physical_id.to_string(),
        };
        self
    }

    pub fn begins_done(mut self, result: OperationResult) -> Self {
        self.begin = BeginScript::Done(result);
        self
    }

    /// Outcomes returned by successive polls; once drained, polls report
    /// `Pending` forever.
    pub fn polls(self, outcomes: Vec<PollOutcome>) -> Self {
        self.script_polls(outcomes);
        self
    }

    /// Replace the poll script on an action already in use, e.g. between
    /// the suspending and resuming halves of a scenario.
    pub fn script_polls(&self, outcomes: Vec<PollOutcome>) {
        *self.poll_script.lock().unwrap() = outcomes.into();
    }
}

#[async_trait]
impl Action for ScriptedAction {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn required_properties(&self) -> &'static [&'static str] {
        self.required
    }

    async fn exists(&self, _event: &ProvisioningEvent) -> Result<bool, ActionError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);

        Ok(self.exists)
    }

    async fn immutable_drift(
        &self,
        _event: &ProvisioningEvent,
    ) -> Result<Option<String>, ActionError> {
        Ok(self.drift.clone())
    }

    async fn begin(
        &self,
        command: &EffectiveCommand,
        _event: &ProvisioningEvent,
    ) -> Result<Begun, ActionError> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        self.begun_commands.lock().unwrap().push(command.clone());

        Ok(match &self.begin {
            BeginScript::InProgress { physical_id } => {
                Begun::InProgress(OperationHandle::new(physical_id.clone(), None))
            }
            BeginScript::Done(result) => Begun::Done(result.clone()),
        })
    }

    async fn poll(
        &self,
        _event: &ProvisioningEvent,
        _handle: &OperationHandle,
    ) -> Result<PollOutcome, ActionError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);

        Ok(self
            .poll_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PollOutcome::Pending))
    }
}
