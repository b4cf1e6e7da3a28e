//! Custom resource action managing an AmazonMQ (ActiveMQ) broker.
//!
//! Creation takes ten minutes or more, so the create path is wait-capable;
//! every declared property is immutable once the broker exists, which makes
//! update a drift check followed by a read, and delete is fire-and-forget.

use action::{Action, ActionError, Begun, OperationHandle};
use async_trait::async_trait;
use aws_sdk_mq::Client;
use aws_sdk_mq::types::{BrokerState, DeploymentMode, EngineType, User};
use model::{EffectiveCommand, OperationResult, PollOutcome, Properties, ProvisioningEvent};
use serde_json::{Value, json};

const NAME: &str = "Name";
const MULTI_AZ: &str = "MultiAZ";
const INSTANCE_TYPE: &str = "InstanceType";
const USERNAME: &str = "Username";
const PASSWORD: &str = "Password";
const SECURITY_GROUPS: &str = "SecurityGroups";
const SUBNETS: &str = "Subnets";

const ENGINE_VERSION: &str = "5.15.0";

const IMMUTABLE_CHANGE_MESSAGE: &str =
    "AmazonMQ broker cannot be updated. Create a new resource if changes are required.";

pub struct BrokerAction {
    mq_client: Client,
    region: String,
}

impl BrokerAction {
    pub fn new(mq_client: Client, region: impl Into<String>) -> Self {
        BrokerAction {
            mq_client,
            region: region.into(),
        }
    }

    /// Broker endpoints are derived from the broker id, not returned by the
    /// control plane: `<id>-<n>.mq.<region>.amazonaws.com`.
    fn endpoint(&self, broker_id: &str, node: u8) -> String {
        format!("{broker_id}-{node}.mq.{}.amazonaws.com", self.region)
    }

    fn broker_data(&self, broker_id: &str, broker_arn: &str, multi_az: bool) -> Value {
        let standby: String = if multi_az {
            self.endpoint(broker_id, 2)
        } else {
            "NONE".to_string()
        };

        json!({
            "BrokerId": broker_id,
            "BrokerArn": broker_arn,
            "Active": self.endpoint(broker_id, 1),
            "Standby": standby,
        })
    }

    /// The broker id: the recorded physical id, or a name lookup when a
    /// create request was reconciled into an update.
    async fn resolve_broker_id(
        &self,
        event: &ProvisioningEvent,
    ) -> Result<Option<String>, ActionError> {
        if let Some(physical_id) = &event.physical_resource_id {
            return Ok(Some(physical_id.clone()));
        }

        let name: &str = property(&event.resource_properties, NAME)?;
        let summaries = self
            .mq_client
            .list_brokers()
            .max_results(100)
            .send()
            .await
            .map_err(|err| ActionError::remote(err.into_service_error()))?
            .broker_summaries
            .unwrap_or_default();

        Ok(summaries
            .into_iter()
            .find(|summary| summary.broker_name.as_deref() == Some(name))
            .and_then(|summary| summary.broker_id))
    }

    async fn create(&self, event: &ProvisioningEvent) -> Result<Begun, ActionError> {
        let properties: &Properties = &event.resource_properties;
        let name: &str = property(properties, NAME)?;
        let multi_az: bool = multi_az(properties);

        tracing::info!(name, multi_az, "Creating broker");

        let user: User = User::builder()
            .console_access(true)
            .username(property(properties, USERNAME)?)
            .password(property(properties, PASSWORD)?)
            .build();

        let output = self
            .mq_client
            .create_broker()
            .auto_minor_version_upgrade(false)
            .broker_name(name)
            .deployment_mode(deployment_mode(multi_az))
            .engine_type(EngineType::Activemq)
            .engine_version(ENGINE_VERSION)
            .host_instance_type(property(properties, INSTANCE_TYPE)?)
            .publicly_accessible(false)
            .set_security_groups(string_list(properties, SECURITY_GROUPS))
            .set_subnet_ids(string_list(properties, SUBNETS))
            .users(user)
            .send()
            .await
            .map_err(|err| ActionError::remote(err.into_service_error()))?;

        let broker_id: String = output
            .broker_id
            .ok_or_else(|| ActionError::remote("CreateBroker returned no broker id"))?;
        let broker_arn: String = output.broker_arn.unwrap_or_default();

        tracing::info!(%broker_id, %broker_arn, "Broker creation started");

        let data: Value = self.broker_data(&broker_id, &broker_arn, multi_az);

        Ok(Begun::InProgress(OperationHandle::new(broker_id, Some(data))))
    }

    /// A clean update changes nothing; report the broker's current
    /// attributes so dependent resources keep resolving.
    async fn update(&self, event: &ProvisioningEvent) -> Result<Begun, ActionError> {
        let broker_id: String = self
            .resolve_broker_id(event)
            .await?
            .ok_or_else(|| ActionError::remote("broker disappeared during update"))?;

        let described = self
            .mq_client
            .describe_broker()
            .broker_id(broker_id.as_str())
            .send()
            .await
            .map_err(|err| ActionError::remote(err.into_service_error()))?;

        let data: Value = self.broker_data(
            described.broker_id.as_deref().unwrap_or(broker_id.as_str()),
            described.broker_arn.as_deref().unwrap_or_default(),
            multi_az(&event.resource_properties),
        );

        Ok(Begun::Done(OperationResult::success(Some(data))))
    }

    async fn delete(&self, event: &ProvisioningEvent) -> Result<Begun, ActionError> {
        let broker_id: &str = event.physical_resource_id.as_deref().ok_or_else(|| {
            ActionError::Validation("delete request is missing its physical id".to_string())
        })?;

        tracing::info!(broker_id, "Deleting broker");

        self.mq_client
            .delete_broker()
            .broker_id(broker_id)
            .send()
            .await
            .map_err(|err| ActionError::remote(err.into_service_error()))?;

        Ok(Begun::Done(OperationResult::success(None)))
    }
}

#[async_trait]
impl Action for BrokerAction {
    fn name(&self) -> &'static str {
        "amazon-mq-broker"
    }

    fn required_properties(&self) -> &'static [&'static str] {
        &[
            NAME,
            MULTI_AZ,
            INSTANCE_TYPE,
            USERNAME,
            PASSWORD,
            SECURITY_GROUPS,
            SUBNETS,
        ]
    }

    async fn exists(&self, event: &ProvisioningEvent) -> Result<bool, ActionError> {
        if let Some(physical_id) = &event.physical_resource_id {
            return match self
                .mq_client
                .describe_broker()
                .broker_id(physical_id.as_str())
                .send()
                .await
            {
                Ok(_) => Ok(true),
                Err(err) => {
                    let service_err = err.into_service_error();

                    if service_err.is_not_found_exception() {
                        return Ok(false);
                    }

                    Err(ActionError::remote(service_err))
                }
            };
        }

        Ok(self.resolve_broker_id(event).await?.is_some())
    }

    /// Every declared property is immutable for a deployed broker.
    async fn immutable_drift(
        &self,
        event: &ProvisioningEvent,
    ) -> Result<Option<String>, ActionError> {
        let Some(broker_id) = self.resolve_broker_id(event).await? else {
            return Ok(None);
        };

        let described = self
            .mq_client
            .describe_broker()
            .broker_id(broker_id)
            .send()
            .await
            .map_err(|err| ActionError::remote(err.into_service_error()))?;

        let properties: &Properties = &event.resource_properties;
        let matches: bool = described.broker_name.as_deref()
            == Some(property(properties, NAME)?)
            && described.host_instance_type.as_deref()
                == Some(property(properties, INSTANCE_TYPE)?)
            && described.deployment_mode.as_ref()
                == Some(&deployment_mode(multi_az(properties)))
            && described.security_groups == string_list(properties, SECURITY_GROUPS)
            && described.subnet_ids == string_list(properties, SUBNETS);

        Ok((!matches).then(|| IMMUTABLE_CHANGE_MESSAGE.to_string()))
    }

    async fn begin(
        &self,
        command: &EffectiveCommand,
        event: &ProvisioningEvent,
    ) -> Result<Begun, ActionError> {
        match command {
            EffectiveCommand::Create => self.create(event).await,
            EffectiveCommand::Update => self.update(event).await,
            EffectiveCommand::Delete => self.delete(event).await,
            EffectiveCommand::NoOp { reason } => Ok(Begun::Done(
                OperationResult::success_with_reason(reason.clone()),
            )),
        }
    }

    async fn poll(
        &self,
        _event: &ProvisioningEvent,
        handle: &OperationHandle,
    ) -> Result<PollOutcome, ActionError> {
        let broker_id: &str = handle.physical_id.as_str();

        let state: Option<BrokerState> = self
            .mq_client
            .describe_broker()
            .broker_id(broker_id)
            .send()
            .await
            .map_err(|err| ActionError::remote(err.into_service_error()))?
            .broker_state;

        tracing::debug!(broker_id, state = ?state, "Observed broker state");

        match state {
            Some(BrokerState::Running) => Ok(PollOutcome::Terminal(OperationResult::success(
                handle.data.clone(),
            ))),
            Some(BrokerState::CreationFailed) => Ok(PollOutcome::Terminal(
                OperationResult::failure(format!("Creation of AmazonMQ {broker_id} failed")),
            )),
            _ => Ok(PollOutcome::Pending),
        }
    }
}

fn property<'a>(properties: &'a Properties, key: &str) -> Result<&'a str, ActionError> {
    properties
        .string(key)
        .ok_or_else(|| ActionError::Validation(format!("{key} property missing")))
}

fn string_list(properties: &Properties, key: &str) -> Option<Vec<String>> {
    properties.string_list(key)
}

fn multi_az(properties: &Properties) -> bool {
    properties
        .string(MULTI_AZ)
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

fn deployment_mode(multi_az: bool) -> DeploymentMode {
    if multi_az {
        DeploymentMode::ActiveStandbyMultiAz
    } else {
        DeploymentMode::SingleInstance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_mq::operation::create_broker::CreateBrokerOutput;
    use aws_sdk_mq::operation::describe_broker::DescribeBrokerOutput;
    use aws_smithy_mocks::{Rule, mock, mock_client};
    use model::RequestKind;
    use serde_json::json;
    use test_utils::test_event_with_properties;

    const REGION: &str = "eu-west-1";

    fn broker_event(kind: RequestKind) -> ProvisioningEvent {
        test_event_with_properties(
            kind,
            json!({
                "Name": "orders-broker",
                "MultiAZ": "true",
                "InstanceType": "mq.m5.large",
                "Username": "admin",
                "Password": "hunter22hunter22",
                "SecurityGroups": ["sg-1"],
                "Subnets": ["subnet-1", "subnet-2"]
            }),
        )
    }

    fn described_broker(state: BrokerState) -> DescribeBrokerOutput {
        DescribeBrokerOutput::builder()
            .broker_id("b-1")
            .broker_arn("arn:aws:mq:eu-west-1:123:broker:b-1")
            .broker_name("orders-broker")
            .broker_state(state)
            .host_instance_type("mq.m5.large")
            .deployment_mode(DeploymentMode::ActiveStandbyMultiAz)
            .security_groups("sg-1")
            .subnet_ids("subnet-1")
            .subnet_ids("subnet-2")
            .build()
    }

    #[test]
    fn multi_az_selects_deployment_mode() {
        assert_eq!(DeploymentMode::ActiveStandbyMultiAz, deployment_mode(true));
        assert_eq!(DeploymentMode::SingleInstance, deployment_mode(false));
    }

    #[test]
    fn derives_endpoints_from_broker_id() {
        let unused_rule: Rule = mock!(aws_sdk_mq::Client::describe_broker)
            .then_output(|| DescribeBrokerOutput::builder().build());
        let action = BrokerAction::new(mock_client!(aws_sdk_mq, [&unused_rule]), REGION);

        let data = action.broker_data("b-1", "arn", true);
        assert_eq!(json!("b-1-1.mq.eu-west-1.amazonaws.com"), data["Active"]);
        assert_eq!(json!("b-1-2.mq.eu-west-1.amazonaws.com"), data["Standby"]);

        let data = action.broker_data("b-1", "arn", false);
        assert_eq!(json!("NONE"), data["Standby"]);
    }

    #[tokio::test]
    async fn create_begins_in_progress_with_endpoint_data() {
        let create_rule: Rule = mock!(aws_sdk_mq::Client::create_broker)
            .match_requests(|request| {
                request.broker_name() == Some("orders-broker")
                    && request.deployment_mode() == Some(&DeploymentMode::ActiveStandbyMultiAz)
                    && request.engine_type() == Some(&EngineType::Activemq)
                    && request.subnet_ids() == ["subnet-1", "subnet-2"]
            })
            .then_output(|| {
                CreateBrokerOutput::builder()
                    .broker_id("b-1")
                    .broker_arn("arn:aws:mq:eu-west-1:123:broker:b-1")
                    .build()
            });
        let action = BrokerAction::new(mock_client!(aws_sdk_mq, [&create_rule]), REGION);

        let begun = action
            .begin(&EffectiveCommand::Create, &broker_event(RequestKind::Create))
            .await
            .unwrap();

        match begun {
            Begun::InProgress(handle) => {
                assert_eq!("b-1", handle.physical_id);
                let data = handle.data.unwrap();
                assert_eq!(json!("b-1-1.mq.eu-west-1.amazonaws.com"), data["Active"]);
            }
            Begun::Done(result) => panic!("expected in-progress, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn poll_running_broker_returns_carried_data() {
        let describe_rule: Rule = mock!(aws_sdk_mq::Client::describe_broker)
            .then_output(|| described_broker(BrokerState::Running));
        let action = BrokerAction::new(mock_client!(aws_sdk_mq, [&describe_rule]), REGION);

        let handle = OperationHandle::new("b-1", Some(json!({"BrokerId": "b-1"})));
        let outcome = action
            .poll(&broker_event(RequestKind::Create), &handle)
            .await
            .unwrap();

        match outcome {
            PollOutcome::Terminal(result) => {
                assert!(result.is_success());
                assert_eq!(Some(json!({"BrokerId": "b-1"})), result.output);
            }
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_failed_creation_is_terminal_failure() {
        let describe_rule: Rule = mock!(aws_sdk_mq::Client::describe_broker)
            .then_output(|| described_broker(BrokerState::CreationFailed));
        let action = BrokerAction::new(mock_client!(aws_sdk_mq, [&describe_rule]), REGION);

        let outcome = action
            .poll(
                &broker_event(RequestKind::Create),
                &OperationHandle::new("b-1", None),
            )
            .await
            .unwrap();

        match outcome {
            PollOutcome::Terminal(result) => {
                assert!(!result.is_success());
                assert!(result.reason.unwrap().contains("b-1"));
            }
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_in_progress_broker_is_pending() {
        let describe_rule: Rule = mock!(aws_sdk_mq::Client::describe_broker)
            .then_output(|| described_broker(BrokerState::CreationInProgress));
        let action = BrokerAction::new(mock_client!(aws_sdk_mq, [&describe_rule]), REGION);

        let outcome = action
            .poll(
                &broker_event(RequestKind::Create),
                &OperationHandle::new("b-1", None),
            )
            .await
            .unwrap();

        assert_eq!(PollOutcome::Pending, outcome);
    }

    #[tokio::test]
    async fn matching_configuration_has_no_drift() {
        let describe_rule: Rule = mock!(aws_sdk_mq::Client::describe_broker)
            .then_output(|| described_broker(BrokerState::Running));
        let action = BrokerAction::new(mock_client!(aws_sdk_mq, [&describe_rule]), REGION);

        let mut event = broker_event(RequestKind::Update);
        event.physical_resource_id = Some("b-1".to_string());

        assert!(action.immutable_drift(&event).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn changed_instance_type_is_drift() {
        let describe_rule: Rule = mock!(aws_sdk_mq::Client::describe_broker)
            .then_output(|| described_broker(BrokerState::Running));
        let action = BrokerAction::new(mock_client!(aws_sdk_mq, [&describe_rule]), REGION);

        let mut event = test_event_with_properties(
            RequestKind::Update,
            json!({
                "Name": "orders-broker",
                "MultiAZ": "true",
                "InstanceType": "mq.m5.xlarge",
                "Username": "admin",
                "Password": "hunter22hunter22",
                "SecurityGroups": ["sg-1"],
                "Subnets": ["subnet-1", "subnet-2"]
            }),
        );
        event.physical_resource_id = Some("b-1".to_string());

        let drift = action.immutable_drift(&event).await.unwrap();

        assert_eq!(Some(IMMUTABLE_CHANGE_MESSAGE.to_string()), drift);
    }

    #[tokio::test]
    async fn delete_is_synchronous() {
        let delete_rule: Rule = mock!(aws_sdk_mq::Client::delete_broker)
            .match_requests(|request| request.broker_id() == Some("b-1"))
            .then_output(|| {
                aws_sdk_mq::operation::delete_broker::DeleteBrokerOutput::builder()
                    .broker_id("b-1")
                    .build()
            });
        let action = BrokerAction::new(mock_client!(aws_sdk_mq, [&delete_rule]), REGION);

        let mut event = broker_event(RequestKind::Delete);
        event.physical_resource_id = Some("b-1".to_string());

        let begun = action.begin(&EffectiveCommand::Delete, &event).await.unwrap();

        assert!(matches!(begun, Begun::Done(ref result) if result.is_success()));
        assert_eq!(1, delete_rule.num_calls());
    }
}
