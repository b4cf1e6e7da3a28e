//! Custom resource action managing a CloudFormation stack in another region.

mod states;

use action::diagnostics::{ResourceEvent, failure_reason};
use action::{Action, ActionError, Begun, OperationHandle, Preflight};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::error::ProvideErrorMetadata;
use aws_sdk_cloudformation::types::{Capability, OnFailure, Parameter, StackEvent};
use model::{
    EffectiveCommand, OperationResult, PollOutcome, Properties, ProvisioningEvent, RequestKind,
};

const REGION: &str = "Region";
const STACK_NAME: &str = "StackName";
const TEMPLATE_URL: &str = "TemplateUrl";
const CAPABILITIES: &str = "Capabilities";
const ON_FAILURE: &str = "OnFailure";
const ENABLED_REGIONS: &str = "EnabledRegions";

/// Template properties prefixed with this become stack parameters.
const STACK_PARAM_PREFIX: &str = "StackParam_";

const DEFAULT_CAPABILITIES: &str = "CAPABILITY_IAM";
const DEFAULT_ON_FAILURE: &str = "DELETE";

const NO_UPDATES_MESSAGE: &str = "No updates are to be performed";
const NOT_FOUND_MESSAGE: &str = "does not exist";

/// Builds a CloudFormation client scoped to the request's target region.
/// Clients are constructed per call; no process-wide client state.
#[async_trait]
pub trait CloudFormationFactory: Send + Sync {
    async fn client(&self, region: &str) -> Client;
}

pub struct RegionalClientFactory;

#[async_trait]
impl CloudFormationFactory for RegionalClientFactory {
    async fn client(&self, region: &str) -> Client {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Client::new(&config)
    }
}

pub struct StackAction<F: CloudFormationFactory> {
    factory: F,
}

impl StackAction<RegionalClientFactory> {
    pub fn new() -> Self {
        StackAction {
            factory: RegionalClientFactory,
        }
    }
}

impl Default for StackAction<RegionalClientFactory> {
    fn default() -> Self {
        StackAction::new()
    }
}

impl<F: CloudFormationFactory> StackAction<F> {
    pub fn with_factory(factory: F) -> Self {
        StackAction { factory }
    }

    /// Delete operates on the stack id recorded at creation; create and
    /// update address the stack by its declared name.
    fn target_identity<'a>(event: &'a ProvisioningEvent, stack_name: &'a str) -> &'a str {
        if event.request_type == RequestKind::Delete {
            event
                .physical_resource_id
                .as_deref()
                .unwrap_or(stack_name)
        } else {
            stack_name
        }
    }

    async fn regional_client(&self, event: &ProvisioningEvent) -> Result<Client, ActionError> {
        let region: &str = property(&event.resource_properties, REGION)?;

        Ok(self.factory.client(region).await)
    }

    async fn create(
        &self,
        client: &Client,
        event: &ProvisioningEvent,
    ) -> Result<Begun, ActionError> {
        let properties: &Properties = &event.resource_properties;
        let stack_name: &str = property(properties, STACK_NAME)?;
        let template_url: &str = property(properties, TEMPLATE_URL)?;

        tracing::info!(stack_name, template_url, "Creating stack");

        let output = client
            .create_stack()
            .stack_name(stack_name)
            .template_url(template_url)
            .set_parameters(Some(stack_parameters(properties)))
            .set_capabilities(Some(capabilities(properties)))
            .on_failure(on_failure(properties))
            .send()
            .await
            .map_err(|err| ActionError::remote(err.into_service_error()))?;

        let stack_id: String = output
            .stack_id
            .ok_or_else(|| ActionError::remote("CreateStack returned no stack id"))?;

        Ok(Begun::InProgress(OperationHandle::new(stack_id, None)))
    }

    async fn update(
        &self,
        client: &Client,
        event: &ProvisioningEvent,
    ) -> Result<Begun, ActionError> {
        let properties: &Properties = &event.resource_properties;
        let stack_name: &str = property(properties, STACK_NAME)?;
        let template_url: &str = property(properties, TEMPLATE_URL)?;
        // A create reconciled into an update has no physical id yet.
        let stack_id: &str = event.physical_resource_id.as_deref().unwrap_or(stack_name);

        tracing::info!(stack_id, template_url, "Updating stack");

        let updated = client
            .update_stack()
            .stack_name(stack_id)
            .template_url(template_url)
            .set_parameters(Some(stack_parameters(properties)))
            .set_capabilities(Some(capabilities(properties)))
            .send()
            .await;

        match updated {
            Ok(output) => {
                let stack_id: String = output.stack_id.unwrap_or_else(|| stack_id.to_string());

                Ok(Begun::InProgress(OperationHandle::new(stack_id, None)))
            }
            Err(err) => {
                let service_err = err.into_service_error();

                if message_of(&service_err).contains(NO_UPDATES_MESSAGE) {
                    tracing::info!(stack_id, "No updates to perform");

                    return Ok(Begun::Done(OperationResult::success_with_reason(
                        "no updates were required",
                    )));
                }

                Err(ActionError::remote(service_err))
            }
        }
    }

    async fn delete(
        &self,
        client: &Client,
        event: &ProvisioningEvent,
    ) -> Result<Begun, ActionError> {
        let stack_name: &str = property(&event.resource_properties, STACK_NAME)?;
        let stack_id: &str = Self::target_identity(event, stack_name);

        tracing::info!(stack_id, "Deleting stack");

        client
            .delete_stack()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(|err| ActionError::remote(err.into_service_error()))?;

        Ok(Begun::InProgress(OperationHandle::new(stack_id, None)))
    }

    async fn stack_failure_reason(&self, client: &Client, stack_id: &str) -> String {
        let events: Vec<StackEvent> = match client
            .describe_stack_events()
            .stack_name(stack_id)
            .send()
            .await
        {
            Ok(output) => output.stack_events.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(stack_id, "Could not read stack events: {err}");

                return String::new();
            }
        };

        failure_reason(events.into_iter().map(|event| ResourceEvent {
            status: event
                .resource_status
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
            reason: event.resource_status_reason,
        }))
    }
}

#[async_trait]
impl<F: CloudFormationFactory> Action for StackAction<F> {
    fn name(&self) -> &'static str {
        "regional-cfn-stack"
    }

    fn required_properties(&self) -> &'static [&'static str] {
        &[REGION, STACK_NAME, TEMPLATE_URL]
    }

    /// Create and update requests for a region outside `EnabledRegions`
    /// succeed with a synthetic physical id and provision nothing. The
    /// physical id change makes CloudFormation follow up with a Delete for
    /// the old id when a region is disabled in place.
    async fn preflight(&self, event: &ProvisioningEvent) -> Result<Option<Preflight>, ActionError> {
        let properties: &Properties = &event.resource_properties;

        let Some(enabled) = properties.string(ENABLED_REGIONS) else {
            return Ok(None);
        };
        if event.request_type == RequestKind::Delete {
            return Ok(None);
        }

        let region: &str = property(properties, REGION)?;
        let stack_name: &str = property(properties, STACK_NAME)?;

        if enabled.split(',').any(|candidate| candidate.trim() == region) {
            return Ok(None);
        }

        tracing::info!(region, stack_name, "Region not enabled, skipping");

        Ok(Some(Preflight {
            physical_id: Some(format!("Disabled{}{stack_name}", region.replace('-', ""))),
            result: OperationResult::success_with_reason(format!(
                "region {region} is not enabled for this stack"
            )),
        }))
    }

    async fn exists(&self, event: &ProvisioningEvent) -> Result<bool, ActionError> {
        let client: Client = self.regional_client(event).await?;
        let stack_name: &str = property(&event.resource_properties, STACK_NAME)?;
        let identity: &str = Self::target_identity(event, stack_name);

        match client.describe_stacks().stack_name(identity).send().await {
            Ok(output) => {
                let status: Option<String> = output
                    .stacks
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .and_then(|stack| stack.stack_status)
                    .map(|status| status.as_str().to_string());

                Ok(matches!(status, Some(status) if status != "DELETE_COMPLETE"))
            }
            Err(err) => {
                let service_err = err.into_service_error();

                if message_of(&service_err).contains(NOT_FOUND_MESSAGE) {
                    return Ok(false);
                }

                Err(ActionError::remote(service_err))
            }
        }
    }

    async fn begin(
        &self,
        command: &EffectiveCommand,
        event: &ProvisioningEvent,
    ) -> Result<Begun, ActionError> {
        let client: Client = self.regional_client(event).await?;

        match command {
            EffectiveCommand::Create => self.create(&client, event).await,
            EffectiveCommand::Update => self.update(&client, event).await,
            EffectiveCommand::Delete => self.delete(&client, event).await,
            EffectiveCommand::NoOp { reason } => Ok(Begun::Done(
                OperationResult::success_with_reason(reason.clone()),
            )),
        }
    }

    async fn poll(
        &self,
        event: &ProvisioningEvent,
        handle: &OperationHandle,
    ) -> Result<PollOutcome, ActionError> {
        let client: Client = self.regional_client(event).await?;
        let stack_id: &str = handle.physical_id.as_str();

        let status: Option<String> = client
            .describe_stacks()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(|err| ActionError::remote(err.into_service_error()))?
            .stacks
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|stack| stack.stack_status)
            .map(|status| status.as_str().to_string());

        let Some(status) = status else {
            return Ok(PollOutcome::Pending);
        };

        tracing::debug!(stack_id, %status, "Observed stack status");

        if states::success_states(event.request_type).contains(&status.as_str()) {
            return Ok(PollOutcome::Terminal(OperationResult::success(None)));
        }
        if states::failure_states(event.request_type).contains(&status.as_str()) {
            let reason: String = self.stack_failure_reason(&client, stack_id).await;

            return Ok(PollOutcome::Terminal(OperationResult::failure(reason)));
        }

        Ok(PollOutcome::Pending)
    }
}

fn property<'a>(properties: &'a Properties, key: &str) -> Result<&'a str, ActionError> {
    properties
        .string(key)
        .ok_or_else(|| ActionError::Validation(format!("{key} property missing")))
}

fn stack_parameters(properties: &Properties) -> Vec<Parameter> {
    properties
        .0
        .iter()
        .filter_map(|(key, value)| {
            let parameter_key: &str = key.strip_prefix(STACK_PARAM_PREFIX)?;
            let parameter_value: String = match value.as_str() {
                Some(text) => text.to_string(),
                None => value.to_string(),
            };

            Some(
                Parameter::builder()
                    .parameter_key(parameter_key)
                    .parameter_value(parameter_value)
                    .build(),
            )
        })
        .collect()
}

fn capabilities(properties: &Properties) -> Vec<Capability> {
    properties
        .string(CAPABILITIES)
        .unwrap_or(DEFAULT_CAPABILITIES)
        .split(',')
        .map(|capability| Capability::from(capability.trim()))
        .collect()
}

fn on_failure(properties: &Properties) -> OnFailure {
    OnFailure::from(
        properties
            .string(ON_FAILURE)
            .unwrap_or(DEFAULT_ON_FAILURE),
    )
}

fn message_of(err: &impl ProvideErrorMetadata) -> &str {
    err.meta().message().unwrap_or_default()
}
