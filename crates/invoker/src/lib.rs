use async_trait::async_trait;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use model::env::SELF_FUNCTION_NAME;
use model::{Error, ProvisioningEvent};

/// Schedules a resumption payload for asynchronous execution.
///
/// The call is fire-and-forget: the current invocation observes no result
/// and sends no callback after a successful handoff.
#[async_trait]
pub trait Reinvoker: Send + Sync {
    async fn reinvoke(&self, event: &ProvisioningEvent) -> Result<(), Error>;
}

/// Re-invokes the currently executing Lambda function with an `Event`
/// (asynchronous) invocation.
pub struct LambdaReinvoker {
    lambda_client: aws_sdk_lambda::Client,
    function_name: String,
}

impl LambdaReinvoker {
    pub fn new(lambda_client: aws_sdk_lambda::Client, function_name: impl Into<String>) -> Self {
        LambdaReinvoker {
            lambda_client,
            function_name: function_name.into(),
        }
    }

    /// Target the function named by the runtime environment.
    pub fn from_env(lambda_client: aws_sdk_lambda::Client) -> Result<Self, Error> {
        let function_name: String = std::env::var(SELF_FUNCTION_NAME)
            .map_err(|_| format!("Missing {SELF_FUNCTION_NAME} environment variable"))?;

        Ok(LambdaReinvoker::new(lambda_client, function_name))
    }
}

#[async_trait]
impl Reinvoker for LambdaReinvoker {
    async fn reinvoke(&self, event: &ProvisioningEvent) -> Result<(), Error> {
        let payload: Vec<u8> = serde_json::to_vec(event)?;

        tracing::info!(
            function_name = %self.function_name,
            physical_id = event.physical_resource_id.as_deref().unwrap_or_default(),
            "Scheduling resumption invocation"
        );

        self.lambda_client
            .invoke()
            .function_name(self.function_name.as_str())
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_lambda::operation::invoke::InvokeOutput;
    use aws_smithy_mocks::{Rule, mock, mock_client};
    use model::RequestKind;

    fn resumed_event() -> ProvisioningEvent {
        serde_json::from_value(serde_json::json!({
            "RequestType": "Create",
            "ResponseURL": "https://cloudformation.example/callback",
            "StackId": "stack-1",
            "RequestId": "req-1",
            "LogicalResourceId": "Resource",
            "PhysicalResourceId": "b-123",
            "WaitComplete": true
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn reinvokes_self_with_event_payload() {
        let invoke_rule: Rule = mock!(aws_sdk_lambda::Client::invoke)
            .match_requests(|request| {
                let body = request.payload().unwrap().clone().into_inner();
                let event: ProvisioningEvent = serde_json::from_slice(&body).unwrap();

                request.function_name() == Some("provision-handler")
                    && request.invocation_type() == Some(&InvocationType::Event)
                    && event.wait_complete
                    && event.request_type == RequestKind::Create
            })
            .then_output(|| InvokeOutput::builder().build());

        let client: aws_sdk_lambda::Client = mock_client!(aws_sdk_lambda, [&invoke_rule]);
        let reinvoker = LambdaReinvoker::new(client, "provision-handler");

        reinvoker
            .reinvoke(&resumed_event())
            .await
            .expect("reinvocation should succeed");

        assert_eq!(1, invoke_rule.num_calls());
    }
}
