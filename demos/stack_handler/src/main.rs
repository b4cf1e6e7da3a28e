//! Lambda entry point for the regional CloudFormation stack custom resource.

use action_stack::StackAction;
use aws_config::BehaviorVersion;
use callback::HttpReporter;
use invoker::LambdaReinvoker;
use lambda_runtime::{LambdaEvent, service_fn, tracing};
use model::{Error, ProvisioningEvent};
use provisioner::{ProvisionerRuntime, provision_fn};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let lambda_client: aws_sdk_lambda::Client = aws_sdk_lambda::Client::new(&config);

    let runtime: ProvisionerRuntime<StackAction<_>> = ProvisionerRuntime::new(
        StackAction::new(),
        Arc::new(HttpReporter::default()),
        Arc::new(LambdaReinvoker::from_env(lambda_client)?),
    )?;

    lambda_runtime::run(service_fn(|event: LambdaEvent<ProvisioningEvent>| {
        provision_fn(&runtime, event)
    }))
    .await
}
