//! Lambda entry point for the AmazonMQ broker custom resource.

use action_broker::BrokerAction;
use aws_config::BehaviorVersion;
use callback::HttpReporter;
use invoker::LambdaReinvoker;
use lambda_runtime::{LambdaEvent, service_fn, tracing};
use model::env::CURRENT_REGION;
use model::{Error, ProvisioningEvent};
use provisioner::{ProvisionerRuntime, provision_fn};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let mq_client: aws_sdk_mq::Client = aws_sdk_mq::Client::new(&config);
    let lambda_client: aws_sdk_lambda::Client = aws_sdk_lambda::Client::new(&config);

    let region: String = std::env::var(CURRENT_REGION)
        .map_err(|_| format!("Missing {CURRENT_REGION} environment variable"))?;

    let runtime: ProvisionerRuntime<BrokerAction> = ProvisionerRuntime::new(
        BrokerAction::new(mq_client, region),
        Arc::new(HttpReporter::default()),
        Arc::new(LambdaReinvoker::from_env(lambda_client)?),
    )?;

    lambda_runtime::run(service_fn(|event: LambdaEvent<ProvisioningEvent>| {
        provision_fn(&runtime, event)
    }))
    .await
}
