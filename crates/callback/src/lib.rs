use async_trait::async_trait;
use model::{Error, OperationResult, OperationStatus, ProvisioningEvent};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;

/// The response document CloudFormation expects at the signed callback URL.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CfnResponse {
    pub status: OperationStatus,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CfnResponse {
    /// Assemble the response for a terminal result. The physical id falls
    /// back to the one already attached to the request, and may be absent
    /// only when a fresh create failed before the resource existed.
    pub fn assemble(
        event: &ProvisioningEvent,
        physical_id: Option<&str>,
        result: &OperationResult,
    ) -> CfnResponse {
        CfnResponse {
            status: result.status,
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            physical_resource_id: physical_id
                .map(str::to_string)
                .or_else(|| event.physical_resource_id.clone()),
            reason: result.reason.clone(),
            data: result.output.clone(),
        }
    }
}

/// Delivers the terminal status of a logical request back to CloudFormation.
/// Invoked exactly once per logical request, never on suspension.
#[async_trait]
pub trait ResponseReporter: Send + Sync {
    async fn respond(
        &self,
        event: &ProvisioningEvent,
        physical_id: Option<&str>,
        result: &OperationResult,
    ) -> Result<(), Error>;
}

/// PUTs the response document to the request's signed callback URL.
pub struct HttpReporter {
    http_client: reqwest::Client,
}

impl HttpReporter {
    pub fn new(http_client: reqwest::Client) -> Self {
        HttpReporter { http_client }
    }
}

impl Default for HttpReporter {
    fn default() -> Self {
        HttpReporter::new(reqwest::Client::new())
    }
}

#[async_trait]
impl ResponseReporter for HttpReporter {
    async fn respond(
        &self,
        event: &ProvisioningEvent,
        physical_id: Option<&str>,
        result: &OperationResult,
    ) -> Result<(), Error> {
        let response: CfnResponse = CfnResponse::assemble(event, physical_id, result);
        let body: String = serde_json::to_string(&response)?;

        tracing::info!(
            request_id = %event.request_id,
            status = ?response.status,
            "Responding to {:?} request",
            event.request_type
        );

        // The pre-signed URL rejects uploads carrying a real content type.
        self.http_client
            .put(event.response_url.as_str())
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> ProvisioningEvent {
        serde_json::from_value(json!({
            "RequestType": "Delete",
            "ResponseURL": "https://cloudformation.example/callback",
            "StackId": "stack-1",
            "RequestId": "req-1",
            "LogicalResourceId": "Resource",
            "PhysicalResourceId": "existing-id"
        }))
        .unwrap()
    }

    #[test]
    fn serialises_expected_document() {
        let result = OperationResult::success(Some(json!({"BrokerId": "b-1"})));
        let response = CfnResponse::assemble(&event(), Some("b-1"), &result);

        let wire: Value = serde_json::to_value(&response).unwrap();

        assert_eq!(json!("SUCCESS"), wire["Status"]);
        assert_eq!(json!("stack-1"), wire["StackId"]);
        assert_eq!(json!("req-1"), wire["RequestId"]);
        assert_eq!(json!("Resource"), wire["LogicalResourceId"]);
        assert_eq!(json!("b-1"), wire["PhysicalResourceId"]);
        assert_eq!(json!({"BrokerId": "b-1"}), wire["Data"]);
        assert!(wire.get("Reason").is_none());
    }

    #[test]
    fn falls_back_to_request_physical_id() {
        let result = OperationResult::failure("broken");
        let response = CfnResponse::assemble(&event(), None, &result);

        assert_eq!(Some("existing-id".to_string()), response.physical_resource_id);
        assert_eq!(OperationStatus::Failed, response.status);
        assert_eq!(Some("broken".to_string()), response.reason);
    }
}
