use crate::result::EffectiveCommand;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The lifecycle intent declared by CloudFormation for this resource.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Create,
    Update,
    Delete,
}

/// Resource properties passed through from the stack template.
///
/// Values are arbitrary JSON because CloudFormation delivers both scalars
/// and lists (for example security group ids) under the same mapping.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Properties(pub serde_json::Map<String, Value>);

impl Properties {
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// A property as a string, if present and string-valued.
    pub fn string(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// A property as a list of strings, if present and list-valued.
    pub fn string_list(&self, key: &str) -> Option<Vec<String>> {
        self.0.get(key).and_then(Value::as_array).map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
    }
}

/// One inbound provisioning request, either fresh from CloudFormation or a
/// resumption payload produced by a previous invocation of this function.
///
/// The two cases share a single wire shape: a resumed event carries
/// `WaitComplete = true`, a concrete `PhysicalResourceId` and any partial
/// result under `Data`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisioningEvent {
    pub request_type: RequestKind,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub resource_properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub wait_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn is_false(value: &bool) -> bool {
    !value
}

impl ProvisioningEvent {
    /// The event as observed by the action once the declared intent has been
    /// reconciled against remote state.
    ///
    /// Terminal states are judged per lifecycle kind, so a Create retried
    /// against an existing target must poll, and resume, as the Update it
    /// became. The rewritten kind travels in any resumption payload built
    /// from the returned event.
    pub fn reconciled(&self, command: &EffectiveCommand) -> ProvisioningEvent {
        let request_type: RequestKind = match command {
            EffectiveCommand::Create => RequestKind::Create,
            EffectiveCommand::Update => RequestKind::Update,
            EffectiveCommand::Delete => RequestKind::Delete,
            EffectiveCommand::NoOp { .. } => self.request_type,
        };

        ProvisioningEvent {
            request_type,
            ..self.clone()
        }
    }

    /// The resumption payload handed to the self-reinvocation collaborator.
    ///
    /// Suspension is only legal once the target's identity is known, so the
    /// physical id is mandatory here.
    pub fn resumption(&self, physical_id: &str, data: Option<Value>) -> ProvisioningEvent {
        ProvisioningEvent {
            physical_resource_id: Some(physical_id.to_string()),
            wait_complete: true,
            data,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fresh_create_json() -> Value {
        json!({
            "RequestType": "Create",
            "ResponseURL": "https://cloudformation.example/callback",
            "StackId": "arn:aws:cloudformation:eu-west-1:123:stack/parent/abc",
            "RequestId": "req-1",
            "LogicalResourceId": "Broker",
            "ResourceProperties": {
                "Name": "broker-1",
                "SecurityGroups": ["sg-1", "sg-2"]
            }
        })
    }

    #[test]
    fn deserialises_fresh_event() {
        let event: ProvisioningEvent = serde_json::from_value(fresh_create_json()).unwrap();

        assert_eq!(RequestKind::Create, event.request_type);
        assert!(!event.wait_complete);
        assert!(event.physical_resource_id.is_none());
        assert_eq!(Some("broker-1"), event.resource_properties.string("Name"));
        assert_eq!(
            Some(vec!["sg-1".to_string(), "sg-2".to_string()]),
            event.resource_properties.string_list("SecurityGroups")
        );
    }

    #[test]
    fn resumption_round_trips_with_flag_and_identity() {
        let event: ProvisioningEvent = serde_json::from_value(fresh_create_json()).unwrap();
        let resumption = event.resumption("b-123", Some(json!({"BrokerId": "b-123"})));

        let wire: Value = serde_json::to_value(&resumption).unwrap();
        let resumed: ProvisioningEvent = serde_json::from_value(wire).unwrap();

        assert!(resumed.wait_complete);
        assert_eq!(Some("b-123".to_string()), resumed.physical_resource_id);
        assert_eq!(resumption.data, resumed.data);
        assert_eq!(event.request_id, resumed.request_id);
    }

    #[test]
    fn reconciled_event_carries_the_effective_kind() {
        let event: ProvisioningEvent = serde_json::from_value(fresh_create_json()).unwrap();

        let rewritten = event.reconciled(&EffectiveCommand::Update);
        assert_eq!(RequestKind::Update, rewritten.request_type);
        assert_eq!(event.request_id, rewritten.request_id);

        let unchanged = event.reconciled(&EffectiveCommand::NoOp {
            reason: "nothing to do".to_string(),
        });
        assert_eq!(RequestKind::Create, unchanged.request_type);
    }

    #[test]
    fn fresh_event_omits_resumption_fields_on_the_wire() {
        let event: ProvisioningEvent = serde_json::from_value(fresh_create_json()).unwrap();
        let wire: Value = serde_json::to_value(&event).unwrap();

        assert!(wire.get("WaitComplete").is_none());
        assert!(wire.get("PhysicalResourceId").is_none());
        assert!(wire.get("Data").is_none());
    }
}
