use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Snapshot of a remote change record as reported by the change-status API.
///
/// The record is an open JSON object; only `status`, `number`, `sys_id` and
/// `details` are ever read. An empty snapshot means the change request has not
/// been created yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeDetails(Map<String, Value>);

impl ChangeDetails {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    pub fn number(&self) -> Option<String> {
        self.0.get("number").and_then(scalar_text)
    }

    pub fn sys_id(&self) -> Option<String> {
        self.0.get("sys_id").and_then(scalar_text)
    }

    /// Free-form failure details attached by the service.
    pub fn details(&self) -> Value {
        self.0.get("details").cloned().unwrap_or(Value::Null)
    }

    /// Whether this snapshot differs from the one seen on the previous poll.
    ///
    /// Differs when the field counts differ or when any field of `self` is not
    /// strictly equal to the same field of `prev`.
    pub fn has_changed_since(&self, prev: &ChangeDetails) -> bool {
        if self.0.len() != prev.0.len() {
            return true;
        }
        self.0
            .iter()
            .any(|(field, value)| prev.0.get(field) != Some(value))
    }

    /// Compact JSON, fields in the order the service sent them.
    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

/// Output-worthy text for a field, skipping empty and non-scalar values.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn details(value: Value) -> ChangeDetails {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_identical_snapshots_are_unchanged() {
        let a = details(json!({"status": "pending_decision", "number": "CHG001"}));
        let b = a.clone();
        assert!(!a.has_changed_since(&b));
    }

    #[test]
    fn test_field_count_mismatch_is_changed() {
        let a = details(json!({"status": "pending_decision"}));
        let b = details(json!({"status": "pending_decision", "number": "CHG001"}));
        assert!(a.has_changed_since(&b));
        assert!(b.has_changed_since(&a));
    }

    #[test]
    fn test_value_change_is_symmetric_on_same_keys() {
        let a = details(json!({"status": "pending_decision", "number": "CHG001"}));
        let b = details(json!({"status": "rejected", "number": "CHG001"}));
        assert!(a.has_changed_since(&b));
        assert_eq!(a.has_changed_since(&b), b.has_changed_since(&a));
    }

    #[test]
    fn test_same_count_different_keys_is_changed() {
        let a = details(json!({"status": "pending_decision"}));
        let b = details(json!({"number": "CHG001"}));
        assert!(a.has_changed_since(&b));
    }

    #[test]
    fn test_nested_values_compare_by_value() {
        let a = details(json!({"details": {"reason": "x"}}));
        let b = details(json!({"details": {"reason": "x"}}));
        assert!(!a.has_changed_since(&b));
    }

    #[test]
    fn test_empty_against_empty_is_unchanged() {
        assert!(!ChangeDetails::default().has_changed_since(&ChangeDetails::default()));
    }

    #[test]
    fn test_to_json_keeps_service_field_order() {
        let d: ChangeDetails = serde_json::from_str(
            r#"{"status":"pending_decision","number":"CHG001","details":"cab","sys_id":"abc"}"#,
        )
        .unwrap();
        assert_eq!(
            d.to_json(),
            r#"{"status":"pending_decision","number":"CHG001","details":"cab","sys_id":"abc"}"#
        );
    }

    #[test]
    fn test_accessors() {
        let d = details(json!({
            "status": "pending_decision",
            "number": "CHG001",
            "sys_id": "",
            "details": "waiting for CAB"
        }));
        assert_eq!(d.status(), Some("pending_decision"));
        assert_eq!(d.number().as_deref(), Some("CHG001"));
        assert_eq!(d.sys_id(), None);
        assert_eq!(d.details(), json!("waiting for CAB"));
        assert_eq!(ChangeDetails::default().details(), Value::Null);
    }
}
