use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::{ItemKey, OperationId, UserKey};
use crate::value::Attributes;

/// A typed command targeting one item, immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: OperationId,
    pub op_type: String,
    pub target: ItemKey,
    pub invoked_by: UserKey,
    pub attributes: Attributes,
    pub timestamp: DateTime<Utc>,
}

/// Caller-supplied draft of an operation. Id and timestamp are
/// server-assigned at invocation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDraft {
    pub op_type: String,
    pub target: ItemKey,
    pub invoked_by: UserKey,
    #[serde(default)]
    pub attributes: Attributes,
}

/// In-process lifecycle of a single invocation.
///
/// The synchronous path surfaces Completed/Failed to the caller; the
/// asynchronous path acknowledges at Validated and resolves the rest on
/// a worker thread, visible only in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Received,
    Validated,
    DispatchedSync,
    DispatchedAsync,
    Completed,
    Failed,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Received => write!(f, "RECEIVED"),
            OperationStatus::Validated => write!(f, "VALIDATED"),
            OperationStatus::DispatchedSync => write!(f, "DISPATCHED_SYNC"),
            OperationStatus::DispatchedAsync => write!(f, "DISPATCHED_ASYNC"),
            OperationStatus::Completed => write!(f, "COMPLETED"),
            OperationStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn draft_defaults_attributes_to_empty() {
        let draft: OperationDraft = serde_json::from_str(
            r#"{
                "op_type": "reboot",
                "target": {"space": "t1", "id": "abc"},
                "invoked_by": {"space": "t1", "email": "ops@example.com"}
            }"#,
        )
        .unwrap();
        assert_eq!(draft.op_type, "reboot");
        assert!(draft.attributes.is_empty());
    }

    #[test]
    fn record_serde_round_trip() {
        let mut attributes = Attributes::new();
        attributes.insert("force".into(), Value::Bool(true));
        let record = OperationRecord {
            id: OperationId::new("t1", "op-1"),
            op_type: "reboot".into(),
            target: ItemKey::new("t1", "abc"),
            invoked_by: UserKey::new("t1", "ops@example.com"),
            attributes,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: OperationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn status_display() {
        assert_eq!(OperationStatus::DispatchedAsync.to_string(), "DISPATCHED_ASYNC");
        assert_eq!(OperationStatus::Failed.to_string(), "FAILED");
    }
}
