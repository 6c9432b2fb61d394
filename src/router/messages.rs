//! Message envelopes and the inbound action vocabulary.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound control-surface actions. The string forms are the stable wire
/// names; everything else about the control surface is free to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    ScanStart,
    ScanStop,
    PaginationStart,
    PaginationStop,
    RetrySubmit,
    RetryCancel,
    PaginationDetect,
    PaginationNavigateNext,
    PaginationReset,
    PaginationGetState,
    ExportData,
}

impl Action {
    pub const ALL: [Self; 11] = [
        Self::ScanStart,
        Self::ScanStop,
        Self::PaginationStart,
        Self::PaginationStop,
        Self::RetrySubmit,
        Self::RetryCancel,
        Self::PaginationDetect,
        Self::PaginationNavigateNext,
        Self::PaginationReset,
        Self::PaginationGetState,
        Self::ExportData,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ScanStart => "SCAN_START",
            Self::ScanStop => "SCAN_STOP",
            Self::PaginationStart => "PAGINATION_START",
            Self::PaginationStop => "PAGINATION_STOP",
            Self::RetrySubmit => "RETRY_SUBMIT",
            Self::RetryCancel => "RETRY_CANCEL",
            Self::PaginationDetect => "PAGINATION_DETECT",
            Self::PaginationNavigateNext => "PAGINATION_NAVIGATE_NEXT",
            Self::PaginationReset => "PAGINATION_RESET",
            Self::PaginationGetState => "PAGINATION_GET_STATE",
            Self::ExportData => "EXPORT_DATA",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == value)
    }
}

/// Inbound request. `action` and `request_id` are required; `payload` and
/// `document_id` are action-specific.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    pub action: String,
    pub request_id: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub document_id: Option<String>,
}

/// Outbound response. Exactly one per request.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub ok: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ResponseEnvelope {
    #[must_use]
    pub fn success(request_id: impl Into<String>, data: Value) -> Self {
        Self {
            ok: true,
            request_id: request_id.into(),
            data: Some(data),
            error: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub fn failure(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            request_id: request_id.into(),
            data: None,
            error: Some(error.into()),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::parse(action.as_str()), Some(action));
        }
        assert_eq!(Action::parse("NO_SUCH_ACTION"), None);
    }

    #[test]
    fn test_envelope_parsing() -> anyhow::Result<()> {
        let raw = serde_json::json!({
            "action": "SCAN_START",
            "request_id": "req-1",
            "payload": {"document_id": "tab-1"}
        });
        let envelope: RequestEnvelope = serde_json::from_value(raw)?;
        assert_eq!(envelope.action, "SCAN_START");
        assert_eq!(envelope.request_id, "req-1");
        assert!(envelope.payload.is_some());
        Ok(())
    }

    #[test]
    fn test_response_shape() -> anyhow::Result<()> {
        let response = ResponseEnvelope::success("req-9", serde_json::json!({"records": 3}));
        let value = serde_json::to_value(&response)?;
        assert_eq!(value["ok"], true);
        assert_eq!(value["request_id"], "req-9");
        assert!(value.get("error").is_none());
        assert!(value["timestamp"].as_i64().is_some());
        Ok(())
    }
}
