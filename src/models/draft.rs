//! Draft model matching the form's draft state and the remote draft contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// The form-facing view of an in-progress observation.
///
/// `is_dirty` means the local copy holds edits the server has not confirmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    pub step: u32,
    #[serde(default = "empty_object")]
    pub session_info: Value,
    #[serde(default = "empty_object")]
    pub evaluation_data: Value,
    #[serde(default = "empty_object")]
    pub student_assessment: Value,
    pub last_saved: DateTime<Utc>,
    #[serde(default)]
    pub is_dirty: bool,
}

impl DraftState {
    /// An empty draft at `step`, not yet known to the server.
    pub fn new(step: u32) -> Self {
        Self {
            session_key: None,
            step,
            session_info: empty_object(),
            evaluation_data: empty_object(),
            student_assessment: empty_object(),
            last_saved: Utc::now(),
            is_dirty: true,
        }
    }

    /// Body for `POST /draft`. A `None` key asks the server to create.
    pub fn to_request(&self) -> DraftRequest {
        DraftRequest {
            session_key: self.session_key.clone(),
            step: self.step,
            session_info: self.session_info.clone(),
            evaluation_data: self.evaluation_data.clone(),
            student_assessment: self.student_assessment.clone(),
        }
    }
}

/// Request body for `POST /draft`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftRequest {
    pub session_key: Option<String>,
    pub step: u32,
    pub session_info: Value,
    pub evaluation_data: Value,
    pub student_assessment: Value,
}

impl DraftRequest {
    /// Same content with the key dropped, used to recreate a draft the server forgot.
    pub fn as_create(&self) -> Self {
        Self {
            session_key: None,
            ..self.clone()
        }
    }
}

/// Response body of both `POST /draft` and `GET /draft`.
///
/// The POST reply only carries `sessionKey`; the GET reply carries the full draft.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DraftResponse {
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub step: Option<u32>,
    #[serde(default)]
    pub session_info: Option<Value>,
    #[serde(default)]
    pub evaluation_data: Option<Value>,
    #[serde(default)]
    pub student_assessment: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DraftResponse {
    /// Normalize the server shape into a clean `DraftState`.
    pub fn into_draft_state(self, requested_key: &str) -> DraftState {
        DraftState {
            session_key: Some(self.session_key.unwrap_or_else(|| requested_key.to_string())),
            step: self.step.unwrap_or(1),
            session_info: non_null_or_empty(self.session_info),
            evaluation_data: non_null_or_empty(self.evaluation_data),
            student_assessment: non_null_or_empty(self.student_assessment),
            last_saved: self.updated_at.unwrap_or_else(Utc::now),
            is_dirty: false,
        }
    }
}

fn non_null_or_empty(value: Option<Value>) -> Value {
    match value {
        Some(Value::Null) | None => empty_object(),
        Some(v) => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_null_key_for_create() {
        let draft = DraftState::new(2);
        let body = serde_json::to_value(draft.to_request()).unwrap();
        assert_eq!(body["sessionKey"], Value::Null);
        assert_eq!(body["step"], 2);
        assert_eq!(body["sessionInfo"], json!({}));
    }

    #[test]
    fn test_response_normalization_fills_missing_parts() {
        let response: DraftResponse = serde_json::from_value(json!({
            "sessionKey": "obs-1",
            "step": 3,
            "sessionInfo": { "school": "A" },
            "evaluationData": null,
            "updatedAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap();

        let draft = response.into_draft_state("obs-1");
        assert_eq!(draft.session_key.as_deref(), Some("obs-1"));
        assert_eq!(draft.step, 3);
        assert_eq!(draft.session_info, json!({ "school": "A" }));
        assert_eq!(draft.evaluation_data, json!({}));
        assert_eq!(draft.student_assessment, json!({}));
        assert!(!draft.is_dirty);
        assert_eq!(draft.last_saved.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }
}
