//! Draft endpoints of the remote observation API.

use serde_json::json;

use super::{RemoteApi, RemoteRequest};
use crate::errors::SyncError;
use crate::models::{DraftRequest, DraftResponse, HttpMethod};

/// Upsert-by-key draft endpoint.
pub const DRAFT_PATH: &str = "/observations/draft";

/// Final submission endpoint.
pub const SUBMIT_PATH: &str = "/observations";

/// `POST /draft`. A `None` key creates; a present key updates and may 404.
pub async fn post_draft(
    remote: &dyn RemoteApi,
    request: &DraftRequest,
) -> Result<DraftResponse, SyncError> {
    let body = serde_json::to_value(request)?;
    let response = remote.send(RemoteRequest::post(DRAFT_PATH, body)).await?;
    parse_draft(response.body)
}

/// `GET /draft?sessionKey=...`.
pub async fn get_draft(remote: &dyn RemoteApi, session_key: &str) -> Result<DraftResponse, SyncError> {
    let request = RemoteRequest::get(DRAFT_PATH).with_query("sessionKey", session_key);
    let response = remote.send(request).await?;
    parse_draft(response.body)
}

/// Request that deletes a draft by key; also the shape queued for replay.
pub fn delete_draft_request(session_key: &str) -> RemoteRequest {
    RemoteRequest::new(HttpMethod::Delete, DRAFT_PATH).with_body(json!({ "sessionKey": session_key }))
}

/// `DELETE /draft` with body `{ sessionKey }`.
pub async fn delete_draft(remote: &dyn RemoteApi, session_key: &str) -> Result<(), SyncError> {
    remote.send(delete_draft_request(session_key)).await?;
    Ok(())
}

fn parse_draft(body: Option<serde_json::Value>) -> Result<DraftResponse, SyncError> {
    let body = body.ok_or_else(|| SyncError::Serialization("Empty draft response".to_string()))?;
    Ok(serde_json::from_value(body)?)
}
