//! Response envelope shared by every endpoint.
//!
//! ```json
//! { "success": true, "correlationId": "…", "data": { … } }
//! { "success": false, "correlationId": "…", "error": { "kind": "not_found", "message": "…" } }
//! ```

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use carevault_core::time::format_rfc3339;
use carevault_storage::ResourceVersion;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

/// Successful envelope around `data`.
pub fn success<T: Serialize>(correlation_id: &str, status: StatusCode, data: T) -> Response {
    let body = ApiResponse {
        success: true,
        correlation_id: correlation_id.to_string(),
        data: Some(data),
        error: None,
    };
    (status, Json(body)).into_response()
}

/// Envelope around one resource version, with its ETag.
pub fn resource(correlation_id: &str, status: StatusCode, version: &ResourceVersion) -> Response {
    let mut response = success(correlation_id, status, &version.payload);
    set_version_headers(&mut response, version);
    response
}

/// Envelope acknowledging a tombstone.
pub fn deleted(correlation_id: &str, version: &ResourceVersion) -> Response {
    let data = json!({
        "resourceType": version.resource_type.as_str(),
        "id": version.logical_id,
        "version": version.version,
        "deleted": true,
    });
    let mut response = success(correlation_id, StatusCode::OK, data);
    set_version_headers(&mut response, version);
    response
}

/// History entry: version metadata plus the payload as written.
pub fn history_entry(version: &ResourceVersion) -> Value {
    json!({
        "version": version.version,
        "lastModified": format_rfc3339(version.last_modified),
        "createdBy": version.created_by,
        "deleted": version.deleted,
        "resource": version.payload,
    })
}

/// Error envelope. Every failure is logged with its internal detail; the
/// caller only sees the public message.
pub fn failure(correlation_id: &str, error: &ApiError) -> Response {
    let status = error.status();
    if error.is_server_error() {
        tracing::error!(
            correlation_id = %correlation_id,
            kind = %error.kind(),
            error = %error,
            "Request failed"
        );
    } else {
        tracing::debug!(
            correlation_id = %correlation_id,
            kind = %error.kind(),
            status = status.as_u16(),
            error = %error,
            detail = ?error,
            "Request rejected"
        );
    }
    let body: ApiResponse<()> = ApiResponse {
        success: false,
        correlation_id: correlation_id.to_string(),
        data: None,
        error: Some(ErrorBody {
            kind: error.kind().as_str(),
            message: error.public_message(),
        }),
    };
    (status, Json(body)).into_response()
}

fn set_version_headers(response: &mut Response, version: &ResourceVersion) {
    if let Ok(etag) = HeaderValue::from_str(&version.etag()) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    let location = format!(
        "/{}/{}/_history/{}",
        version.resource_type, version.logical_id, version.version
    );
    if let Ok(location) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::CONTENT_LOCATION, location);
    }
}
