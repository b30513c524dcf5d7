use std::str::FromStr;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::IF_MATCH},
    response::{IntoResponse, Response},
};
use carevault_auth::{AccessLevel, GrantFilter, GrantRequest};
use carevault_core::audit::AuditRange;
use carevault_core::time::parse_rfc3339;
use carevault_core::{ResourceType, TenantId};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ApiResult};
use crate::middleware::Identity;
use crate::response;
use crate::server::AppState;
use crate::service::PageQuery;

type Params = Query<Vec<(String, String)>>;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
    version: &'a str,
}

pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

// ---- resources ----

pub async fn create_resource(
    State(state): State<AppState>,
    identity: Identity,
    Path(resource_type): Path<String>,
    body: Bytes,
) -> Response {
    let cancel = state.shutdown.child_token();
    let result: ApiResult<_> = async {
        let resource_type = ResourceType::from_str(&resource_type)?;
        let payload = parse_json(&body)?;
        state.service.create(identity.ctx(), resource_type, payload, &cancel).await
    }
    .await;
    match result {
        Ok(v) => response::resource(identity.correlation_id(), StatusCode::CREATED, &v),
        Err(e) => response::failure(identity.correlation_id(), &e),
    }
}

pub async fn read_resource(
    State(state): State<AppState>,
    identity: Identity,
    Path((resource_type, id)): Path<(String, String)>,
) -> Response {
    let cancel = state.shutdown.child_token();
    let result: ApiResult<_> = async {
        let resource_type = ResourceType::from_str(&resource_type)?;
        state.service.read(identity.ctx(), resource_type, &id, &cancel).await
    }
    .await;
    match result {
        Ok(v) => response::resource(identity.correlation_id(), StatusCode::OK, &v),
        Err(e) => response::failure(identity.correlation_id(), &e),
    }
}

pub async fn update_resource(
    State(state): State<AppState>,
    identity: Identity,
    Path((resource_type, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let cancel = state.shutdown.child_token();
    let result: ApiResult<_> = async {
        let resource_type = ResourceType::from_str(&resource_type)?;
        let expected = expected_version(&headers)?;
        let payload = parse_json(&body)?;
        state
            .service
            .update(identity.ctx(), resource_type, &id, expected, payload, &cancel)
            .await
    }
    .await;
    match result {
        Ok(v) => response::resource(identity.correlation_id(), StatusCode::OK, &v),
        Err(e) => response::failure(identity.correlation_id(), &e),
    }
}

pub async fn delete_resource(
    State(state): State<AppState>,
    identity: Identity,
    Path((resource_type, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let cancel = state.shutdown.child_token();
    let result: ApiResult<_> = async {
        let resource_type = ResourceType::from_str(&resource_type)?;
        let expected = expected_version(&headers)?;
        state
            .service
            .delete(identity.ctx(), resource_type, &id, expected, &cancel)
            .await
    }
    .await;
    match result {
        Ok(v) => response::deleted(identity.correlation_id(), &v),
        Err(e) => response::failure(identity.correlation_id(), &e),
    }
}

pub async fn resource_history(
    State(state): State<AppState>,
    identity: Identity,
    Path((resource_type, id)): Path<(String, String)>,
) -> Response {
    let cancel = state.shutdown.child_token();
    let result: ApiResult<_> = async {
        let resource_type = ResourceType::from_str(&resource_type)?;
        state.service.history(identity.ctx(), resource_type, &id, &cancel).await
    }
    .await;
    match result {
        Ok(versions) => {
            let entries: Vec<_> = versions.iter().map(response::history_entry).collect();
            response::success(identity.correlation_id(), StatusCode::OK, entries)
        }
        Err(e) => response::failure(identity.correlation_id(), &e),
    }
}

pub async fn resource_version(
    State(state): State<AppState>,
    identity: Identity,
    Path((resource_type, id, version)): Path<(String, String, String)>,
) -> Response {
    let cancel = state.shutdown.child_token();
    let result: ApiResult<_> = async {
        let resource_type = ResourceType::from_str(&resource_type)?;
        let version = version
            .parse::<u64>()
            .map_err(|_| ApiError::bad_request(format!("invalid version '{version}'")))?;
        state
            .service
            .version(identity.ctx(), resource_type, &id, version, &cancel)
            .await
    }
    .await;
    match result {
        Ok(v) => response::resource(identity.correlation_id(), StatusCode::OK, &v),
        Err(e) => response::failure(identity.correlation_id(), &e),
    }
}

pub async fn search_resources(
    State(state): State<AppState>,
    identity: Identity,
    Path(resource_type): Path<String>,
    Query(params): Params,
) -> Response {
    let cancel = state.shutdown.child_token();
    let result: ApiResult<_> = async {
        let resource_type = ResourceType::from_str(&resource_type)?;
        let (page, filters) = split_paging(params)?;
        state
            .service
            .search(identity.ctx(), resource_type, filters, page, &cancel)
            .await
    }
    .await;
    match result {
        Ok(page) => {
            let page = page.map(|v| v.payload);
            response::success(identity.correlation_id(), StatusCode::OK, page)
        }
        Err(e) => response::failure(identity.correlation_id(), &e),
    }
}

// ---- access grants ----

pub async fn create_grant(State(state): State<AppState>, identity: Identity, body: Bytes) -> Response {
    let cancel = state.shutdown.child_token();
    let result: ApiResult<_> = async {
        let request: GrantRequest = parse_json(&body)?;
        state.service.grant_access(identity.ctx(), request, &cancel).await
    }
    .await;
    match result {
        Ok(grant) => response::success(identity.correlation_id(), StatusCode::CREATED, grant),
        Err(e) => response::failure(identity.correlation_id(), &e),
    }
}

pub async fn revoke_grant(
    State(state): State<AppState>,
    identity: Identity,
    Path(grant_id): Path<String>,
    Query(params): Params,
) -> Response {
    let cancel = state.shutdown.child_token();
    let reason = first(&params, "reason");
    match state
        .service
        .revoke_access(identity.ctx(), &grant_id, reason, &cancel)
        .await
    {
        Ok(revoked) => response::success(identity.correlation_id(), StatusCode::OK, revoked),
        Err(e) => response::failure(identity.correlation_id(), &e),
    }
}

pub async fn list_grants(State(state): State<AppState>, identity: Identity, Query(params): Params) -> Response {
    let cancel = state.shutdown.child_token();
    let result: ApiResult<_> = async {
        let (page, rest) = split_paging(params)?;
        let mut filter = GrantFilter::default();
        for (key, value) in rest {
            match key.as_str() {
                "patient" => filter.patient_id = Some(value),
                "user" => filter.user_id = Some(value),
                "level" => {
                    let level = serde_json::from_value::<AccessLevel>(value.clone().into())
                        .map_err(|_| ApiError::bad_request(format!("unknown access level '{value}'")))?;
                    filter.level = Some(level);
                }
                "active" => filter.active_only = parse_bool(&value)?,
                other => return Err(ApiError::bad_request(format!("unknown parameter '{other}'"))),
            }
        }
        state.service.list_grants(identity.ctx(), filter, page, &cancel).await
    }
    .await;
    match result {
        Ok(page) => response::success(identity.correlation_id(), StatusCode::OK, page),
        Err(e) => response::failure(identity.correlation_id(), &e),
    }
}

// ---- audit ----

pub async fn audit_events(State(state): State<AppState>, identity: Identity, Query(params): Params) -> Response {
    let cancel = state.shutdown.child_token();
    let result: ApiResult<_> = async {
        let mut range = AuditRange::all();
        let mut tenant = None;
        for (key, value) in params {
            match key.as_str() {
                "tenant" => tenant = Some(TenantId::new(value)),
                "since" => range.since = Some(parse_rfc3339(&value)?),
                "until" => range.until = Some(parse_rfc3339(&value)?),
                other => return Err(ApiError::bad_request(format!("unknown parameter '{other}'"))),
            }
        }
        state.service.audit_trail(identity.ctx(), tenant, range, &cancel).await
    }
    .await;
    match result {
        Ok(events) => response::success(identity.correlation_id(), StatusCode::OK, events),
        Err(e) => response::failure(identity.correlation_id(), &e),
    }
}

// ---- helpers ----

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
}

/// Version number from `If-Match`: `W/"3"`, `"3"` or `3`.
fn expected_version(headers: &HeaderMap) -> ApiResult<Option<u64>> {
    let Some(value) = headers.get(IF_MATCH) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| ApiError::bad_request("If-Match is not valid text"))?
        .trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw).trim_matches('"');
    raw.parse::<u64>()
        .map(Some)
        .map_err(|_| ApiError::bad_request(format!("If-Match must carry a version number, got '{raw}'")))
}

/// Pull `_count` and `_offset` out of the query, leaving the filters.
fn split_paging(params: Vec<(String, String)>) -> ApiResult<(PageQuery, Vec<(String, String)>)> {
    let mut page = PageQuery::default();
    let mut rest = Vec::with_capacity(params.len());
    for (key, value) in params {
        match key.as_str() {
            "_count" => page.count = Some(parse_u32(&key, &value)?),
            "_offset" => page.offset = Some(parse_u32(&key, &value)?),
            _ => rest.push((key, value)),
        }
    }
    Ok((page, rest))
}

fn parse_u32(key: &str, value: &str) -> ApiResult<u32> {
    value
        .parse()
        .map_err(|_| ApiError::bad_request(format!("{key} must be a non-negative integer")))
}

fn parse_bool(value: &str) -> ApiResult<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ApiError::bad_request(format!("expected true or false, got '{value}'"))),
    }
}

fn first(params: &[(String, String)], key: &str) -> Option<String> {
    params.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}
