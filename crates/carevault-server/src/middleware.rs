use std::str::FromStr;

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{HeaderName, HeaderValue, Request, request::Parts},
    middleware::Next,
    response::Response,
};
use carevault_core::{Actor, RequestContext, Role, TenantId};
use uuid::Uuid;

use crate::error::ApiError;
use crate::response;

pub const REQUEST_ID: &str = "x-request-id";
pub const USER_ID: &str = "x-user-id";
pub const USER_ROLE: &str = "x-user-role";
pub const TENANT_ID: &str = "x-tenant-id";
pub const PRACTITIONER_ID: &str = "x-practitioner-id";

// Request ID middleware: preserve an incoming X-Request-Id or generate one,
// expose it to downstream extractors and echo it on the response.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID);

    let req_id_value = req
        .headers()
        .get(&header_name)
        .filter(|v| v.to_str().is_ok_and(|s| !s.trim().is_empty()))
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    let Some(req_id_value) = req_id_value else {
        return next.run(req).await;
    };
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

/// Correlation id of the request, as set by [`request_id`].
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

fn correlation_id(parts: &Parts) -> String {
    parts
        .extensions
        .get::<HeaderValue>()
        .or_else(|| parts.headers.get(REQUEST_ID))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for CorrelationId {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(correlation_id(parts)))
    }
}

/// Caller identity asserted by the trusted upstream gateway.
///
/// Requires `x-user-id`, `x-user-role` and `x-tenant-id`; `x-practitioner-id`
/// is optional. Rejections are rendered in the standard envelope.
#[derive(Debug, Clone)]
pub struct Identity(pub RequestContext);

impl Identity {
    pub fn ctx(&self) -> &RequestContext {
        &self.0
    }

    pub fn correlation_id(&self) -> &str {
        self.0.correlation_id().unwrap_or_default()
    }
}

fn header<'a>(parts: &'a Parts, name: &'static str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn identity(parts: &Parts) -> Result<Actor, ApiError> {
    let user_id = header(parts, USER_ID).ok_or(ApiError::missing_identity(USER_ID))?;
    let role = header(parts, USER_ROLE).ok_or(ApiError::missing_identity(USER_ROLE))?;
    let tenant = header(parts, TENANT_ID).ok_or(ApiError::missing_identity(TENANT_ID))?;
    let role = Role::from_str(role)?;

    let mut actor = Actor::new(user_id, role, TenantId::new(tenant));
    if let Some(practitioner) = header(parts, PRACTITIONER_ID) {
        actor = actor.with_practitioner(practitioner);
    }
    Ok(actor)
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(parts);
        match identity(parts) {
            Ok(actor) => {
                tracing::debug!(
                    actor = %actor.user_id,
                    role = %actor.role,
                    tenant = %actor.tenant_id,
                    "Identity resolved"
                );
                Ok(Self(RequestContext::new(actor).with_correlation_id(correlation_id)))
            }
            Err(e) => Err(response::failure(&correlation_id, &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/Patient");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn test_identity_from_headers() {
        let p = parts(&[
            (USER_ID, "dr-a"),
            (USER_ROLE, "HealthcareProvider"),
            (TENANT_ID, "t-1"),
            (PRACTITIONER_ID, "pr-a"),
        ]);
        let actor = identity(&p).unwrap();
        assert_eq!(actor.user_id, "dr-a");
        assert_eq!(actor.role, Role::HealthcareProvider);
        assert_eq!(actor.practitioner_id.as_deref(), Some("pr-a"));
    }

    #[test]
    fn test_identity_rejections() {
        let err = identity(&parts(&[(USER_ID, "dr-a"), (TENANT_ID, "t-1")])).unwrap_err();
        assert!(matches!(err, ApiError::MissingIdentity { header: USER_ROLE }));

        let err = identity(&parts(&[(USER_ID, "u"), (USER_ROLE, "Wizard"), (TENANT_ID, "t")])).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_correlation_id_prefers_request_header() {
        let p = parts(&[(REQUEST_ID, "req-42")]);
        assert_eq!(correlation_id(&p), "req-42");
        assert!(!correlation_id(&parts(&[])).is_empty());
    }
}
