use std::str::FromStr;

use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use duka_core::{TenantId, UserId};

use crate::app::errors::json_error;
use crate::context::TenantContext;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";

/// Resolve the tenant (and optional user) of a request from its headers.
pub async fn tenant_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let context = tenant_context(req.headers())?;
    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

fn tenant_context(headers: &HeaderMap) -> Result<TenantContext, Response> {
    let tenant_id = header_value::<TenantId>(headers, TENANT_HEADER)?.ok_or_else(|| {
        json_error(
            StatusCode::BAD_REQUEST,
            "missing_tenant",
            "X-Tenant-Id header is required",
        )
    })?;
    let user_id = header_value::<UserId>(headers, USER_HEADER)?;
    Ok(TenantContext::new(tenant_id, user_id))
}

fn header_value<T: FromStr>(headers: &HeaderMap, name: &'static str) -> Result<Option<T>, Response> {
    let Some(raw) = headers.get(name) else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .map(str::trim)
        .and_then(|s| s.parse().ok())
        .map(Some)
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "invalid_header", format!("{name} must be a UUID")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn tenant_header_is_required() {
        let err = tenant_context(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn user_header_is_optional() {
        let tenant = TenantId::new();
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_str(&tenant.to_string()).unwrap());
        let ctx = tenant_context(&headers).unwrap();
        assert_eq!(ctx.tenant_id(), tenant);
        assert_eq!(ctx.user_id(), None);

        let user = UserId::new();
        headers.insert(USER_HEADER, HeaderValue::from_str(&user.to_string()).unwrap());
        assert_eq!(tenant_context(&headers).unwrap().user_id(), Some(user));
    }

    #[test]
    fn malformed_ids_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert_eq!(tenant_context(&headers).unwrap_err().status(), StatusCode::BAD_REQUEST);
    }
}
