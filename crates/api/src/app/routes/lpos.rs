use std::sync::Arc;

use axum::{
    extract::{Extension, OriginalUri, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;

use duka_purchasing::LpoId;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(issue_lpo).get(list_lpos))
        .route("/:id", get(get_lpo))
        .route("/:id/update_delivery", post(update_delivery))
        .route("/:id/cancel", post(cancel_lpo))
}

pub async fn issue_lpo(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    WithRejection(Json(body), _): WithRejection<Json<dto::CreateLpoRequest>, ApiError>,
) -> Result<Response, ApiError> {
    let caller = tenant.caller();
    let lpo = services.run(move |ledger| ledger.issue_lpo(&caller, body.into())).await?;
    Ok((StatusCode::CREATED, Json(dto::lpo_to_json(lpo))).into_response())
}

pub async fn list_lpos(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    OriginalUri(uri): OriginalUri,
    WithRejection(Query(query), _): WithRejection<Query<dto::ListQuery>, ApiError>,
) -> Response {
    let lpos = &services.views.lpos;
    let body = match query.page_request() {
        Some(request) => dto::page_to_json(
            uri.path(),
            request,
            lpos.page(tenant.tenant_id(), request),
            dto::lpo_view_to_json,
        ),
        None => dto::list_to_json(lpos.list(tenant.tenant_id()), dto::lpo_view_to_json),
    };
    Json(body).into_response()
}

pub async fn get_lpo(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let lpo_id: LpoId = dto::parse_id(&id, "id")?;
    let tenant_id = tenant.tenant_id();
    let lpo = services.run(move |ledger| ledger.lpo(tenant_id, lpo_id)).await?;
    Ok(Json(dto::lpo_to_json(lpo)).into_response())
}

/// Record a delivery; the received goods enter stock in the same commit.
pub async fn update_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<dto::DeliveryRequest>, ApiError>,
) -> Result<Response, ApiError> {
    let lpo_id: LpoId = dto::parse_id(&id, "id")?;
    let caller = tenant.caller();
    let outcome = services
        .run(move |ledger| ledger.record_delivery(&caller, lpo_id, body.delivered_quantity))
        .await?;
    let mut body = dto::lpo_to_json(outcome.lpo);
    if let Some(fields) = body.as_object_mut() {
        fields.insert("movement".to_string(), dto::movement_to_json(outcome.movement));
    }
    Ok(Json(body).into_response())
}

pub async fn cancel_lpo(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::CancelLpoRequest>>,
) -> Result<Response, ApiError> {
    let lpo_id: LpoId = dto::parse_id(&id, "id")?;
    let reason = body.and_then(|Json(b)| b.reason);
    let caller = tenant.caller();
    let lpo = services.run(move |ledger| ledger.cancel_lpo(&caller, lpo_id, reason)).await?;
    Ok(Json(dto::lpo_to_json(lpo)).into_response())
}
