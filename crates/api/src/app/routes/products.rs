use std::sync::Arc;

use axum::{
    extract::{Extension, OriginalUri, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde_json::json;

use duka_infra::ledger::{StockAdjustment, StockOutcome};
use duka_inventory::ProductId;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/low_stock", get(low_stock))
        .route("/:id", get(get_product))
        .route("/:id/pricing", put(update_pricing))
        .route("/:id/deactivate", post(deactivate_product))
        .route("/:id/reactivate", post(reactivate_product))
        .route("/:id/adjust_stock", post(adjust_stock))
        .route("/:id/movements", post(record_movement).get(list_movements))
}

fn outcome_to_json(outcome: StockOutcome) -> serde_json::Value {
    json!({
        "product": dto::product_to_json(outcome.product),
        "movement": outcome.movement.map(dto::movement_to_json),
    })
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    WithRejection(Json(body), _): WithRejection<Json<dto::CreateProductRequest>, ApiError>,
) -> Result<Response, ApiError> {
    let caller = tenant.caller();
    let outcome = services
        .run(move |ledger| ledger.register_product(&caller, body.into()))
        .await?;
    Ok((StatusCode::CREATED, Json(outcome_to_json(outcome))).into_response())
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    OriginalUri(uri): OriginalUri,
    WithRejection(Query(query), _): WithRejection<Query<dto::ListQuery>, ApiError>,
) -> Response {
    let stock = &services.views.stock;
    let body = match query.page_request() {
        Some(request) => dto::page_to_json(
            uri.path(),
            request,
            stock.page(tenant.tenant_id(), request),
            dto::stock_view_to_json,
        ),
        None => dto::list_to_json(stock.list(tenant.tenant_id()), dto::stock_view_to_json),
    };
    Json(body).into_response()
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    let items = services.views.stock.low_stock(tenant.tenant_id());
    Json(dto::list_to_json(items, dto::stock_view_to_json)).into_response()
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let product_id: ProductId = dto::parse_id(&id, "id")?;
    let tenant_id = tenant.tenant_id();
    let product = services.run(move |ledger| ledger.product(tenant_id, product_id)).await?;
    Ok(Json(dto::product_to_json(product)).into_response())
}

pub async fn update_pricing(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<dto::UpdatePricingRequest>, ApiError>,
) -> Result<Response, ApiError> {
    let product_id: ProductId = dto::parse_id(&id, "id")?;
    let caller = tenant.caller();
    let product = services
        .run(move |ledger| ledger.update_product(&caller, product_id, body.into()))
        .await?;
    Ok(Json(dto::product_to_json(product)).into_response())
}

pub async fn deactivate_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let product_id: ProductId = dto::parse_id(&id, "id")?;
    let caller = tenant.caller();
    let product = services
        .run(move |ledger| ledger.deactivate_product(&caller, product_id))
        .await?;
    Ok(Json(dto::product_to_json(product)).into_response())
}

pub async fn reactivate_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let product_id: ProductId = dto::parse_id(&id, "id")?;
    let caller = tenant.caller();
    let product = services
        .run(move |ledger| ledger.reactivate_product(&caller, product_id))
        .await?;
    Ok(Json(dto::product_to_json(product)).into_response())
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<dto::AdjustStockRequest>, ApiError>,
) -> Result<Response, ApiError> {
    let product_id: ProductId = dto::parse_id(&id, "id")?;
    let adjustment = StockAdjustment::try_from(body)?;
    let caller = tenant.caller();
    let outcome = services
        .run(move |ledger| ledger.adjust_stock(&caller, product_id, adjustment))
        .await?;
    Ok(Json(outcome_to_json(outcome)).into_response())
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<dto::RecordMovementRequest>, ApiError>,
) -> Result<Response, ApiError> {
    let product_id: ProductId = dto::parse_id(&id, "id")?;
    let caller = tenant.caller();
    let outcome = services
        .run(move |ledger| ledger.record_movement(&caller, product_id, body.into()))
        .await?;
    Ok((StatusCode::CREATED, Json(outcome_to_json(outcome))).into_response())
}

/// Read straight from the product's stream, so the answer includes every
/// committed movement.
pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let product_id: ProductId = dto::parse_id(&id, "id")?;
    let tenant_id = tenant.tenant_id();
    let movements = services
        .run(move |ledger| ledger.movements(tenant_id, product_id))
        .await?;
    Ok(Json(dto::list_to_json(movements, dto::movement_to_json)).into_response())
}
