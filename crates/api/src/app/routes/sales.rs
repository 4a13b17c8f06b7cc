use std::sync::Arc;

use axum::{
    extract::{Extension, OriginalUri, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;

use duka_infra::ledger::{NewPayment, NewSale};
use duka_sales::SaleId;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_sale).get(list_sales))
        .route("/:id", get(get_sale))
        .route("/:id/lines/:line_no/supply", post(update_line_supply))
        .route("/:id/record_payment", post(record_payment))
}

pub async fn create_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    WithRejection(Json(body), _): WithRejection<Json<dto::CreateSaleRequest>, ApiError>,
) -> Result<Response, ApiError> {
    let request = NewSale::try_from(body)?;
    let caller = tenant.caller();
    let sale = services.run(move |ledger| ledger.create_sale(&caller, request)).await?;
    Ok((StatusCode::CREATED, Json(dto::sale_to_json(sale))).into_response())
}

pub async fn list_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    OriginalUri(uri): OriginalUri,
    WithRejection(Query(query), _): WithRejection<Query<dto::ListQuery>, ApiError>,
) -> Response {
    let sales = &services.views.sales;
    let body = match query.page_request() {
        Some(request) => dto::page_to_json(
            uri.path(),
            request,
            sales.page(tenant.tenant_id(), request),
            dto::sale_view_to_json,
        ),
        None => dto::list_to_json(sales.list(tenant.tenant_id()), dto::sale_view_to_json),
    };
    Json(body).into_response()
}

pub async fn get_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let sale_id: SaleId = dto::parse_id(&id, "id")?;
    let tenant_id = tenant.tenant_id();
    let sale = services.run(move |ledger| ledger.sale(tenant_id, sale_id)).await?;
    Ok(Json(dto::sale_to_json(sale)).into_response())
}

pub async fn update_line_supply(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path((id, line_no)): Path<(String, String)>,
    WithRejection(Json(body), _): WithRejection<Json<dto::LineSupplyRequest>, ApiError>,
) -> Result<Response, ApiError> {
    let sale_id: SaleId = dto::parse_id(&id, "id")?;
    let line_no: u32 = dto::parse_id(&line_no, "line_no")?;
    let caller = tenant.caller();
    let sale = services
        .run(move |ledger| ledger.update_line_supply(&caller, sale_id, line_no, body.quantity_supplied))
        .await?;
    Ok(Json(dto::sale_to_json(sale)).into_response())
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<dto::RecordPaymentRequest>, ApiError>,
) -> Result<Response, ApiError> {
    let sale_id: SaleId = dto::parse_id(&id, "id")?;
    let payment = NewPayment::try_from(body)?;
    let caller = tenant.caller();
    let sale = services
        .run(move |ledger| ledger.record_sale_payment(&caller, sale_id, payment))
        .await?;
    Ok(Json(dto::sale_to_json(sale)).into_response())
}
