use std::sync::Arc;

use axum::{
    extract::{Extension, OriginalUri, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;

use duka_infra::ledger::NewPayment;
use duka_invoicing::InvoiceId;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(issue_invoice).get(list_invoices))
        .route("/:id", get(get_invoice))
        .route("/:id/record_payment", post(record_payment))
}

pub async fn issue_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    WithRejection(Json(body), _): WithRejection<Json<dto::CreateInvoiceRequest>, ApiError>,
) -> Result<Response, ApiError> {
    let caller = tenant.caller();
    let invoice = services
        .run(move |ledger| ledger.issue_invoice(&caller, body.into()))
        .await?;
    Ok((StatusCode::CREATED, Json(dto::invoice_to_json(invoice))).into_response())
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    OriginalUri(uri): OriginalUri,
    WithRejection(Query(query), _): WithRejection<Query<dto::ListQuery>, ApiError>,
) -> Response {
    let invoices = &services.views.invoices;
    let body = match query.page_request() {
        Some(request) => dto::page_to_json(
            uri.path(),
            request,
            invoices.page(tenant.tenant_id(), request),
            dto::invoice_view_to_json,
        ),
        None => dto::list_to_json(invoices.list(tenant.tenant_id()), dto::invoice_view_to_json),
    };
    Json(body).into_response()
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let invoice_id: InvoiceId = dto::parse_id(&id, "id")?;
    let tenant_id = tenant.tenant_id();
    let invoice = services.run(move |ledger| ledger.invoice(tenant_id, invoice_id)).await?;
    Ok(Json(dto::invoice_to_json(invoice)).into_response())
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<dto::RecordPaymentRequest>, ApiError>,
) -> Result<Response, ApiError> {
    let invoice_id: InvoiceId = dto::parse_id(&id, "id")?;
    let payment = NewPayment::try_from(body)?;
    let caller = tenant.caller();
    let invoice = services
        .run(move |ledger| ledger.record_invoice_payment(&caller, invoice_id, payment))
        .await?;
    Ok(Json(dto::invoice_to_json(invoice)).into_response())
}
