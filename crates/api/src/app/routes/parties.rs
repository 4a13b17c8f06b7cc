use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;

use duka_infra::DispatchError;
use duka_parties::{PartyId, PartyKind};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::TenantContext;

/// Customers and suppliers share one registry; `kind` fixes which one a
/// router serves.
pub fn router(kind: PartyKind) -> Router {
    Router::new()
        .route(
            "/",
            post(
                move |services: Extension<Arc<AppServices>>,
                      tenant: Extension<TenantContext>,
                      body: WithRejection<Json<dto::RegisterPartyRequest>, ApiError>| {
                    register_party(kind, services, tenant, body)
                },
            ),
        )
        .route(
            "/:id",
            get(
                move |services: Extension<Arc<AppServices>>, tenant: Extension<TenantContext>, id: Path<String>| {
                    get_party(kind, services, tenant, id)
                },
            ),
        )
        .route("/:id/deactivate", post(deactivate_party))
}

async fn register_party(
    kind: PartyKind,
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    WithRejection(Json(body), _): WithRejection<Json<dto::RegisterPartyRequest>, ApiError>,
) -> Result<Response, ApiError> {
    let caller = tenant.caller();
    let request = body.into_party(kind);
    let party = services.run(move |ledger| ledger.register_party(&caller, request)).await?;
    Ok((StatusCode::CREATED, Json(dto::party_to_json(party))).into_response())
}

async fn get_party(
    kind: PartyKind,
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let party_id: PartyId = dto::parse_id(&id, "id")?;
    let tenant_id = tenant.tenant_id();
    let party = services.run(move |ledger| ledger.party(tenant_id, party_id)).await?;
    if party.kind() != kind {
        return Err(DispatchError::NotFound(format!("{} {party_id}", kind.as_str())).into());
    }
    Ok(Json(dto::party_to_json(party)).into_response())
}

async fn deactivate_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let party_id: PartyId = dto::parse_id(&id, "id")?;
    let caller = tenant.caller();
    let party = services.run(move |ledger| ledger.deactivate_party(&caller, party_id)).await?;
    Ok(Json(dto::party_to_json(party)).into_response())
}
