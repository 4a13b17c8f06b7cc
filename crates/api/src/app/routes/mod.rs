use axum::Router;

use duka_parties::PartyKind;

pub mod invoices;
pub mod lpos;
pub mod parties;
pub mod products;
pub mod sales;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/products", products::router())
        .nest("/customers", parties::router(PartyKind::Customer))
        .nest("/suppliers", parties::router(PartyKind::Supplier))
        .nest("/sales", sales::router())
        .nest("/lpos", lpos::router())
        .nest("/invoices", invoices::router())
}
