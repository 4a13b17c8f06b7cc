use std::collections::HashSet;

use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{ApiErrorBody, ClientError};
use crate::models::{
    Invoice, Lpo, Movement, NewInvoice, NewLpo, NewMovement, NewParty, NewPayment, NewProduct, NewSale, Party,
    PricingChanges, Product, Sale, StockAdjustment, StockOutcome,
};
use crate::page::{ListEnvelope, Page};
use crate::session::{NoRefresh, Session, TokenRefresher};

/// Typed client for the ledger HTTP API.
///
/// Every request carries the session's tenant (and user, when set). On a
/// 401 the configured refresher is asked for a new token once and the
/// request is retried once; a second 401 is returned to the caller.
pub struct DukaClient<R: TokenRefresher = NoRefresh> {
    http: reqwest::Client,
    session: Session,
    refresher: Option<R>,
}

impl DukaClient<NoRefresh> {
    pub fn new(session: Session) -> Self {
        Self {
            http: reqwest::Client::new(),
            session,
            refresher: None,
        }
    }
}

impl<R: TokenRefresher> DukaClient<R> {
    pub fn with_refresher<R2: TokenRefresher>(self, refresher: R2) -> DukaClient<R2> {
        DukaClient {
            http: self.http,
            session: self.session,
            refresher: Some(refresher),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn request<B: Serialize + ?Sized>(&self, method: Method, url: Url, body: Option<&B>) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, url)
            .header("X-Tenant-Id", self.session.tenant_id().to_string());
        if let Some(user_id) = self.session.user_id() {
            builder = builder.header("X-User-Id", user_id.to_string());
        }
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ClientError> {
        let url = self.session.resolve(path)?;
        let response = self.request(method.clone(), url.clone(), body).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        let Some(refresher) = &self.refresher else {
            return Ok(response);
        };

        debug!(%url, "401 received, refreshing token");
        let token = refresher.refresh().await?;
        self.session.set_token(token);
        Ok(self.request(method, url, body).send().await?)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body = response.json::<ApiErrorBody>().await.unwrap_or_else(|_| ApiErrorBody {
            error: status.canonical_reason().unwrap_or("error").to_string(),
            ..ApiErrorBody::default()
        });
        Err(ClientError::Api { status, body })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        Self::decode(self.send::<()>(Method::GET, path, None).await?).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        Self::decode(self.send(Method::POST, path, Some(body)).await?).await
    }

    async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        Self::decode(self.send(Method::PUT, path, Some(body)).await?).await
    }

    /// One page of a list endpoint, whichever envelope the server used.
    pub async fn list_page<T: DeserializeOwned>(&self, path: &str) -> Result<Page<T>, ClientError> {
        let envelope: ListEnvelope<T> = self.get(path).await?;
        Ok(envelope.into())
    }

    /// Every item of a list, following `next` links to the end.
    ///
    /// A link that resolves to a page already fetched ends the walk with
    /// [`ClientError::RepeatedPage`].
    #[instrument(skip(self), err)]
    pub async fn fetch_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ClientError> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(path.to_string());
        while let Some(link) = next {
            let url = self.session.resolve(&link)?;
            if !seen.insert(url.clone()) {
                return Err(ClientError::RepeatedPage(url.to_string()));
            }
            let page = self.list_page::<T>(&link).await?;
            items.extend(page.items);
            next = page.next_page;
        }
        debug!(pages = seen.len(), items = items.len(), "list collected");
        Ok(items)
    }

    // -------------------------
    // Parties
    // -------------------------

    pub async fn register_customer(&self, party: &NewParty) -> Result<Party, ClientError> {
        self.post("/customers", party).await
    }

    pub async fn register_supplier(&self, party: &NewParty) -> Result<Party, ClientError> {
        self.post("/suppliers", party).await
    }

    // -------------------------
    // Products and stock
    // -------------------------

    pub async fn create_product(&self, product: &NewProduct) -> Result<StockOutcome, ClientError> {
        self.post("/products", product).await
    }

    pub async fn product(&self, id: Uuid) -> Result<Product, ClientError> {
        self.get(&format!("/products/{id}")).await
    }

    pub async fn products(&self) -> Result<Vec<Product>, ClientError> {
        self.fetch_all("/products").await
    }

    pub async fn update_pricing(&self, id: Uuid, changes: &PricingChanges) -> Result<Product, ClientError> {
        self.put(&format!("/products/{id}/pricing"), changes).await
    }

    pub async fn deactivate_product(&self, id: Uuid) -> Result<Product, ClientError> {
        self.post(&format!("/products/{id}/deactivate"), &json!({})).await
    }

    pub async fn reactivate_product(&self, id: Uuid) -> Result<Product, ClientError> {
        self.post(&format!("/products/{id}/reactivate"), &json!({})).await
    }

    pub async fn adjust_stock(&self, id: Uuid, adjustment: &StockAdjustment) -> Result<StockOutcome, ClientError> {
        self.post(&format!("/products/{id}/adjust_stock"), adjustment).await
    }

    pub async fn record_movement(&self, id: Uuid, movement: &NewMovement) -> Result<StockOutcome, ClientError> {
        self.post(&format!("/products/{id}/movements"), movement).await
    }

    pub async fn movements(&self, id: Uuid) -> Result<Vec<Movement>, ClientError> {
        self.fetch_all(&format!("/products/{id}/movements")).await
    }

    // -------------------------
    // Sales
    // -------------------------

    pub async fn create_sale(&self, sale: &NewSale) -> Result<Sale, ClientError> {
        self.post("/sales", sale).await
    }

    pub async fn sale(&self, id: Uuid) -> Result<Sale, ClientError> {
        self.get(&format!("/sales/{id}")).await
    }

    pub async fn sales(&self) -> Result<Vec<Sale>, ClientError> {
        self.fetch_all("/sales").await
    }

    pub async fn update_line_supply(&self, id: Uuid, line_no: u32, quantity_supplied: i64) -> Result<Sale, ClientError> {
        self.post(
            &format!("/sales/{id}/lines/{line_no}/supply"),
            &json!({ "quantity_supplied": quantity_supplied }),
        )
        .await
    }

    pub async fn record_sale_payment(&self, id: Uuid, payment: &NewPayment) -> Result<Sale, ClientError> {
        self.post(&format!("/sales/{id}/record_payment"), payment).await
    }

    // -------------------------
    // LPOs
    // -------------------------

    pub async fn create_lpo(&self, lpo: &NewLpo) -> Result<Lpo, ClientError> {
        self.post("/lpos", lpo).await
    }

    pub async fn lpo(&self, id: Uuid) -> Result<Lpo, ClientError> {
        self.get(&format!("/lpos/{id}")).await
    }

    pub async fn lpos(&self) -> Result<Vec<Lpo>, ClientError> {
        self.fetch_all("/lpos").await
    }

    pub async fn record_delivery(&self, id: Uuid, delivered_quantity: i64) -> Result<Lpo, ClientError> {
        self.post(
            &format!("/lpos/{id}/update_delivery"),
            &json!({ "delivered_quantity": delivered_quantity }),
        )
        .await
    }

    pub async fn cancel_lpo(&self, id: Uuid, reason: Option<&str>) -> Result<Lpo, ClientError> {
        self.post(&format!("/lpos/{id}/cancel"), &json!({ "reason": reason })).await
    }

    // -------------------------
    // Invoices
    // -------------------------

    pub async fn create_invoice(&self, invoice: &NewInvoice) -> Result<Invoice, ClientError> {
        self.post("/invoices", invoice).await
    }

    pub async fn invoice(&self, id: Uuid) -> Result<Invoice, ClientError> {
        self.get(&format!("/invoices/{id}")).await
    }

    pub async fn invoices(&self) -> Result<Vec<Invoice>, ClientError> {
        self.fetch_all("/invoices").await
    }

    pub async fn record_invoice_payment(&self, id: Uuid, payment: &NewPayment) -> Result<Invoice, ClientError> {
        self.post(&format!("/invoices/{id}/record_payment"), payment).await
    }
}
