use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::{Value, json};

use duka_api::config::ApiConfig;
use duka_client::models::{NewParty, NewProduct, NewSale, NewSaleLine, StockAdjustment};
use duka_client::{ClientError, DukaClient, Session, TokenRefresher};
use duka_core::{Money, TenantId};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn serve(app: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { base_url, handle }
    }

    async fn ledger() -> Self {
        let app = duka_api::app::build_app(&ApiConfig::ephemeral())
            .await
            .expect("failed to build app");
        Self::serve(app).await
    }

    fn client(&self) -> DukaClient {
        DukaClient::new(Session::new(&self.base_url, TenantId::new()).unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn product(code: &str, initial_stock: i64) -> NewProduct {
    NewProduct {
        code: code.to_string(),
        name: format!("{code} item"),
        unit_price: Money::from_major(100),
        minimum_stock: 0,
        initial_stock,
    }
}

fn party(name: &str) -> NewParty {
    NewParty {
        name: name.to_string(),
        phone: None,
    }
}

#[tokio::test]
async fn sells_and_restocks_through_the_client() {
    let srv = TestServer::ledger().await;
    let client = srv.client();

    let supplier = client.register_supplier(&party("Bamburi")).await.unwrap();
    let customer = client.register_customer(&party("Mama Mboga")).await.unwrap();
    let created = client.create_product(&product("CEM-50", 5)).await.unwrap();
    let product_id = created.product.id;
    assert_eq!(created.movement.unwrap().reason, "INITIAL");

    let restocked = client
        .adjust_stock(
            product_id,
            &StockAdjustment::In {
                quantity: 20,
                supplier: supplier.id,
                notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(restocked.product.current_stock, 25);

    let sale = client
        .create_sale(&NewSale {
            customer: customer.id,
            lpo_quotation_number: None,
            delivery_number: None,
            mode_of_payment: "Not Paid".to_string(),
            amount_paid: Money::ZERO,
            reference_number: None,
            line_items: vec![NewSaleLine {
                product: product_id,
                quantity_ordered: 10,
                quantity_supplied: 10,
                supply_status: None,
                unit_price: Money::from_major(100),
            }],
        })
        .await
        .unwrap();
    assert_eq!(sale.total_amount, Money::from_major(1160));
    assert_eq!(sale.line_items[0].supply_status, "Supplied");

    let movements = client.movements(product_id).await.unwrap();
    let reasons: Vec<_> = movements.iter().map(|m| m.reason.as_str()).collect();
    assert_eq!(reasons, vec!["INITIAL", "RESTOCK", "SALE"]);
    assert_eq!(client.product(product_id).await.unwrap().current_stock, 15);
}

#[tokio::test]
async fn server_errors_keep_their_details() {
    let srv = TestServer::ledger().await;
    let client = srv.client();
    let customer = client.register_customer(&party("Mama Mboga")).await.unwrap();
    let created = client.create_product(&product("NAIL-3", 2)).await.unwrap();

    let err = client
        .create_sale(&NewSale {
            customer: customer.id,
            lpo_quotation_number: None,
            delivery_number: None,
            mode_of_payment: "Cash".to_string(),
            amount_paid: Money::ZERO,
            reference_number: None,
            line_items: vec![NewSaleLine {
                product: created.product.id,
                quantity_ordered: 5,
                quantity_supplied: 5,
                supply_status: None,
                unit_price: Money::from_major(10),
            }],
        })
        .await
        .unwrap_err();
    match err {
        ClientError::Api { status, body } => {
            assert_eq!(status, reqwest::StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!((body.requested, body.available), (Some(5), Some(2)));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = client.sale(uuid::Uuid::now_v7()).await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn fetch_all_follows_paged_links() {
    let srv = TestServer::ledger().await;
    let client = srv.client();
    for n in 0..5 {
        client.create_product(&product(&format!("P-{n}"), 1)).await.unwrap();
    }

    // The product list is served from a projection that catches up shortly
    // after each command.
    let mut all = Vec::new();
    for _ in 0..50 {
        all = client.products().await.unwrap();
        if all.len() == 5 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(all.len(), 5);

    let first = client.list_page::<Value>("/products?limit=2").await.unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.next_page.as_deref(), Some("/products?limit=2&offset=2"));

    let paged: Vec<duka_client::models::Product> = client.fetch_all("/products?limit=2").await.unwrap();
    assert_eq!(paged, all);
}

// -------------------------
// Session handling against a stub server
// -------------------------

async fn guarded(headers: HeaderMap) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer fresh");
    if authorized {
        (StatusCode::OK, axum::Json(json!([1, 2])))
    } else {
        (StatusCode::UNAUTHORIZED, axum::Json(json!({"error": "unauthorized", "message": "token expired"})))
    }
}

#[derive(serde::Deserialize)]
struct PageQuery {
    offset: Option<usize>,
}

async fn numbers(Query(q): Query<PageQuery>) -> axum::Json<Value> {
    match q.offset.unwrap_or(0) {
        0 => axum::Json(json!({"results": [1, 2], "next": "/numbers?limit=2&offset=2"})),
        2 => axum::Json(json!({"results": [3, 4], "next": "numbers?limit=2&offset=4"})),
        _ => axum::Json(json!({"results": [5], "next": null})),
    }
}

async fn circular(Query(q): Query<PageQuery>) -> axum::Json<Value> {
    match q.offset.unwrap_or(0) {
        0 => axum::Json(json!({"results": [1, 2], "next": "/circular?limit=2&offset=2"})),
        _ => axum::Json(json!({"results": [3], "next": "circular?limit=2&offset=0"})),
    }
}

async fn stub() -> TestServer {
    TestServer::serve(
        Router::new()
            .route("/guarded", get(guarded))
            .route("/numbers", get(numbers))
            .route("/circular", get(circular)),
    )
    .await
}

struct CountingRefresher {
    token: &'static str,
    calls: Arc<AtomicUsize>,
}

impl TokenRefresher for CountingRefresher {
    async fn refresh(&self) -> Result<String, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.token.to_string())
    }
}

#[tokio::test]
async fn expired_token_is_refreshed_once() {
    let srv = stub().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let session = Session::new(&srv.base_url, TenantId::new()).unwrap().with_token("stale");
    let client = DukaClient::new(session).with_refresher(CountingRefresher {
        token: "fresh",
        calls: calls.clone(),
    });

    let page = client.list_page::<u32>("/guarded").await.unwrap();
    assert_eq!(page.items, vec![1, 2]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.session().token().as_deref(), Some("fresh"));

    // The refreshed token is reused without another refresh.
    client.list_page::<u32>("/guarded").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_unauthorized_is_returned() {
    let srv = stub().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let client = DukaClient::new(Session::new(&srv.base_url, TenantId::new()).unwrap()).with_refresher(
        CountingRefresher {
            token: "still-wrong",
            calls: calls.clone(),
        },
    );

    let err = client.list_page::<u32>("/guarded").await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn without_refresher_unauthorized_is_returned() {
    let srv = stub().await;
    let err = srv.client().list_page::<u32>("/guarded").await.unwrap_err();
    match err {
        ClientError::Api { status, body } => {
            assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
            assert_eq!(body.message, "token expired");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn fetch_all_resolves_relative_and_rooted_links() {
    let srv = stub().await;
    let all: Vec<u32> = srv.client().fetch_all("/numbers?limit=2").await.unwrap();
    assert_eq!(all, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn fetch_all_stops_when_links_loop() {
    let srv = stub().await;
    let err = srv.client().fetch_all::<u32>("/circular?limit=2&offset=0").await.unwrap_err();
    match err {
        ClientError::RepeatedPage(url) => assert!(url.ends_with("/circular?limit=2&offset=0"), "{url}"),
        other => panic!("unexpected error: {other:?}"),
    }
}
