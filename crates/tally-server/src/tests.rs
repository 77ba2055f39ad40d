//! Server API tests

use super::*;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tally_core::chat::{ChatReply, ChatRequest};
use tally_core::ingest::Ingestor;
use tower::ServiceExt;

/// Chat service that answers from memory or fails on demand
struct StubChat {
    fail: bool,
}

#[async_trait]
impl ChatService for StubChat {
    async fn ask(&self, request: &ChatRequest) -> tally_core::Result<ChatReply> {
        if self.fail {
            return Err(tally_core::Error::Chat(
                "Query service error: 500 Internal Server Error - boom".to_string(),
            ));
        }
        Ok(ChatReply {
            query: request.query.trim().to_string(),
            sql: Some("SELECT 1".to_string()),
            results: json!([{"value": 1}]),
            explanation: Some("One".to_string()),
            conversation_id: Some("conv-9".to_string()),
            timestamp: Utc::now(),
        })
    }
}

fn record(id: &str, status: &str, vendor: &str, total: &str, due_in_days: i64) -> Value {
    let now = Utc::now();
    json!({
        "_id": id,
        "name": format!("{}.pdf", id),
        "status": status,
        "organizationId": "org-00000001",
        "departmentId": "dept-0000001",
        "uploadedById": "user-0000001",
        "createdAt": now.to_rfc3339(),
        "updatedAt": now.to_rfc3339(),
        "extractedData": {"llmData": {
            "vendor": {"value": {"vendorName": {"value": vendor}}},
            "invoice": {"value": {
                "invoiceId": {"value": format!("NO-{}", id)},
                "invoiceDate": {"value": now.date_naive().to_string()}
            }},
            "payment": {"value": {
                "dueDate": {"value": (now + Duration::days(due_in_days)).date_naive().to_string()}
            }},
            "summary": {"value": {"invoiceTotal": {"value": total}, "totalTax": {"value": "1.50"}}}
        }}
    })
}

fn test_db() -> Database {
    let db = Database::in_memory().unwrap();
    Ingestor::new(&db)
        .ingest(&[
            record("inv-1", "processed", "Acme \"Prime\" GmbH", "120.00", 3),
            record("inv-2", "pending", "Bolt AG", "80.00", 20),
            record("inv-3", "failed", "Acme \"Prime\" GmbH", "10.00", 2),
        ])
        .unwrap();
    db
}

fn setup_test_app_with(db: Database, chat_fails: bool) -> Router {
    create_router(AppState {
        db,
        config: ServerConfig::default(),
        analytics: AnalyticsConfig::default(),
        chat: Arc::new(StubChat { fail: chat_fails }),
    })
}

fn setup_test_app() -> Router {
    setup_test_app_with(test_db(), false)
}

async fn get(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_json(app: Router, uri: &str, body: Value) -> axum::response::Response {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

async fn get_body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get_body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ========== Health & Headers ==========

#[tokio::test]
async fn test_health() {
    let response = get(setup_test_app(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");

    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["timestamp"].is_string());
}

#[test]
fn test_parse_origins() {
    assert_eq!(
        parse_origins(" http://a.test, ,http://b.test "),
        vec!["http://a.test", "http://b.test"]
    );
    assert!(parse_origins("").is_empty());
}

// ========== Dashboard ==========

#[tokio::test]
async fn test_stats() {
    let response = get(setup_test_app(), "/api/stats").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["totalSpend"]["value"], json!(210.0));
    assert_eq!(json["totalSpend"]["period"], "YTD");
    assert_eq!(json["totalInvoicesProcessed"]["value"], 1);
    assert_eq!(json["documentsUploaded"]["value"], 3);
    assert!(json["averageInvoiceValue"]["change"].is_number());
}

#[tokio::test]
async fn test_stats_on_empty_store() {
    let app = setup_test_app_with(Database::in_memory().unwrap(), false);
    let json = get_body_json(get(app, "/api/stats").await).await;
    assert_eq!(json["totalSpend"]["value"], json!(0.0));
    assert_eq!(json["totalSpend"]["change"], json!(0.0));
}

#[tokio::test]
async fn test_invoice_trends() {
    let json = get_body_json(get(setup_test_app(), "/api/invoice-trends").await).await;
    let trends = json.as_array().unwrap();
    assert_eq!(trends.len(), 12);
    assert_eq!(trends[11]["totalSpend"], json!(210.0));
    assert!(trends[11]["invoiceCount"].is_number());
}

#[tokio::test]
async fn test_vendors_and_top10() {
    let json = get_body_json(get(setup_test_app(), "/api/vendors").await).await;
    let vendors = json.as_array().unwrap();
    assert_eq!(vendors.len(), 2);
    assert_eq!(vendors[0]["vendorName"], "Acme \"Prime\" GmbH");
    assert_eq!(vendors[0]["invoiceCount"], 2);
    assert!(vendors[0].get("totalTax").is_none());

    let json = get_body_json(get(setup_test_app(), "/api/vendors/top10").await).await;
    assert_eq!(json.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_category_spend() {
    let json = get_body_json(get(setup_test_app(), "/api/category-spend").await).await;
    assert_eq!(json[0]["category"], "Operations");
    assert_eq!(json[0]["invoiceCount"], 3);
}

#[tokio::test]
async fn test_cash_outflow() {
    let json = get_body_json(get(setup_test_app(), "/api/cash-outflow").await).await;
    let buckets = json.as_array().unwrap();
    assert_eq!(buckets.len(), 4);
    assert_eq!(buckets[0]["period"], "0-7 days");
    // inv-3 is FAILED and excluded
    assert_eq!(buckets[0]["invoiceCount"], 1);
    assert_eq!(buckets[1]["invoiceCount"], 1);
}

// ========== Invoices ==========

#[tokio::test]
async fn test_list_invoices() {
    let response = get(setup_test_app(), "/api/invoices?sortBy=totalAmount&sortOrder=asc").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    let ids: Vec<_> = json["invoices"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["inv-3", "inv-2", "inv-1"]);
    assert_eq!(json["pagination"]["totalCount"], 3);
    assert_eq!(json["pagination"]["page"], 1);
    assert_eq!(json["invoices"][0]["uploadedBy"], "-0000001_admin@tally.local");
}

#[tokio::test]
async fn test_list_invoices_filters() {
    let json =
        get_body_json(get(setup_test_app(), "/api/invoices?status=PENDING").await).await;
    assert_eq!(json["pagination"]["totalCount"], 1);

    let json = get_body_json(get(setup_test_app(), "/api/invoices?search=bolt").await).await;
    assert_eq!(json["invoices"][0]["vendorName"], "Bolt AG");

    let json =
        get_body_json(get(setup_test_app(), "/api/invoices?limit=500&page=1").await).await;
    assert_eq!(json["pagination"]["limit"], 100);
}

#[tokio::test]
async fn test_list_invoices_bad_params() {
    for uri in [
        "/api/invoices?page=abc",
        "/api/invoices?page=0",
        "/api/invoices?page=9223372036854775807",
        "/api/invoices?limit=-1",
        "/api/invoices?sortBy=password",
        "/api/invoices?sortOrder=sideways",
    ] {
        let response = get(setup_test_app(), uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let json = get_body_json(response).await;
        assert!(json["error"].is_string());
    }
}

#[tokio::test]
async fn test_get_invoice() {
    let response = get(setup_test_app(), "/api/invoices/inv-1").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["id"], "inv-1");
    assert_eq!(json["status"], "COMPLETED");
    assert_eq!(json["extractedData"]["invoiceNumber"], "NO-inv-1");
    assert_eq!(json["departmentName"], "Department -0000001");
    assert!(json["lineItems"].as_array().unwrap().is_empty());

    let response = get(setup_test_app(), "/api/invoices/missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ========== Chat ==========

#[tokio::test]
async fn test_chat_with_data() {
    let response = post_json(
        setup_test_app(),
        "/api/chat-with-data",
        json!({"query": " total spend? ", "conversationId": "conv-9"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["query"], "total spend?");
    assert_eq!(json["sql"], "SELECT 1");
    assert_eq!(json["conversationId"], "conv-9");
}

#[tokio::test]
async fn test_chat_empty_query() {
    let response = post_json(setup_test_app(), "/api/chat-with-data", json!({"query": "  "})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_upstream_failure() {
    let app = setup_test_app_with(test_db(), true);
    let response = post_json(app, "/api/chat-with-data", json!({"query": "hi"})).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json = get_body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("500"));
}

// ========== Export ==========

#[tokio::test]
async fn test_export_invoices_csv() {
    let response = get(setup_test_app(), "/api/export/invoices/csv?status=COMPLETED").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/csv; charset=utf-8"
    );
    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"invoices_"));
    assert!(disposition.ends_with(".csv\""));

    let text = get_body_text(response).await;
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("\"inv-1\",\"NO-inv-1\",\"Acme \"\"Prime\"\" GmbH\""));
}

#[tokio::test]
async fn test_export_invoices_bad_dates() {
    let response = get(setup_test_app(), "/api/export/invoices/csv?startDate=yesterday").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(setup_test_app(), "/api/export/invoices/csv?limit=0").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_export_invoices_date_window() {
    let today = Utc::now().date_naive();
    let uri = format!(
        "/api/export/invoices/csv?startDate={}&endDate={}",
        today, today
    );
    let text = get_body_text(get(setup_test_app(), &uri).await).await;
    assert_eq!(text.lines().count(), 4);

    let tomorrow = today + Duration::days(1);
    let uri = format!("/api/export/invoices/csv?startDate={}", tomorrow);
    let text = get_body_text(get(setup_test_app(), &uri).await).await;
    assert_eq!(text.lines().count(), 1);
}

#[tokio::test]
async fn test_export_vendors_csv() {
    let response = get(setup_test_app(), "/api/export/vendors/csv").await;
    assert_eq!(response.status(), StatusCode::OK);

    let text = get_body_text(response).await;
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "\"Vendor Name\",\"Total Invoices\",\"Total Spend\",\"Total Tax\"");
    assert_eq!(lines[1], "\"Acme \"\"Prime\"\" GmbH\",\"2\",\"130.00\",\"3.00\"");
}

#[tokio::test]
async fn test_export_analytics_csv() {
    let text = get_body_text(get(setup_test_app(), "/api/export/analytics/csv").await).await;
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "\"Month\",\"Invoice Count\",\"Total Amount\"");
    let month = Utc::now().format("%Y-%m").to_string();
    assert_eq!(lines[1], format!("\"{}\",\"3\",\"210.00\"", month));
}

// ========== Ingest ==========

#[tokio::test]
async fn test_ingest_appends() {
    let db = test_db();
    let app = setup_test_app_with(db.clone(), false);

    let response = post_json(
        app,
        "/api/ingest",
        json!([
            record("inv-4", "processing", "Cargo Ltd", "5.00", 1),
            record("inv-1", "processed", "Acme", "1.00", 1),
            {"_id": "junk"}
        ]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["createdCount"], 1);
    assert_eq!(json["errors"].as_array().unwrap().len(), 2);
    assert_eq!(db.invoice_count().unwrap(), 4);
}

#[tokio::test]
async fn test_ingest_rejects_non_array() {
    let response = post_json(setup_test_app(), "/api/ingest", json!({"_id": "x"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Errors ==========

#[test]
fn test_core_error_mapping() {
    use tally_core::Error;
    assert_eq!(
        AppError::from_core(Error::InvalidData("x".into())).status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        AppError::from_core(Error::NotFound("x".into())).status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        AppError::from_core(Error::Chat("x".into())).status,
        StatusCode::BAD_GATEWAY
    );

    let internal = AppError::from_core(Error::Ingest("disk".into()));
    assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(internal.message, "An internal error occurred");
}
