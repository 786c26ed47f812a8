//! End-to-end tests of the REST surface over an in-memory store.

#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use chrono::{Days, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{BookSource, REGION, app, day, tritanium_book};

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let Ok(response) = app.clone().oneshot(request).await else {
        panic!("router should respond");
    };
    let status = response.status();
    let Ok(bytes) = to_bytes(response.into_body(), 1 << 20).await else {
        panic!("body should be readable");
    };
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    let Ok(request) = Request::get(uri).body(Body::empty()) else {
        panic!("valid request");
    };
    request
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    let Ok(request) = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
    else {
        panic!("valid request");
    };
    request
}

#[tokio::test]
async fn health_reports_cache_counters() {
    let app = app(&Arc::new(BookSource::default()));
    let (status, body) = call(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["venues"], 1);
    assert_eq!(body["cache"]["hits"], 0);
}

#[tokio::test]
async fn refresh_then_quote_and_orders() {
    let source = Arc::new(BookSource::with_pages(tritanium_book()));
    let app = app(&source);

    let (status, report) = call(&app, post("/api/v1/refresh", &json!({ "dataset": "market_order" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["refreshed"], true);
    assert_eq!(report["records"], 4);
    assert_eq!(
        report["summary"],
        "jita:\n  total orders: 4 (buy: 2, sell: 2, types: 1)"
    );

    let (status, quote) = call(&app, get("/api/v1/quotes/34")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["best_bid"], 4.2);
    assert_eq!(quote["best_ask"], 5.1);

    let (status, top) = call(&app, get("/api/v1/orders/34?venue=jita&limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(top["buy"].as_array().map(Vec::len), Some(1));
    assert_eq!(top["sell"][0]["price"], 5.1);

    let (_, venues) = call(&app, get("/api/v1/venues")).await;
    assert_eq!(venues["data"][0]["summary"]["total"], 4);
}

#[tokio::test]
async fn second_refresh_within_interval_is_skipped() {
    let source = Arc::new(BookSource::with_pages(tritanium_book()));
    let app = app(&source);
    let body = json!({ "dataset": "orders:jita" });

    let (_, first) = call(&app, post("/api/v1/refresh", &body)).await;
    assert_eq!(first["refreshed"], true);
    let calls = source.page_calls();

    let (status, second) = call(&app, post("/api/v1/refresh", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["refreshed"], false);
    assert_eq!(source.page_calls(), calls);
}

#[tokio::test]
async fn bad_keys_and_venues_map_to_client_errors() {
    let app = app(&Arc::new(BookSource::default()));

    let (status, body) = call(&app, post("/api/v1/refresh", &json!({ "dataset": "weather" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], 1002);

    let (status, body) = call(&app, get("/api/v1/quotes/34?venue=amarr")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 2001);

    let (status, _) = call(
        &app,
        post("/api/v1/history/refresh", &json!({ "region_id": REGION, "type_ids": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn history_batch_and_reads() {
    let source = Arc::new(BookSource::default());
    let today = Utc::now().date_naive();
    let Some(yesterday) = today.checked_sub_days(Days::new(1)) else {
        panic!("valid date");
    };
    source.set_history(34, vec![day(34, yesterday, 5.0), day(34, today, 6.0)]);
    let app = app(&source);

    let (status, batch) = call(
        &app,
        post(
            "/api/v1/history/batch",
            &json!({ "region_id": REGION, "type_ids": [34, 35], "order": "asc" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(batch["report"]["stale"], json!([34, 35]));
    assert_eq!(batch["data"][0]["records"][0]["average"], 5.0);
    assert_eq!(batch["data"][1]["records"], json!([]));

    let (_, again) = call(
        &app,
        post("/api/v1/history/refresh", &json!({ "region_id": REGION, "type_ids": [34] })),
    )
    .await;
    assert_eq!(again["stale"], json!([]));

    let uri = format!("/api/v1/history/{REGION}/34");
    let (_, series) = call(&app, get(&uri)).await;
    assert_eq!(series["records"][0]["average"], 6.0);

    let (status, stats) = call(&app, get(&format!("{uri}/stats?also=10000043"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats.as_array().map(Vec::len), Some(2));
    assert_eq!(stats[0]["stats"]["week"]["volume"], 200);
}
