use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use axum::Router;
use axum::routing;
use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, LOCATION, PRAGMA};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::{AppState, build_router, with_service_layers};
use crate::badge::TRANSPARENT_PIXEL_PNG;
use crate::config::Config;
use crate::copywriter::Copywriter;
use crate::records::{self, Fields, Filter, MemoryRecordStore, RecordStore};

fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

fn test_app() -> (Arc<MemoryRecordStore>, Router) {
    let store = records::memory();
    let state = AppState::new(Config::for_tests(), store.clone(), Copywriter::disabled());
    (store, build_router(state))
}

async fn seed_listing(store: &MemoryRecordStore, value: Value) -> Result<String> {
    let record = store.create("Listings", fields(value)).await?;
    Ok(record.id)
}

async fn get(app: &Router, uri: &str) -> Result<Response> {
    Ok(app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty())?)
        .await?)
}

async fn post_json(app: &Router, uri: &str, body: &Value) -> Result<Response> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?;
    Ok(app.clone().oneshot(request).await?)
}

async fn read_json(response: Response) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

async fn read_text(response: Response) -> Result<String> {
    let bytes = response.into_body().collect().await?.to_bytes();
    String::from_utf8(bytes.to_vec()).map_err(|error| anyhow!("non-utf8 body: {error}"))
}

async fn read_bytes(response: Response) -> Result<Vec<u8>> {
    Ok(response.into_body().collect().await?.to_bytes().to_vec())
}

#[tokio::test]
async fn health_and_readiness_report_store_state() -> Result<()> {
    let (store, app) = test_app();

    let response = get(&app, "/healthz").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = read_json(response).await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "territory-service");
    assert_eq!(body["store_driver"], "memory");

    let response = get(&app, "/readyz").await?;
    assert_eq!(response.status(), StatusCode::OK);

    store.set_unavailable(true).await;
    let response = get(&app, "/readyz").await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(read_json(response).await?["status"], "not_ready");
    Ok(())
}

#[tokio::test]
async fn request_id_is_propagated() -> Result<()> {
    let (_store, app) = test_app();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .header("x-request-id", "req-abc")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.headers()["x-request-id"], "req-abc");
    Ok(())
}

#[tokio::test]
async fn empty_slot_is_available() -> Result<()> {
    let (store, app) = test_app();
    seed_listing(
        &store,
        json!({"Business Name": "Old Pipes", "Category": "Plumber", "Zip": "90210", "Status": "Cancelled"}),
    )
    .await?;

    let response = get(&app, "/api/check-slot?category=plumber&zip=90210").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await?, json!({"available": true}));
    Ok(())
}

#[tokio::test]
async fn pending_slot_is_unavailable_for_every_category_spelling() -> Result<()> {
    let (store, app) = test_app();
    seed_listing(
        &store,
        json!({"Business Name": "Shear Joy", "Category": "Hair Salon", "Zip": "M5V", "Status": "Pending Payment"}),
    )
    .await?;

    for category in ["hair-salon", "hair_salon", "Hair%20Salon"] {
        let response = get(&app, &format!("/api/check-slot?category={category}&zip=M5V")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await?;
        assert_eq!(body["available"], false, "category {category}");
        assert_eq!(body["business_name"], "Shear Joy");
        assert_eq!(body["status"], "Pending Payment");
    }
    Ok(())
}

#[tokio::test]
async fn check_slot_requires_category_and_zip() -> Result<()> {
    let (_store, app) = test_app();
    let response = get(&app, "/api/check-slot?zip=90210").await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await?;
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(body["message"], "category is required");
    Ok(())
}

#[tokio::test]
async fn store_outage_is_not_reported_as_available() -> Result<()> {
    let (store, app) = test_app();
    store.set_unavailable(true).await;
    let response = get(&app, "/api/check-slot?category=plumber&zip=90210").await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await?;
    assert_eq!(body["error"], "upstream_query_failed");
    assert!(body.get("available").is_none());
    Ok(())
}

#[tokio::test]
async fn check_zip_maps_occupied_categories() -> Result<()> {
    let (store, app) = test_app();
    seed_listing(
        &store,
        json!({"Business Name": "Ace", "Category": "Plumber", "Zip": "90210", "Status": "Active", "Expiry": "2027-01-31"}),
    )
    .await?;
    seed_listing(
        &store,
        json!({"Business Name": "Shear Joy", "Category": "hair salon", "Zip": "90210", "Status": "Pending Payment"}),
    )
    .await?;
    seed_listing(
        &store,
        json!({"Business Name": "Gone Dogs", "Category": "Dog Groomer", "Zip": "90210", "Status": "Expired"}),
    )
    .await?;

    let response = get(&app, "/api/check-zip?zip=90210").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["zip"], "90210");
    assert_eq!(body["country"], "CA");
    let sold = body["sold"].as_object().ok_or_else(|| anyhow!("sold map"))?;
    assert_eq!(sold.len(), 2);
    assert_eq!(sold["Plumber"]["business_name"], "Ace");
    assert_eq!(sold["Plumber"]["expiry"], "2027-01-31");
    assert_eq!(sold["Hair Salon"]["status"], "Pending Payment");
    Ok(())
}

#[tokio::test]
async fn onboard_without_zip_is_rejected_and_writes_nothing() -> Result<()> {
    let (store, app) = test_app();
    let response = post_json(
        &app,
        "/api/onboard",
        &json!({"business_name": "Ace Plumbing", "category": "Plumber"}),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await?["message"], "zip is required");
    assert!(store.rows("Listings").await.is_empty());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/onboard")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.rows("Listings").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn onboarded_listing_holds_slot_as_pending() -> Result<()> {
    let (store, app) = test_app();
    let response = post_json(
        &app,
        "/api/onboard",
        &json!({
            "business_name": "Ace Plumbing",
            "category": "Plumber",
            "zip": "90210",
            "status": "Active"
        }),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["business_name"], "Ace Plumbing");
    assert_eq!(body["category"], "Plumber");
    assert_eq!(body["zip"], "90210");
    let record_id = body["record_id"]
        .as_str()
        .ok_or_else(|| anyhow!("record_id"))?
        .to_string();

    let rows = store.rows("Listings").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, record_id);
    assert_eq!(rows[0].text("Status"), Some("Pending Payment"));

    let response = get(&app, "/api/check-slot?category=Plumber&zip=90210").await?;
    let body = read_json(response).await?;
    assert_eq!(body["available"], false);
    assert_eq!(body["business_name"], "Ace Plumbing");
    assert_eq!(body["status"], "Pending Payment");

    let response = get(&app, "/api/get-pick?category=plumber&zip=90210").await?;
    assert_eq!(read_json(response).await?, json!({"found": false}));
    Ok(())
}

#[tokio::test]
async fn get_pick_returns_active_listing_fields() -> Result<()> {
    let (store, app) = test_app();
    seed_listing(
        &store,
        json!({
            "Business Name": "Ace Plumbing",
            "Category": "Plumber",
            "Zip": "90210",
            "Status": "Active",
            "Phone": "555-0100",
            "Rating": 4.9
        }),
    )
    .await?;
    let response = get(&app, "/api/get-pick?category=plumber&zip=90210").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["found"], true);
    assert_eq!(body["business_name"], "Ace Plumbing");
    assert_eq!(body["phone"], "555-0100");
    assert_eq!(body["status"], "Active");
    assert_eq!(body["rating"], 4.9);
    Ok(())
}

#[tokio::test]
async fn badge_goes_blank_on_the_request_after_expiry() -> Result<()> {
    let (store, app) = test_app();
    let record_id = seed_listing(
        &store,
        json!({"Business Name": "Ace", "Category": "Plumber", "Zip": "90210", "Status": "Active"}),
    )
    .await?;

    let response = get(&app, "/api/badge/plumber.png?zip=90210").await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[LOCATION],
        "https://cdn.territory.test/badges/plumber.png"
    );
    assert_eq!(
        response.headers()[CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );

    store
        .patch("Listings", &record_id, fields(json!({"Status": "Expired"})))
        .await?;

    let response = get(&app, "/api/badge/plumber.png?zip=90210").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
    assert_eq!(
        response.headers()[CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(response.headers()[PRAGMA], "no-cache");
    assert_eq!(response.headers()[EXPIRES], "0");
    assert_eq!(read_bytes(response).await?, TRANSPARENT_PIXEL_PNG.to_vec());
    Ok(())
}

#[tokio::test]
async fn badge_without_zip_or_during_outage_is_placeholder() -> Result<()> {
    let (store, app) = test_app();
    seed_listing(
        &store,
        json!({"Business Name": "Ace", "Category": "Plumber", "Zip": "90210", "Status": "Active"}),
    )
    .await?;

    let response = get(&app, "/api/badge/plumber").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/png");

    store.set_unavailable(true).await;
    let response = get(&app, "/api/badge/plumber?zip=90210").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
    Ok(())
}

#[tokio::test]
async fn reveal_serves_listing_only_while_active() -> Result<()> {
    let (store, app) = test_app();
    let record_id = seed_listing(
        &store,
        json!({
            "Business Name": "Ace Plumbing",
            "Category": "Plumber",
            "Zip": "90210",
            "Status": "Active",
            "Reveal Copy": "- Licensed\n- Insured\nCITIES: Beverly Hills, Bel Air"
        }),
    )
    .await?;

    let response = get(&app, "/reveal/plumber/90210").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    let html = read_text(response).await?;
    assert!(html.contains("Ace Plumbing"));
    assert!(html.contains("<li>Licensed</li>"));
    assert!(html.contains("Beverly Hills, Bel Air"));
    assert!(!html.contains("CITIES:"));

    store
        .patch("Listings", &record_id, fields(json!({"Status": "Cancelled"})))
        .await?;
    let response = get(&app, "/reveal/plumber/90210").await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let html = read_text(response).await?;
    assert!(html.contains("Not currently available"));
    assert!(!html.contains("Ace Plumbing"));
    Ok(())
}

#[tokio::test]
async fn reveal_during_outage_is_an_error_page() -> Result<()> {
    let (store, app) = test_app();
    store.set_unavailable(true).await;
    let response = get(&app, "/reveal/plumber/90210").await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let html = read_text(response).await?;
    assert!(html.contains("Something went wrong"));
    Ok(())
}

#[tokio::test]
async fn landing_page_renders_without_the_store() -> Result<()> {
    let (store, app) = test_app();
    store.set_unavailable(true).await;
    let response = get(&app, "/best/hair_salon/M5V%202T6").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = read_text(response).await?;
    assert!(html.contains("Best Hair Salon in M5V 2T6"));
    assert!(html.contains("href=\"/reveal/hair-salon/M5V%202T6\""));
    Ok(())
}

#[tokio::test]
async fn preview_pages_use_query_parameters() -> Result<()> {
    let (store, app) = test_app();
    store.set_unavailable(true).await;

    let response = get(
        &app,
        "/preview/reveal/plumber/90210?business_name=Demo%20Pipes&reveal_copy=Fast%0ACITIES%3A%20Bel%20Air",
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = read_text(response).await?;
    assert!(html.contains("Demo Pipes"));
    assert!(html.contains("<li>Fast</li>"));
    assert!(html.contains("Bel Air"));
    assert!(html.contains("Preview"));

    let response = get(&app, "/preview/reveal/plumber/90210").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = read_text(response).await?;
    assert!(html.contains("Your Business Here"));
    assert!(html.contains("The only plumber we feature in 90210"));

    let response = get(&app, "/preview/best/plumber/90210").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = read_text(response).await?;
    assert!(html.contains("href=\"/preview/reveal/plumber/90210\""));
    Ok(())
}

#[tokio::test]
async fn preview_page_drops_unparseable_numbers() -> Result<()> {
    let (_store, app) = test_app();

    let response = get(
        &app,
        "/preview/reveal/plumber/90210?business_name=Demo%20Pipes&rating=abc&review_count=-3",
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = read_text(response).await?;
    assert!(html.contains("Demo Pipes"));
    assert!(!html.contains("lp-rating"));

    let response = get(&app, "/preview/reveal/plumber/90210?rating=4.76&review_count=12").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(read_text(response).await?.contains("4.8 ★"));
    Ok(())
}

async fn panicking_handler() -> &'static str {
    panic!("boom")
}

#[tokio::test]
async fn handler_panic_becomes_internal_error() -> Result<()> {
    let app = with_service_layers(
        Router::new().route(
            "/boom",
            routing::get(panicking_handler),
        ),
        Duration::from_secs(5),
    );

    let response = get(&app, "/boom").await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        read_json(response).await?,
        json!({"error": "internal", "message": "internal server error"})
    );
    Ok(())
}

#[tokio::test]
async fn request_timeout_is_reported_as_upstream_failure() -> Result<()> {
    let app = with_service_layers(
        Router::new().route(
            "/slow",
            routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        ),
        Duration::from_millis(20),
    );

    let response = get(&app, "/slow").await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        read_json(response).await?,
        json!({"error": "upstream_query_failed", "message": "record store query failed"})
    );
    Ok(())
}

#[tokio::test]
async fn credit_check_then_use_consumes_the_last_credit() -> Result<()> {
    let (store, app) = test_app();
    store
        .create(
            "Credits",
            fields(json!({"Email": "owner@example.com", "Remaining Uses": 1})),
        )
        .await?;

    let response = post_json(&app, "/check-credit", &json!({"email": "Owner@Example.com"})).await?;
    assert_eq!(
        read_json(response).await?,
        json!({"allowed": true, "outcome": "allowed"})
    );

    let response = post_json(&app, "/use-credit", &json!({"email": "owner@example.com"})).await?;
    assert_eq!(
        read_json(response).await?,
        json!({"success": true, "outcome": "used", "remaining": 0})
    );

    let response = post_json(&app, "/check-credit", &json!({"email": "owner@example.com"})).await?;
    assert_eq!(read_json(response).await?["allowed"], false);

    let rows = store
        .select("Credits", &Filter::eq("Email", "owner@example.com"), 1)
        .await?;
    assert_eq!(rows[0].number("Remaining Uses"), Some(0.0));
    Ok(())
}

#[tokio::test]
async fn credit_endpoints_fail_closed() -> Result<()> {
    let (store, app) = test_app();

    let response = post_json(&app, "/check-credit", &json!({})).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(&app, "/use-credit", &json!({"email": "nobody@example.com"})).await?;
    assert_eq!(
        read_json(response).await?,
        json!({"success": false, "outcome": "denied"})
    );

    store.set_unavailable(true).await;
    let response = post_json(&app, "/check-credit", &json!({"email": "nobody@example.com"})).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await?,
        json!({"allowed": false, "outcome": "indeterminate"})
    );
    Ok(())
}
