use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::BoxError;
use axum::error_handling::HandleErrorLayer;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::badge::{self, CACHE_NO_STORE};
use crate::category::{category_slug, normalize_area_key, normalize_category};
use crate::config::Config;
use crate::copywriter::Copywriter;
use crate::credit::{CreditGate, UseOutcome};
use crate::entitlement::{
    ContentDecision, EntitlementResolver, ListingDraft, LiveGate, OnboardError, ResolveError,
    SlotLifecycle, SlotState,
};
use crate::listing::Listing;
use crate::records::{Filter, RecordStore};
use crate::reveal::{RevealCopy, split_reveal_copy};
use crate::web_maud::{
    LandingView, RevealView, render_error_page, render_landing_page, render_not_available_page,
    render_reveal_page,
};

#[cfg(test)]
mod tests;

const CACHE_LANDING: &str = "public, max-age=300";
const HEADER_REFERRER_POLICY: &str = "referrer-policy";
const HEADER_X_CONTENT_TYPE_OPTIONS: &str = "x-content-type-options";
const HTML_REFERRER_POLICY: &str = "strict-origin-when-cross-origin";
const X_CONTENT_TYPE_OPTIONS_NOSNIFF: &str = "nosniff";
const PREVIEW_BUSINESS_NAME: &str = "Your Business Here";

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn RecordStore>,
    resolver: Arc<EntitlementResolver>,
    lifecycle: Arc<SlotLifecycle>,
    gate: Arc<LiveGate>,
    credits: Arc<CreditGate>,
    copywriter: Arc<Copywriter>,
    started_at: DateTime<Utc>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn RecordStore>, copywriter: Copywriter) -> Self {
        let resolver = Arc::new(EntitlementResolver::new(
            store.clone(),
            config.listings_table.clone(),
            config.default_country.clone(),
        ));
        let lifecycle = Arc::new(SlotLifecycle::new(
            store.clone(),
            config.listings_table.clone(),
            config.default_country.clone(),
        ));
        let gate = Arc::new(LiveGate::new(resolver.clone()));
        let credits = Arc::new(CreditGate::new(store.clone(), config.credits_table.clone()));
        Self {
            config: Arc::new(config),
            store,
            resolver,
            lifecycle,
            gate,
            credits,
            copywriter: Arc::new(copywriter),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: String,
    version: &'static str,
    uptime_seconds: i64,
    store_driver: &'static str,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct SlotQuery {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    zip: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CountryQuery {
    #[serde(default)]
    zip: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailBody {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PreviewQuery {
    #[serde(default)]
    business_name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    rating: Option<String>,
    #[serde(default)]
    review_count: Option<String>,
    #[serde(default)]
    reveal_copy: Option<String>,
    #[serde(default)]
    bullets: Option<String>,
    #[serde(default)]
    cities: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    let request_timeout = Duration::from_millis(state.config.request_timeout_ms);
    let router = Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(readiness))
        .route("/api/check-slot", get(check_slot))
        .route("/api/check-zip", get(check_zip))
        .route("/api/onboard", post(onboard))
        .route("/api/get-pick", get(get_pick))
        .route("/api/badge/:slug", get(badge_image))
        .route("/check-credit", post(check_credit))
        .route("/use-credit", post(use_credit))
        .route("/reveal/:category/:zip", get(reveal_page))
        .route("/best/:category/:zip", get(landing_page))
        .route("/preview/reveal/:category/:zip", get(preview_reveal_page))
        .route("/preview/best/:category/:zip", get(preview_landing_page))
        .with_state(state);
    with_service_layers(router, request_timeout)
}

fn with_service_layers(router: Router, request_timeout: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(HandleErrorLayer::new(handle_layer_error))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(CatchPanicLayer::custom(panic_response)),
    )
}

async fn handle_layer_error(error: BoxError) -> Response {
    if error.is::<Elapsed>() {
        ApiError::Upstream("request timed out".to_string()).into_response()
    } else {
        ApiError::Internal(error.to_string()).into_response()
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_default();
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = (Utc::now() - state.started_at).num_seconds();
    Json(HealthResponse {
        status: "ok",
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        store_driver: state.config.store_driver.as_str(),
    })
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let ready = match state
        .store
        .select(&state.config.listings_table, &Filter::All(Vec::new()), 1)
        .await
    {
        Ok(_) => true,
        Err(error) => {
            tracing::warn!(
                target: "territory.http",
                error = %error,
                "readiness probe failed",
            );
            false
        }
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "not_ready" },
        }),
    )
}

async fn check_slot(
    State(state): State<AppState>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, ApiError> {
    let category = required_param(query.category.as_deref(), "category")?;
    let zip = required_param(query.zip.as_deref(), "zip")?;
    let slot = state
        .resolver
        .resolve_slot(category, zip, query.country.as_deref())
        .await
        .map_err(ApiError::from_resolve)?;
    let body = match slot {
        SlotState::Free => json!({ "available": true }),
        SlotState::Held(holder) => json!({
            "available": false,
            "business_name": holder.business_name,
            "status": holder.status,
            "expiry": holder.expiry,
        }),
    };
    Ok(Json(body))
}

async fn check_zip(
    State(state): State<AppState>,
    Query(query): Query<CountryQuery>,
) -> Result<Json<Value>, ApiError> {
    let zip = normalize_area_key(required_param(query.zip.as_deref(), "zip")?);
    let country = state.resolver.normalized_country(query.country.as_deref());
    let sold = state
        .resolver
        .occupied_slots(&zip, Some(&country))
        .await
        .map_err(ApiError::from_resolve)?;
    Ok(Json(json!({
        "zip": zip,
        "country": country,
        "sold": sold,
    })))
}

async fn onboard(
    State(state): State<AppState>,
    payload: Result<Json<ListingDraft>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(draft) =
        payload.map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;
    let receipt = state
        .lifecycle
        .onboard(draft)
        .await
        .map_err(|error| match error {
            OnboardError::Validation { field } => {
                ApiError::InvalidRequest(format!("{field} is required"))
            }
            OnboardError::Store(error) => ApiError::Upstream(error.to_string()),
        })?;
    Ok(Json(json!({
        "success": true,
        "record_id": receipt.record_id,
        "business_name": receipt.business_name,
        "category": receipt.category,
        "zip": receipt.zip,
    })))
}

async fn get_pick(
    State(state): State<AppState>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, ApiError> {
    let category = required_param(query.category.as_deref(), "category")?;
    let zip = required_param(query.zip.as_deref(), "zip")?;
    let listing = state
        .resolver
        .active_listing(category, zip, query.country.as_deref())
        .await
        .map_err(ApiError::from_resolve)?;
    let Some(listing) = listing else {
        return Ok(Json(json!({ "found": false })));
    };
    let mut body = serde_json::to_value(&listing)
        .map_err(|error| ApiError::Internal(format!("listing encode failed: {error}")))?;
    if let Some(object) = body.as_object_mut() {
        object.insert("found".to_string(), Value::Bool(true));
    }
    Ok(Json(body))
}

async fn badge_image(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<CountryQuery>,
) -> Response {
    let Some(zip) = query
        .zip
        .as_deref()
        .map(str::trim)
        .filter(|zip| !zip.is_empty())
    else {
        return badge::placeholder_response();
    };
    let category = badge::badge_category(&slug);
    match state
        .gate
        .authorize_content(category, zip, query.country.as_deref())
        .await
    {
        ContentDecision::Allowed(_) => badge::redirect_response(&badge::badge_asset_url(
            &state.config.badge_asset_base_url,
            category,
        )),
        ContentDecision::Denied => badge::placeholder_response(),
        ContentDecision::Indeterminate(reason) => {
            tracing::warn!(
                target: "territory.http",
                slug = %slug,
                zip = %zip,
                reason = %reason,
                "badge entitlement indeterminate; serving placeholder",
            );
            badge::placeholder_response()
        }
    }
}

async fn check_credit(
    State(state): State<AppState>,
    payload: Result<Json<EmailBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let email = required_email(payload)?;
    let decision = state.credits.check_credit(&email).await;
    Ok(Json(json!({
        "allowed": decision.is_allowed(),
        "outcome": decision.as_str(),
    })))
}

async fn use_credit(
    State(state): State<AppState>,
    payload: Result<Json<EmailBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let email = required_email(payload)?;
    let outcome = state.credits.use_credit(&email).await;
    let mut body = json!({
        "success": outcome.is_success(),
        "outcome": outcome.as_str(),
    });
    if let (UseOutcome::Used { remaining }, Some(object)) =
        (outcome, body.as_object_mut())
    {
        object.insert("remaining".to_string(), Value::from(remaining));
    }
    Ok(Json(body))
}

async fn reveal_page(
    State(state): State<AppState>,
    Path((category, zip)): Path<(String, String)>,
    Query(query): Query<CountryQuery>,
) -> Response {
    let site_name = state.config.site_name.as_str();
    match state
        .gate
        .authorize_content(&category, &zip, query.country.as_deref())
        .await
    {
        ContentDecision::Allowed(listing) => {
            let view = reveal_view_for_listing(site_name, &listing);
            html_response(StatusCode::OK, CACHE_NO_STORE, render_reveal_page(&view))
        }
        ContentDecision::Denied => html_response(
            StatusCode::NOT_FOUND,
            CACHE_NO_STORE,
            render_not_available_page(site_name, &display_category(&category), zip.trim()),
        ),
        ContentDecision::Indeterminate(reason) => {
            tracing::warn!(
                target: "territory.http",
                category = %category,
                zip = %zip,
                reason = %reason,
                "reveal entitlement indeterminate",
            );
            html_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                CACHE_NO_STORE,
                render_error_page(
                    site_name,
                    "Something went wrong",
                    "We could not load this page right now. Please try again shortly.",
                ),
            )
        }
    }
}

async fn landing_page(
    State(state): State<AppState>,
    Path((category, zip)): Path<(String, String)>,
) -> Response {
    let view = LandingView {
        site_name: state.config.site_name.clone(),
        category: display_category(&category),
        zip: normalize_area_key(&zip),
        reveal_href: content_href("/reveal", &category, &zip),
        preview: false,
    };
    html_response(StatusCode::OK, CACHE_LANDING, render_landing_page(&view))
}

async fn preview_reveal_page(
    State(state): State<AppState>,
    Path((category, zip)): Path<(String, String)>,
    Query(query): Query<PreviewQuery>,
) -> Response {
    let category = display_category(&category);
    let zip = normalize_area_key(&zip);
    let business_name = non_empty(query.business_name.as_deref())
        .unwrap_or(PREVIEW_BUSINESS_NAME)
        .to_string();

    let copy = match preview_copy(&query) {
        Some(copy) => copy,
        None => {
            state
                .copywriter
                .reveal_copy_or_default(&business_name, &category, &zip)
                .await
        }
    };

    let view = RevealView {
        site_name: state.config.site_name.clone(),
        business_name,
        category,
        zip,
        address: non_empty(query.address.as_deref()).map(ToString::to_string),
        phone: non_empty(query.phone.as_deref()).map(ToString::to_string),
        website: non_empty(query.website.as_deref()).map(ToString::to_string),
        rating: lenient_number::<f64>(query.rating.as_deref())
            .filter(|rating| rating.is_finite()),
        review_count: lenient_number::<u64>(query.review_count.as_deref()),
        copy,
        preview: true,
    };
    html_response(StatusCode::OK, CACHE_NO_STORE, render_reveal_page(&view))
}

async fn preview_landing_page(
    State(state): State<AppState>,
    Path((category, zip)): Path<(String, String)>,
) -> Response {
    let view = LandingView {
        site_name: state.config.site_name.clone(),
        category: display_category(&category),
        zip: normalize_area_key(&zip),
        reveal_href: content_href("/preview/reveal", &category, &zip),
        preview: true,
    };
    html_response(StatusCode::OK, CACHE_NO_STORE, render_landing_page(&view))
}

/// Demo values that do not parse are dropped instead of failing the page.
fn lenient_number<T: std::str::FromStr>(raw: Option<&str>) -> Option<T> {
    non_empty(raw).and_then(|raw| raw.parse().ok())
}

fn preview_copy(query: &PreviewQuery) -> Option<RevealCopy> {
    if let Some(raw) = non_empty(query.reveal_copy.as_deref()) {
        return Some(split_reveal_copy(raw));
    }
    let bullets = non_empty(query.bullets.as_deref());
    let cities = non_empty(query.cities.as_deref());
    if bullets.is_none() && cities.is_none() {
        return None;
    }
    let mut copy = bullets.map(split_reveal_copy).unwrap_or_default();
    copy.area_list = cities.unwrap_or_default().to_string();
    Some(copy)
}

fn reveal_view_for_listing(site_name: &str, listing: &Listing) -> RevealView {
    RevealView {
        site_name: site_name.to_string(),
        business_name: listing.business_name.clone(),
        category: display_category(&listing.category),
        zip: listing.zip.clone(),
        address: listing.address.clone(),
        phone: listing.phone.clone(),
        website: listing.website.clone(),
        rating: listing.rating,
        review_count: listing.review_count,
        copy: listing
            .reveal_copy
            .as_deref()
            .map(split_reveal_copy)
            .unwrap_or_default(),
        preview: false,
    }
}

fn display_category(raw: &str) -> String {
    normalize_category(raw)
}

fn content_href(prefix: &str, category: &str, zip: &str) -> String {
    format!(
        "{prefix}/{}/{}",
        encode_path_segment(&category_slug(category)),
        encode_path_segment(zip.trim())
    )
}

fn encode_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn html_response(status: StatusCode, cache_control: &'static str, body: String) -> Response {
    let mut response = (
        status,
        [
            (CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
            (CACHE_CONTROL, HeaderValue::from_static(cache_control)),
        ],
        body,
    )
        .into_response();
    apply_html_security_headers(response.headers_mut());
    response
}

fn apply_html_security_headers(headers: &mut HeaderMap) {
    headers.insert(
        HeaderName::from_static(HEADER_REFERRER_POLICY),
        HeaderValue::from_static(HTML_REFERRER_POLICY),
    );
    headers.insert(
        HeaderName::from_static(HEADER_X_CONTENT_TYPE_OPTIONS),
        HeaderValue::from_static(X_CONTENT_TYPE_OPTIONS_NOSNIFF),
    );
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn required_param<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ApiError> {
    non_empty(value).ok_or_else(|| ApiError::InvalidRequest(format!("{name} is required")))
}

fn required_email(payload: Result<Json<EmailBody>, JsonRejection>) -> Result<String, ApiError> {
    let Json(body) =
        payload.map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;
    required_param(body.email.as_deref(), "email").map(ToString::to_string)
}

#[derive(Debug)]
enum ApiError {
    InvalidRequest(String),
    Upstream(String),
    Internal(String),
}

impl ApiError {
    fn from_resolve(error: ResolveError) -> Self {
        match error {
            ResolveError::MissingInput(field) => Self::InvalidRequest(format!("{field} is required")),
            ResolveError::QueryFailed(error) => Self::Upstream(error.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid_request",
                    "message": message,
                })),
            )
                .into_response(),
            Self::Upstream(message) => {
                tracing::warn!(target: "territory.http", message = %message, "upstream query failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "upstream_query_failed",
                        "message": "record store query failed",
                    })),
                )
                    .into_response()
            }
            Self::Internal(message) => {
                tracing::error!(target: "territory.http", message = %message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "internal",
                        "message": "internal server error",
                    })),
                )
                    .into_response()
            }
        }
    }
}
