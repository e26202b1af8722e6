use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, LOCATION, PRAGMA};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::category::category_slug;

pub const CACHE_NO_STORE: &str = "no-cache, no-store, must-revalidate";

/// 1x1 fully transparent PNG.
pub const TRANSPARENT_PIXEL_PNG: [u8; 67] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Placeholder served whenever a badge is not entitled.
pub fn placeholder_response() -> Response {
    let mut response = (
        StatusCode::OK,
        [(CONTENT_TYPE, HeaderValue::from_static("image/png"))],
        TRANSPARENT_PIXEL_PNG.to_vec(),
    )
        .into_response();
    apply_no_cache_headers(&mut response);
    response
}

/// Temporary redirect to the badge asset for an entitled listing.
pub fn redirect_response(asset_url: &str) -> Response {
    let Ok(location) = HeaderValue::from_str(asset_url) else {
        return placeholder_response();
    };
    let mut response = (StatusCode::FOUND, [(LOCATION, location)]).into_response();
    apply_no_cache_headers(&mut response);
    response
}

pub fn apply_no_cache_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_NO_STORE));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
}

/// Asset URL for a badge slug, e.g. `hair-salon` → `{base}/hair-salon.png`.
///
/// A trailing `.png` on the incoming slug is tolerated.
pub fn badge_asset_url(base_url: &str, slug: &str) -> String {
    let slug = slug.strip_suffix(".png").unwrap_or(slug);
    format!("{}/{}.png", base_url.trim_end_matches('/'), category_slug(slug))
}

/// The category part of a badge slug.
pub fn badge_category(slug: &str) -> &str {
    slug.strip_suffix(".png").unwrap_or(slug)
}
