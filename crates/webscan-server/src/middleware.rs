//! Fronting-layer middleware (§6): same-origin enforcement, CORS, and the
//! required response security headers. None of this is scanner *output* —
//! it protects the control surface the scanner is served behind.

use axum::extract::Request;
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::AppError;

/// Build the CORS layer from configured origins (ambient browser-facing
/// concern, independent of the same-origin enforcement below).
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Same-origin enforcement (§6): any state-changing method, or a sensitive
/// read, requires the `Origin` (falling back to `Referer`) hostname to equal
/// the request's own `Host` hostname. Plain `GET` to non-sensitive paths
/// bypasses this check — `/health` and the log stream are intentionally not
/// gated so a same-origin browser tab can keep a log subscription open
/// without re-proving same-origin on every event.
pub async fn same_origin_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    if request.method() == Method::GET && !is_sensitive_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let host = header_str(&request, axum::http::header::HOST)
        .and_then(|h| hostname_of(&format!("http://{h}")))
        .ok_or_else(|| AppError::BadRequest("missing or invalid Host header".into()))?;

    let candidate = header_str(&request, axum::http::header::ORIGIN)
        .and_then(|o| hostname_of(&o))
        .or_else(|| header_str(&request, axum::http::header::REFERER).and_then(|r| hostname_of(&r)));

    match candidate {
        Some(candidate_host) if candidate_host == host => Ok(next.run(request).await),
        _ => Err(AppError::Forbidden("cross-origin request rejected".into())),
    }
}

/// Sensitive `GET`s (scan status/results) are same-origin gated too;
/// `/health` and the SSE log stream are not.
fn is_sensitive_path(path: &str) -> bool {
    path.starts_with("/scan/") && (path.ends_with("/results") || path.ends_with("/status"))
}

fn header_str(request: &Request, name: axum::http::HeaderName) -> Option<String> {
    request.headers().get(name)?.to_str().ok().map(str::to_string)
}

fn hostname_of(value: &str) -> Option<String> {
    url::Url::parse(value).ok().and_then(|u| u.host_str().map(str::to_string))
}

/// Sets the response security headers required by §6 on every response.
/// `Content-Security-Policy` is restrictive because this surface serves
/// JSON/SSE, never HTML with inline scripts.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(axum::http::header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(axum::http::header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        axum::http::header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        axum::http::header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitive_paths_are_gated() {
        let id = "123e4567-e89b-12d3-a456-426614174000";
        assert!(is_sensitive_path(&format!("/scan/{id}/results")));
        assert!(is_sensitive_path(&format!("/scan/{id}/status")));
        assert!(!is_sensitive_path("/health"));
        assert!(!is_sensitive_path("/scan/logs"));
    }

    #[test]
    fn hostname_of_extracts_host_only() {
        assert_eq!(hostname_of("https://example.com:8080/path"), Some("example.com".into()));
        assert_eq!(hostname_of("not a url"), None);
    }
}
