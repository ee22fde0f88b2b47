//! Request attribute extraction for axum services.
//!
//! # Responsibilities
//! - Lift gray attributes from `x-gray-*` headers
//! - Attach them to the request before handlers run
//! - Hand them to handlers through the `Attributes` extractor
//!
//! # Design Decisions
//! - Missing or malformed headers yield empty fields, never a rejection
//! - Decisions stay with the handler; this layer only gathers inputs

use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;

use crate::gray::attributes::{AccountFields, RequestAttributes};

pub const X_GRAY_IDENTITY: &str = "x-gray-identity";
pub const X_GRAY_DEVICE: &str = "x-gray-device";
pub const X_GRAY_PLATFORM: &str = "x-gray-platform";
pub const X_GRAY_APP_TYPE: &str = "x-gray-app-type";
pub const X_GRAY_VERSION: &str = "x-gray-version";
pub const X_GRAY_BUSINESS: &str = "x-gray-business";
pub const X_GRAY_ACCOUNT_INFO: &str = "x-gray-account-info";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default()
}

/// Build request attributes from `x-gray-*` headers.
pub fn attributes_from_headers(headers: &HeaderMap) -> RequestAttributes {
    let account = match header(headers, X_GRAY_ACCOUNT_INFO) {
        "" => AccountFields::default(),
        raw => serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Ignoring malformed account info header");
            AccountFields::default()
        }),
    };

    RequestAttributes::new(header(headers, X_GRAY_IDENTITY))
        .with_device(header(headers, X_GRAY_DEVICE))
        .with_platform(header(headers, X_GRAY_PLATFORM))
        .with_app_type(header(headers, X_GRAY_APP_TYPE))
        .with_version(header(headers, X_GRAY_VERSION))
        .with_business(header(headers, X_GRAY_BUSINESS))
        .with_account(account)
}

/// Middleware storing [`RequestAttributes`] in the request extensions.
///
/// Install with `axum::middleware::from_fn(attributes_middleware)`.
pub async fn attributes_middleware(mut req: Request, next: Next) -> Response {
    let attrs = attributes_from_headers(req.headers());
    req.extensions_mut().insert(attrs);
    next.run(req).await
}

/// Extractor for the request's gray attributes.
///
/// Reads what [`attributes_middleware`] stored, or parses the headers when
/// the middleware is not installed.
#[derive(Debug, Clone)]
pub struct Attributes(pub RequestAttributes);

impl<S> FromRequestParts<S> for Attributes
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let attrs = match parts.extensions.get::<RequestAttributes>() {
            Some(attrs) => attrs.clone(),
            None => attributes_from_headers(&parts.headers),
        };
        Ok(Attributes(attrs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    async fn describe(Attributes(attrs): Attributes) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            attrs.identity,
            attrs.platform,
            attrs.app_type,
            attrs.business,
            attrs.account.role,
            attrs.account.channel
        )
    }

    fn app(with_middleware: bool) -> Router {
        let router = Router::new().route("/", get(describe));
        if with_middleware {
            router.layer(axum::middleware::from_fn(attributes_middleware))
        } else {
            router
        }
    }

    async fn body(router: Router, req: axum::http::Request<Body>) -> String {
        let response = router.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request() -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri("/")
            .header(X_GRAY_IDENTITY, " 1001 ")
            .header(X_GRAY_PLATFORM, "iOS")
            .header(X_GRAY_APP_TYPE, "Lite")
            .header(X_GRAY_BUSINESS, "shop")
            .header(X_GRAY_ACCOUNT_INFO, r#"{"role": 3, "channel": "appstore"}"#)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_middleware_populates_attributes() {
        assert_eq!(
            body(app(true), request()).await,
            "1001|ios|lite|shop|3|appstore"
        );
    }

    #[tokio::test]
    async fn test_extractor_without_middleware() {
        assert_eq!(
            body(app(false), request()).await,
            "1001|ios|lite|shop|3|appstore"
        );
    }

    #[tokio::test]
    async fn test_missing_and_malformed_headers() {
        let req = axum::http::Request::builder()
            .uri("/")
            .header(X_GRAY_IDENTITY, "7")
            .header(X_GRAY_ACCOUNT_INFO, "{not json")
            .body(Body::empty())
            .unwrap();
        assert_eq!(body(app(true), req).await, "7||||0|");
    }

    #[test]
    fn test_attributes_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(X_GRAY_DEVICE, "Pixel".parse().unwrap());
        headers.insert(X_GRAY_VERSION, "2.3.1".parse().unwrap());

        let attrs = attributes_from_headers(&headers);
        assert_eq!(attrs.identity, "");
        assert_eq!(attrs.device, "pixel");
        assert_eq!(attrs.version, "2.3.1");
        assert_eq!(attrs.account, AccountFields::default());
    }
}
