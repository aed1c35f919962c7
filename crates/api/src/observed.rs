//! The observed-position header transport.
//!
//! The tracker's value is read from the inbound header before handling and
//! written to the outbound header after handling, under a single well-known
//! header name. An absent header means "start from zero". The outbound value
//! is the caller's "wait for at least this" token for its next request.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use common::{GlobalPosition, RequestScope, OBSERVED_POSITION_HEADER};

/// Middleware creating the per-request scope, seeded from the inbound
/// observed-position header and echoed into the response.
///
/// Handlers reach the scope through `Extension<RequestScope>`.
pub async fn observed_position(mut request: Request, next: Next) -> Response {
    let scope = RequestScope::new();
    if let Some(position) = request
        .headers()
        .get(OBSERVED_POSITION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok())
    {
        scope.observed.observe(GlobalPosition::new(position));
    }
    request.extensions_mut().insert(scope.clone());

    let mut response = next.run(request).await;

    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(OBSERVED_POSITION_HEADER.as_bytes()),
        HeaderValue::from_str(&scope.observed.get().as_i64().to_string()),
    ) {
        response.headers_mut().insert(name, value);
    }
    response
}
