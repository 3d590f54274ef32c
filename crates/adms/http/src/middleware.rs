//! HTTP middleware.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Serial number from a device request's query string, if any.
fn serial_of(request: &Request) -> Option<String> {
    let query = request.uri().query()?;
    adms_core::Params::parse(query)
        .non_empty("SN")
        .map(str::to_string)
}

/// Logs each device request with its serial number, status and latency.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let serial = serial_of(&request).unwrap_or_default();
    let started = Instant::now();

    tracing::debug!(method = %method, path = %path, serial = %serial, "device request");

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %path,
        serial = %serial,
        status = %response.status(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "device request completed"
    );

    response
}
