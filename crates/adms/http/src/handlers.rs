//! Device protocol handlers.
//!
//! Replies are plain text. Devices cannot act on structured errors, so every
//! failure collapses to a status code plus an `ERROR: <reason>` line.

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use adms_core::{DeviceRequest, Endpoint, Frame, OK, render_poll};
use adms_service::{DeviceProtocol, Rejection};

/// Plain-text response.
fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body.into(),
    )
        .into_response()
}

fn reject(rejection: &Rejection) -> Response {
    let status = match rejection {
        Rejection::UnknownDevice(_) | Rejection::InactiveDevice(_) => StatusCode::FORBIDDEN,
        Rejection::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
    };
    text(status, rejection.body())
}

fn parse(endpoint: Endpoint, query: Option<String>, body: &[u8]) -> Result<DeviceRequest, Response> {
    // Firmware occasionally sends non-UTF-8 names; keep what can be read.
    let body = String::from_utf8_lossy(body);
    DeviceRequest::parse(endpoint, query.as_deref().unwrap_or_default(), &body).map_err(|e| {
        tracing::warn!(endpoint = ?endpoint, error = %e, "malformed device request");
        text(StatusCode::BAD_REQUEST, format!("ERROR: {}", e))
    })
}

/// Handle device handshakes.
pub async fn handshake_handler<S>(
    State(service): State<S>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response
where
    S: DeviceProtocol,
{
    let request = match parse(Endpoint::Handshake, query, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let params = request
        .frames
        .into_iter()
        .find_map(|frame| match frame {
            Frame::Handshake(params) => Some(params),
            _ => None,
        })
        .unwrap_or_default();

    match service.handshake(&request.serial_number, &params).await {
        Ok(reply) => text(StatusCode::OK, reply.to_string()),
        Err(e) => reject(&e),
    }
}

/// Handle punch batch uploads.
pub async fn punch_batch_handler<S>(
    State(service): State<S>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response
where
    S: DeviceProtocol,
{
    let request = match parse(Endpoint::Punches, query, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let lines: Vec<_> = request
        .frames
        .into_iter()
        .filter_map(|frame| match frame {
            Frame::Punch(line) => Some(line),
            _ => None,
        })
        .collect();

    match service.ingest_punches(&request.serial_number, &lines).await {
        Ok(_) => text(StatusCode::OK, OK),
        Err(e) => reject(&e),
    }
}

/// Handle command polls.
pub async fn poll_handler<S>(
    State(service): State<S>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response
where
    S: DeviceProtocol,
{
    let request = match parse(Endpoint::Poll, query, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match service.poll(&request.serial_number).await {
        Ok(issued) => {
            let commands: Vec<_> = issued
                .into_iter()
                .map(|issued| (issued.alias, issued.command.payload))
                .collect();
            text(StatusCode::OK, render_poll(&commands))
        }
        Err(e) => reject(&e),
    }
}

/// Handle command acknowledgements. Always answers `OK` once the serial
/// number is known, so devices never re-send results.
pub async fn ack_handler<S>(
    State(service): State<S>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response
where
    S: DeviceProtocol,
{
    let request = match parse(Endpoint::Ack, query, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let acks: Vec<_> = request
        .frames
        .into_iter()
        .filter_map(|frame| match frame {
            Frame::Ack(ack) => Some(ack),
            _ => None,
        })
        .collect();

    if acks.is_empty() {
        tracing::debug!(serial = %request.serial_number, "acknowledgement without ID");
    } else {
        service.acknowledge(&request.serial_number, &acks).await;
    }

    text(StatusCode::OK, OK)
}

/// Liveness probe.
pub async fn health_handler() -> &'static str {
    OK
}
