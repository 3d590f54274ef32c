//! ADMS HTTP Layer
//!
//! Axum handlers for the device push protocol and the admin API.

mod api;
mod handlers;
mod middleware;

#[cfg(test)]
mod tests;

pub use api::*;
pub use handlers::*;
pub use middleware::*;

use axum::Router;

/// Create the device protocol router.
///
/// Each endpoint is served at a short path and at the path terminals use
/// out of the box.
pub fn device_router<S>(service: S) -> Router
where
    S: adms_service::DeviceProtocol + Clone + 'static,
{
    use axum::routing::{get, post};

    Router::new()
        .route("/handshake", get(handlers::handshake_handler::<S>))
        .route("/punch-batch", post(handlers::punch_batch_handler::<S>))
        .route("/poll", get(handlers::poll_handler::<S>))
        .route("/ack", post(handlers::ack_handler::<S>))
        .route(
            "/iclock/cdata",
            get(handlers::handshake_handler::<S>).post(handlers::punch_batch_handler::<S>),
        )
        .route("/iclock/getrequest", get(handlers::poll_handler::<S>))
        .route("/iclock/devicecmd", post(handlers::ack_handler::<S>))
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .route("/health", get(handlers::health_handler))
        .with_state(service)
}

/// Create the admin API router.
pub fn api_router<S>(service: S) -> Router
where
    S: adms_service::Administration + Clone + 'static,
{
    use axum::routing::{delete, get, post, put};

    Router::new()
        .route(
            "/api/devices",
            get(api::list_devices::<S>).post(api::register_device::<S>),
        )
        .route("/api/devices/{serial}/status", put(api::set_device_status::<S>))
        .route(
            "/api/devices/{serial}/commands",
            get(api::list_commands::<S>).post(api::enqueue_command::<S>),
        )
        .route("/api/devices/{serial}/punches", get(api::list_punch_logs::<S>))
        .route(
            "/api/devices/{serial}/enrollments",
            get(api::list_enrollments::<S>).post(api::enroll::<S>),
        )
        .route(
            "/api/devices/{serial}/enrollments/{kind}/{id}",
            delete(api::unenroll::<S>),
        )
        .route("/api/persons", put(api::upsert_person::<S>))
        .route("/api/persons/{kind}/{id}/sessions", get(api::list_sessions::<S>))
        .route(
            "/api/persons/{kind}/{id}/checkout",
            post(api::self_service_checkout::<S>),
        )
        .with_state(service)
}
