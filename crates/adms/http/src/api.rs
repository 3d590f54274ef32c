//! Admin REST API.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use adms_core::{DeviceMetadata, Person, PersonKind, PersonRef, Status};
use adms_service::{AdminError, Administration, AttendanceError, CommandRequest};

/// Default page size for punch log listings.
const DEFAULT_PUNCH_LIMIT: i64 = 100;

/// JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// [`AdminError`] rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError(AdminError);

impl From<AdminError> for ApiError {
    fn from(error: AdminError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AdminError::Conflict(_) => StatusCode::CONFLICT,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AdminError::Attendance(
                AttendanceError::OutOfOrder { .. } | AttendanceError::Contended(_),
            ) => StatusCode::CONFLICT,
            AdminError::Attendance(_) | AdminError::Store(_) => {
                tracing::error!(error = %self.0, "admin request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn person_ref(kind: &str, id: i64) -> ApiResult<PersonRef> {
    let kind = PersonKind::from_db(kind)
        .ok_or_else(|| AdminError::InvalidInput(format!("unknown person kind {}", kind)))?;
    Ok(PersonRef::new(kind, id))
}

/// Register device request.
#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub serial_number: String,
    #[serde(flatten)]
    pub metadata: DeviceMetadata,
}

/// Register a device.
pub async fn register_device<S>(
    State(service): State<S>,
    Json(request): Json<RegisterDeviceRequest>,
) -> ApiResult<impl IntoResponse>
where
    S: Administration,
{
    let device = service
        .register_device(&request.serial_number, &request.metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(device)))
}

/// List devices with their online flag.
pub async fn list_devices<S>(State(service): State<S>) -> ApiResult<impl IntoResponse>
where
    S: Administration,
{
    Ok(Json(service.devices().await?))
}

/// Set device status request.
#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: Status,
}

/// Activate or deactivate a device.
pub async fn set_device_status<S>(
    State(service): State<S>,
    Path(serial): Path<String>,
    Json(request): Json<SetStatusRequest>,
) -> ApiResult<impl IntoResponse>
where
    S: Administration,
{
    Ok(Json(service.set_device_status(&serial, request.status).await?))
}

/// Queue a command for a device.
pub async fn enqueue_command<S>(
    State(service): State<S>,
    Path(serial): Path<String>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<impl IntoResponse>
where
    S: Administration,
{
    let command = service.enqueue_command(&serial, &request).await?;
    Ok((StatusCode::CREATED, Json(command)))
}

/// A device's command history.
pub async fn list_commands<S>(
    State(service): State<S>,
    Path(serial): Path<String>,
) -> ApiResult<impl IntoResponse>
where
    S: Administration,
{
    Ok(Json(service.commands(&serial).await?))
}

/// Punch log query.
#[derive(Debug, Deserialize)]
pub struct PunchLogQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// A device's recent punch logs.
pub async fn list_punch_logs<S>(
    State(service): State<S>,
    Path(serial): Path<String>,
    Query(query): Query<PunchLogQuery>,
) -> ApiResult<impl IntoResponse>
where
    S: Administration,
{
    let limit = query.limit.unwrap_or(DEFAULT_PUNCH_LIMIT);
    Ok(Json(service.punch_logs(&serial, limit).await?))
}

/// Enroll request.
#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub person: PersonRef,
    pub device_user_id: String,
}

/// Enroll a person on a device.
pub async fn enroll<S>(
    State(service): State<S>,
    Path(serial): Path<String>,
    Json(request): Json<EnrollRequest>,
) -> ApiResult<impl IntoResponse>
where
    S: Administration,
{
    let enrollment = service
        .enroll(&serial, request.person, &request.device_user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// A device's enrollments.
pub async fn list_enrollments<S>(
    State(service): State<S>,
    Path(serial): Path<String>,
) -> ApiResult<impl IntoResponse>
where
    S: Administration,
{
    Ok(Json(service.enrollments(&serial).await?))
}

/// Remove a person from a device.
pub async fn unenroll<S>(
    State(service): State<S>,
    Path((serial, kind, id)): Path<(String, String, i64)>,
) -> ApiResult<impl IntoResponse>
where
    S: Administration,
{
    let person = person_ref(&kind, id)?;
    Ok(Json(service.unenroll(&serial, person).await?))
}

/// Insert or update a person.
pub async fn upsert_person<S>(
    State(service): State<S>,
    Json(person): Json<Person>,
) -> ApiResult<impl IntoResponse>
where
    S: Administration,
{
    service.upsert_person(&person).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// A person's sessions.
pub async fn list_sessions<S>(
    State(service): State<S>,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<impl IntoResponse>
where
    S: Administration,
{
    let person = person_ref(&kind, id)?;
    Ok(Json(service.sessions(person).await?))
}

/// Close a person's open session from a kiosk.
pub async fn self_service_checkout<S>(
    State(service): State<S>,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<impl IntoResponse>
where
    S: Administration,
{
    let person = person_ref(&kind, id)?;
    Ok(Json(service.self_service_checkout(person).await?))
}
