//! HTTP error response conversion
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`. Domain errors convert into
//! [`AppError`] first and render through its [`ErrorMetadata`], so status, body and log
//! level stay consistent across endpoints.
//!
//! Bodies are rendered without diagnostics. [`error_details_middleware`] puts them back
//! outside production, using the environment from [`AppState`]'s config.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::rejection::JsonRejection,
    extract::{FromRequest, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};

use assetflow_core::{AppError, ErrorMetadata, LogLevel};
use assetflow_services::IngestError;
use assetflow_storage::StorageError;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether this error is recoverable (can be retried)
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

/// Wrapper type for AppError to implement IntoResponse.
///
/// `AppError` lives in `assetflow-core`, so the orphan rule keeps us from implementing
/// axum's trait on it directly.
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl From<anyhow::Error> for HttpAppError {
    fn from(err: anyhow::Error) -> Self {
        HttpAppError(AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        })
    }
}

impl From<StorageError> for HttpAppError {
    fn from(err: StorageError) -> Self {
        HttpAppError(AppError::from(err))
    }
}

impl From<IngestError> for HttpAppError {
    fn from(err: IngestError) -> Self {
        HttpAppError(AppError::from(err))
    }
}

/// Convert JSON body deserialization failures into a 400 with our ErrorResponse format.
impl From<JsonRejection> for HttpAppError {
    fn from(rejection: JsonRejection) -> Self {
        HttpAppError(AppError::InvalidInput(format!(
            "Invalid request body: {}",
            rejection.body_text()
        )))
    }
}

/// JSON body extractor that answers malformed bodies with an [`ErrorResponse`] instead
/// of axum's plain-text rejection.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = HttpAppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(inner) = Json::<T>::from_request(req, state)
            .await
            .map_err(HttpAppError::from)?;
        Ok(ValidatedJson(inner))
    }
}

fn log_error(error: &AppError) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, error_type = error_type, "Error occurred");
        }
    }
}

/// Full error body, diagnostics included. Travels in the response extensions of
/// non-sensitive errors.
#[derive(Debug, Clone)]
struct ErrorDiagnostics(ErrorResponse);

/// 416 carries no body, only the size of the resource.
fn range_not_satisfiable(total_size: u64) -> Response {
    let mut response = StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total_size)) {
        response.headers_mut().insert(header::CONTENT_RANGE, value);
    }
    response
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.0;
        log_error(app_error);

        if let AppError::RangeNotSatisfiable { total_size } = app_error {
            return range_not_satisfiable(*total_size);
        }

        let status = StatusCode::from_u16(app_error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = ErrorResponse {
            error: app_error.client_message(),
            details: None,
            error_type: None,
            code: app_error.error_code().to_string(),
            recoverable: app_error.is_recoverable(),
            suggested_action: app_error.suggested_action().map(String::from),
        };

        let diagnostics = (!app_error.is_sensitive()).then(|| {
            ErrorDiagnostics(ErrorResponse {
                details: Some(app_error.detailed_message()),
                error_type: Some(app_error.error_type().to_string()),
                ..body.clone()
            })
        });

        let mut response = (status, Json(body)).into_response();
        if let Some(diagnostics) = diagnostics {
            response.extensions_mut().insert(diagnostics);
        }
        response
    }
}

/// Re-render error bodies with their diagnostics when not running in production.
pub async fn error_details_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let Some(ErrorDiagnostics(full)) = response.extensions_mut().remove::<ErrorDiagnostics>()
    else {
        return response;
    };
    if state.config.is_production() {
        return response;
    }

    match serde_json::to_vec(&full) {
        Ok(bytes) => {
            let (mut parts, _) = response.into_parts();
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to render error diagnostics");
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let response = HttpAppError(AppError::NotFound("File not found".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn range_errors_carry_content_range_without_json() {
        let response =
            HttpAppError(AppError::RangeNotSatisfiable { total_size: 42 }).into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */42"
        );
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn ingest_errors_keep_their_status() {
        let malicious: HttpAppError = IngestError::Malicious("Eicar".to_string()).into();
        assert_eq!(
            malicious.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let scanner: HttpAppError = IngestError::ScannerUnreachable("refused".to_string()).into();
        assert_eq!(
            scanner.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn bodies_leave_diagnostics_to_the_middleware() {
        let response =
            HttpAppError(AppError::InvalidInput("bad field".to_string())).into_response();
        let diagnostics = response.extensions().get::<ErrorDiagnostics>().unwrap();
        assert_eq!(diagnostics.0.error_type.as_deref(), Some("InvalidInput"));
        assert!(diagnostics.0.details.is_some());
    }

    #[test]
    fn sensitive_errors_carry_no_diagnostics() {
        let response = HttpAppError(AppError::Internal("db password".to_string())).into_response();
        assert!(response.extensions().get::<ErrorDiagnostics>().is_none());
    }

    #[test]
    fn invalid_stored_names_look_like_missing_files() {
        let err: HttpAppError = StorageError::InvalidKey("../etc".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
