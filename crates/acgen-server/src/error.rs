use acgen_core::error::{AcgenError, ErrorKind};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses. The body is
/// `{"error": message, "code": kind}`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(AcgenError::InvalidRequest(msg.into()).into())
    }

    pub fn from_json(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }

    pub fn from_query(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// HTTP status for a core error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidIssueId
        | ErrorKind::InvalidRequest
        | ErrorKind::InvalidPublishMode
        | ErrorKind::UnknownProvider
        | ErrorKind::ProviderNotConfigured
        | ErrorKind::CustomFieldNotConfigured
        | ErrorKind::IntegrationNotConfigured
        | ErrorKind::InvalidConfig => StatusCode::BAD_REQUEST,
        ErrorKind::JiraAuthError => StatusCode::UNAUTHORIZED,
        ErrorKind::StoryNotFound => StatusCode::NOT_FOUND,
        ErrorKind::Cancelled => StatusCode::CONFLICT,
        ErrorKind::ProviderRejected
        | ErrorKind::GenerationParseError
        | ErrorKind::PartialPublishFailure
        | ErrorKind::PublishFailed
        | ErrorKind::Jira => StatusCode::BAD_GATEWAY,
        ErrorKind::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::InvalidTransition | ErrorKind::History | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self
            .0
            .downcast_ref::<AcgenError>()
            .map(AcgenError::kind)
            .unwrap_or(ErrorKind::Internal);
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(code = %kind, error = %self.0, "request failed");
        } else {
            tracing::debug!(code = %kind, error = %self.0, "request rejected");
        }
        let body = serde_json::json!({ "error": self.0.to_string(), "code": kind });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    fn status(err: AcgenError) -> StatusCode {
        AppError(err.into()).into_response().status()
    }

    #[test]
    fn invalid_input_maps_to_400() {
        assert_eq!(status(AcgenError::InvalidIssueId("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(AcgenError::CustomFieldNotConfigured("ac".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(AcgenError::UnknownProvider("m".into())), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn story_not_found_maps_to_404() {
        assert_eq!(status(AcgenError::StoryNotFound("PROJ-1".into())), StatusCode::NOT_FOUND);
    }

    #[test]
    fn jira_auth_maps_to_401() {
        let err = AcgenError::JiraAuthError {
            status: 403,
            message: "no".into(),
        };
        assert_eq!(status(err), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn provider_failures_split_502_and_503() {
        let rejected = AcgenError::ProviderRejected {
            provider: "openai".into(),
            message: "HTTP 429: quota".into(),
        };
        let unavailable = AcgenError::ProviderUnavailable {
            provider: "openai".into(),
            message: "timed out after 60s".into(),
        };
        assert_eq!(status(rejected), StatusCode::BAD_GATEWAY);
        assert_eq!(status(unavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status(AcgenError::PublishFailed("all".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn cancelled_maps_to_409() {
        assert_eq!(status(AcgenError::Cancelled), StatusCode::CONFLICT);
    }

    #[test]
    fn io_error_maps_to_500() {
        let io_err = std::io::Error::other("disk full");
        assert_eq!(status(AcgenError::Io(io_err)), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn foreign_error_maps_to_500() {
        let response = AppError(anyhow::anyhow!("something unexpected")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn bad_request_constructor_maps_to_400() {
        let response = AppError::bad_request("missing jql").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
