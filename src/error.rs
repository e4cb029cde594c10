use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    decode::DecodeError,
    engine::EngineError,
    fetch::FetchError,
    validate::{Rejection, bad_content_type_message},
};

pub const MISSING_URL_MESSAGE: &str = "No image URL provided in your request.";

/// Every way an analyze request can end short of a detection list.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("{}", MISSING_URL_MESSAGE)]
    MissingParameter,
    #[error(transparent)]
    Network(#[from] FetchError),
    #[error("upstream responded with {0}")]
    UpstreamStatus(StatusCode),
    #[error("{}", bad_content_type_message(.0.as_deref()))]
    UnsupportedContentType(Option<String>),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] EngineError),
}

impl From<Rejection> for AnalyzeError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Status(status) => AnalyzeError::UpstreamStatus(status),
            Rejection::ContentType(ct) => AnalyzeError::UnsupportedContentType(ct),
        }
    }
}

impl AnalyzeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalyzeError::MissingParameter => StatusCode::NOT_FOUND,
            AnalyzeError::UpstreamStatus(status) => *status,
            AnalyzeError::UnsupportedContentType(_) => StatusCode::BAD_REQUEST,
            AnalyzeError::Network(_) | AnalyzeError::Decode(_) | AnalyzeError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            AnalyzeError::MissingParameter => {
                log::warn!("ERROR: no image URL provided.");
                (status, MISSING_URL_MESSAGE).into_response()
            }
            AnalyzeError::UpstreamStatus(_) => {
                log::debug!("Passing upstream status {} through", status);
                status.into_response()
            }
            AnalyzeError::UnsupportedContentType(_) => {
                log::debug!("{}", self);
                (status, self.to_string()).into_response()
            }
            AnalyzeError::Network(_) | AnalyzeError::Decode(_) | AnalyzeError::Inference(_) => {
                log::error!("ERROR: {}", self);
                (status, format!("ERROR: {self}")).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AnalyzeError) -> (StatusCode, String) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_missing_parameter_is_404() {
        let (status, body) = body_of(AnalyzeError::MissingParameter).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "No image URL provided in your request.");
        assert_eq!(AnalyzeError::MissingParameter.to_string(), MISSING_URL_MESSAGE);
    }

    #[tokio::test]
    async fn test_upstream_status_passes_through_with_empty_body() {
        let (status, body) = body_of(Rejection::Status(StatusCode::IM_A_TEAPOT).into()).await;
        assert_eq!(status, StatusCode::IM_A_TEAPOT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_bad_content_type_is_400() {
        let err: AnalyzeError = Rejection::ContentType(Some("image/png".to_string())).into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            "Bad content type on your URL: image/png. Expecting ['image/jpeg', 'image/jpg']"
        );
    }

    #[tokio::test]
    async fn test_engine_failure_is_500_with_message() {
        let (status, body) = body_of(EngineError::Stopped.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "ERROR: inference engine is not running");
    }

    #[tokio::test]
    async fn test_decode_failure_is_500() {
        let decode_err = crate::decode::decode(b"nope").unwrap_err();
        let (status, body) = body_of(decode_err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with("ERROR: failed to decode image"));
    }
}
