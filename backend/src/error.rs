use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::config::ConfigError;
use crate::db::RepositoryError;
use crate::inference::{InferenceError, ModelLoadError, PipelineError};
use crate::records::{FeedbackError, StoreError};
use crate::storage::ImageStoreError;

/// Request-boundary error. 4xx variants carry a message meant for the caller;
/// 5xx variants carry detail that is logged and never sent.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Inference error: {0}")]
    Inference(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn client_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::Inference(_) => "Prediction failed. Please try again later.".to_string(),
            AppError::Persistence(_) => "Failed to store the request. Please try again later.".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    pub(crate) fn log(&self) {
        match self.status_code() {
            status if status.is_server_error() => log::error!("{}", self),
            _ => log::warn!("{}", self),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Inference(_) | AppError::Persistence(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.log();
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.client_message(),
        })
    }
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Undecodable(_) => AppError::Validation(e.to_string()),
            PipelineError::Rejected(reason) => AppError::Validation(reason),
            PipelineError::Inference(inner) => inner.into(),
        }
    }
}

impl From<InferenceError> for AppError {
    fn from(e: InferenceError) -> Self {
        AppError::Inference(e.to_string())
    }
}

impl From<ImageStoreError> for AppError {
    fn from(e: ImageStoreError) -> Self {
        match e {
            ImageStoreError::TooLarge { .. } => AppError::PayloadTooLarge(e.to_string()),
            ImageStoreError::Empty => AppError::Validation("No file uploaded".to_string()),
            _ => AppError::Persistence(e.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Image(inner) => inner.into(),
            other => AppError::Persistence(other.to_string()),
        }
    }
}

impl From<FeedbackError> for AppError {
    fn from(e: FeedbackError) -> Self {
        match e {
            FeedbackError::InvalidLabel(_) => AppError::Validation(e.to_string()),
            FeedbackError::NotFound(_) => AppError::NotFound(e.to_string()),
            FeedbackError::AlreadyCorrected(_) => AppError::Conflict(e.to_string()),
            FeedbackError::Repository(inner) => AppError::Persistence(inner.to_string()),
        }
    }
}

impl From<BlockingError> for AppError {
    fn from(e: BlockingError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(e: actix_multipart::MultipartError) -> Self {
        AppError::Validation(format!("Malformed upload: {}", e))
    }
}

/// Anything that stops the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Models(#[from] ModelLoadError),
    #[error(transparent)]
    Database(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] ImageStoreError),
}

impl From<StartupError> for std::io::Error {
    fn from(e: StartupError) -> Self {
        std::io::Error::other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::validator::Rejection;

    #[test]
    fn statuses_follow_the_error_kind() {
        let cases = [
            (
                AppError::from(PipelineError::Rejected(Rejection::TooSmall.reason().into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(FeedbackError::NotFound(3)),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(FeedbackError::AlreadyCorrected(3)),
                StatusCode::CONFLICT,
            ),
            (
                AppError::from(FeedbackError::InvalidLabel("Z".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(ImageStoreError::TooLarge { size: 9, limit: 1 }),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                AppError::from(InferenceError::Panicked("svm")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{:?}", error);
        }
    }

    #[test]
    fn rejection_reason_reaches_the_client() {
        let error = AppError::from(PipelineError::Rejected(Rejection::LowContrast.reason().into()));
        assert_eq!(error.client_message(), Rejection::LowContrast.reason());
    }

    #[test]
    fn server_errors_hide_detail() {
        let error = AppError::from(StoreError::MissingImage("/secret/path.png".into()));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.client_message().contains("secret"));
    }
}
