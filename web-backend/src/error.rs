use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use secure_review_core::ReviewError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// 返回给客户端的文本，内部错误不暴露细节
    fn public_message(&self) -> String {
        match self {
            Self::BadRequest(message) => message.clone(),
            Self::Unauthorized => "Unauthorized".to_string(),
            Self::Review(ReviewError::InvalidInput(message)) => message.clone(),
            Self::Review(ReviewError::NotFound) => "Review not found".to_string(),
            Self::Review(ReviewError::AccessDenied) => "Access denied".to_string(),
            Self::Review(ReviewError::AnalysisInProgress) => {
                "Review analysis is still in progress".to_string()
            }
            Self::Review(_) | Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Review(ReviewError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            Self::Review(ReviewError::NotFound) => StatusCode::NOT_FOUND,
            Self::Review(ReviewError::AccessDenied) => StatusCode::FORBIDDEN,
            Self::Review(ReviewError::AnalysisInProgress) => StatusCode::CONFLICT,
            Self::Review(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        HttpResponse::build(status).json(serde_json::json!({
            "error": self.public_message()
        }))
    }
}
