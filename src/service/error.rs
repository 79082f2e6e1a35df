use thiserror::Error;

use crate::error::{ErrorMessage, HttpError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("No downline found for user {user_id} and pack {pack_id}")]
    DownlineNotFound { user_id: String, pack_id: String },

    #[error("Upstream referral service returned {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("{0}")]
    RequestSuperseded(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Export error: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::DownlineNotFound { .. } => HttpError::not_found(error.to_string()),

            ServiceError::Validation(_) => HttpError::bad_request(error.to_string()),

            ServiceError::RequestSuperseded(_) => {
                HttpError::conflict(ErrorMessage::RequestSuperseded.to_string())
            }

            ServiceError::UpstreamStatus { .. } | ServiceError::Upstream(_) => {
                tracing::error!("{}", error);
                HttpError::bad_gateway(ErrorMessage::UpstreamUnavailable.to_string())
            }

            ServiceError::Export(_) | ServiceError::Other(_) => {
                tracing::error!("{}", error);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
        }
    }
}
