use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use scrivener_codecs::{CodecError, UnsupportedFormatError};
use scrivener_core::{DetectionError, SessionError, TranslationError, TranslatorError};

use crate::models::ErrorBody;

/// A failed request, rendered as `{ "kind", "message" }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                kind: self.kind,
                message: self.message,
            }),
        )
            .into_response()
    }
}

fn status_for(error: &TranslationError) -> StatusCode {
    match error {
        TranslationError::Detection(DetectionError::NoTranslator(_))
        | TranslationError::Detection(DetectionError::UnrecognizedIdentifier(_)) => {
            StatusCode::NOT_IMPLEMENTED
        }
        TranslationError::Session(SessionError::InvalidSelection(_)) => StatusCode::BAD_REQUEST,
        TranslationError::Session(_) => StatusCode::NOT_FOUND,
        TranslationError::Translator(TranslatorError::Timeout { .. }) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        TranslationError::Translator(_) => StatusCode::INTERNAL_SERVER_ERROR,
        TranslationError::Fetch(_) => StatusCode::BAD_GATEWAY,
    }
}

impl From<TranslationError> for ApiError {
    fn from(error: TranslationError) -> Self {
        Self {
            status: status_for(&error),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<CodecError> for ApiError {
    fn from(error: CodecError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<UnsupportedFormatError> for ApiError {
    fn from(error: UnsupportedFormatError) -> Self {
        CodecError::from(error).into()
    }
}
