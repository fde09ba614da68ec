use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;

use crate::{Error, ErrorKind};

/// Implements conversion into a json response for all possible error variants.
///
/// Caller errors are answered with their message. Anything else is logged
/// and answered with a bare 500, backtraces are never part of the response.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self.kind {
            ErrorKind::BadInput(_)
            | ErrorKind::EmailParseError(_)
            | ErrorKind::Validation { .. } => StatusCode::BAD_REQUEST,
            ErrorKind::EntryNotFound(_) | ErrorKind::BatchNotFound(_) => StatusCode::NOT_FOUND,
            ErrorKind::RunInProgress => StatusCode::CONFLICT,
            _ => {
                tracing::error!("{}", self.to_string());
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        tracing::debug!("{}", self.kind);
        let body = match &self.kind {
            ErrorKind::Validation { first, count } => serde_json::json!({
                "error": self.kind.to_string(),
                "first": first,
                "count": count,
            }),
            kind => serde_json::json!({ "error": kind.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
