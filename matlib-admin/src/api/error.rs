//! Mapping of library errors onto HTTP responses
//!
//! Field validation failures carry an `errors` object keyed by field; every
//! other failure carries a single `error` message.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use matlib_common::{Error, FieldErrors};

/// Handler error wrapping [`matlib_common::Error`]
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

/// Body rejections become 400s in the same shapes as library errors
///
/// A body that parses but does not fit the form is reported against the
/// offending field. Anything else (syntax, content type) is invalid input.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => {
                ApiError(Error::Validation(field_error(&err.body_text())))
            }
            other => ApiError(Error::InvalidInput(other.body_text())),
        }
    }
}

/// Field-level error from a deserialization message
///
/// Messages look like `<prefix>: tag: invalid type: ...` or
/// `<prefix>: missing field `tag` at ...`.
fn field_error(text: &str) -> FieldErrors {
    let detail = text
        .split_once("target type: ")
        .map_or(text, |(_, detail)| detail);

    if let Some(rest) = detail.strip_prefix("missing field `") {
        if let Some((field, _)) = rest.split_once('`') {
            return FieldErrors::single(field, "Field is required");
        }
    }

    match detail.split_once(": ") {
        Some((field, message)) if is_field_name(field) => FieldErrors::single(field, message),
        _ => FieldErrors::single("form", detail),
    }
}

fn is_field_name(path: &str) -> bool {
    !path.is_empty() && path.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError(Error::NotFound(what.into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0 {
            Error::Validation(errors) => {
                return (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors })))
                    .into_response();
            }
            Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Error::Conflict(msg) => {
                warn!("Request refused: {}", msg);
                (StatusCode::PRECONDITION_FAILED, msg)
            }
            err @ (Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_)) => {
                error!("Request failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": body }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (Error::validation("value", "empty"), StatusCode::BAD_REQUEST),
            (Error::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (Error::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (Error::Conflict("used".into()), StatusCode::PRECONDITION_FAILED),
            (Error::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_field_error_names_the_field() {
        let errors = field_error(
            "Failed to deserialize the JSON body into the target type: \
             tag: invalid type: string \"abc\", expected i64 at line 1 column 12",
        );
        assert!(errors.get("tag").unwrap().starts_with("invalid type"));

        let errors = field_error(
            "Failed to deserialize the JSON body into the target type: \
             missing field `value` at line 1 column 10",
        );
        assert_eq!(errors.get("value"), Some("Field is required"));

        let errors = field_error("something unexpected");
        assert!(errors.contains("form"));
    }
}
