use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;

use crate::error::ServiceError;

/// JSON response with the given status.
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

pub fn no_content() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Body::Empty)
        .map_err(Box::new)?)
}

/// Render a service error as `{"error": kind, "message": ...}`.
pub fn error_response(err: &ServiceError) -> Result<Response<Body>, Error> {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %err, "request failed");
    } else {
        tracing::warn!(status = status.as_u16(), error = %err, "request rejected");
    }
    json_response(
        status,
        &serde_json::json!({"error": err.kind(), "message": err.to_string()}),
    )
}

/// Map a service result into a response, rendering errors with their status.
pub fn respond<T: Serialize>(
    status: StatusCode,
    result: Result<T, ServiceError>,
) -> Result<Response<Body>, Error> {
    match result {
        Ok(value) => json_response(status, &value),
        Err(e) => error_response(&e),
    }
}

/// Decode a JSON request body, mapping malformed input to a 400.
pub fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(body).map_err(|e| ServiceError::Validation(format!("Invalid request body: {}", e)))
}

pub fn not_found() -> Result<Response<Body>, Error> {
    json_response(StatusCode::NOT_FOUND, &serde_json::json!({"error": "Not found"}))
}

pub fn method_not_allowed() -> Result<Response<Body>, Error> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({"error": "Method not allowed"}),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_carries_kind_and_message() {
        let resp = error_response(&ServiceError::Conflict("Task was claimed by another hunter".into())).unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["error"], "Conflict");
        assert_eq!(body["message"], "Task was claimed by another hunter");
    }

    #[test]
    fn malformed_body_is_validation_error() {
        #[derive(Debug, serde::Deserialize)]
        struct Payload {
            _name: String,
        }
        let err = parse_body::<Payload>(b"{not json").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
