use lambda_http::http::header::{HeaderValue, VARY};
use lambda_http::{Body, Error, Response};

/// The request origin if it is on the allow-list. There is no wildcard fallback.
pub fn allowed_origin<'a>(request_origin: Option<&'a str>, allowed: &[String]) -> Option<&'a str> {
    let origin = request_origin?;
    let normalized = origin.trim_end_matches('/');
    allowed.iter().any(|a| a == normalized).then_some(origin)
}

pub fn with_cors_headers(mut resp: Response<Body>, request_origin: Option<&str>, allowed: &[String]) -> Response<Body> {
    let headers = resp.headers_mut();
    if let Some(origin) = allowed_origin(request_origin, allowed) {
        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert("Access-Control-Allow-Origin", value);
            headers.insert("Access-Control-Allow-Credentials", HeaderValue::from_static("true"));
        }
    } else if request_origin.is_some() {
        tracing::warn!(origin = ?request_origin, "origin not in allow-list");
    }
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET,POST,PATCH,DELETE,OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type,Authorization"),
    );
    headers.append(VARY, HeaderValue::from_static("Origin"));
    resp
}

pub fn finalize_response(
    resp: Result<Response<Body>, Error>,
    request_origin: Option<&str>,
    allowed: &[String],
) -> Result<Response<Body>, Error> {
    resp.map(|r| with_cors_headers(r, request_origin, allowed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow() -> Vec<String> {
        vec!["https://app.bughunt.test".to_string()]
    }

    #[test]
    fn listed_origin_is_echoed() {
        let resp = with_cors_headers(Response::new(Body::Empty), Some("https://app.bughunt.test"), &allow());
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "https://app.bughunt.test"
        );
    }

    #[test]
    fn unknown_origin_gets_no_allow_origin() {
        let resp = with_cors_headers(Response::new(Body::Empty), Some("https://evil.test"), &allow());
        assert!(resp.headers().get("Access-Control-Allow-Origin").is_none());
        assert!(resp.headers().get("Access-Control-Allow-Methods").is_some());

        let no_origin = with_cors_headers(Response::new(Body::Empty), None, &allow());
        assert!(no_origin.headers().get("Access-Control-Allow-Origin").is_none());
    }
}
