use bughunt_atoms::docs::DocKind;
use bughunt_atoms::http::{error_response, no_content, not_found, parse_body, respond};
use bughunt_shared::cors::{finalize_response, with_cors_headers};
use bughunt_shared::{auth, AppState, Principal};
use hunt_workflow::{delivery, docs, files, leaderboard, reports, reviews, tasks, users};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use std::sync::Arc;

/// Main Lambda handler: CORS, public auth routes, then bearer-authenticated `/api` routes
pub(crate) async fn function_handler(event: Request, state: Arc<AppState>) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let request_origin = event.headers().get("Origin").and_then(|v| v.to_str().ok());
    let allowed = state.config.allowed_origins.as_slice();
    tracing::info!(%method, path, "api request");

    // Handle CORS preflight
    if method == Method::OPTIONS {
        let resp = Response::builder()
            .status(StatusCode::OK)
            .body(Body::Empty)
            .map_err(Box::new)?;
        return Ok(with_cors_headers(resp, request_origin, allowed));
    }

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let route = match parts.as_slice() {
        ["api", rest @ ..] => rest,
        _ => return finalize_response(not_found(), request_origin, allowed),
    };
    let body: &[u8] = event.body().as_ref();

    // Public routes (no token yet)
    match (method, route) {
        (&Method::POST, ["auth", "login"]) => {
            let resp = match parse_body(body) {
                Ok(payload) => respond(StatusCode::OK, users::login(&state, payload).await),
                Err(e) => error_response(&e),
            };
            return finalize_response(resp, request_origin, allowed);
        }
        (&Method::POST, ["auth", "register"]) => {
            let resp = match parse_body(body) {
                Ok(payload) => respond(StatusCode::CREATED, users::register(&state, payload).await),
                Err(e) => error_response(&e),
            };
            return finalize_response(resp, request_origin, allowed);
        }
        _ => {}
    }

    let now = chrono::Utc::now().timestamp();
    let principal = match auth::authenticate(event.headers(), state.jwt_secret(), now) {
        Ok(principal) => principal,
        Err(e) => return finalize_response(error_response(&e), request_origin, allowed),
    };

    // Docs libraries share one shape: /api/{texts|videos|scripts}[/{id}]
    if let Some(kind) = route.first().and_then(|segment| DocKind::from_collection(segment)) {
        let resp = docs_routes(&state, &principal, method, kind, &route[1..], body).await;
        return finalize_response(resp, request_origin, allowed);
    }

    let time_range = event
        .query_string_parameters_ref()
        .and_then(|params| params.first("timeRange"))
        .map(str::to_string);

    let resp = match (method, route) {
        // --- TASKS ---
        (&Method::GET, ["task"]) => respond(StatusCode::OK, tasks::list_tasks(&state).await),
        (&Method::POST, ["task"]) => match parse_body(body) {
            Ok(payload) => respond(StatusCode::CREATED, tasks::create_task(&state, &principal, payload).await),
            Err(e) => error_response(&e),
        },
        (&Method::PATCH, ["task", "update-status", task_id]) => match parse_body(body) {
            Ok(payload) => respond(
                StatusCode::OK,
                tasks::update_status(&state, &principal, task_id, payload).await,
            ),
            Err(e) => error_response(&e),
        },
        (&Method::POST, ["task", "claim", task_id]) => {
            respond(StatusCode::OK, tasks::claim_task(&state, &principal, task_id).await)
        }
        (&Method::POST, ["task", "deliver", task_id]) => {
            respond(StatusCode::OK, delivery::deliver_task(&state, &principal, task_id).await)
        }
        (&Method::GET, ["task", task_id]) => respond(StatusCode::OK, tasks::get_task_detail(&state, task_id).await),
        (&Method::PATCH, ["task", task_id]) => match parse_body(body) {
            Ok(payload) => respond(
                StatusCode::OK,
                tasks::update_task(&state, &principal, task_id, payload).await,
            ),
            Err(e) => error_response(&e),
        },
        (&Method::DELETE, ["task", task_id]) => match tasks::delete_task(&state, &principal, task_id).await {
            Ok(()) => no_content(),
            Err(e) => error_response(&e),
        },

        // --- DELIVERED ---
        (&Method::GET, ["delivered"]) => respond(StatusCode::OK, delivery::list_delivered(&state).await),
        (&Method::GET, ["delivered", task_id]) => {
            respond(StatusCode::OK, delivery::get_delivered(&state, task_id).await)
        }

        // --- REVIEWS ---
        (&Method::POST, ["taskReview", "create"]) => match parse_body(body) {
            Ok(payload) => respond(
                StatusCode::CREATED,
                reviews::create_review(&state, &principal, payload).await,
            ),
            Err(e) => error_response(&e),
        },
        (&Method::GET, ["taskReview", "task", task_id]) => {
            respond(StatusCode::OK, reviews::list_reviews_for_task(&state, task_id).await)
        }
        (&Method::GET, ["taskReview", "file", file_id]) => files::download_handler(&state, file_id).await,
        (&Method::GET, ["taskReview", task_id, review_id]) => {
            respond(StatusCode::OK, reviews::get_review(&state, task_id, review_id).await)
        }
        (&Method::PATCH, ["taskReview", task_id, review_id, "feedback"]) => match parse_body(body) {
            Ok(payload) => respond(
                StatusCode::OK,
                reviews::set_feedback(&state, &principal, task_id, review_id, payload).await,
            ),
            Err(e) => error_response(&e),
        },
        (&Method::DELETE, ["taskReview", task_id, review_id]) => {
            match reviews::delete_review(&state, &principal, task_id, review_id).await {
                Ok(()) => no_content(),
                Err(e) => error_response(&e),
            }
        }

        // --- FILES ---
        (&Method::POST, ["files", "upload-url"]) => match parse_body(body) {
            Ok(payload) => respond(StatusCode::CREATED, files::create_upload(&state, &principal, payload).await),
            Err(e) => error_response(&e),
        },
        (&Method::GET, ["files", file_id]) => respond(StatusCode::OK, files::get_file(&state, file_id).await),
        (&Method::DELETE, ["files", file_id]) => match files::delete_file(&state, &principal, file_id).await {
            Ok(()) => no_content(),
            Err(e) => error_response(&e),
        },

        // --- FINAL REPORTS ---
        (&Method::POST, ["finalReport", "createOrUpdate"]) => match parse_body(body) {
            Ok(payload) => respond(
                StatusCode::OK,
                reports::upsert_final_report(&state, &principal, payload).await,
            ),
            Err(e) => error_response(&e),
        },
        (&Method::GET, ["finalReport", task_id]) => {
            respond(StatusCode::OK, reports::get_final_report(&state, task_id).await)
        }

        // --- USERS ---
        (&Method::POST, ["auth", "approve-user"]) => match parse_body(body) {
            Ok(payload) => respond(StatusCode::OK, users::approve_user(&state, &principal, payload).await),
            Err(e) => error_response(&e),
        },
        (&Method::POST, ["auth", "reject-user"]) => match parse_body(body) {
            Ok(payload) => respond(StatusCode::OK, users::reject_user(&state, &principal, payload).await),
            Err(e) => error_response(&e),
        },
        (&Method::GET, ["auth", "pending-users"]) => {
            respond(StatusCode::OK, users::list_pending_users(&state, &principal).await)
        }
        (&Method::GET, ["auth", "me"]) => respond(StatusCode::OK, users::me(&state, &principal).await),
        (&Method::GET, ["users"]) => respond(StatusCode::OK, users::list_users(&state, &principal).await),

        // --- LEADERBOARD ---
        (&Method::GET, ["leaderboard"]) => respond(
            StatusCode::OK,
            leaderboard::leaderboard(&state, time_range.as_deref()).await,
        ),

        _ => not_found(),
    };

    finalize_response(resp, request_origin, allowed)
}

async fn docs_routes(
    state: &AppState,
    principal: &Principal,
    method: &Method,
    kind: DocKind,
    rest: &[&str],
    body: &[u8],
) -> Result<Response<Body>, Error> {
    match (method, rest) {
        (&Method::GET, []) => respond(StatusCode::OK, docs::list_docs(state, kind).await),
        (&Method::POST, []) => match parse_body(body) {
            Ok(payload) => respond(StatusCode::CREATED, docs::create_doc(state, principal, kind, payload).await),
            Err(e) => error_response(&e),
        },
        (&Method::DELETE, [doc_id]) => match docs::delete_doc(state, principal, kind, doc_id).await {
            Ok(()) => no_content(),
            Err(e) => error_response(&e),
        },
        _ => not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_config::{BehaviorVersion, Region, SdkConfig};
    use bughunt_atoms::users::Role;
    use bughunt_shared::auth::jwt;
    use bughunt_shared::Config;
    use std::collections::HashMap;

    const SECRET: &str = "router-test-secret-router-test-secret";
    const ORIGIN: &str = "https://app.bughunt.test";

    // Clients are never called: every request below is rejected before storage.
    fn state() -> Arc<AppState> {
        let sdk = SdkConfig::builder()
            .region(Region::new("us-east-1"))
            .behavior_version(BehaviorVersion::latest())
            .build();
        let config = Config::from_lookup(|key| {
            let value = match key {
                "JWT_SECRET" => SECRET,
                "COGNITO_CLIENT_ID" => "client",
                "COGNITO_CLIENT_SECRET" => "secret",
                "COGNITO_USER_POOL_ID" => "pool",
                "EMAIL_FROM" => "noreply@bughunt.test",
                "ALLOWED_ORIGINS" => ORIGIN,
                _ => return None,
            };
            Some(value.to_string())
        })
        .unwrap();
        Arc::new(AppState::new(&sdk, config))
    }

    fn token(role: Role) -> String {
        jwt::issue(SECRET.as_bytes(), "tester", role, chrono::Utc::now().timestamp(), 600).unwrap()
    }

    fn request(method: &str, uri: &str, role: Option<Role>, body: &str) -> Request {
        let mut builder = lambda_http::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("Origin", ORIGIN)
            .header("Content-Type", "application/json");
        if let Some(role) = role {
            builder = builder.header("Authorization", format!("Bearer {}", token(role)));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn call(req: Request) -> (StatusCode, serde_json::Value) {
        let resp = function_handler(req, state()).await.unwrap();
        let status = resp.status();
        let body = serde_json::from_slice(resp.body()).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn preflight_echoes_allowed_origin() {
        let resp = function_handler(request("OPTIONS", "/api/task", None, ""), state())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("Access-Control-Allow-Origin").unwrap(), ORIGIN);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let (status, body) = call(request("GET", "/api/task", None, "")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn hunters_cannot_create_tasks() {
        let payload = r#"{"external_id":"BH-1","project_name":"Shop"}"#;
        let (status, _) = call(request("POST", "/api/task", Some(Role::Hunter), payload)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_status_is_bad_request() {
        let (status, body) = call(request(
            "PATCH",
            "/api/task/update-status/t-1",
            Some(Role::Hunter),
            r#"{"status":"Archived"}"#,
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");
    }

    #[tokio::test]
    async fn coaches_cannot_claim() {
        let (status, _) = call(request("POST", "/api/task/claim/t-1", Some(Role::Coach), "")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn only_admins_deliver() {
        let (status, _) = call(request("POST", "/api/task/deliver/t-1", Some(Role::Coach), "")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn hunters_cannot_leave_feedback() {
        let (status, _) = call(request(
            "PATCH",
            "/api/taskReview/t-1/r-1/feedback",
            Some(Role::Hunter),
            r#"{"feedback":"mine"}"#,
        ))
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn hunters_cannot_add_videos() {
        let payload = r#"{"title":"x","body":"https://v.test/1"}"#;
        let (status, _) = call(request("POST", "/api/videos", Some(Role::Hunter), payload)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_self_registration_is_refused() {
        let payload = r#"{"username":"mallory","email":"m@x.test","password":"longenough","role":"admin"}"#;
        let (status, _) = call(request("POST", "/api/auth/register", None, payload)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_register_body_is_bad_request() {
        let (status, _) = call(request("POST", "/api/auth/register", None, "{")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bad_leaderboard_range_is_bad_request() {
        let req = request("GET", "/api/leaderboard", Some(Role::Hunter), "").with_query_string_parameters(
            HashMap::from([("timeRange".to_string(), "year".to_string())]),
        );
        let (status, _) = call(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let (status, _) = call(request("GET", "/api/nothing-here", Some(Role::Admin), "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (outside, _) = call(request("GET", "/health", None, "")).await;
        assert_eq!(outside, StatusCode::NOT_FOUND);
    }
}
