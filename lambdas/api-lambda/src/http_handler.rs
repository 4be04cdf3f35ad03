use admin_shared::{logs, maker, points, roles, users, AppState, Config, RequestMeta};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use std::sync::Arc;

/// Main Lambda handler - routes requests to the resource handlers.
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let config = Config::from_env();
    let method = event.method().clone();
    let path = event.uri().path().to_string();
    let body = event.body();
    tracing::info!("Admin API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET,POST,PUT,DELETE,OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type,Authorization")
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    let qp = |name: &str| {
        event
            .query_string_parameters_ref()
            .and_then(|params| params.first(name))
            .map(|s| s.to_string())
    };
    let header = |name: &str| {
        event
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let meta = RequestMeta {
        ip: header("x-forwarded-for"),
        user_agent: header("user-agent"),
        requester: qp("requester").unwrap_or_default(),
    };

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (&method, parts.as_slice()) {
        // --- USERS ---
        (&Method::GET, ["users"]) => {
            users::get_users(&state, &config, qp("user_id"), qp("key")).await
        }
        (&Method::POST, ["users"]) => users::create_user(&state, &config, body, &meta).await,
        (&Method::PUT, ["users"]) => users::update_user(&state, &config, body, &meta).await,
        (&Method::DELETE, ["users"]) => {
            users::delete_user(&state, &config, qp("user_id"), &meta).await
        }

        // --- ROLES ---
        (&Method::GET, ["roles"]) => roles::get_roles(&state, &config, qp("role"), qp("key")).await,
        (&Method::POST, ["roles"]) => roles::create_role(&state, &config, body).await,
        (&Method::PUT, ["roles"]) => roles::update_role(&state, &config, body).await,
        (&Method::DELETE, ["roles"]) => roles::delete_role(&state, &config, qp("role")).await,

        // --- POINTS ---
        (&Method::GET, ["points"]) => {
            points::get_points(&state, &config, qp("user_id"), qp("key_user"), qp("key_point"))
                .await
        }
        (&Method::POST, ["points"]) => points::create_points(&state, &config, body).await,
        (&Method::PUT, ["points"]) => points::update_points(&state, &config, body, &meta).await,
        (&Method::DELETE, ["points"]) => {
            points::delete_points(&state, &config, qp("user_id"), qp("points_id")).await
        }

        // --- MAKER REQUESTS ---
        (&Method::GET, ["makers"]) => {
            maker::get_maker_requests(
                &state,
                &config,
                qp("req_id"),
                qp("maker_id"),
                qp("status"),
                qp("key_req"),
                qp("key_role"),
            )
            .await
        }
        (&Method::GET, ["checkers"]) => {
            maker::get_checker_requests(&state, &config, qp("role"), qp("status")).await
        }
        (&Method::POST, ["makers"]) => maker::create_request(&state, &config, body, &meta).await,
        (&Method::PUT, ["makers", "decision"]) => {
            maker::submit_decision(&state, &config, body, &meta).await
        }

        // --- AUDIT LOGS ---
        (&Method::GET, ["logs"]) => logs::get_logs(&state, &config, qp("key")).await,

        _ => {
            tracing::warn!("No route matched - Method: {} Path: {}", method, path);
            not_found()
        }
    }
}

fn not_found() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({"error": "Not found"}).to_string().into())
        .map_err(Box::new)?)
}
