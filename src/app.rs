use std::{future::Future, net::SocketAddr};

use axum::{middleware, routing::get, Router};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::require_auth;
use crate::state::AppState;
use crate::{auth, expenses, users};

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .merge(users::router())
        .merge(expenses::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(auth::router())
        .merge(protected)
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);
    run(listener, app, shutdown_signal()).await
}

/// Serves until `shutdown` resolves, then lets in-flight requests finish.
pub async fn run<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    async fn login(app: &Router, username: &str, password: &str) -> String {
        let (status, body) = call(
            app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": username, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("ok"));
    }

    #[tokio::test]
    async fn register_login_and_reach_protected_route() {
        let app = build_app(AppState::fake());
        let creds = json!({ "username": "alice", "password": "pw1" });

        let (status, body) =
            call(&app, Method::POST, "/auth/register", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({ "id": 1, "username": "alice" }));

        let token = login(&app, "alice", "pw1").await;
        let (status, body) = call(&app, Method::GET, "/user", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 1);
        assert_eq!(body["username"], "alice");
        assert!(body.get("password_hash").is_none());

        let (status, body) =
            call(&app, Method::POST, "/auth/register", None, Some(creds)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "user already exists" }));
    }

    #[tokio::test]
    async fn gate_rejects_missing_and_bad_tokens() {
        let app = build_app(AppState::fake());

        let (status, body) = call(&app, Method::GET, "/user", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "authorization header is required" }));

        let (status, body) = call(&app, Method::GET, "/expenses", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "invalid token" }));

        let req = Request::builder()
            .uri("/user")
            .header(header::AUTHORIZATION, "Token abc")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let app = build_app(AppState::fake());
        call(
            &app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "alice", "password": "pw1" })),
        )
        .await;

        let wrong_password = call(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "nope" })),
        )
        .await;
        let unknown_user = call(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "mallory", "password": "pw1" })),
        )
        .await;
        assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_password, unknown_user);
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let app = build_app(AppState::fake());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "", "password": "pw" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn expenses_over_http() {
        let app = build_app(AppState::fake());
        for name in ["alice", "bob"] {
            call(
                &app,
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "username": name, "password": "pw" })),
            )
            .await;
        }
        let alice = login(&app, "alice", "pw").await;
        let bob = login(&app, "bob", "pw").await;

        let (status, created) = call(
            &app,
            Method::POST,
            "/expenses",
            Some(&alice),
            Some(json!({ "amount": 12.5, "category": "food", "date": "2024-03-05" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["user_id"], 1);
        assert_eq!(created["date"], "2024-03-05");
        assert_eq!(created["description"], "");
        let id = created["id"].as_i64().unwrap();

        let (status, _) =
            call(&app, Method::GET, &format!("/expenses/{id}"), Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, updated) = call(
            &app,
            Method::PUT,
            &format!("/expenses/{id}"),
            Some(&alice),
            Some(json!({ "amount": 20.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["amount"], 20.0);
        assert_eq!(updated["category"], "food");

        let (status, rows) = call(
            &app,
            Method::GET,
            "/expenses/period?start=2024-03-01&end=2024-03-31",
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rows.as_array().unwrap().len(), 1);

        let (status, _) = call(
            &app,
            Method::GET,
            "/expenses/period?start=2024-03-31&end=2024-03-01",
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::GET,
            "/expenses/period?start=03/01/2024&end=2024-03-31",
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, rows) = call(
            &app,
            Method::GET,
            "/expenses/category?category=food",
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rows.as_array().unwrap().len(), 1);

        let (status, _) =
            call(&app, Method::GET, "/expenses/category", Some(&alice), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            call(&app, Method::GET, "/expenses?limit=-1", Some(&alice), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            call(&app, Method::GET, "/expenses/abc", Some(&alice), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            call(&app, Method::DELETE, &format!("/expenses/{id}"), Some(&alice), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) =
            call(&app, Method::DELETE, &format!("/expenses/{id}"), Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn user_profile_lifecycle() {
        let app = build_app(AppState::fake());
        for name in ["alice", "bob"] {
            call(
                &app,
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "username": name, "password": "pw" })),
            )
            .await;
        }
        let alice = login(&app, "alice", "pw").await;

        let (status, body) = call(
            &app,
            Method::PUT,
            "/user/username",
            Some(&alice),
            Some(json!({ "username": "bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "user already exists" }));

        let (status, body) = call(
            &app,
            Method::PUT,
            "/user/username",
            Some(&alice),
            Some(json!({ "username": "alicia" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alicia");

        let (status, _) = call(&app, Method::DELETE, "/user", Some(&alice), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        // The token outlives the account.
        let (status, _) = call(&app, Method::GET, "/user", Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn run_returns_once_shutdown_fires() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(run(listener, build_app(AppState::fake()), async move {
            stopped.await.ok();
        }));

        let mut conn = tokio::net::TcpStream::connect(addr).await.unwrap();
        conn.write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut reply = String::new();
        conn.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");

        stop.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}
