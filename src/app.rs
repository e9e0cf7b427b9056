use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .route("/health", get(|| async { "ok" })),
        )
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
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::{AppConfig, JwtConfig},
        users::{
            repo::tests::{store_with, user},
            repo_types::Role,
        },
    };

    struct TestApp {
        _file: NamedTempFile,
        state: AppState,
        app: Router,
    }

    async fn test_app() -> TestApp {
        let (file, store) = store_with(&[
            user("1", "alice", Role::Admin, "pw"),
            user("2", "bob", Role::User, "bobpw"),
        ])
        .await;
        let config = Arc::new(AppConfig {
            data_file: file.path().to_path_buf(),
            jwt: JwtConfig {
                secret: "router-test-secret".into(),
                ttl_minutes: 60 * 24,
            },
        });
        let state = AppState::from_parts(config, Arc::new(store));
        let app = build_app(state.clone());
        TestApp {
            _file: file,
            state,
            app,
        }
    }

    impl TestApp {
        fn token_for(&self, id: &str, username: &str, role: Role) -> String {
            self.state.keys.sign(&user(id, username, role, "")).unwrap()
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> Response {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some(t) = token {
                req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
            }
            let req = match body {
                Some(b) => req
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(b.to_string()))
                    .unwrap(),
                None => req.body(Body::empty()).unwrap(),
            };
            self.app.clone().oneshot(req).await.unwrap()
        }
    }

    async fn json_body(res: Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn login_success_returns_token_and_identity() {
        let t = test_app().await;
        let res = t
            .send(
                Method::POST,
                "/api/login",
                None,
                Some(json!({"username": "alice", "password": "pw"})),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert!(!body["token"].as_str().unwrap().is_empty());
        assert_eq!(body["id"], "1");
        assert_eq!(body["username"], "alice");
        assert_eq!(body["role"], "admin");
        assert!(body.get("password").is_none());

        // the issued token works on a protected route
        let token = body["token"].as_str().unwrap().to_string();
        let res = t.send(Method::GET, "/api/users", Some(&token), None).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let t = test_app().await;
        let res = t
            .send(
                Method::POST,
                "/api/login",
                None,
                Some(json!({"username": "alice", "password": "wrong"})),
            )
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(res).await["message"], "Invalid credentials.");

        let res = t
            .send(
                Method::POST,
                "/api/login",
                None,
                Some(json!({"username": "nobody", "password": "pw"})),
            )
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let t = test_app().await;
        let res = t
            .send(Method::POST, "/api/login", None, Some(json!({"username": "alice"})))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = t.send(Method::POST, "/api/login", None, None).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_users_requires_admin() {
        let t = test_app().await;

        let res = t.send(Method::GET, "/api/users", None, None).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let bob = t.token_for("2", "bob", Role::User);
        let res = t.send(Method::GET, "/api/users", Some(&bob), None).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let alice = t.token_for("1", "alice", Role::Admin);
        let res = t.send(Method::GET, "/api/users", Some(&alice), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        let users = body.as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u.get("password").is_none()));
    }

    #[tokio::test]
    async fn malformed_and_invalid_tokens_are_unauthorized() {
        let t = test_app().await;
        let req = Request::builder()
            .uri("/api/users")
            .header(header::AUTHORIZATION, "Bearer")
            .body(Body::empty())
            .unwrap();
        let res = t.app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(res).await["message"], "Bearer token malformed.");

        let res = t
            .send(Method::GET, "/api/users", Some("garbage"), None)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(res).await["message"], "Invalid token.");
    }

    #[tokio::test]
    async fn create_user_checks_token_before_role() {
        let t = test_app().await;
        let body = json!({"username": "carol", "password": "c", "role": "user"});

        let res = t
            .send(Method::POST, "/api/users", None, Some(body.clone()))
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let bob = t.token_for("2", "bob", Role::User);
        let res = t
            .send(Method::POST, "/api/users", Some(&bob), Some(body))
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn create_user_flow() {
        let t = test_app().await;
        let alice = t.token_for("1", "alice", Role::Admin);

        let res = t
            .send(
                Method::POST,
                "/api/users",
                Some(&alice),
                Some(json!({"username": "carol", "password": "c", "role": "user"})),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let created = json_body(res).await;
        assert_eq!(created["username"], "carol");
        assert_eq!(created["role"], "user");
        assert!(created.get("password").is_none());

        let stored = t
            .state
            .store
            .find_by_id(created["id"].as_str().unwrap())
            .await
            .unwrap()
            .expect("persisted");
        assert_eq!(stored.username, "carol");

        let res = t
            .send(
                Method::POST,
                "/api/users",
                Some(&alice),
                Some(json!({"username": "carol", "password": "x", "role": "admin"})),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = t
            .send(
                Method::POST,
                "/api/users",
                Some(&alice),
                Some(json!({"username": "dave", "password": "x"})),
            )
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = t
            .send(
                Method::POST,
                "/api/users",
                Some(&alice),
                Some(json!({"username": "dave", "password": "x", "role": "root"})),
            )
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_user_flow() {
        let t = test_app().await;
        let alice = t.token_for("1", "alice", Role::Admin);

        let res = t.send(Method::DELETE, "/api/users/1", Some(&alice), None).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = t
            .send(Method::DELETE, "/api/users/404", Some(&alice), None)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = t.send(Method::DELETE, "/api/users/2", Some(&alice), None).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
        assert!(t.state.store.find_by_id("2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_of_deleted_user_is_rejected() {
        let t = test_app().await;
        let bob = t.token_for("2", "bob", Role::User);
        assert!(t.state.store.delete_by_id("2").await.unwrap());

        let res = t.send(Method::GET, "/api/users/me", Some(&bob), None).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(res).await["message"], "Invalid token.");
    }

    #[tokio::test]
    async fn me_returns_live_record() {
        let t = test_app().await;
        let bob = t.token_for("2", "bob", Role::User);
        let res = t.send(Method::GET, "/api/users/me", Some(&bob), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body, json!({"id": "2", "username": "bob", "role": "user"}));
    }

    #[tokio::test]
    async fn health_is_public() {
        let t = test_app().await;
        let res = t.send(Method::GET, "/api/health", None, None).await;
        assert_eq!(res.status(), StatusCode::OK);
    }
}
