// Copyright 2023 Remi Bernotavicius

//! The HTTP API, everything under `/api`.
//!
//! Handlers resolve the viewer, parse the request, then run their store calls
//! on the blocking pool while holding the one SQLite connection.

use crate::database;
use crate::store;
use axum::extract::Request;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

mod auth;
mod catalog;
mod error;
mod pagination;
mod recipes;
mod users;
mod views;

pub use error::ApiError;

pub struct AppState {
    db: Mutex<database::Connection>,
    /// Default page size for paginated listings.
    pub page_size: i64,
}

impl AppState {
    pub fn new(conn: database::Connection, page_size: i64) -> Arc<Self> {
        Arc::new(Self {
            db: Mutex::new(conn),
            page_size,
        })
    }

    /// Runs `f` against the database on the blocking pool.
    pub async fn with_conn<T, F>(self: &Arc<Self>, f: F) -> error::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut database::Connection) -> store::Result<T> + Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = state
                .db
                .lock()
                .map_err(|_| ApiError::Internal("database lock poisoned".into()))?;
            f(&mut *conn).map_err(ApiError::from)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("database task failed: {e}")))?
    }
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/recipes", get(recipes::list).post(recipes::create))
        .route(
            "/recipes/{id}",
            get(recipes::show)
                .patch(recipes::update)
                .delete(recipes::destroy),
        )
        .route(
            "/recipes/{id}/favorite",
            post(recipes::add_favorite).delete(recipes::remove_favorite),
        )
        .route(
            "/recipes/{id}/shopping_cart",
            post(recipes::add_to_cart).delete(recipes::remove_from_cart),
        )
        .route(
            "/recipes/shopping_cart/download",
            get(recipes::download_shopping_cart),
        )
        .route("/tags", get(catalog::list_tags))
        .route("/tags/{id}", get(catalog::show_tag))
        .route("/ingredients", get(catalog::list_ingredients))
        .route("/ingredients/{id}", get(catalog::show_ingredient))
        .route("/users", get(users::list).post(users::register))
        .route("/users/me", get(users::me))
        .route("/users/set_password", post(users::set_password))
        .route("/users/subscriptions", get(users::subscriptions))
        .route("/users/{id}", get(users::show))
        .route(
            "/users/{id}/subscribe",
            post(users::subscribe).delete(users::unsubscribe),
        )
        .route("/auth/token/login", post(users::login))
        .route("/auth/token/logout", post(users::logout))
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();
    let response = next.run(request).await;
    log::info!(
        "{method} {uri} {} ({:?})",
        response.status().as_u16(),
        start.elapsed()
    );
    response
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .nest("/api", api_routes())
        .layer(middleware::from_fn(log_request))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, address: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    log::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("received Ctrl+C, shutting down"),
            Err(e) => {
                log::error!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                log::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Drives the router in-process for the handler tests.
#[cfg(test)]
pub(crate) mod test_util {
    use super::{router, AppState};
    use crate::database::{self, models::User};
    use crate::store::users;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt as _;
    use std::sync::{Arc, MutexGuard};
    use tower::ServiceExt as _;

    pub fn state() -> Arc<AppState> {
        AppState::new(database::in_memory(), 6)
    }

    pub fn conn(state: &AppState) -> MutexGuard<'_, database::Connection> {
        state.db.lock().unwrap()
    }

    pub fn token(state: &AppState, user: &User) -> String {
        users::issue_token(&mut conn(state), user.id).unwrap()
    }

    pub struct TestResponse {
        pub status: StatusCode,
        pub headers: axum::http::HeaderMap,
        pub body: Vec<u8>,
    }

    impl TestResponse {
        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap()
        }

        pub fn text(&self) -> String {
            String::from_utf8(self.body.clone()).unwrap()
        }
    }

    pub async fn send(
        state: &Arc<AppState>,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> TestResponse {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Token {token}"));
        }
        let request = match body {
            Some(body) => request
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            headers,
            body: body.to_vec(),
        }
    }
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let state = test_util::state();
    let response = test_util::send(&state, "GET", "/api/nothing", None, None).await;
    assert_eq!(response.status, axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cors_preflight() {
    let state = test_util::state();
    let request = axum::http::Request::builder()
        .method("OPTIONS")
        .uri("/api/recipes")
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "POST")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = tower::ServiceExt::oneshot(router(state), request)
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
}
