use std::{sync::Arc, time::Duration};

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{Config, HealthReporter};

mod demo;
mod health;

// ---

/// State shared by every route.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub reporter: Arc<HealthReporter>,
    pub shutdown: CancellationToken,
    pub config: Config,
}

/// Build the application router with its middleware stack.
///
/// Layers, outermost first: request tracing, request timeout (408 on
/// expiry), panic recovery (500).
pub fn router(state: AppState) -> Router {
    // ---
    let request_timeout = state.config.request_timeout;

    let app = Router::new()
        .merge(health::router())
        .merge(demo::router())
        .with_state(state);

    with_middleware(app, request_timeout)
}

fn with_middleware(app: Router, request_timeout: Duration) -> Router {
    // ---
    app.layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::net::SocketAddr;

    use axum::{routing::get, Json};
    use reqwest::StatusCode;
    use serde_json::Value;

    struct TestServer {
        base: String,
        state: Option<AppState>,
        handle: tokio::task::JoinHandle<()>,
    }

    impl TestServer {
        fn state(&self) -> &AppState {
            self.state.as_ref().expect("server was started without app state")
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.handle.abort();
        }
    }

    fn test_config() -> Config {
        // ---
        Config {
            request_timeout: Duration::from_millis(300),
            slow_route_delay: Duration::from_secs(2),
            ..Config::default()
        }
    }

    async fn spawn_app(config: Config) -> TestServer {
        // ---
        let state = AppState {
            reporter: Arc::new(HealthReporter::new()),
            shutdown: CancellationToken::new(),
            config,
        };

        let mut server = serve(router(state.clone())).await;
        server.state = Some(state);
        server
    }

    async fn serve(app: Router) -> TestServer {
        // ---
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base: format!("http://{}", addr),
            state: None,
            handle,
        }
    }

    #[tokio::test]
    async fn test_health_returns_report() {
        // ---
        let server = spawn_app(test_config()).await;
        server
            .state()
            .reporter
            .register_probe("db", || "up".to_string());

        let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "OK");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["checks"]["db"], "up");
        assert!(body["memory"]["totalAlloc"].as_u64().unwrap() > 0);
        assert!(body["system"]["numCPU"].as_u64().unwrap() >= 1);
        assert!(body["uptime"].is_string());
    }

    #[tokio::test]
    async fn test_health_without_probes_omits_checks() {
        // ---
        let server = spawn_app(test_config()).await;

        let body: Value = reqwest::get(format!("{}/health", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(body.get("checks").is_none(), "unexpected checks: {body}");
    }

    #[tokio::test]
    async fn test_health_after_shutdown_skips_probes() {
        // ---
        let server = spawn_app(test_config()).await;
        server
            .state()
            .reporter
            .register_probe("db", || "up".to_string());
        server.state().shutdown.cancel();

        let body: Value = reqwest::get(format!("{}/health", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "OK");
        assert_eq!(body["checks"]["db"], "cancelled");
    }

    #[tokio::test]
    async fn test_test_route() {
        // ---
        let server = spawn_app(test_config()).await;

        let resp = reqwest::get(format!("{}/test", server.base)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.text().await.unwrap(), "Hello, World 👋!");
    }

    #[tokio::test]
    async fn test_error_route() {
        // ---
        let server = spawn_app(test_config()).await;

        let resp = reqwest::get(format!("{}/error", server.base)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.text().await.unwrap(), "error");
    }

    #[tokio::test]
    async fn test_slow_route_hits_request_timeout() {
        // ---
        let server = spawn_app(test_config()).await;

        let resp = reqwest::get(format!("{}/timeout", server.base)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_slow_route_completes_within_timeout() {
        // ---
        let config = Config {
            request_timeout: Duration::from_secs(5),
            slow_route_delay: Duration::from_millis(50),
            ..Config::default()
        };
        let server = spawn_app(config).await;

        let resp = reqwest::get(format!("{}/timeout", server.base)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.text().await.unwrap(), "timeout");
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_500() {
        // ---
        async fn boom() -> Json<()> {
            panic!("handler blew up")
        }

        let app = Router::new()
            .route("/boom", get(boom))
            .route("/ok", get(|| async { "ok" }));
        let server = serve(with_middleware(app, Duration::from_secs(1))).await;

        let resp = reqwest::get(format!("{}/boom", server.base)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // The server keeps serving after a panic
        let resp = reqwest::get(format!("{}/ok", server.base)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        // ---
        let server = spawn_app(test_config()).await;

        let resp = reqwest::get(format!("{}/nope", server.base)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
