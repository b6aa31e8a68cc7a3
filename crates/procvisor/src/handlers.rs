//! HTTP routing and the status endpoint.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tracing::{debug, error};

use crate::access_log::AccessLogLayer;
use crate::state::AppState;

/// Builds the router: a single route, `/`, answering every method.
pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", any(handle_status))
        .with_state(state)
        .layer(AccessLogLayer)
        .layer(CompressionLayer::new())
}

/// Collects a fresh status snapshot and returns it as JSON.
///
/// Source failures only drop fields from the snapshot; the request itself
/// fails only if the response cannot be built.
pub(crate) async fn handle_status(State(state): State<AppState>) -> Response {
    let pid = state.child_pid();
    let aggregator = state.aggregator.clone();
    debug!(root = %aggregator.root().display(), pid = ?pid, "collecting status");

    // File reads are blocking, keep them off the async workers.
    match tokio::task::spawn_blocking(move || aggregator.status(pid)).await {
        Ok(status) => json_response(&status),
        Err(e) => internal_error(format!("status collection failed: {}", e)),
    }
}

fn json_response<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

fn internal_error(message: String) -> Response {
    error!(error = %message, "failed to build status response");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use procvisor_core::collector::RealFs;
    use procvisor_core::{StatusAggregator, Supervisor};
    use serde_json::Value;
    use tower::ServiceExt;

    const MEMINFO: &str = "\
MemTotal:        8000000 kB
MemFree:         1000000 kB
MemAvailable:    4000000 kB
Buffers:          100000 kB
Cached:          2000000 kB
SwapTotal:             0 kB
SwapFree:              0 kB
";
    const STAT: &str = "\
cpu  4705 356 584 3699 23 23 0 0 0 0
cpu0 1393 280 259 1833 10 11 0 0 0 0
ctxt 1990473
btime 1062191376
processes 2915
procs_running 1
procs_blocked 0
";
    const LOADAVG: &str = "0.20 0.18 0.12 1/80 11206\n";

    fn fixture_root(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    fn full_fixture() -> tempfile::TempDir {
        fixture_root(&[("meminfo", MEMINFO), ("stat", STAT), ("loadavg", LOADAVG)])
    }

    fn app(root: &Path, supervisor: Option<Arc<Supervisor>>) -> Router {
        let aggregator = StatusAggregator::new(RealFs::new(), root);
        router(AppState::new(supervisor, aggregator))
    }

    async fn request(app: Router, method: Method) -> (StatusCode, Option<String>, Vec<u8>) {
        let req = Request::builder()
            .method(method)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_owned());
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, content_type, body)
    }

    async fn get_json(app: Router) -> serde_json::Map<String, Value> {
        let (status, content_type, body) = request(app, Method::GET).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        match serde_json::from_slice(&body).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected JSON object, got {other}"),
        }
    }

    fn keys(map: &serde_json::Map<String, Value>) -> Vec<&str> {
        let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    #[tokio::test]
    async fn test_fixture_root_with_running_child() {
        let root = full_fixture();
        let supervisor = Arc::new(Supervisor::new("sleep", ["30"]));
        let pid = supervisor.start().unwrap();

        let body = get_json(app(root.path(), Some(supervisor.clone()))).await;

        assert_eq!(keys(&body), ["load", "mem", "proc_stat", "stat"]);
        assert_eq!(body["mem"]["mem_total"], 8000000);
        assert_eq!(body["stat"]["processes"], 2915);
        assert_eq!(body["load"]["total"], 80);
        assert_eq!(body["proc_stat"]["pid"], pid);
        assert_eq!(body["proc_stat"]["comm"], "sleep");

        supervisor.stop().unwrap();
    }

    #[tokio::test]
    async fn test_missing_loadavg_drops_load_only() {
        let root = fixture_root(&[("meminfo", MEMINFO), ("stat", STAT)]);

        let body = get_json(app(root.path(), None)).await;

        assert_eq!(keys(&body), ["mem", "stat"]);
    }

    #[tokio::test]
    async fn test_launch_failure_still_serves_system_metrics() {
        let root = full_fixture();
        let supervisor = Arc::new(Supervisor::new(
            "/nonexistent/command/12345",
            Vec::<String>::new(),
        ));
        assert!(supervisor.start().is_err());

        let body = get_json(app(root.path(), Some(supervisor))).await;

        assert_eq!(keys(&body), ["load", "mem", "stat"]);
    }

    #[tokio::test]
    async fn test_stopped_child_drops_proc_stat() {
        let root = full_fixture();
        let supervisor = Arc::new(Supervisor::new("sleep", ["30"]));
        supervisor.start().unwrap();
        let app = app(root.path(), Some(supervisor.clone()));

        assert!(get_json(app.clone()).await.contains_key("proc_stat"));

        supervisor.stop().unwrap();
        let body = get_json(app).await;
        assert!(!body.contains_key("proc_stat"));
        assert!(body.contains_key("mem"));
    }

    #[tokio::test]
    async fn test_any_method_is_served() {
        let root = full_fixture();

        for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE] {
            let (status, _, _) = request(app(root.path(), None), method.clone()).await;
            assert_eq!(status, StatusCode::OK, "method {method}");
        }
    }

    #[tokio::test]
    async fn test_other_paths_are_not_found() {
        let root = full_fixture();
        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();

        let resp = app(root.path(), None).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_repeated_requests_have_same_fields() {
        let root = fixture_root(&[("meminfo", MEMINFO), ("loadavg", LOADAVG)]);
        let app = app(root.path(), None);

        let first = get_json(app.clone()).await;
        let second = get_json(app).await;
        assert_eq!(keys(&first), keys(&second));
        assert_eq!(keys(&first), ["load", "mem"]);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_router() {
        let root = full_fixture();
        let supervisor = Arc::new(Supervisor::new("sleep", ["30"]));
        supervisor.start().unwrap();
        let app = app(root.path(), Some(supervisor.clone()));

        let (a, b, c, d) = tokio::join!(
            get_json(app.clone()),
            get_json(app.clone()),
            get_json(app.clone()),
            get_json(app),
        );

        for body in [&a, &b, &c, &d] {
            assert_eq!(keys(body), ["load", "mem", "proc_stat", "stat"]);
            assert_eq!(body["mem"], a["mem"]);
        }

        supervisor.stop().unwrap();
    }

    #[tokio::test]
    async fn test_meminfo_deleted_between_requests() {
        let root = full_fixture();
        let app = app(root.path(), None);

        assert!(get_json(app.clone()).await.contains_key("mem"));

        std::fs::remove_file(root.path().join("meminfo")).unwrap();
        let body = get_json(app).await;
        assert_eq!(keys(&body), ["load", "stat"]);
    }

    #[tokio::test]
    async fn test_empty_root_returns_empty_object() {
        let root = fixture_root(&[]);

        let body = get_json(app(root.path(), None)).await;
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_bundled_fixtures_parse() {
        let root = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures"));

        let body = get_json(app(&root, None)).await;
        assert_eq!(keys(&body), ["load", "mem", "stat"]);
    }

    #[test]
    fn test_encoding_failure_is_500() {
        // JSON object keys must be strings.
        let unencodable: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);

        let resp = json_response(&unencodable);

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
