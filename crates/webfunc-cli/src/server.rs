//! HTTP front end. Every request, whatever its method or path, runs the guest
//! once and turns the session report into the response.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};
use webfunc_sandbox::request::canonical_header_name;
use webfunc_sandbox::{RequestMetadata, SandboxError, SandboxSession, SessionReport};
use webfunc_telemetry::RequestContext;

#[derive(Clone)]
struct AppState {
    session: SandboxSession,
}

/// Catch-all router running `session` per request.
pub(crate) fn router(session: SandboxSession, max_body_bytes: usize) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(AppState { session })
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

/// Bind `addr` and serve until Ctrl-C.
pub(crate) async fn serve(addr: SocketAddr, session: SandboxSession, max_body_bytes: usize) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, router(session, max_body_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn handle_request(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let context = RequestContext::new(method.as_str(), uri.path());
    let span = context.span();

    async move {
        debug!("Request started");
        let request = request_metadata(&method, &uri, &headers);

        // Dropping the handler (client went away) cancels the guest.
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let session = state.session.clone();
        let body = body.to_vec();
        let parent = tracing::Span::current();
        let outcome = tokio::task::spawn_blocking(move || {
            parent.in_scope(|| session.run(&request, body, std::io::sink(), Some(cancel)))
        })
        .await;

        let response = match outcome {
            Ok(Ok(report)) => respond(report),
            Ok(Err(e)) => session_failed(&e),
            Err(e) => {
                warn!(error = %e, "Session task failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            },
        };

        info!(
            status = response.status().as_u16(),
            elapsed_ms = context.elapsed_ms(),
            "Request completed"
        );
        response
    }
    .instrument(span)
    .await
}

/// Request metadata with Go-style canonical header names.
fn request_metadata(method: &Method, uri: &Uri, headers: &HeaderMap) -> RequestMetadata {
    let mut request =
        RequestMetadata::new(method.as_str(), uri.path()).with_query(uri.query().unwrap_or(""));
    for (name, value) in headers {
        request.push_header(
            canonical_header_name(name.as_str()),
            String::from_utf8_lossy(value.as_bytes()),
        );
    }
    request
}

fn respond(report: SessionReport) -> Response {
    debug!(
        exit_code = report.exit_code,
        stdout = %String::from_utf8_lossy(&report.stdout),
        stderr = %String::from_utf8_lossy(&report.stderr),
        "Guest output"
    );

    let status = match report.status_code() {
        Some(code) => StatusCode::from_u16(code).unwrap_or(StatusCode::OK),
        None => {
            if report
                .outputs
                .get(webfunc_sandbox::vfs::contract::STATUS_CODE_FILE)
                .is_some_and(|raw| !raw.is_empty())
            {
                warn!("Ignoring malformed status_code");
            }
            StatusCode::OK
        },
    };
    (status, report.stdout).into_response()
}

fn session_failed(err: &SandboxError) -> Response {
    warn!(error = %err, "Session failed");
    let status = match err {
        SandboxError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use webfunc_sandbox::{CleanExit, ScriptedEngine, SessionConfig};

    use super::*;

    fn app(engine: ScriptedEngine) -> Router {
        let session = SandboxSession::new(Arc::new(engine), SessionConfig::default());
        router(session, 1024)
    }

    fn read_file(inv: &webfunc_sandbox::Invocation, name: &str) -> String {
        use std::io::Read;
        let mut handle = inv.filesystem.open(name).unwrap();
        let mut out = String::new();
        handle.read_to_string(&mut out).unwrap();
        out
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn stdout_becomes_body_with_default_status() {
        let app = app(ScriptedEngine::new(|inv| {
            inv.stdout.write_all(b"hello")?;
            Ok(CleanExit::SUCCESS)
        }));

        let response = app
            .oneshot(Request::get("/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "hello");
    }

    #[tokio::test]
    async fn status_code_file_sets_status() {
        let app = app(ScriptedEngine::new(|inv| {
            inv.filesystem.open("status_code")?.write_some(b"404")?;
            inv.stdout.write_all(b"missing")?;
            Ok(CleanExit::SUCCESS)
        }));

        let response = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "missing");
    }

    #[tokio::test]
    async fn malformed_status_falls_back_to_ok() {
        let app = app(ScriptedEngine::new(|inv| {
            inv.filesystem.open("status_code")?.write_some(b"teapot")?;
            Ok(CleanExit::SUCCESS)
        }));

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn request_is_mounted_for_the_guest() {
        let app = app(ScriptedEngine::new(|inv| {
            let headers = read_file(inv, "headers");
            let trace = headers
                .lines()
                .find(|l| l.starts_with("X-Trace-Id"))
                .unwrap_or("");
            let summary = format!(
                "{}|{}|{}|{trace}",
                read_file(inv, "method"),
                read_file(inv, "path"),
                read_file(inv, "query"),
            );
            inv.stdout.write_all(summary.as_bytes())?;
            Ok(CleanExit::SUCCESS)
        }));

        let request = Request::post("/submit?b=2&a=1")
            .header("x-trace-id", "abc")
            .body(Body::from("payload"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            body_text(response).await,
            "POST|/submit|a=1&b=2|X-Trace-Id: abc"
        );
    }

    #[tokio::test]
    async fn body_is_guest_stdin() {
        let app = app(ScriptedEngine::new(|inv| {
            let body = inv.stdin.clone();
            inv.stdout.write_all(&body)?;
            Ok(CleanExit::SUCCESS)
        }));

        let response = app
            .oneshot(Request::put("/echo").body(Body::from("ping")).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "ping");
    }

    #[tokio::test]
    async fn non_zero_exit_is_not_an_error() {
        let app = app(ScriptedEngine::new(|inv| {
            inv.stdout.write_all(b"partial")?;
            Ok(CleanExit(3))
        }));

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "partial");
    }

    #[tokio::test]
    async fn guest_fault_is_500() {
        let app = app(ScriptedEngine::new(|_| {
            Err(SandboxError::ExecutionFault("unreachable executed".into()))
        }));

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("unreachable executed"));
    }

    #[tokio::test]
    async fn deadline_is_504() {
        let app = app(ScriptedEngine::new(|_| {
            Err(SandboxError::DeadlineExceeded(Duration::from_secs(30)))
        }));

        let response = app
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let engine = Arc::new(ScriptedEngine::new(|_| Ok(CleanExit::SUCCESS)));
        let session = SandboxSession::new(engine.clone(), SessionConfig::default());
        let app = router(session, 8);

        let response = app
            .oneshot(Request::post("/").body(Body::from("0123456789")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn header_names_are_canonicalized() {
        let mut headers = HeaderMap::new();
        headers.append("content-type", "text/plain".parse().unwrap());
        headers.append("x-multi", "1".parse().unwrap());
        headers.append("x-multi", "2".parse().unwrap());

        let uri: Uri = "/p?q=1".parse().unwrap();
        let request = request_metadata(&Method::GET, &uri, &headers);
        assert_eq!(request.query, "q=1");
        assert_eq!(
            request.headers.get("X-Multi"),
            Some(&vec!["1".to_owned(), "2".to_owned()])
        );
        assert!(request.headers.contains_key("Content-Type"));
    }
}
