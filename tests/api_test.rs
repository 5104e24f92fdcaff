//! Integration tests for the worker API client against an in-process server

use attendance_agent::domain::attendance::Progress;
use attendance_agent::domain::types::{NotificationId, OrderId, PositionSample};
use attendance_agent::io::{ApiError, HttpWorkerApi, WorkerApi};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;

/// One request as seen by the fake server
#[derive(Debug, Clone)]
struct Seen {
    method: String,
    path: String,
    query: Option<String>,
    body: serde_json::Value,
    cookie: Option<String>,
}

type Routes = Arc<dyn Fn(&str) -> (StatusCode, String) + Send + Sync>;

/// Serve `routes` on an ephemeral port, recording every request
async fn start_server(routes: Routes) -> (String, Arc<Mutex<Vec<Seen>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            let routes = routes.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let routes = routes.clone();
                    let log = log.clone();
                    async move {
                        let method = req.method().to_string();
                        let path = req.uri().path().to_string();
                        let query = req.uri().query().map(str::to_string);
                        let cookie = req
                            .headers()
                            .get(hyper::header::COOKIE)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        let raw = req.into_body().collect().await.unwrap().to_bytes();
                        let body = serde_json::from_slice(&raw).unwrap_or(serde_json::Value::Null);
                        log.lock().push(Seen { method, path: path.clone(), query, body, cookie });

                        let (status, body) = routes(&path);
                        let response = Response::builder()
                            .status(status)
                            .header("Content-Type", "application/json")
                            .header("Set-Cookie", "session=abc123; Path=/")
                            .body(Full::new(Bytes::from(body)))
                            .unwrap();
                        Ok::<_, Infallible>(response)
                    }
                });
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    (format!("http://{addr}"), seen)
}

fn ok(body: &str) -> (StatusCode, String) {
    (StatusCode::OK, body.to_string())
}

#[tokio::test]
async fn test_check_in_posts_sample_and_reads_session() {
    let routes: Routes = Arc::new(|path: &str| match path {
        "/attendance/checkin" => ok(r#"{
            "success": true,
            "message": "Checked in",
            "session": {
                "check_in_morning": "2024-03-05T08:02:11.123456",
                "check_out_morning": null
            }
        }"#),
        _ => (StatusCode::NOT_FOUND, "{}".to_string()),
    });
    let (base_url, seen) = start_server(routes).await;
    let api = HttpWorkerApi::new(&base_url).unwrap();

    let sample = PositionSample::new(36.7525, 3.042, 7.5);
    let check_in = api.check_in(&sample).await.unwrap();

    assert_eq!(check_in.message.as_deref(), Some("Checked in"));
    let session = check_in.session.unwrap();
    assert_eq!(session.display_lines().to_vec(), vec!["Morning check-in: 08:02".to_string()]);

    let seen = seen.lock();
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].path, "/attendance/checkin");
    assert_eq!(seen[0].body["latitude"], 36.7525);
    assert_eq!(seen[0].body["longitude"], 3.042);
    assert_eq!(seen[0].body["accuracy"], 7.5);
}

#[tokio::test]
async fn test_rejection_carries_server_message() {
    let routes: Routes =
        Arc::new(|_: &str| ok(r#"{"success": false, "message": "Order belongs to another worker"}"#));
    let (base_url, _) = start_server(routes).await;
    let api = HttpWorkerApi::new(&base_url).unwrap();

    let progress = Progress::new(50).unwrap();
    let err = api.update_progress(OrderId(5), progress).await.unwrap_err();
    assert_eq!(err.rejection_message(), Some("Order belongs to another worker"));

    let err = api.complete_order(OrderId(5)).await.unwrap_err();
    assert_eq!(err.rejection_message(), Some("Order belongs to another worker"));
}

#[tokio::test]
async fn test_rejection_body_on_error_status() {
    let routes: Routes = Arc::new(|_: &str| {
        (StatusCode::BAD_REQUEST, r#"{"success": false, "message": "Too far"}"#.to_string())
    });
    let (base_url, _) = start_server(routes).await;
    let api = HttpWorkerApi::new(&base_url).unwrap();

    let err = api.check_in(&PositionSample::new(0.0, 0.0, 1.0)).await.unwrap_err();
    assert_eq!(err, ApiError::Rejected { message: "Too far".into() });
}

#[tokio::test]
async fn test_non_json_error_status() {
    let routes: Routes =
        Arc::new(|_: &str| (StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>".to_string()));
    let (base_url, _) = start_server(routes).await;
    let api = HttpWorkerApi::new(&base_url).unwrap();

    let err = api.complete_order(OrderId(1)).await.unwrap_err();
    assert_eq!(err, ApiError::Status(500));
    assert_eq!(err.rejection_message(), None);
}

#[tokio::test]
async fn test_progress_and_complete_endpoints() {
    let routes: Routes = Arc::new(|_: &str| ok(r#"{"success": true, "message": "Saved"}"#));
    let (base_url, seen) = start_server(routes).await;
    let api = HttpWorkerApi::new(&base_url).unwrap();

    let message = api.update_progress(OrderId(42), Progress::new(75).unwrap()).await.unwrap();
    assert_eq!(message.as_deref(), Some("Saved"));
    api.complete_order(OrderId(42)).await.unwrap();

    let seen = seen.lock();
    assert_eq!(seen[0].path, "/orders/update-progress/42");
    assert_eq!(seen[0].body, serde_json::json!({"progress": 75}));
    assert_eq!(seen[1].method, "POST");
    assert_eq!(seen[1].path, "/orders/complete/42");
}

#[tokio::test]
async fn test_notifications_and_session_cookie() {
    let routes: Routes = Arc::new(|path: &str| match path {
        "/notifications" => ok(r#"[
            {"id": 1, "title": "New order", "message": "Order #42 assigned"},
            {"id": 2, "title": "Reminder"}
        ]"#),
        _ => ok(r#"{"success": true}"#),
    });
    let (base_url, seen) = start_server(routes).await;
    let api = HttpWorkerApi::new(&base_url).unwrap();

    let notifications = api.unread_notifications().await.unwrap();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].id, NotificationId(1));
    assert_eq!(notifications[1].message, "");

    api.mark_notification_read(NotificationId(2)).await.unwrap();

    let seen = seen.lock();
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].query.as_deref(), Some("unread_only=true"));
    assert_eq!(seen[1].method, "GET");
    assert_eq!(seen[1].path, "/notifications/mark-read/2");
    // Cookie issued on the first answer is replayed
    assert_eq!(seen[1].cookie.as_deref(), Some("session=abc123"));
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = HttpWorkerApi::new(&format!("http://{addr}")).unwrap();
    let err = api.unread_notifications().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
}
