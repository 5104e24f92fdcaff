//! Status HTTP endpoint
//!
//! - `GET /metrics` - session counters in Prometheus text format
//! - `GET /presence` - latest presence snapshot as JSON
//! - `GET /health` - liveness probe
//!
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::io::presenter::SharedPresence;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

fn write_gauge_f64(output: &mut String, name: &str, help: &str, val: f64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name} {val:.2}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(summary: &MetricsSummary, inside: bool) -> String {
    let mut output = String::with_capacity(2048);

    write_location_metrics(&mut output, summary, inside);
    write_api_metrics(&mut output, summary);

    write_metric(
        &mut output,
        "attendance_absences_recorded_total",
        "Absences recorded while automatic attendance was on",
        MetricType::Counter,
        summary.absences_recorded,
    );
    write_metric(
        &mut output,
        "attendance_toasts_total",
        "Toasts shown to the worker",
        MetricType::Counter,
        summary.toasts_shown,
    );
    write_metric(
        &mut output,
        "attendance_uptime_seconds",
        "Seconds since the agent started",
        MetricType::Gauge,
        summary.uptime_secs,
    );

    output
}

fn write_location_metrics(output: &mut String, summary: &MetricsSummary, inside: bool) {
    write_metric(
        output,
        "attendance_samples_total",
        "Position samples received",
        MetricType::Counter,
        summary.samples_total,
    );
    write_metric(
        output,
        "attendance_samples_outside_total",
        "Position samples outside the workshop geofence",
        MetricType::Counter,
        summary.samples_outside,
    );
    write_metric(
        output,
        "attendance_location_errors_total",
        "Location provider errors",
        MetricType::Counter,
        summary.location_errors,
    );
    write_metric(
        output,
        "attendance_inside_geofence",
        "1 when the latest sample is inside the geofence",
        MetricType::Gauge,
        inside as u64,
    );
    // Omitted until the first sample arrives
    if let Some(distance) = summary.last_distance_m {
        write_gauge_f64(
            output,
            "attendance_distance_meters",
            "Distance from the latest sample to the workshop",
            distance,
        );
    }
}

fn write_api_metrics(output: &mut String, summary: &MetricsSummary) {
    write_metric(
        output,
        "attendance_api_requests_total",
        "Requests sent to the worker API",
        MetricType::Counter,
        summary.api_requests,
    );
    write_metric(
        output,
        "attendance_api_failures_total",
        "Requests that failed in transport or decoding",
        MetricType::Counter,
        summary.api_failures,
    );
    write_metric(
        output,
        "attendance_api_rejections_total",
        "Requests the server answered with success false",
        MetricType::Counter,
        summary.api_rejections,
    );
}

fn respond(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    presence: SharedPresence,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics.report(), presence.get().inside);
            respond(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body)
        }
        (&Method::GET, "/presence") => match serde_json::to_vec(&presence.get()) {
            Ok(body) => respond(StatusCode::OK, "application/json", body),
            Err(e) => {
                error!(error = %e, "presence_encode_failed");
                respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "encode failed")
            }
        },
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok"),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };
    Ok(response)
}

/// Bind the status endpoint. Port 0 picks an ephemeral port.
pub async fn bind_status_listener(
    port: u16,
) -> Result<TcpListener, Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    Ok(TcpListener::bind(addr).await?)
}

/// Serve the status endpoint until shutdown is signalled
pub async fn serve_status(
    listener: TcpListener,
    metrics: Arc<Metrics>,
    presence: SharedPresence,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let port = listener.local_addr()?.port();
    info!(port = %port, "status_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let presence = presence.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let presence = presence.clone();
                                async move { handle_request(req, metrics, presence).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "status_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "status_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("status_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

/// Start the status endpoint on `port`
pub async fn start_status_server(
    port: u16,
    metrics: Arc<Metrics>,
    presence: SharedPresence,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = bind_status_listener(port).await?;
    serve_status(listener, metrics, presence, shutdown).await
}
