//! Metrics HTTP Endpoint
//!
//! Exposes gateway counters in Prometheus text format on a separate listener,
//! alongside a JSON health check.

use crate::metrics::{GatewayMetrics, MetricsSnapshot};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

const PREFIX: &str = "swarm_gateway";

/// Metrics endpoint server
pub struct MetricsEndpoint {
    metrics: Arc<GatewayMetrics>,
    addr: SocketAddr,
}

impl MetricsEndpoint {
    /// Create a new metrics endpoint
    ///
    /// # Arguments
    /// * `metrics` - Shared metrics collector
    /// * `addr` - Address to bind the HTTP server to
    pub fn new(metrics: Arc<GatewayMetrics>, addr: SocketAddr) -> Self {
        Self { metrics, addr }
    }

    /// Bind and serve until the process exits
    pub async fn start(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics available at http://{}/metrics", self.addr);
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let metrics = Arc::clone(&self.metrics);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let metrics = Arc::clone(&metrics);
                    async move { Ok::<_, Infallible>(handle_request(req, &metrics)) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

fn handle_request<B>(req: Request<B>, metrics: &GatewayMetrics) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/metrics" => text_response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics.get_stats()),
        ),
        "/health" => text_response(StatusCode::OK, "application/json", r#"{"status":"healthy"}"#.to_string()),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "404 Not Found".to_string()),
    }
}

fn text_response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static(content_type));
    response
}

fn push_metric(out: &mut String, name: &str, kind: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP {}_{} {}", PREFIX, name, help);
    let _ = writeln!(out, "# TYPE {}_{} {}", PREFIX, name, kind);
    let _ = writeln!(out, "{}_{} {}\n", PREFIX, name, value);
}

/// Format a snapshot in Prometheus exposition format
fn format_prometheus_metrics(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    // Requests
    push_metric(&mut out, "requests_total", "counter", "Total number of requests processed", snapshot.total_requests);
    push_metric(&mut out, "liveness_requests_total", "counter", "Liveness requests", snapshot.liveness_requests);
    push_metric(&mut out, "listing_requests_total", "counter", "File list requests", snapshot.listing_requests);
    push_metric(&mut out, "file_requests_total", "counter", "Single file stream requests", snapshot.file_requests);
    push_metric(&mut out, "range_requests_total", "counter", "File streams served as partial content", snapshot.range_requests);
    push_metric(&mut out, "archive_requests_total", "counter", "Whole-resource archive requests", snapshot.archive_requests);
    push_metric(&mut out, "manifest_requests_total", "counter", "Sanitized manifest requests", snapshot.manifest_requests);
    push_metric(&mut out, "webseed_placeholder_requests_total", "counter", "Web seed requests answered with the placeholder", snapshot.webseed_placeholder_requests);
    push_metric(&mut out, "rejected_requests_total", "counter", "Requests answered with a 4xx status", snapshot.rejected_requests);
    push_metric(&mut out, "failed_requests_total", "counter", "Requests answered with a 5xx status", snapshot.failed_requests);

    // Acquisitions
    push_metric(&mut out, "acquisitions_started_total", "counter", "Swarm acquisitions started", snapshot.acquisitions_started);
    push_metric(&mut out, "acquisitions_completed_total", "counter", "Swarm acquisitions that produced a resource", snapshot.acquisitions_completed);
    push_metric(&mut out, "acquisitions_failed_total", "counter", "Swarm acquisitions that failed or timed out", snapshot.acquisitions_failed);
    push_metric(&mut out, "acquisitions_in_flight", "gauge", "Swarm acquisitions currently running", snapshot.acquisitions_in_flight());

    // Streams
    push_metric(&mut out, "bytes_to_client_total", "counter", "Total bytes sent to clients", snapshot.bytes_to_client);
    push_metric(&mut out, "aborted_streams_total", "counter", "Response bodies cut short by a stream error", snapshot.aborted_streams);

    // Latency
    push_metric(&mut out, "request_duration_ms_avg", "gauge", "Average time to response head in milliseconds", format!("{:.2}", snapshot.avg_request_duration_ms()));
    push_metric(&mut out, "acquisition_duration_ms_avg", "gauge", "Average acquisition duration in milliseconds", format!("{:.2}", snapshot.avg_acquisition_duration_ms()));

    out
}
