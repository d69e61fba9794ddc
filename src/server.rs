//! HTTP front end of the gateway
//!
//! Routes requests to the resolver and the streaming components, logs one
//! line per request and keeps the request counters. Routing happens before
//! identifier validation, and validation before any swarm acquisition.

use crate::archive::ArchiveAssembler;
use crate::body::{self, BodyMode, GatewayBody};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::file_streamer::FileStreamer;
use crate::headers::attachment_disposition;
use crate::manifest::{ManifestSanitizer, MANIFEST_CONTENT_TYPE};
use crate::metrics::{GatewayMetrics, RequestKind};
use crate::resolver::ResourceResolver;
use crate::swarm::{find_file_by_name, SwarmEngine};
use http::header::{ALLOW, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const LIVENESS_TEXT: &str = "Swarm gateway API endpoint";
const WEBSEED_PLACEHOLDER_TEXT: &str = "Torrent web seed";

/// A parsed request path
#[derive(Debug, PartialEq, Eq)]
enum Route {
    Liveness,
    Listing { id: String },
    File { id: String, index: Option<usize> },
    Manifest { id: String },
    Archive { id: String },
    Webseed { id: String },
    WebseedFile { id: String, filename: String },
}

impl Route {
    /// Match a request path against the routing table
    ///
    /// Segments are percent-decoded. `None` means no route matched.
    fn parse(path: &str) -> Option<Route> {
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
            .collect();

        let mut segments = segments.into_iter();
        let route = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (None, ..) => Route::Liveness,
            (Some(root), Some(id), third, fourth) if root == "torrent" && fourth.is_none() => {
                match third.as_deref() {
                    None => Route::Listing { id },
                    Some("safefile") => Route::Manifest { id },
                    Some("tar") => Route::Archive { id },
                    Some(index) if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) => {
                        // Indexes too large for usize cannot name a file
                        Route::File {
                            id,
                            index: index.parse().ok(),
                        }
                    }
                    Some(_) => return None,
                }
            }
            (Some(root), Some(id), None, None) if root == "webseed" => Route::Webseed { id },
            (Some(root), Some(id), Some(_name), Some(filename)) if root == "webseed" => {
                if segments.next().is_some() {
                    return None;
                }
                Route::WebseedFile { id, filename }
            }
            _ => return None,
        };
        Some(route)
    }

    fn kind(&self) -> RequestKind {
        match self {
            Route::Liveness => RequestKind::Liveness,
            Route::Listing { .. } => RequestKind::Listing,
            Route::File { .. } | Route::WebseedFile { .. } | Route::Webseed { .. } => RequestKind::File,
            Route::Manifest { .. } => RequestKind::Manifest,
            Route::Archive { .. } => RequestKind::Archive,
        }
    }
}

/// Whether the `dl` query parameter asks for inline display
///
/// Only the first `dl` value counts; `dl=0` suppresses the attachment disposition.
fn download_requested(query: Option<&str>) -> bool {
    let first_dl = query.and_then(|q| {
        q.split('&')
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
            .find(|(key, _)| *key == "dl")
            .map(|(_, value)| value)
    });
    first_dl != Some("0")
}

/// The gateway's HTTP request handler
///
/// Cheap to clone; clones share the resolver, registry and metrics.
#[derive(Clone)]
pub struct GatewayServer {
    resolver: Arc<ResourceResolver>,
    sanitizer: Arc<ManifestSanitizer>,
    streamer: Arc<FileStreamer>,
    archive: Arc<ArchiveAssembler>,
    metrics: Arc<GatewayMetrics>,
}

impl GatewayServer {
    /// Create a server over `engine`
    ///
    /// # Arguments
    /// * `config` - Gateway configuration
    /// * `engine` - Swarm engine used for acquisitions
    /// * `metrics` - Shared metrics collector
    pub fn new(config: &GatewayConfig, engine: Arc<dyn SwarmEngine>, metrics: Arc<GatewayMetrics>) -> Self {
        let resolver = ResourceResolver::new(
            engine,
            config.trackers.clone(),
            config.acquisition_timeout_secs.map(Duration::from_secs),
            Arc::clone(&metrics),
        );

        GatewayServer {
            resolver: Arc::new(resolver),
            sanitizer: Arc::new(ManifestSanitizer::new(
                config.webseed_root.clone(),
                config.manifest_comment.clone(),
            )),
            streamer: Arc::new(FileStreamer::new(Arc::clone(&metrics))),
            archive: Arc::new(ArchiveAssembler::new(
                config.archive_buffer_chunks,
                Arc::clone(&metrics),
            )),
            metrics,
        }
    }

    pub fn resolver(&self) -> &ResourceResolver {
        &self.resolver
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    /// Handle one request
    ///
    /// Never fails: errors raised before the head is written become bare
    /// status responses. Errors after that point abort the body instead.
    /// `HEAD` gets the head a `GET` would get, without content.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<GatewayBody> {
        let started = Instant::now();
        let (parts, _) = req.into_parts();
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        let mode = BodyMode::for_method(&method);

        let (response, kind) = match mode {
            None => (method_not_allowed(), None),
            Some(mode) => match Route::parse(&path) {
                None => (status_response(StatusCode::NOT_FOUND), None),
                Some(route) => {
                    let kind = Some(route.kind());
                    let download = download_requested(parts.uri.query());
                    match self.dispatch(route, &parts.headers, download, mode).await {
                        Ok((response, kind_override)) => (response, kind_override.or(kind)),
                        Err(e) => (self.error_response(&e), kind),
                    }
                }
            },
        };
        let response = match mode {
            Some(BodyMode::HeadOnly) => without_body(response),
            _ => response,
        };

        let status = response.status();
        let elapsed = started.elapsed();
        self.metrics.record_request_duration(elapsed);
        if status.is_client_error() {
            self.metrics.record_rejected();
        } else if status.is_server_error() {
            self.metrics.record_failed();
        } else if let Some(kind) = kind {
            self.metrics.record_request(kind);
        }

        info!("{} {} {} {:?}", method, path, status.as_u16(), elapsed);
        response
    }

    async fn dispatch(
        &self,
        route: Route,
        headers: &HeaderMap,
        download: bool,
        mode: BodyMode,
    ) -> Result<(Response<GatewayBody>, Option<RequestKind>)> {
        match route {
            Route::Liveness => Ok((text_response(LIVENESS_TEXT)?, None)),
            Route::Listing { id } => Ok((self.listing(&id).await?, None)),
            Route::File { id, index } => {
                let resource = self.resolver.resolve(&id).await?;
                let response = self
                    .streamer
                    .respond(resource, index, headers, download, mode)
                    .await?;
                Ok((response, None))
            }
            Route::Manifest { id } => Ok((self.manifest(&id).await?, None)),
            Route::Archive { id } => {
                let resource = self.resolver.resolve(&id).await?;
                Ok((self.archive.respond(resource, mode)?, None))
            }
            Route::Webseed { id } => {
                let resource = self.resolver.resolve(&id).await?;
                if resource.files().len() == 1 {
                    let response = self
                        .streamer
                        .respond(resource, Some(0), headers, download, mode)
                        .await?;
                    Ok((response, None))
                } else {
                    debug!("Web seed root requested for multi-file resource {}", id);
                    Ok((
                        text_response(WEBSEED_PLACEHOLDER_TEXT)?,
                        Some(RequestKind::WebseedPlaceholder),
                    ))
                }
            }
            Route::WebseedFile { id, filename } => {
                let resource = self.resolver.resolve(&id).await?;
                let index = find_file_by_name(resource.as_ref(), &filename);
                let response = self
                    .streamer
                    .respond(resource, index, headers, download, mode)
                    .await?;
                Ok((response, None))
            }
        }
    }

    async fn listing(&self, id: &str) -> Result<Response<GatewayBody>> {
        let resource = self.resolver.resolve(id).await?;
        let paths: Vec<&str> = resource.files().iter().map(|f| f.path()).collect();
        let json = serde_json::to_vec(&paths)
            .map_err(|e| GatewayError::InternalError(format!("cannot encode file list: {}", e)))?;

        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .header(CONTENT_LENGTH, json.len())
            .body(body::full(json))
            .map_err(GatewayError::from)
    }

    async fn manifest(&self, id: &str) -> Result<Response<GatewayBody>> {
        let resource = self.resolver.resolve(id).await?;
        let sanitized = self.sanitizer.sanitize(resource.id(), &resource.raw_manifest())?;
        let filename = ManifestSanitizer::filename(resource.id());

        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, MANIFEST_CONTENT_TYPE)
            .header(CONTENT_DISPOSITION, attachment_disposition(&filename))
            .header(CONTENT_LENGTH, sanitized.len())
            .body(body::full(sanitized))
            .map_err(GatewayError::from)
    }

    fn error_response(&self, err: &GatewayError) -> Response<GatewayBody> {
        let status = StatusCode::from_u16(err.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if err.is_client_error() {
            debug!("Rejected request: {}", err);
        } else {
            warn!("Request failed: {}", err);
        }
        status_response(status)
    }

    /// Serve connections from `listener` until `shutdown` resolves
    ///
    /// Connections already accepted keep running to completion.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.handle(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    // Aborted bodies end up here too
                    debug!("Connection from {} closed with error: {:?}", peer, err);
                }
            });
        }
    }

    /// Bind `addr` and serve until Ctrl-C
    pub async fn run(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Gateway listening on http://{}", addr);

        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

fn status_response(status: StatusCode) -> Response<GatewayBody> {
    let mut response = Response::new(body::empty());
    *response.status_mut() = status;
    response
}

fn method_not_allowed() -> Response<GatewayBody> {
    let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED);
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
    response
}

/// Keep status and headers, drop the content
fn without_body(response: Response<GatewayBody>) -> Response<GatewayBody> {
    let (parts, _) = response.into_parts();
    Response::from_parts(parts, body::empty())
}

fn text_response(text: &'static str) -> Result<Response<GatewayBody>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(CONTENT_LENGTH, text.len())
        .body(body::full(text))
        .map_err(GatewayError::from)
}
