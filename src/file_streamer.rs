//! Single-file responses
//!
//! Builds the response head for one file of a resource (status, length,
//! range, disposition and the informational swarm headers) and pipes the
//! file's byte stream into the body.

use crate::body::{self, BodyMode, GatewayBody};
use crate::error::{GatewayError, Result};
use crate::headers::{
    attachment_disposition, content_type_for, format_bytes, format_speed, X_TORRENT_DOWNLOADED,
    X_TORRENT_DOWNLOAD_SPEED, X_TORRENT_PEERS, X_TORRENT_RECEIVED, X_TORRENT_UPLOAD_SPEED,
};
use crate::metrics::GatewayMetrics;
use crate::models::SwarmStats;
use crate::range_negotiator::{RangeNegotiator, RangeOutcome};
use crate::swarm::SwarmResource;
use http::header::{ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Streams single files out of resolved resources
pub struct FileStreamer {
    metrics: Arc<GatewayMetrics>,
}

impl FileStreamer {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        FileStreamer { metrics }
    }

    /// Respond with file `index` of `resource`
    ///
    /// # Arguments
    /// * `resource` - The resolved resource
    /// * `index` - File index; `None` stands for a lookup that matched nothing
    /// * `request_headers` - Client headers, consulted for `Range`
    /// * `download` - Whether to send an `attachment` disposition
    /// * `mode` - With `HeadOnly` the file stream is never opened
    ///
    /// # Returns
    /// * `Err(NotFound)` when `index` does not name a file
    /// * a bare 400 or 416 response when the range cannot be served
    /// * otherwise a 200 or 206 streaming response
    pub async fn respond(
        &self,
        resource: Arc<dyn SwarmResource>,
        index: Option<usize>,
        request_headers: &HeaderMap,
        download: bool,
        mode: BodyMode,
    ) -> Result<Response<GatewayBody>> {
        let file = index
            .and_then(|i| resource.files().get(i))
            .ok_or_else(|| {
                GatewayError::NotFound(format!(
                    "file {} of {}",
                    index.map_or_else(|| "-1".to_string(), |i| i.to_string()),
                    resource.id()
                ))
            })?;
        let length = file.length();

        let mut builder = Response::builder();
        if let Some(headers) = builder.headers_mut() {
            insert_stats_headers(headers, &resource.stats());
            headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type_for(file.name())));
            if download {
                headers.insert(CONTENT_DISPOSITION, attachment_disposition(file.name()));
            }
        }

        let range = match RangeNegotiator::from_headers(request_headers, length) {
            Ok(RangeOutcome::NoRange) => None,
            Ok(RangeOutcome::Single(range)) => Some(range),
            Err(e) => {
                debug!("Rejecting range for {}: {}", file.path(), e);
                let status = StatusCode::from_u16(e.to_http_status())
                    .unwrap_or(StatusCode::RANGE_NOT_SATISFIABLE);
                if status == StatusCode::RANGE_NOT_SATISFIABLE {
                    builder = builder.header(CONTENT_RANGE, format!("bytes */{}", length));
                }
                return builder
                    .status(status)
                    .body(body::empty())
                    .map_err(GatewayError::from);
            }
        };

        let builder = match range {
            Some(range) => builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(CONTENT_RANGE, range.content_range(length))
                .header(CONTENT_LENGTH, range.size()),
            None => builder.status(StatusCode::OK).header(CONTENT_LENGTH, length),
        };

        if mode == BodyMode::HeadOnly {
            debug!("Head of {} ({} bytes)", file.path(), length);
            return builder.body(body::empty()).map_err(GatewayError::from);
        }

        let stream = file.open_stream(range).await?;
        let stream = body::metered(stream, Arc::clone(&self.metrics), file.path().to_string());
        match range {
            Some(range) => {
                self.metrics.record_range_request();
                debug!(
                    "Streaming {} bytes {}-{} of {}",
                    file.path(),
                    range.start,
                    range.end,
                    length
                );
            }
            None => debug!("Streaming {} ({} bytes)", file.path(), length),
        }

        builder
            .body(body::streaming(stream))
            .map_err(GatewayError::from)
    }
}

fn insert_stats_headers(headers: &mut HeaderMap, stats: &SwarmStats) {
    let values = [
        (X_TORRENT_PEERS, stats.peers.to_string()),
        (X_TORRENT_DOWNLOAD_SPEED, format_speed(stats.download_speed)),
        (X_TORRENT_UPLOAD_SPEED, format_speed(stats.upload_speed)),
        (X_TORRENT_RECEIVED, format_bytes(stats.received)),
        (X_TORRENT_DOWNLOADED, format_bytes(stats.downloaded)),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}
