//! Metrics collection for the gateway
//!
//! Thread-safe counters built on relaxed atomics. They track requests by
//! endpoint, swarm acquisitions, and bytes streamed to clients.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Kind of request served, used to split the request counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Liveness text on `/`
    Liveness,
    /// File list as JSON
    Listing,
    /// Single file download or stream
    File,
    /// Whole-resource tar archive
    Archive,
    /// Sanitized manifest
    Manifest,
    /// Web seed root of a multi-file resource
    WebseedPlaceholder,
}

/// Metrics collector for the gateway
///
/// All operations are thread-safe using atomic operations.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    // Request statistics
    total_requests: AtomicU64,
    liveness_requests: AtomicU64,
    listing_requests: AtomicU64,
    file_requests: AtomicU64,
    range_requests: AtomicU64,
    archive_requests: AtomicU64,
    manifest_requests: AtomicU64,
    webseed_placeholder_requests: AtomicU64,
    rejected_requests: AtomicU64,
    failed_requests: AtomicU64,

    // Acquisition statistics
    acquisitions_started: AtomicU64,
    acquisitions_completed: AtomicU64,
    acquisitions_failed: AtomicU64,

    // Stream statistics
    bytes_to_client: AtomicU64,
    aborted_streams: AtomicU64,

    // Latency statistics (stored as microseconds)
    total_request_duration_us: AtomicU64,
    total_acquisition_duration_us: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub liveness_requests: u64,
    pub listing_requests: u64,
    pub file_requests: u64,
    pub range_requests: u64,
    pub archive_requests: u64,
    pub manifest_requests: u64,
    pub webseed_placeholder_requests: u64,
    pub rejected_requests: u64,
    pub failed_requests: u64,

    pub acquisitions_started: u64,
    pub acquisitions_completed: u64,
    pub acquisitions_failed: u64,

    pub bytes_to_client: u64,
    pub aborted_streams: u64,

    pub total_request_duration_us: u64,
    pub total_acquisition_duration_us: u64,
}

impl GatewayMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request that reached an endpoint handler successfully
    pub fn record_request(&self, kind: RequestKind) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            RequestKind::Liveness => &self.liveness_requests,
            RequestKind::Listing => &self.listing_requests,
            RequestKind::File => &self.file_requests,
            RequestKind::Archive => &self.archive_requests,
            RequestKind::Manifest => &self.manifest_requests,
            RequestKind::WebseedPlaceholder => &self.webseed_placeholder_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a file request answered with 206
    pub fn record_range_request(&self) {
        self.range_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request answered with a 4xx status
    pub fn record_rejected(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request answered with a 5xx status
    pub fn record_failed(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the start of a swarm acquisition
    pub fn record_acquisition_started(&self) {
        self.acquisitions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the end of a swarm acquisition
    ///
    /// # Arguments
    /// * `success` - Whether the resource became ready
    /// * `duration` - Time spent acquiring
    pub fn record_acquisition_finished(&self, success: bool, duration: Duration) {
        if success {
            self.acquisitions_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.acquisitions_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_acquisition_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record bytes handed to the HTTP layer
    pub fn record_bytes_to_client(&self, bytes: u64) {
        self.bytes_to_client.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a response body that ended in an error after headers were sent
    pub fn record_stream_aborted(&self) {
        self.aborted_streams.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time until the response head was ready
    pub fn record_request_duration(&self, duration: Duration) {
        self.total_request_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    ///
    /// Fields are loaded independently, so a snapshot taken under load may
    /// not be perfectly consistent across fields.
    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            liveness_requests: self.liveness_requests.load(Ordering::Relaxed),
            listing_requests: self.listing_requests.load(Ordering::Relaxed),
            file_requests: self.file_requests.load(Ordering::Relaxed),
            range_requests: self.range_requests.load(Ordering::Relaxed),
            archive_requests: self.archive_requests.load(Ordering::Relaxed),
            manifest_requests: self.manifest_requests.load(Ordering::Relaxed),
            webseed_placeholder_requests: self.webseed_placeholder_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            acquisitions_started: self.acquisitions_started.load(Ordering::Relaxed),
            acquisitions_completed: self.acquisitions_completed.load(Ordering::Relaxed),
            acquisitions_failed: self.acquisitions_failed.load(Ordering::Relaxed),
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
            aborted_streams: self.aborted_streams.load(Ordering::Relaxed),
            total_request_duration_us: self.total_request_duration_us.load(Ordering::Relaxed),
            total_acquisition_duration_us: self.total_acquisition_duration_us.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Average time to response head in milliseconds, over every counted request
    pub fn avg_request_duration_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.total_request_duration_us as f64 / self.total_requests as f64) / 1000.0
        }
    }

    /// Average acquisition time in milliseconds, over finished acquisitions
    pub fn avg_acquisition_duration_ms(&self) -> f64 {
        let finished = self.acquisitions_completed + self.acquisitions_failed;
        if finished == 0 {
            0.0
        } else {
            (self.total_acquisition_duration_us as f64 / finished as f64) / 1000.0
        }
    }

    /// Acquisitions started but not yet finished
    pub fn acquisitions_in_flight(&self) -> u64 {
        self.acquisitions_started
            .saturating_sub(self.acquisitions_completed + self.acquisitions_failed)
    }
}
