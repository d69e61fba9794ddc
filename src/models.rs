//! Core data models for the swarm gateway

use crate::error::{GatewayError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Forty alphanumeric characters anywhere in the input.
///
/// The pattern is deliberately unanchored: `xx<40 chars>` is accepted too.
static CONTENT_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new("[A-Za-z0-9]{40}").expect("content id pattern is a valid regex")
});

/// Identifier naming a swarm resource (an info hash in hex form)
///
/// Stored lowercased so that differently-cased spellings of the same hash
/// share one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentId(String);

impl ContentId {
    /// Validate a raw path segment and build a ContentId from it
    ///
    /// # Returns
    /// * `Ok(ContentId)` if 40 alphanumeric characters occur somewhere in `raw`
    /// * `Err(GatewayError::InvalidIdentifier)` otherwise
    pub fn parse(raw: &str) -> Result<Self> {
        if CONTENT_ID_PATTERN.is_match(raw) {
            Ok(ContentId(raw.to_ascii_lowercase()))
        } else {
            Err(GatewayError::InvalidIdentifier(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Represents a validated byte range for HTTP Range requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (inclusive)
    pub end: u64,
}

impl ByteRange {
    /// Create a new ByteRange
    ///
    /// # Arguments
    /// * `start` - Starting byte position (inclusive)
    /// * `end` - Ending byte position (inclusive)
    ///
    /// # Returns
    /// * `Ok(ByteRange)` if the range is valid
    /// * `Err(GatewayError)` if start > end
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(GatewayError::UnsatisfiableRange(format!(
                "start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(ByteRange { start, end })
    }

    /// Get the size of this byte range in bytes
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Format the `Content-Range` value for a resource of `total_length` bytes
    pub fn content_range(&self, total_length: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_length)
    }
}

/// Live counters reported by the swarm for one resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmStats {
    /// Number of connected peers
    pub peers: usize,
    /// Download throughput in bytes per second
    pub download_speed: u64,
    /// Upload throughput in bytes per second
    pub upload_speed: u64,
    /// Total bytes received from peers, including wasted data
    pub received: u64,
    /// Total verified bytes downloaded
    pub downloaded: u64,
}
