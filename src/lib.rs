//! Swarm Gateway
//!
//! An HTTP gateway that serves the files of peer-to-peer swarm resources to
//! ordinary HTTP clients. A resource is named by a 40-character content
//! identifier; the gateway resolves it through a swarm engine once, keeps it
//! registered for the life of the process, and streams its files on demand.
//!
//! # Features
//!
//! - **Single-flight resolution**: concurrent requests for a new identifier share one acquisition
//! - **Range requests**: single byte ranges are served as `206 Partial Content`
//! - **Whole-resource archives**: a tar stream with an exact, pre-declared `Content-Length`
//! - **Sanitized manifests**: republished with trackers removed, the private flag set,
//!   and this gateway as the only web seed
//! - **Web seed endpoint**: lets swarm clients fetch pieces over HTTP from the gateway
//! - **Metrics**: atomic counters with an optional Prometheus text endpoint
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use swarm_gateway::{GatewayConfig, GatewayMetrics, GatewayServer, LocalSwarmEngine};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_env()?;
//! let engine = Arc::new(LocalSwarmEngine::new(&config.data_dir, config.stream_chunk_size));
//! let server = GatewayServer::new(&config, engine, Arc::new(GatewayMetrics::new()));
//! server.run(config.socket_addr()?).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`ResourceResolver`]: identifier validation and the single-flight registry
//! - [`RangeNegotiator`]: `Range` header parsing against a known length
//! - [`FileStreamer`]: single-file responses
//! - [`ArchiveAssembler`]: sequential tar streaming
//! - [`ManifestSanitizer`]: manifest rewriting
//! - [`GatewayServer`]: routing, request logging, hyper accept loop
//!
//! The swarm itself sits behind the [`SwarmEngine`], [`SwarmResource`] and
//! [`SwarmFile`] traits. [`LocalSwarmEngine`] serves from a directory of
//! manifests and content; [`MemorySwarmEngine`] serves from memory.
//!
//! # HTTP surface
//!
//! | Path | Response |
//! |---|---|
//! | `/` | liveness text |
//! | `/torrent/{id}` | JSON array of file paths |
//! | `/torrent/{id}/{index}` | file stream, ranges supported |
//! | `/torrent/{id}/safefile` | sanitized manifest |
//! | `/torrent/{id}/tar` | tar archive of every file |
//! | `/webseed/{id}` | the only file, or a placeholder for multi-file resources |
//! | `/webseed/{id}/{name}/{filename}` | file stream, looked up by file name |
//!
//! `?dl=0` on streaming endpoints drops the attachment disposition.

pub mod archive;
pub mod body;
pub mod config;
pub mod error;
pub mod file_streamer;
pub mod headers;
pub mod local_swarm;
pub mod manifest;
pub mod memory_swarm;
pub mod metrics;
pub mod metrics_endpoint;
pub mod models;
pub mod range_negotiator;
pub mod resolver;
pub mod server;
pub mod swarm;

// Re-export commonly used types
pub use archive::ArchiveAssembler;
pub use body::GatewayBody;
pub use config::{GatewayConfig, MetricsEndpointConfig};
pub use error::{GatewayError, Result};
pub use file_streamer::FileStreamer;
pub use local_swarm::LocalSwarmEngine;
pub use manifest::{ManifestInfo, ManifestSanitizer};
pub use memory_swarm::{MemoryResource, MemorySwarmEngine};
pub use metrics::{GatewayMetrics, MetricsSnapshot, RequestKind};
pub use metrics_endpoint::MetricsEndpoint;
pub use models::{ByteRange, ContentId, SwarmStats};
pub use range_negotiator::{RangeNegotiator, RangeOutcome};
pub use resolver::{ResourceResolver, ResourceState};
pub use server::GatewayServer;
pub use swarm::{ByteStream, SwarmEngine, SwarmFile, SwarmResource};
