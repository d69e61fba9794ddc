//! Interfaces the gateway needs from a swarm engine
//!
//! The engine resolves a [`ContentId`] into a resource made of named, sized,
//! readable files. Everything peer-to-peer lives behind these traits.

use crate::error::Result;
use crate::models::{ByteRange, ContentId, SwarmStats};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;

/// A stream of file content chunks
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Engine that turns content identifiers into ready resources
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Join the swarm for `id` and wait until its file list and manifest are known
    async fn acquire(&self, id: &ContentId, trackers: &[String]) -> Result<Arc<dyn SwarmResource>>;
}

/// A resolved swarm resource
pub trait SwarmResource: Send + Sync {
    fn id(&self) -> &ContentId;

    /// Files in manifest order
    fn files(&self) -> &[Arc<dyn SwarmFile>];

    /// Current peer and throughput counters
    fn stats(&self) -> SwarmStats;

    /// The raw bencoded manifest
    fn raw_manifest(&self) -> Bytes;
}

/// One file inside a swarm resource
#[async_trait]
pub trait SwarmFile: Send + Sync {
    /// Final path component, used for display and web seed lookups
    fn name(&self) -> &str;

    /// Slash-separated path relative to the resource root
    fn path(&self) -> &str;

    /// Length in bytes
    fn length(&self) -> u64;

    /// Open an independent stream over the whole file or over `range`
    ///
    /// Streams never share a read position; dropping one releases its handle.
    async fn open_stream(&self, range: Option<ByteRange>) -> Result<ByteStream>;
}

/// Find the index of the first file whose name equals `name`
pub fn find_file_by_name(resource: &dyn SwarmResource, name: &str) -> Option<usize> {
    resource.files().iter().position(|file| file.name() == name)
}
