//! In-memory swarm engine
//!
//! Serves resources registered up front from memory. Useful for embedding the
//! gateway in tests and for exercising the HTTP layer without a network.
//! Supports an artificial acquisition delay, an acquisition counter, and
//! failures or stalls injected part-way through a file stream.

use crate::error::{GatewayError, Result};
use crate::models::{ByteRange, ContentId, SwarmStats};
use crate::swarm::{ByteStream, SwarmEngine, SwarmFile, SwarmResource};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future;
use futures::stream::{self, StreamExt};
use serde_bencode::value::Value;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
const PIECE_LENGTH: u64 = 16 * 1024;

/// Engine that resolves identifiers from an in-memory table
#[derive(Default)]
pub struct MemorySwarmEngine {
    resources: Mutex<HashMap<ContentId, MemoryResource>>,
    acquisitions: AtomicUsize,
    acquire_delay: Mutex<Option<Duration>>,
}

impl MemorySwarmEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resource` under `id`, replacing any previous registration
    pub fn insert(&self, id: ContentId, resource: MemoryResource) {
        self.resources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, resource);
    }

    /// Delay every acquisition by `delay`
    pub fn set_acquire_delay(&self, delay: Duration) {
        *self.acquire_delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    /// Number of acquisitions started so far
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwarmEngine for MemorySwarmEngine {
    async fn acquire(&self, id: &ContentId, trackers: &[String]) -> Result<Arc<dyn SwarmResource>> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        debug!("Memory engine acquiring {} ({} trackers)", id, trackers.len());

        let delay = *self.acquire_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let resource = self
            .resources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::acquisition_failed(id.as_str(), "unknown resource"))?;

        Ok(Arc::new(LoadedResource {
            id: id.clone(),
            resource,
        }))
    }
}

/// A resource template held by [`MemorySwarmEngine`]
#[derive(Clone)]
pub struct MemoryResource {
    files: Vec<Arc<dyn SwarmFile>>,
    memory_files: Vec<Arc<MemoryFile>>,
    stats: SwarmStats,
    manifest: Bytes,
}

impl MemoryResource {
    /// Start building a resource whose multi-file root is `name`
    pub fn builder(name: impl Into<String>) -> MemoryResourceBuilder {
        MemoryResourceBuilder {
            name: name.into(),
            files: Vec::new(),
            stats: SwarmStats::default(),
            trackers: vec!["udp://tracker.example:6969/announce".to_string()],
            manifest: None,
        }
    }

    /// Streams currently open across all files of this resource
    pub fn open_streams(&self) -> usize {
        self.memory_files.iter().map(|f| f.open_streams()).sum()
    }
}

struct LoadedResource {
    id: ContentId,
    resource: MemoryResource,
}

impl SwarmResource for LoadedResource {
    fn id(&self) -> &ContentId {
        &self.id
    }

    fn files(&self) -> &[Arc<dyn SwarmFile>] {
        &self.resource.files
    }

    fn stats(&self) -> SwarmStats {
        self.resource.stats
    }

    fn raw_manifest(&self) -> Bytes {
        self.resource.manifest.clone()
    }
}

/// Builder for [`MemoryResource`]
///
/// A single file whose path has no `/` produces a single-file manifest named
/// after the file; anything else produces a multi-file manifest rooted at the
/// builder name, and file paths are prefixed with it.
pub struct MemoryResourceBuilder {
    name: String,
    files: Vec<PendingFile>,
    stats: SwarmStats,
    trackers: Vec<String>,
    manifest: Option<Bytes>,
}

struct PendingFile {
    path: String,
    data: Bytes,
    chunk_size: usize,
    fail_after: Option<u64>,
    stall_after: Option<u64>,
}

impl MemoryResourceBuilder {
    /// Add a file at `path` (slash-separated, relative to the root)
    pub fn file(mut self, path: impl Into<String>, data: Bytes) -> Self {
        self.files.push(PendingFile {
            path: path.into(),
            data,
            chunk_size: DEFAULT_CHUNK_SIZE,
            fail_after: None,
            stall_after: None,
        });
        self
    }

    /// Add a file whose streams fail once `fail_after` bytes were produced
    pub fn failing_file(mut self, path: impl Into<String>, data: Bytes, fail_after: u64) -> Self {
        self.files.push(PendingFile {
            path: path.into(),
            data,
            chunk_size: DEFAULT_CHUNK_SIZE,
            fail_after: Some(fail_after),
            stall_after: None,
        });
        self
    }

    /// Add a file whose streams stop making progress once `stall_after` bytes were produced
    pub fn stalling_file(mut self, path: impl Into<String>, data: Bytes, stall_after: u64) -> Self {
        self.files.push(PendingFile {
            path: path.into(),
            data,
            chunk_size: DEFAULT_CHUNK_SIZE,
            fail_after: None,
            stall_after: Some(stall_after),
        });
        self
    }

    /// Stream chunk size for all files added so far
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        for file in &mut self.files {
            file.chunk_size = chunk_size.max(1);
        }
        self
    }

    /// Swarm counters reported by the resource
    pub fn stats(mut self, stats: SwarmStats) -> Self {
        self.stats = stats;
        self
    }

    /// Trackers written into the generated manifest
    pub fn trackers(mut self, trackers: Vec<String>) -> Self {
        self.trackers = trackers;
        self
    }

    /// Use `manifest` verbatim instead of generating one
    pub fn manifest(mut self, manifest: Bytes) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn build(self) -> MemoryResource {
        let single = self.files.len() == 1 && !self.files[0].path.contains('/');
        let root = if single {
            self.files[0].path.clone()
        } else {
            self.name.clone()
        };

        let manifest = match self.manifest.clone() {
            Some(manifest) => manifest,
            None => Bytes::from(self.encode_manifest(&root, single)),
        };

        let memory_files: Vec<Arc<MemoryFile>> = self
            .files
            .into_iter()
            .map(|pending| {
                let path = if single {
                    pending.path
                } else {
                    format!("{}/{}", root, pending.path)
                };
                let name = path.rsplit('/').next().unwrap_or_default().to_string();
                Arc::new(MemoryFile {
                    name,
                    path,
                    data: pending.data,
                    chunk_size: pending.chunk_size,
                    fail_after: pending.fail_after,
                    stall_after: pending.stall_after,
                    open_streams: Arc::new(AtomicUsize::new(0)),
                })
            })
            .collect();
        let files = memory_files
            .iter()
            .map(|f| Arc::clone(f) as Arc<dyn SwarmFile>)
            .collect();

        MemoryResource {
            files,
            memory_files,
            stats: self.stats,
            manifest,
        }
    }

    fn encode_manifest(&self, root: &str, single: bool) -> Vec<u8> {
        let total: u64 = self.files.iter().map(|f| f.data.len() as u64).sum();
        let pieces = total.div_ceil(PIECE_LENGTH).max(1) as usize;

        let mut info = HashMap::new();
        info.insert(b"name".to_vec(), Value::Bytes(root.as_bytes().to_vec()));
        info.insert(b"piece length".to_vec(), Value::Int(PIECE_LENGTH as i64));
        info.insert(b"pieces".to_vec(), Value::Bytes(vec![0u8; pieces * 20]));
        if single {
            info.insert(b"length".to_vec(), Value::Int(self.files[0].data.len() as i64));
        } else {
            let files = self
                .files
                .iter()
                .map(|f| {
                    let mut entry = HashMap::new();
                    entry.insert(b"length".to_vec(), Value::Int(f.data.len() as i64));
                    entry.insert(
                        b"path".to_vec(),
                        Value::List(
                            f.path
                                .split('/')
                                .map(|c| Value::Bytes(c.as_bytes().to_vec()))
                                .collect(),
                        ),
                    );
                    Value::Dict(entry)
                })
                .collect();
            info.insert(b"files".to_vec(), Value::List(files));
        }

        let mut root_dict = HashMap::new();
        if let Some(first) = self.trackers.first() {
            root_dict.insert(b"announce".to_vec(), Value::Bytes(first.as_bytes().to_vec()));
            root_dict.insert(
                b"announce-list".to_vec(),
                Value::List(
                    self.trackers
                        .iter()
                        .map(|t| Value::List(vec![Value::Bytes(t.as_bytes().to_vec())]))
                        .collect(),
                ),
            );
        }
        root_dict.insert(b"created by".to_vec(), Value::Bytes(b"swarm-gateway".to_vec()));
        root_dict.insert(b"info".to_vec(), Value::Dict(info));

        // Encoding an in-memory Value tree cannot fail.
        serde_bencode::to_bytes(&Value::Dict(root_dict)).unwrap_or_default()
    }
}

/// A file held in memory
pub struct MemoryFile {
    name: String,
    path: String,
    data: Bytes,
    chunk_size: usize,
    fail_after: Option<u64>,
    stall_after: Option<u64>,
    open_streams: Arc<AtomicUsize>,
}

impl MemoryFile {
    /// Streams opened on this file that have not been dropped yet
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

/// Decrements the owning file's open stream count when dropped
struct StreamGuard(Arc<AtomicUsize>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct StreamState {
    data: Bytes,
    offset: usize,
    produced: u64,
    chunk_size: usize,
    fail_after: Option<u64>,
    stall_after: Option<u64>,
    failed: bool,
    _guard: StreamGuard,
}

#[async_trait]
impl SwarmFile for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    async fn open_stream(&self, range: Option<ByteRange>) -> Result<ByteStream> {
        let data = match range {
            Some(range) => {
                if range.end >= self.length() {
                    return Err(GatewayError::UnsatisfiableRange(format!(
                        "{}-{} outside {} bytes",
                        range.start,
                        range.end,
                        self.length()
                    )));
                }
                self.data.slice(range.start as usize..=range.end as usize)
            }
            None => self.data.clone(),
        };

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        let state = StreamState {
            data,
            offset: 0,
            produced: 0,
            chunk_size: self.chunk_size,
            fail_after: self.fail_after,
            stall_after: self.stall_after,
            failed: false,
            _guard: StreamGuard(Arc::clone(&self.open_streams)),
        };

        let stream = stream::unfold(state, |mut state| async move {
            if state.failed || state.offset >= state.data.len() {
                return None;
            }

            let mut take = state.chunk_size.min(state.data.len() - state.offset);
            if let Some(limit) = state.fail_after {
                if state.produced >= limit {
                    state.failed = true;
                    let err = io::Error::new(io::ErrorKind::ConnectionReset, "injected stream failure");
                    return Some((Err(err), state));
                }
                take = take.min((limit - state.produced) as usize);
            }
            if let Some(limit) = state.stall_after {
                if state.produced >= limit {
                    // Holds the stream, and its guard, until the consumer drops it
                    future::pending::<()>().await;
                }
                take = take.min((limit - state.produced) as usize);
            }

            let chunk = state.data.slice(state.offset..state.offset + take);
            state.offset += take;
            state.produced += take as u64;
            Some((Ok(chunk), state))
        });

        Ok(stream.boxed())
    }
}
