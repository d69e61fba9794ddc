//! Directory-backed swarm engine
//!
//! Resolves an identifier from files already present under a data directory:
//! the manifest at `{data_dir}/{id}.torrent` and the content it describes at
//! `{data_dir}/{name}` (single-file) or `{data_dir}/{name}/{path...}`
//! (multi-file). This is the engine the binary serves from; a peer-to-peer
//! engine plugs in behind the same traits.

use crate::error::{GatewayError, Result};
use crate::manifest::{ManifestInfo, MANIFEST_EXTENSION};
use crate::models::{ByteRange, ContentId, SwarmStats};
use crate::swarm::{ByteStream, SwarmEngine, SwarmFile, SwarmResource};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

/// Engine serving resources from a local directory
pub struct LocalSwarmEngine {
    data_dir: PathBuf,
    chunk_size: usize,
}

impl LocalSwarmEngine {
    /// Create an engine rooted at `data_dir`, reading `chunk_size` bytes at a time
    pub fn new(data_dir: impl Into<PathBuf>, chunk_size: usize) -> Self {
        LocalSwarmEngine {
            data_dir: data_dir.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Where the manifest for `id` is expected
    pub fn manifest_path(&self, id: &ContentId) -> PathBuf {
        self.data_dir.join(format!("{}.{}", id, MANIFEST_EXTENSION))
    }

    async fn load(&self, id: &ContentId) -> Result<LocalResource> {
        // Identifiers only need to contain a hash; never let the rest reach a path
        if !id.as_str().bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(GatewayError::acquisition_failed(
                id.as_str(),
                "identifier is not a plain hash",
            ));
        }

        let manifest_path = self.manifest_path(id);
        let raw = fs::read(&manifest_path).await.map_err(|e| {
            GatewayError::acquisition_failed(
                id.as_str(),
                format!("cannot read {}: {}", manifest_path.display(), e),
            )
        })?;

        let layout = ManifestInfo::parse(&raw)
            .map_err(|e| GatewayError::acquisition_failed(id.as_str(), e.to_string()))?;

        let mut files: Vec<Arc<dyn SwarmFile>> = Vec::with_capacity(layout.files.len());
        for entry in &layout.files {
            let disk_path = entry
                .path
                .iter()
                .fold(self.data_dir.clone(), |dir, component| dir.join(component));
            check_content(&disk_path, entry.length)
                .await
                .map_err(|e| GatewayError::acquisition_failed(id.as_str(), e.to_string()))?;

            files.push(Arc::new(LocalFile {
                name: entry.name().to_string(),
                path: entry.relative_path(),
                length: entry.length,
                disk_path,
                chunk_size: self.chunk_size,
            }));
        }

        Ok(LocalResource {
            id: id.clone(),
            stats: SwarmStats {
                downloaded: layout.total_length(),
                received: layout.total_length(),
                ..Default::default()
            },
            files,
            manifest: Bytes::from(raw),
        })
    }
}

#[async_trait]
impl SwarmEngine for LocalSwarmEngine {
    async fn acquire(&self, id: &ContentId, trackers: &[String]) -> Result<Arc<dyn SwarmResource>> {
        debug!(
            "Loading {} from {} ({} trackers ignored)",
            id,
            self.data_dir.display(),
            trackers.len()
        );
        let resource = self.load(id).await?;
        info!("Loaded {} with {} files from disk", id, resource.files.len());
        Ok(Arc::new(resource))
    }
}

async fn check_content(path: &Path, length: u64) -> io::Result<()> {
    let metadata = fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        ));
    }
    if metadata.len() != length {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "{} has {} bytes, manifest says {}",
                path.display(),
                metadata.len(),
                length
            ),
        ));
    }
    Ok(())
}

struct LocalResource {
    id: ContentId,
    files: Vec<Arc<dyn SwarmFile>>,
    stats: SwarmStats,
    manifest: Bytes,
}

impl SwarmResource for LocalResource {
    fn id(&self) -> &ContentId {
        &self.id
    }

    fn files(&self) -> &[Arc<dyn SwarmFile>] {
        &self.files
    }

    fn stats(&self) -> SwarmStats {
        self.stats
    }

    fn raw_manifest(&self) -> Bytes {
        self.manifest.clone()
    }
}

struct LocalFile {
    name: String,
    path: String,
    length: u64,
    disk_path: PathBuf,
    chunk_size: usize,
}

#[async_trait]
impl SwarmFile for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn length(&self) -> u64 {
        self.length
    }

    async fn open_stream(&self, range: Option<ByteRange>) -> Result<ByteStream> {
        let (start, remaining) = match range {
            Some(range) if range.end >= self.length => {
                return Err(GatewayError::UnsatisfiableRange(format!(
                    "{}-{} outside {} bytes",
                    range.start, range.end, self.length
                )))
            }
            Some(range) => (range.start, range.size()),
            None => (0, self.length),
        };

        let mut file = File::open(&self.disk_path).await?;
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }

        let chunk_size = self.chunk_size as u64;
        let stream = stream::try_unfold((file, remaining), move |(mut file, remaining)| async move {
            if remaining == 0 {
                return Ok(None);
            }
            let mut buf = vec![0u8; remaining.min(chunk_size) as usize];
            let n = file.read(&mut buf).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file ended with {} bytes still expected", remaining),
                ));
            }
            buf.truncate(n);
            Ok(Some((Bytes::from(buf), (file, remaining - n as u64))))
        });

        Ok(stream.boxed())
    }
}
