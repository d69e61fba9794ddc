//! Whole-resource tar archives
//!
//! The archive is a GNU tar stream with one regular-file entry per resource
//! file, in resource order, followed by the two zero blocks that end an
//! archive. Every entry is a header, exactly `size` content bytes, then zero
//! padding to the next 512-byte boundary. Headers come from the `tar` crate;
//! paths longer than the name field get a preceding GNU long-name entry.
//!
//! Because every header is computed from path and size alone, the total
//! length is known before any content is read and can be sent as
//! `Content-Length`. Entries are written strictly one after another: a file's
//! stream is fully drained before the next header is emitted.

use crate::body::{self, BodyMode, GatewayBody};
use crate::error::{GatewayError, Result};
use crate::headers::attachment_disposition;
use crate::metrics::GatewayMetrics;
use crate::swarm::{ByteStream, SwarmFile, SwarmResource};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use http::header::{CONNECTION, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Response, StatusCode};
use std::io;
use std::sync::Arc;
use tar::{Builder, EntryType, Header};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Size of one tar block
pub const BLOCK_SIZE: u64 = 512;

/// Two zero blocks terminate an archive
pub const END_OF_ARCHIVE_LEN: u64 = 2 * BLOCK_SIZE;

const FILE_MODE: u32 = 0o644;

static ZERO_BLOCKS: [u8; END_OF_ARCHIVE_LEN as usize] = [0; END_OF_ARCHIVE_LEN as usize];

/// Zero bytes needed after `size` content bytes to reach a block boundary
pub fn padding(size: u64) -> u64 {
    (BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE
}

/// Header bytes for one entry, including a long-name entry when the path needs one
///
/// Fails for paths a tar header cannot carry (absolute or containing `..`).
pub fn entry_header(path: &str, size: u64) -> io::Result<Vec<u8>> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(size);
    header.set_mode(FILE_MODE);
    header.set_uid(0);
    header.set_gid(0);
    // mtime stays 0 so identical resources give identical archives
    header.set_mtime(0);

    // An empty body makes the builder emit only the header blocks
    let mut builder = Builder::new(Vec::with_capacity(BLOCK_SIZE as usize));
    builder.append_data(&mut header, path, io::empty())?;
    // The end-of-archive blocks the builder writes on drop land in the emptied buffer
    Ok(std::mem::take(builder.get_mut()))
}

/// Bytes an entry adds besides its content: headers plus padding
pub fn entry_overhead(path: &str, size: u64) -> io::Result<u64> {
    Ok(entry_header(path, size)?.len() as u64 + padding(size))
}

/// Exact archive length for `files`
pub fn archive_length(files: &[Arc<dyn SwarmFile>]) -> io::Result<u64> {
    files.iter().try_fold(END_OF_ARCHIVE_LEN, |total, f| {
        Ok(total + f.length() + entry_overhead(f.path(), f.length())?)
    })
}

/// Streams a resource as one tar archive
pub struct ArchiveAssembler {
    buffer_chunks: usize,
    metrics: Arc<GatewayMetrics>,
}

impl ArchiveAssembler {
    /// Create an assembler
    ///
    /// # Arguments
    /// * `buffer_chunks` - Chunks buffered between the pipeline and the socket
    /// * `metrics` - Shared metrics collector
    pub fn new(buffer_chunks: usize, metrics: Arc<GatewayMetrics>) -> Self {
        ArchiveAssembler {
            buffer_chunks: buffer_chunks.max(1),
            metrics,
        }
    }

    /// Build the archive response for `resource`
    ///
    /// The head carries the exact `Content-Length` and `Connection: close`.
    /// If a file stream fails later, the body ends early and the connection is
    /// dropped short of the declared length. With `BodyMode::HeadOnly` the
    /// pipeline is not started.
    pub fn respond(&self, resource: Arc<dyn SwarmResource>, mode: BodyMode) -> Result<Response<GatewayBody>> {
        let id = resource.id().clone();
        let length = archive_length(resource.files())?;
        let builder = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_LENGTH, length)
            .header(CONNECTION, "close")
            .header(CONTENT_DISPOSITION, attachment_disposition(&format!("{}.tar", id)))
            .header(CONTENT_TYPE, "application/x-tar");

        if mode == BodyMode::HeadOnly {
            debug!("Archive head for {}: {} bytes", id, length);
            return builder.body(body::empty()).map_err(GatewayError::from);
        }

        info!(
            "Streaming archive for {}: {} files, {} bytes",
            id,
            resource.files().len(),
            length
        );
        let stream = body::metered(self.stream(resource), Arc::clone(&self.metrics), format!("{}.tar", id));
        builder.body(body::streaming(stream)).map_err(GatewayError::from)
    }

    /// The archive bytes of `resource`
    ///
    /// A background task walks the files in order and pushes header, content
    /// and padding through a bounded channel. The task stops as soon as the
    /// receiving side is dropped, releasing the current file stream.
    pub fn stream(&self, resource: Arc<dyn SwarmResource>) -> ByteStream {
        let (tx, rx) = mpsc::channel(self.buffer_chunks);

        tokio::spawn(async move {
            let id = resource.id().clone();
            match write_archive(resource.as_ref(), &tx).await {
                Ok(()) => debug!("Archive for {} complete", id),
                Err(e) if tx.is_closed() => debug!("Archive for {} abandoned by client: {}", id, e),
                Err(e) => {
                    warn!("Archive for {} failed: {}", id, e);
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
    }
}

type ChunkSender = mpsc::Sender<io::Result<Bytes>>;

async fn write_archive(resource: &dyn SwarmResource, tx: &ChunkSender) -> io::Result<()> {
    for file in resource.files() {
        write_entry(file.as_ref(), tx).await?;
    }
    send(tx, Bytes::from_static(&ZERO_BLOCKS)).await
}

async fn write_entry(file: &dyn SwarmFile, tx: &ChunkSender) -> io::Result<()> {
    let size = file.length();
    send(tx, Bytes::from(entry_header(file.path(), size)?)).await?;

    // A stalled swarm read must not outlive the client
    let mut content = tokio::select! {
        opened = file.open_stream(None) => {
            opened.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?
        }
        _ = tx.closed() => return Err(receiver_dropped()),
    };

    let mut written = 0u64;
    loop {
        let next = tokio::select! {
            next = content.next() => next,
            _ = tx.closed() => return Err(receiver_dropped()),
        };
        let Some(chunk) = next else {
            break;
        };

        let chunk = chunk?;
        written += chunk.len() as u64;
        if written > size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} produced more than its {} bytes", file.path(), size),
            ));
        }
        send(tx, chunk).await?;
    }

    if written != size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{} ended after {} of {} bytes", file.path(), written, size),
        ));
    }

    let pad = padding(size) as usize;
    if pad > 0 {
        send(tx, Bytes::from_static(&ZERO_BLOCKS[..pad])).await?;
    }
    Ok(())
}

async fn send(tx: &ChunkSender, chunk: Bytes) -> io::Result<()> {
    tx.send(Ok(chunk)).await.map_err(|_| receiver_dropped())
}

fn receiver_dropped() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "archive receiver dropped")
}
