//! Response body type shared by every gateway endpoint

use crate::metrics::GatewayMetrics;
use crate::swarm::ByteStream;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use http::Method;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use std::io;
use std::sync::Arc;
use tracing::warn;

/// Body of every gateway response
///
/// A body error after the head was written makes hyper abort the connection,
/// which is how mid-stream swarm failures reach the client.
pub type GatewayBody = UnsyncBoxBody<Bytes, io::Error>;

/// Whether a response carries content or only its head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Content follows the head (GET)
    Full,
    /// Head only (HEAD): the same status and headers, and no content
    /// stream is ever opened
    HeadOnly,
}

impl BodyMode {
    /// Mode for a request method; `None` for methods the gateway does not serve
    pub fn for_method(method: &Method) -> Option<BodyMode> {
        if *method == Method::GET {
            Some(BodyMode::Full)
        } else if *method == Method::HEAD {
            Some(BodyMode::HeadOnly)
        } else {
            None
        }
    }
}

/// A body with fixed content
pub fn full(data: impl Into<Bytes>) -> GatewayBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed_unsync()
}

/// A body without content
pub fn empty() -> GatewayBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

/// A body fed from a byte stream
pub fn streaming(stream: ByteStream) -> GatewayBody {
    StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync()
}

/// Count bytes passing through `stream` and note when it ends in an error
pub fn metered(stream: ByteStream, metrics: Arc<GatewayMetrics>, label: String) -> ByteStream {
    stream
        .inspect(move |item| match item {
            Ok(chunk) => metrics.record_bytes_to_client(chunk.len() as u64),
            Err(e) => {
                metrics.record_stream_aborted();
                warn!("Stream for {} aborted mid-transfer: {}", label, e);
            }
        })
        .boxed()
}
