//! Integration tests for the HTTP routing table
//!
//! Requests go straight through `GatewayServer::handle`, backed by the
//! in-memory engine, so every status, header and body can be inspected
//! without a socket.

use bytes::Bytes;
use futures::StreamExt;
use http::header::{
    ACCEPT_RANGES, ALLOW, CONNECTION, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
    RANGE,
};
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use serde_bencode::value::Value;
use std::sync::Arc;
use std::time::Duration;
use swarm_gateway::archive::archive_length;
use swarm_gateway::{
    ContentId, GatewayBody, GatewayConfig, GatewayMetrics, GatewayServer, MemoryResource,
    MemorySwarmEngine, SwarmEngine,
};

const SINGLE: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";
const MULTI: &str = "0123456789abcdef0123456789abcdef01234567";
const FAILING: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

fn pattern(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

struct Harness {
    server: GatewayServer,
    engine: Arc<MemorySwarmEngine>,
    multi: MemoryResource,
    failing: MemoryResource,
}

fn harness() -> Harness {
    let engine = MemorySwarmEngine::new();

    let single = MemoryResource::builder("ignored")
        .file("clip.mp4", pattern(1000))
        .chunk_size(128)
        .build();
    let multi = MemoryResource::builder("Season 1")
        .file("episode 1.mkv", pattern(700))
        .file("extras/notes.txt", Bytes::from_static(b"behind the scenes"))
        .file("episode 2.mkv", pattern(513))
        .chunk_size(100)
        .build();
    let failing = MemoryResource::builder("broken")
        .file("ok.bin", pattern(600))
        .failing_file("bad.bin", pattern(5000), 1200)
        .file("never.bin", pattern(10))
        .chunk_size(256)
        .build();

    engine.insert(ContentId::parse(SINGLE).unwrap(), single);
    engine.insert(ContentId::parse(MULTI).unwrap(), multi.clone());
    engine.insert(ContentId::parse(FAILING).unwrap(), failing.clone());
    let engine = Arc::new(engine);

    let config = GatewayConfig {
        webseed_root: "https://gw.example/webseed".to_string(),
        archive_buffer_chunks: 2,
        ..Default::default()
    };
    let server = GatewayServer::new(&config, Arc::clone(&engine) as _, Arc::new(GatewayMetrics::new()));

    Harness {
        server,
        engine,
        multi,
        failing,
    }
}

async fn get(server: &GatewayServer, uri: &str) -> Response<GatewayBody> {
    server
        .handle(Request::builder().uri(uri).body(()).unwrap())
        .await
}

async fn get_range(server: &GatewayServer, uri: &str, range: &str) -> Response<GatewayBody> {
    server
        .handle(Request::builder().uri(uri).header(RANGE, range).body(()).unwrap())
        .await
}

async fn head(server: &GatewayServer, uri: &str) -> Response<GatewayBody> {
    server
        .handle(Request::builder().method(Method::HEAD).uri(uri).body(()).unwrap())
        .await
}

async fn body(response: Response<GatewayBody>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

#[tokio::test]
async fn test_liveness() {
    let h = harness();
    let response = get(&h.server, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!body(response).await.is_empty());
}

#[tokio::test]
async fn test_invalid_identifier_is_404_without_acquisition() {
    let h = harness();
    for uri in [
        "/torrent/abc",
        "/torrent/abc/0",
        "/torrent/abc/safefile",
        "/torrent/abc/tar",
        "/webseed/abc",
        "/webseed/abc/name/file.txt",
        "/torrent/c12fe1c06bba254a9dc9f519b335aa7c1367a88/0",
    ] {
        let response = get(&h.server, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        assert!(body(response).await.is_empty());
    }
    assert_eq!(h.engine.acquisitions(), 0);
}

#[tokio::test]
async fn test_identifier_match_is_unanchored() {
    let h = harness();
    let response = get(&h.server, &format!("/torrent/xx{}yy/0", SINGLE)).await;
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_path_and_method() {
    let h = harness();
    assert_eq!(get(&h.server, "/favicon.ico").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        get(&h.server, &format!("/torrent/{}/zip", SINGLE)).await.status(),
        StatusCode::NOT_FOUND
    );

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/torrent/{}", SINGLE))
        .body(())
        .unwrap();
    let response = h.server.handle(request).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[ALLOW], "GET, HEAD");
    assert_eq!(h.engine.acquisitions(), 0);
}

#[tokio::test]
async fn test_listing() {
    let h = harness();
    let response = get(&h.server, &format!("/torrent/{}", MULTI)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[CONTENT_TYPE].to_str().unwrap().starts_with("application/json"));

    let paths: Vec<String> = serde_json::from_slice(&body(response).await).unwrap();
    assert_eq!(
        paths,
        vec![
            "Season 1/episode 1.mkv",
            "Season 1/extras/notes.txt",
            "Season 1/episode 2.mkv"
        ]
    );
}

#[tokio::test]
async fn test_full_file() {
    let h = harness();
    let response = get(&h.server, &format!("/torrent/{}/0", SINGLE)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_LENGTH], "1000");
    assert_eq!(response.headers()[ACCEPT_RANGES], "bytes");
    assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
    assert_eq!(response.headers()[CONTENT_DISPOSITION], "attachment; filename=\"clip.mp4\"");
    for name in [
        "x-torrent-peers",
        "x-torrent-downloadspeed",
        "x-torrent-uploadspeed",
        "x-torrent-received",
        "x-torrent-downloaded",
    ] {
        assert!(response.headers().contains_key(name), "{}", name);
    }
    assert_eq!(body(response).await, pattern(1000));
}

#[tokio::test]
async fn test_range_request() {
    let h = harness();
    let response = get_range(&h.server, &format!("/torrent/{}/0", SINGLE), "bytes=0-99").await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes 0-99/1000");
    assert_eq!(response.headers()[CONTENT_LENGTH], "100");
    assert_eq!(body(response).await, pattern(1000).slice(0..100));

    let response = get_range(&h.server, &format!("/torrent/{}/0", SINGLE), "bytes=900-").await;
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes 900-999/1000");
    assert_eq!(body(response).await, pattern(1000).slice(900..));
}

#[tokio::test]
async fn test_range_rejections() {
    let h = harness();
    let uri = format!("/torrent/{}/0", SINGLE);

    let response = get_range(&h.server, &uri, "bytes=1000-100").await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert!(body(response).await.is_empty());

    let response = get_range(&h.server, &uri, "bytes=0-1,5-9").await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);

    let response = get_range(&h.server, &uri, "items=0-1").await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);

    let response = get_range(&h.server, &uri, "bytes=abc").await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);

    let response = get_range(&h.server, &uri, "bytes=-5000").await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes */1000");

    let response = get_range(&h.server, &uri, "bytes 0-5").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body(response).await.is_empty());
}

#[tokio::test]
async fn test_bare_start_range_is_open_ended() {
    let h = harness();
    let response = get_range(&h.server, &format!("/torrent/{}/0", SINGLE), "bytes=5").await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes 5-999/1000");
    assert_eq!(body(response).await, pattern(1000).slice(5..));
}

#[tokio::test]
async fn test_index_out_of_range() {
    let h = harness();
    assert_eq!(
        get(&h.server, &format!("/torrent/{}/3", MULTI)).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        get(&h.server, &format!("/torrent/{}/184467440737095516160", MULTI))
            .await
            .status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_inline_display() {
    let h = harness();
    let response = get(&h.server, &format!("/torrent/{}/1?dl=0", MULTI)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(CONTENT_DISPOSITION).is_none());
    assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
    assert_eq!(body(response).await, Bytes::from_static(b"behind the scenes"));
}

#[tokio::test]
async fn test_webseed_single_file_matches_torrent_route() {
    let h = harness();
    let via_webseed = get(&h.server, &format!("/webseed/{}", SINGLE)).await;
    let via_torrent = get(&h.server, &format!("/torrent/{}/0", SINGLE)).await;

    assert_eq!(via_webseed.status(), via_torrent.status());
    assert_eq!(
        via_webseed.headers()[CONTENT_LENGTH],
        via_torrent.headers()[CONTENT_LENGTH]
    );
    assert_eq!(body(via_webseed).await, body(via_torrent).await);
}

#[tokio::test]
async fn test_webseed_multi_file_placeholder() {
    let h = harness();
    let response = get(&h.server, &format!("/webseed/{}", MULTI)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(ACCEPT_RANGES).is_none());
    assert_eq!(body(response).await, Bytes::from_static(b"Torrent web seed"));
}

#[tokio::test]
async fn test_webseed_file_lookup() {
    let h = harness();
    let response = get_range(
        &h.server,
        &format!("/webseed/{}/Season%201/notes.txt", MULTI),
        "bytes=0-5",
    )
    .await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body(response).await, Bytes::from_static(b"behind"));

    let response = get(&h.server, &format!("/webseed/{}/Season%201/episode%202.mkv", MULTI)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await, pattern(513));

    let response = get(&h.server, &format!("/webseed/{}/Season%201/missing.mkv", MULTI)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_safe_manifest() {
    let h = harness();
    let response = get(&h.server, &format!("/torrent/{}/safefile", MULTI)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/x-bittorrent");
    assert_eq!(
        response.headers()[CONTENT_DISPOSITION],
        format!("attachment; filename=\"{}.torrent\"", MULTI).as_str()
    );

    let Value::Dict(root) = serde_bencode::from_bytes::<Value>(&body(response).await).unwrap() else {
        panic!("manifest root is not a dictionary");
    };
    assert!(!root.contains_key(&b"announce-list"[..]));
    let Some(Value::List(urls)) = root.get(&b"url-list"[..]) else {
        panic!("url-list missing");
    };
    assert!(matches!(
        &urls[..],
        [Value::Bytes(url)] if url == format!("https://gw.example/webseed/{}", MULTI).as_bytes()
    ));
}

#[tokio::test]
async fn test_archive() {
    let h = harness();
    let response = get(&h.server, &format!("/torrent/{}/tar", MULTI)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONNECTION], "close");
    assert_eq!(response.headers()[CONTENT_TYPE], "application/x-tar");
    assert_eq!(
        response.headers()[CONTENT_DISPOSITION],
        format!("attachment; filename=\"{}.tar\"", MULTI).as_str()
    );

    let id = ContentId::parse(MULTI).unwrap();
    let resource = h.engine.acquire(&id, &[]).await.unwrap();
    let declared: u64 = response.headers()[CONTENT_LENGTH].to_str().unwrap().parse().unwrap();
    assert_eq!(declared, archive_length(resource.files()).unwrap());

    let archive = body(response).await;
    assert_eq!(archive.len() as u64, declared);

    // Entries in order, each header followed by its whole content
    let first = &archive[..512];
    assert_eq!(&first[..22], b"Season 1/episode 1.mkv");
    assert_eq!(&archive[512..512 + 700], &pattern(700)[..]);
    let second = &archive[512 + 1024..512 + 1024 + 512];
    assert_eq!(&second[..25], b"Season 1/extras/notes.txt");
    assert_eq!(&archive[2048..2048 + 17], b"behind the scenes");
    let third = &archive[2560..3072];
    assert_eq!(&third[..22], b"Season 1/episode 2.mkv");

    assert_eq!(h.multi.open_streams(), 0);
}

#[tokio::test]
async fn test_archive_failure_truncates_body() {
    let h = harness();
    let response = get(&h.server, &format!("/torrent/{}/tar", FAILING)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let declared: usize = response.headers()[CONTENT_LENGTH].to_str().unwrap().parse().unwrap();

    let mut stream = response.into_body().into_data_stream();
    let mut received = 0usize;
    let mut failed = false;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(data) => received += data.len(),
            Err(_) => {
                failed = true;
                break;
            }
        }
    }

    assert!(failed);
    assert!(received < declared);
    // ok.bin entry plus the part of bad.bin delivered before the failure
    assert_eq!(received, 512 + 1024 + 512 + 1200);
}

#[tokio::test]
async fn test_dropped_body_releases_streams() {
    let h = harness();
    let response = get(&h.server, &format!("/torrent/{}/0", MULTI)).await;
    assert_eq!(h.multi.open_streams(), 1);

    let mut stream = response.into_body().into_data_stream();
    let _ = stream.next().await;
    drop(stream);
    assert_eq!(h.multi.open_streams(), 0);

    let response = get(&h.server, &format!("/torrent/{}/tar", FAILING)).await;
    let mut stream = response.into_body().into_data_stream();
    let _ = stream.next().await;
    drop(stream);

    // The archive pipeline notices the closed channel on its next send
    for _ in 0..50 {
        if h.failing.open_streams() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.failing.open_streams(), 0);
}

#[tokio::test]
async fn test_metrics_follow_requests() {
    let h = harness();
    let _ = get(&h.server, &format!("/torrent/{}", MULTI)).await;
    let _ = get_range(&h.server, &format!("/torrent/{}/0", SINGLE), "bytes=0-9").await;
    let _ = get(&h.server, "/torrent/nope").await;

    let stats = h.server.metrics().get_stats();
    assert_eq!(stats.listing_requests, 1);
    assert_eq!(stats.file_requests, 1);
    assert_eq!(stats.range_requests, 1);
    assert_eq!(stats.rejected_requests, 1);
    assert_eq!(stats.acquisitions_completed, 2);
}

#[tokio::test]
async fn test_head_matches_get_without_body() {
    let h = harness();

    let response = head(&h.server, &format!("/torrent/{}/0", SINGLE)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_LENGTH], "1000");
    assert_eq!(response.headers()[ACCEPT_RANGES], "bytes");
    assert!(body(response).await.is_empty());

    let response = head(&h.server, &format!("/torrent/{}/tar", MULTI)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/x-tar");
    let id = ContentId::parse(MULTI).unwrap();
    let resource = h.engine.acquire(&id, &[]).await.unwrap();
    let declared: u64 = response.headers()[CONTENT_LENGTH].to_str().unwrap().parse().unwrap();
    assert_eq!(declared, archive_length(resource.files()).unwrap());
    assert_eq!(h.multi.open_streams(), 0);
    assert!(body(response).await.is_empty());
    assert_eq!(h.multi.open_streams(), 0);

    let response = head(&h.server, &format!("/torrent/{}", MULTI)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(CONTENT_TYPE));
    assert!(body(response).await.is_empty());
}

#[tokio::test]
async fn test_head_keeps_error_status() {
    let h = harness();
    let response = head(&h.server, &format!("/torrent/{}/9", SINGLE)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body(response).await.is_empty());
}

#[tokio::test]
async fn test_server_errors_count_towards_totals() {
    let h = harness();
    let _ = get(&h.server, "/").await;
    let response = get(&h.server, "/torrent/bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let stats = h.server.metrics().get_stats();
    assert_eq!(stats.liveness_requests, 1);
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(stats.total_requests, 2);
}
