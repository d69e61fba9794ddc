//! Integration tests for manifest sanitizing
//!
//! The sanitized manifest must decode with a standard reader, carry no
//! trackers, be marked private, advertise only the gateway's web seed, and
//! leave every other field exactly as it was.

use serde_bencode::value::Value;
use std::collections::HashMap;
use swarm_gateway::{ContentId, GatewayError, ManifestInfo, ManifestSanitizer};

const HASH: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";
const ROOT: &str = "https://gateway.example/webseed";

fn bytes(text: &str) -> Value {
    Value::Bytes(text.as_bytes().to_vec())
}

fn dict(entries: Vec<(&str, Value)>) -> Value {
    Value::Dict(
        entries
            .into_iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v))
            .collect(),
    )
}

fn raw_manifest() -> Vec<u8> {
    let files = Value::List(vec![
        dict(vec![
            ("length", Value::Int(1024)),
            ("path", Value::List(vec![bytes("disc1"), bytes("track01.flac")])),
        ]),
        dict(vec![
            ("length", Value::Int(77)),
            ("path", Value::List(vec![bytes("cover.jpg")])),
        ]),
    ]);
    let info = dict(vec![
        ("files", files),
        ("name", bytes("Album")),
        ("piece length", Value::Int(262_144)),
        ("pieces", Value::Bytes(vec![0xAB; 40])),
        ("source", bytes("rip")),
    ]);
    let root = dict(vec![
        ("announce", bytes("udp://tracker.one:6969/announce")),
        (
            "announce-list",
            Value::List(vec![
                Value::List(vec![bytes("udp://tracker.one:6969/announce")]),
                Value::List(vec![bytes("udp://tracker.two:1337/announce")]),
            ]),
        ),
        ("comment", bytes("original comment")),
        ("created by", bytes("mktorrent 1.1")),
        ("creation date", Value::Int(1_600_000_000)),
        ("info", info),
        ("url-list", Value::List(vec![bytes("https://mirror.example/Album")])),
    ]);
    serde_bencode::to_bytes(&root).unwrap()
}

fn decode(raw: &[u8]) -> HashMap<Vec<u8>, Value> {
    match serde_bencode::from_bytes::<Value>(raw).unwrap() {
        Value::Dict(dict) => dict,
        _ => panic!("manifest root is not a dictionary"),
    }
}

fn sanitized() -> Vec<u8> {
    let sanitizer = ManifestSanitizer::new(format!("{}/", ROOT), "Republished by the gateway");
    sanitizer
        .sanitize(&ContentId::parse(HASH).unwrap(), &raw_manifest())
        .unwrap()
}

#[test]
fn test_trackers_are_removed() {
    let out = decode(&sanitized());
    assert!(!out.contains_key(&b"announce"[..]));
    assert!(!out.contains_key(&b"announce-list"[..]));
}

#[test]
fn test_private_flag_and_web_seed() {
    let out = decode(&sanitized());

    let Some(Value::Dict(info)) = out.get(&b"info"[..]) else {
        panic!("info dictionary missing");
    };
    assert!(matches!(info.get(&b"private"[..]), Some(Value::Int(1))));

    let Some(Value::List(urls)) = out.get(&b"url-list"[..]) else {
        panic!("url-list missing");
    };
    assert_eq!(urls.len(), 1);
    assert!(matches!(&urls[0], Value::Bytes(url) if url == format!("{}/{}", ROOT, HASH).as_bytes()));

    assert!(matches!(
        out.get(&b"comment"[..]),
        Some(Value::Bytes(c)) if c == b"Republished by the gateway"
    ));
}

#[test]
fn test_untouched_fields_are_byte_identical() {
    let before = decode(&raw_manifest());
    let after = decode(&sanitized());

    for key in [&b"created by"[..], &b"creation date"[..]] {
        assert_eq!(
            serde_bencode::to_bytes(&before[key]).unwrap(),
            serde_bencode::to_bytes(&after[key]).unwrap(),
            "{}",
            String::from_utf8_lossy(key)
        );
    }

    let (Value::Dict(info_before), Value::Dict(info_after)) = (&before[&b"info"[..]], &after[&b"info"[..]]) else {
        panic!("info dictionary missing");
    };
    for (key, value) in info_before {
        assert_eq!(
            serde_bencode::to_bytes(value).unwrap(),
            serde_bencode::to_bytes(&info_after[key]).unwrap()
        );
    }
    assert_eq!(info_after.len(), info_before.len() + 1);
}

#[test]
fn test_file_layout_survives() {
    let before = ManifestInfo::parse(&raw_manifest()).unwrap();
    let after = ManifestInfo::parse(&sanitized()).unwrap();
    assert_eq!(before, after);
    assert_eq!(after.files[0].relative_path(), "Album/disc1/track01.flac");
    assert_eq!(after.total_length(), 1101);
}

#[test]
fn test_sanitizing_twice_is_stable() {
    let sanitizer = ManifestSanitizer::new(ROOT, "Republished by the gateway");
    let id = ContentId::parse(HASH).unwrap();
    let once = sanitizer.sanitize(&id, &raw_manifest()).unwrap();
    let twice = sanitizer.sanitize(&id, &once).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_garbage_is_a_manifest_error() {
    let sanitizer = ManifestSanitizer::new(ROOT, "c");
    let id = ContentId::parse(HASH).unwrap();
    let result = sanitizer.sanitize(&id, b"this is not bencode");
    assert!(matches!(result, Err(GatewayError::ManifestError(_))));
}
