//! Header value helpers shared by the streaming endpoints

use http::HeaderValue;
use std::fmt::Write;

/// Informational swarm headers attached to streamed files
pub const X_TORRENT_PEERS: &str = "x-torrent-peers";
pub const X_TORRENT_DOWNLOAD_SPEED: &str = "x-torrent-downloadspeed";
pub const X_TORRENT_UPLOAD_SPEED: &str = "x-torrent-uploadspeed";
pub const X_TORRENT_RECEIVED: &str = "x-torrent-received";
pub const X_TORRENT_DOWNLOADED: &str = "x-torrent-downloaded";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Format a byte count with binary units, e.g. `12.06KB`
///
/// Up to two decimals are kept and trailing zeros are trimmed.
pub fn format_bytes(value: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    let mut unit = 0;
    let mut scaled = value as f64;
    while scaled >= 1024.0 && unit < UNITS.len() - 1 {
        scaled /= 1024.0;
        unit += 1;
    }

    let mut text = format!("{:.2}", scaled);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    text.push_str(UNITS[unit]);
    text
}

/// Format a throughput value, e.g. `1.5MB/sec`
pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/sec", format_bytes(bytes_per_sec))
}

/// Escape text for embedding inside a double-quoted header parameter
///
/// Follows jsesc's default output: quotes and backslashes are
/// backslash-escaped, common controls use their short forms, a NUL not
/// followed by a digit becomes `\0`, other code points below U+0100 become
/// `\xHH`, and anything above becomes `\uXXXX` per UTF-16 unit. Double
/// quotes are escaped as well, so the result is printable ASCII that can
/// neither end the parameter nor split a header line.
pub fn escape_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\0' if !chars.peek().is_some_and(|next| next.is_ascii_digit()) => {
                out.push_str("\\0")
            }
            ' '..='~' => out.push(ch),
            c if (c as u32) <= 0xFF => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04X}", unit);
                }
            }
        }
    }
    out
}

/// Build an `attachment` Content-Disposition value for `filename`
pub fn attachment_disposition(filename: &str) -> HeaderValue {
    let value = format!("attachment; filename=\"{}\"", escape_header_value(filename));
    // Escaped text is printable ASCII, which is always a valid header value.
    HeaderValue::from_str(&value)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Infer a content type from the last extension of `filename`
pub fn content_type_for(filename: &str) -> &'static str {
    let Some((_, extension)) = filename.rsplit_once('.') else {
        return DEFAULT_CONTENT_TYPE;
    };

    match extension.to_ascii_lowercase().as_str() {
        "txt" | "nfo" | "log" => "text/plain; charset=utf-8",
        "srt" => "application/x-subrip",
        "vtt" => "text/vtt; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "application/xml",
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "pdf" => "application/pdf",
        "epub" => "application/epub+zip",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ogv" => "video/ogg",
        "ts" => "video/mp2t",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" | "tgz" => "application/gzip",
        "bz2" => "application/x-bzip2",
        "xz" => "application/x-xz",
        "7z" => "application/x-7z-compressed",
        "rar" => "application/vnd.rar",
        "iso" => "application/x-iso9660-image",
        "torrent" => "application/x-bittorrent",
        _ => DEFAULT_CONTENT_TYPE,
    }
}
