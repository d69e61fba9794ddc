//! Manifest (`.torrent`) handling
//!
//! Two jobs live here:
//! - [`ManifestSanitizer`] rewrites a raw manifest for republication: trackers
//!   removed, `info.private` set, `url-list` pointed at this gateway's web seed,
//!   and a fixed comment. Every other key survives untouched; bencode
//!   dictionaries are always re-emitted with keys in byte order.
//! - [`ManifestInfo::parse`] extracts the file layout, used by engines that
//!   need to know which files a manifest describes.

use crate::error::{GatewayError, Result};
use crate::models::ContentId;
use serde::Deserialize;
use serde_bencode::value::Value;
use tracing::debug;

/// File extension for manifests
pub const MANIFEST_EXTENSION: &str = "torrent";

/// Content type for manifests
pub const MANIFEST_CONTENT_TYPE: &str = "application/x-bittorrent";

const ANNOUNCE: &[u8] = b"announce";
const ANNOUNCE_LIST: &[u8] = b"announce-list";
const INFO: &[u8] = b"info";
const PRIVATE: &[u8] = b"private";
const URL_LIST: &[u8] = b"url-list";
const COMMENT: &[u8] = b"comment";

/// Rewrites manifests so they point at the gateway instead of the original swarm
#[derive(Debug, Clone)]
pub struct ManifestSanitizer {
    webseed_root: String,
    comment: String,
}

impl ManifestSanitizer {
    /// Create a sanitizer
    ///
    /// # Arguments
    /// * `webseed_root` - Base URL of the gateway's `/webseed` endpoint
    /// * `comment` - Comment written into every sanitized manifest
    pub fn new(webseed_root: impl Into<String>, comment: impl Into<String>) -> Self {
        let webseed_root = webseed_root.into();
        ManifestSanitizer {
            webseed_root: webseed_root.trim_end_matches('/').to_string(),
            comment: comment.into(),
        }
    }

    /// The web seed URL advertised for `id`
    pub fn webseed_url(&self, id: &ContentId) -> String {
        format!("{}/{}", self.webseed_root, id)
    }

    /// Suggested download filename for the sanitized manifest of `id`
    pub fn filename(id: &ContentId) -> String {
        format!("{}.{}", id, MANIFEST_EXTENSION)
    }

    /// Decode `raw`, apply the rewrite and re-encode it
    ///
    /// # Returns
    /// * `Ok(bytes)` with the sanitized manifest
    /// * `Err(GatewayError::ManifestError)` if `raw` is not a bencoded
    ///   dictionary with an `info` dictionary
    pub fn sanitize(&self, id: &ContentId, raw: &[u8]) -> Result<Vec<u8>> {
        let mut root: Value = serde_bencode::from_bytes(raw)?;

        let Value::Dict(dict) = &mut root else {
            return Err(GatewayError::ManifestError(
                "manifest root is not a dictionary".to_string(),
            ));
        };

        match dict.get_mut(INFO) {
            Some(Value::Dict(info)) => {
                info.insert(PRIVATE.to_vec(), Value::Int(1));
            }
            _ => {
                return Err(GatewayError::ManifestError(
                    "manifest has no info dictionary".to_string(),
                ))
            }
        }

        let removed = dict.remove(ANNOUNCE).is_some() as usize
            + dict.remove(ANNOUNCE_LIST).is_some() as usize;

        let url = self.webseed_url(id);
        dict.insert(
            URL_LIST.to_vec(),
            Value::List(vec![Value::Bytes(url.clone().into_bytes())]),
        );
        dict.insert(COMMENT.to_vec(), Value::Bytes(self.comment.clone().into_bytes()));

        let encoded = serde_bencode::to_bytes(&root)?;
        debug!(
            "Sanitized manifest for {}: removed {} tracker keys, web seed {}, {} -> {} bytes",
            id,
            removed,
            url,
            raw.len(),
            encoded.len()
        );
        Ok(encoded)
    }
}

/// One file entry described by a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    /// Path components relative to the resource root
    pub path: Vec<String>,
    pub length: u64,
}

impl ManifestFile {
    /// Slash-joined relative path
    pub fn relative_path(&self) -> String {
        self.path.join("/")
    }

    /// Final path component
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }
}

/// File layout described by a manifest's info dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestInfo {
    /// Suggested root name (file name for single-file resources)
    pub name: String,
    /// True when the manifest uses the multi-file `files` list
    pub multi_file: bool,
    /// Files in manifest order; paths include `name` as first component
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    info: RawInfo,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    name: String,
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    length: u64,
    path: Vec<String>,
}

impl ManifestInfo {
    /// Parse the file layout from raw manifest bytes
    ///
    /// Path components are rejected if they are empty, `.`, `..` or contain a
    /// separator, so a layout can always be joined safely under a root directory.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let manifest: RawManifest = serde_bencode::from_bytes(raw)?;
        let info = manifest.info;
        check_component(&info.name)?;

        let (multi_file, files) = match (info.files, info.length) {
            (Some(files), _) => {
                let mut entries = Vec::with_capacity(files.len());
                for file in files {
                    if file.path.is_empty() {
                        return Err(GatewayError::ManifestError(
                            "file entry with empty path".to_string(),
                        ));
                    }
                    for component in &file.path {
                        check_component(component)?;
                    }
                    let mut path = Vec::with_capacity(file.path.len() + 1);
                    path.push(info.name.clone());
                    path.extend(file.path);
                    entries.push(ManifestFile {
                        path,
                        length: file.length,
                    });
                }
                (true, entries)
            }
            (None, Some(length)) => (
                false,
                vec![ManifestFile {
                    path: vec![info.name.clone()],
                    length,
                }],
            ),
            (None, None) => {
                return Err(GatewayError::ManifestError(
                    "info dictionary has neither length nor files".to_string(),
                ))
            }
        };

        Ok(ManifestInfo {
            name: info.name,
            multi_file,
            files,
        })
    }

    /// Total content length
    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|f| f.length).sum()
    }
}

fn check_component(component: &str) -> Result<()> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains('/')
        || component.contains('\\')
    {
        return Err(GatewayError::ManifestError(format!(
            "unsafe path component {:?}",
            component
        )));
    }
    Ok(())
}
