//! Project file model and path resolution.
//!
//! The editor owns the file collection; the assembler only reads it.
//! A `ProjectFile` with a `url` is addressable as a direct network
//! resource (media blob); one without a `url` carries textual `content`
//! that must be inlined or blob-encoded into the assembled document.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// One file of the sketch project.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ProjectFile {
    pub fn new(id: &str, name: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            url: None,
        }
    }

    pub fn with_url(id: &str, name: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            content: String::new(),
            url: Some(url.to_string()),
        }
    }

    /// File name minus its final extension (`sketch.js` → `sketch`).
    pub fn stem(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.name)
    }
}

/// Resolve a textual path against the file collection.
///
/// The candidate is normalized (leading `./`, `../` and `/` segments
/// stripped), then matched exactly against file names; failing that, a
/// basename match is accepted. No match resolves to `None` — absence,
/// not an error. Idempotent and side-effect-free.
pub fn resolve_path_to_file<'a>(path: &str, files: &'a [ProjectFile]) -> Option<&'a ProjectFile> {
    let normalized = normalize_path(path);
    if normalized.is_empty() {
        return None;
    }

    if let Some(found) = files.iter().find(|f| f.name == normalized) {
        return Some(found);
    }

    let basename = normalized.rsplit('/').next().unwrap_or(&normalized);
    files.iter().find(|f| f.name == basename)
}

fn normalize_path(path: &str) -> &str {
    let mut rest = path.trim();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("../") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            return rest;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOB REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Transient blob URLs minted during a render pass, keyed by file id.
///
/// URLs are content-addressed: the same bytes always mint the same URL,
/// so re-renders do not churn references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlobRegistry {
    urls: HashMap<String, String>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the blob URL for a file's textual content.
    pub fn mint_url(file: &ProjectFile) -> String {
        Self::mint_url_for_bytes(file.content.as_bytes())
    }

    pub fn mint_url_for_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("blob:sketch/{:x}", hasher.finalize())
    }

    /// Record a minted URL for the surrounding environment.
    pub fn register(&mut self, file: &ProjectFile, url: &str) {
        self.urls.insert(file.id.clone(), url.to_string());
    }

    pub fn get(&self, file_id: &str) -> Option<&str> {
        self.urls.get(file_id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.urls.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
