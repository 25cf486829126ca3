//! Project discovery.
//!
//! Loads a sketch directory from disk into the `ProjectFile` collection
//! consumed by the assembler. Text sources (html/js/css and text assets)
//! are read as content; binary media gets a content-addressed blob URL
//! instead, matching how the editor host serves uploaded assets.

use log::debug;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

use crate::project::{BlobRegistry, ProjectFile};
use crate::scan;

#[derive(Debug)]
pub enum ProjectLoadError {
    Io { path: String, source: io::Error },
}

impl fmt::Display for ProjectLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read '{}': {}", path, source),
        }
    }
}

impl std::error::Error for ProjectLoadError {}

/// Extensions read as text content; everything else classified as media
/// is blob-addressed, and unrecognized files are skipped.
const TEXT_SOURCE_EXTENSIONS: &[&str] = &["html", "htm", "js", "css", "json", "txt", "csv"];

/// Load every project file under `root`, entry HTML first, the rest in
/// name order. Hidden files and directories are ignored.
pub fn load_project_dir(root: &Path) -> Result<Vec<ProjectFile>, ProjectLoadError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_hidden(e.file_name().to_str().unwrap_or("")))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                return Err(ProjectLoadError::Io {
                    path: err
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string()),
                    source: err.into(),
                })
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        if is_text_source(&name) {
            let content = fs::read_to_string(entry.path()).map_err(|source| ProjectLoadError::Io {
                path: entry.path().display().to_string(),
                source,
            })?;
            files.push(ProjectFile::new(&name, &name, &content));
        } else if scan::is_local_media_reference(&name, false) {
            let bytes = fs::read(entry.path()).map_err(|source| ProjectLoadError::Io {
                path: entry.path().display().to_string(),
                source,
            })?;
            let url = BlobRegistry::mint_url_for_bytes(&bytes);
            files.push(ProjectFile::with_url(&name, &name, &url));
        } else {
            debug!("skipping unrecognized project file {}", name);
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pos) = entry_html_position(&files) {
        let entry = files.remove(pos);
        files.insert(0, entry);
    }
    Ok(files)
}

/// The project's HTML entry point: `index.html` when present, otherwise
/// the first HTML file in name order.
pub fn find_entry_html(files: &[ProjectFile]) -> Option<&ProjectFile> {
    files
        .iter()
        .find(|f| f.name == "index.html")
        .or_else(|| files.iter().find(|f| is_html(&f.name)))
}

fn entry_html_position(files: &[ProjectFile]) -> Option<usize> {
    files
        .iter()
        .position(|f| f.name == "index.html")
        .or_else(|| files.iter().position(|f| is_html(&f.name)))
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') && name.len() > 1
}

fn is_html(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

fn is_text_source(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    match lower.rsplit_once('.') {
        Some((_, ext)) => TEXT_SOURCE_EXTENSIONS.contains(&ext),
        None => false,
    }
}
