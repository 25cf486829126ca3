//! Document assembly orchestration.
//!
//! `assemble` runs the full pipeline for one render pass:
//!
//! 1. pre-resolve the file collection (shallow copies),
//! 2. rewrite the parsed entry document (scripts, styles, media),
//! 3. append the instrumentation scripts for the active output modes,
//! 4. serialize and scan for script markers to build the offset table,
//! 5. insert the console-errors hijack script (with the table embedded)
//!    as the first child of `<head>`,
//! 6. re-serialize behind the fixed doctype.
//!
//! Assembly is best-effort by contract: a failure anywhere degrades to
//! the raw entry text rather than an error, and unresolved references
//! ride through untouched.

use log::warn;
use serde::{Deserialize, Serialize};

#[cfg(feature = "napi")]
use napi_derive::napi;

use crate::dom;
use crate::inject::{self, OutputModes};
use crate::offsets::{self, ScriptOffsetEntry};
use crate::project::{BlobRegistry, ProjectFile};
use crate::rewrite;

const DOCTYPE: &str = "<!DOCTYPE HTML>\n";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssembleOptions {
    /// Execution origin the `<base>` element points at.
    pub origin: String,
    pub modes: OutputModes,
}

/// One render pass's output. Rebuilt wholesale every pass and handed to
/// the execution surface; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembledDocument {
    pub html: String,
    pub offsets: Vec<ScriptOffsetEntry>,
    /// The injector defaulted to text output; the host should flip its
    /// own flag to match.
    pub forced_text_output: bool,
}

/// Assemble the final sandbox document from the entry HTML and the
/// project files.
pub fn assemble(
    entry: &ProjectFile,
    files: &[ProjectFile],
    options: &AssembleOptions,
    blobs: &mut BlobRegistry,
) -> AssembledDocument {
    let resolved = rewrite::resolve_js_and_css_links(files, blobs);

    let dom = match rewrite::assemble_body(&entry.content, &resolved, &options.origin, blobs) {
        Ok(dom) => dom,
        Err(err) => {
            warn!("entry document could not be read ({}); passing it through", err);
            return passthrough(entry);
        }
    };

    let selection = inject::select_instrumentation(&options.modes);
    if let Some(head) = dom::document_head(&dom) {
        inject::append_runtime_scripts(&head, &selection);
    }

    let provisional = match dom::serialize_document_element(&dom) {
        Ok(serialized) => format!("{}{}", DOCTYPE, serialized),
        Err(err) => {
            warn!("serialization failed ({}); passing the entry through", err);
            return passthrough(entry);
        }
    };

    let script_offsets = offsets::compute_offsets(&provisional, inject::hijack_line_offset());
    if let Some(head) = dom::document_head(&dom) {
        inject::insert_hijack_script(&head, &script_offsets);
    }

    let html = match dom::serialize_document_element(&dom) {
        Ok(serialized) => format!("{}{}", DOCTYPE, serialized),
        Err(err) => {
            warn!("serialization failed ({}); passing the entry through", err);
            return passthrough(entry);
        }
    };

    AssembledDocument {
        html,
        offsets: script_offsets,
        forced_text_output: selection.forced_text_output,
    }
}

fn passthrough(entry: &ProjectFile) -> AssembledDocument {
    AssembledDocument {
        html: format!("{}{}", DOCTYPE, entry.content),
        offsets: Vec::new(),
        forced_text_output: false,
    }
}

#[cfg(feature = "napi")]
#[napi]
pub fn assemble_sketch_native(
    entry: serde_json::Value,
    files: serde_json::Value,
    options: serde_json::Value,
) -> napi::Result<serde_json::Value> {
    let entry: ProjectFile = serde_json::from_value(entry)
        .map_err(|e| napi::Error::from_reason(format!("Invalid entry file: {}", e)))?;
    let files: Vec<ProjectFile> = serde_json::from_value(files)
        .map_err(|e| napi::Error::from_reason(format!("Invalid file collection: {}", e)))?;
    let options: AssembleOptions = serde_json::from_value(options)
        .map_err(|e| napi::Error::from_reason(format!("Invalid options: {}", e)))?;

    let mut blobs = BlobRegistry::new();
    let document = assemble(&entry, &files, &options, &mut blobs);

    let blob_urls: std::collections::HashMap<String, String> = blobs
        .iter()
        .map(|(id, url)| (id.to_string(), url.to_string()))
        .collect();

    serde_json::to_value(serde_json::json!({
        "document": document,
        "blobUrls": blob_urls,
    }))
    .map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> AssembleOptions {
        AssembleOptions {
            origin: "https://editor.example/sketch/abc".to_string(),
            modes: OutputModes::default(),
        }
    }

    #[test]
    fn test_plain_entry_gains_only_instrumentation_and_base() {
        let entry = ProjectFile::new(
            "0",
            "index.html",
            "<html><head><title>t</title></head><body><p>hi</p></body></html>",
        );
        let doc = assemble(&entry, &[], &options(), &mut BlobRegistry::new());

        assert!(doc.html.starts_with(DOCTYPE));
        assert!(doc.html.contains("<p>hi</p>"));
        assert!(doc.html.contains("<title>t</title>"));
        assert!(doc.html.contains("<base href=\"https://editor.example/sketch/abc/\">"));
        assert!(doc.html.contains(inject::LOOP_GUARD_RUNTIME));
        assert!(doc.html.contains(inject::CONSOLE_HIJACK_RUNTIME));
        assert!(doc.html.contains("window.onerror"));
        assert!(!doc.html.contains("/interceptor/"));
        assert!(doc.offsets.is_empty());
        assert!(!doc.forced_text_output);
    }

    #[test]
    fn test_end_to_end_sketch_inlining() {
        let entry = ProjectFile::new(
            "0",
            "index.html",
            "<html><head></head><body><script src=\"sketch.js\"></script></body></html>",
        );
        let files = vec![
            ProjectFile::new("1", "sketch.js", "loadSound(\"beep.mp3\")"),
            ProjectFile::with_url("2", "beep.mp3", "blob:xyz"),
        ];
        let doc = assemble(&entry, &files, &options(), &mut BlobRegistry::new());

        assert!(doc.html.contains("data-assembled-file=\"@fs-sketch\""));
        assert!(doc.html.contains("loadSound(\"blob:xyz\")"));
        assert!(!doc.html.contains("src=\"sketch.js\""));

        assert_eq!(doc.offsets.len(), 1);
        assert_eq!(doc.offsets[0].label, "sketch");
        // the stored line is the marker's line in the *final* document
        assert_eq!(doc.offsets, offsets::compute_offsets(&doc.html, 0));
    }

    #[test]
    fn test_hijack_script_is_first_in_head() {
        let entry = ProjectFile::new("0", "index.html", "<html><head></head><body></body></html>");
        let doc = assemble(&entry, &[], &options(), &mut BlobRegistry::new());
        let hijack_at = doc.html.find("lookupScriptOrigin").unwrap();
        let base_at = doc.html.find("<base").unwrap();
        let runtime_at = doc.html.find(inject::LOOP_GUARD_RUNTIME).unwrap();
        assert!(hijack_at < base_at);
        assert!(hijack_at < runtime_at);
    }

    #[test]
    fn test_forced_text_output_bundle() {
        let entry = ProjectFile::new("0", "index.html", "<html></html>");
        let opts = AssembleOptions {
            origin: "https://e".to_string(),
            modes: OutputModes {
                is_accessible_output_playing: true,
                ..Default::default()
            },
        };
        let doc = assemble(&entry, &[], &opts, &mut BlobRegistry::new());
        assert!(doc.forced_text_output);
        assert!(doc.html.contains("/interceptor/registry.js"));
        assert!(doc.html.contains("/interceptor/text/interceptor-sketch.js"));
        assert!(!doc.html.contains("/interceptor/grid/"));
        assert!(!doc.html.contains("/interceptor/sound/"));
    }

    #[test]
    fn test_blob_effects_surface_in_registry() {
        let entry = ProjectFile::new(
            "0",
            "index.html",
            "<html><body><script src=\"sketch.js\"></script></body></html>",
        );
        let files = vec![
            ProjectFile::new("1", "sketch.js", "loadJSON(\"data.json\")"),
            ProjectFile::new("2", "data.json", "{}"),
        ];
        let mut blobs = BlobRegistry::new();
        let doc = assemble(&entry, &files, &options(), &mut blobs);
        let minted = blobs.get("2").expect("text asset published as blob");
        assert!(doc.html.contains(minted));
    }

    #[test]
    fn test_unresolved_references_ride_through() {
        let entry = ProjectFile::new(
            "0",
            "index.html",
            "<html><body><img src=\"gone.png\"><script src=\"gone.js\"></script></body></html>",
        );
        let doc = assemble(&entry, &[], &options(), &mut BlobRegistry::new());
        assert!(doc.html.contains("src=\"gone.png\""));
        assert!(doc.html.contains("src=\"gone.js\""));
        assert!(doc.offsets.is_empty());
    }
}
