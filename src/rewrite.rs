//! Script and style rewriting.
//!
//! Walks the parsed entry document and turns every local file reference
//! into something the sandboxed execution context can load:
//!
//! - `src`/`href` attributes naming local media are pointed at the
//!   asset's URL.
//! - `<script src>` pointing at a local script is inlined: the `src`
//!   attribute is dropped, the element is tagged with a file-label
//!   marker for later error attribution, and the body becomes the
//!   file's sanitized content.
//! - Inline `<script>` and `<style>` bodies get their quoted media
//!   references rewritten in place; text assets (`json`/`txt`/`csv`)
//!   referenced from scripts are published through a transient blob URL.
//! - `<link rel="stylesheet">` is rewritten to a URL, or replaced by an
//!   injected `<style>` block when only inline text is available.
//!
//! A reference that looks local but resolves to nothing is left exactly
//! as written; the broken load surfaces inside the sandbox at runtime,
//! never as an assembly failure.

use log::{debug, warn};
use std::io;

use markup5ever_rcdom::{Handle, RcDom};

use crate::dom;
use crate::offsets::{FILE_TAG_ATTR, FILE_TAG_PREFIX};
use crate::project::{resolve_path_to_file, BlobRegistry, ProjectFile};
use crate::sanitize::sanitize_script;
use crate::scan;

/// Pre-pass over the whole collection: shallow-copy every file and
/// rewrite the embedded references of `.js` and `.css` sources, so
/// later inlining picks up already-transformed content. Originals are
/// never mutated.
pub fn resolve_js_and_css_links(files: &[ProjectFile], blobs: &mut BlobRegistry) -> Vec<ProjectFile> {
    files
        .iter()
        .map(|file| {
            let mut copy = file.clone();
            let lower = file.name.to_ascii_lowercase();
            if lower.ends_with(".js") {
                copy.content = resolve_js_links_in_string(&file.content, files, blobs);
            } else if lower.ends_with(".css") {
                copy.content = resolve_css_links_in_string(&file.content, files);
            }
            copy
        })
        .collect()
}

/// Rewrite quoted local-media references inside script text, then
/// sanitize it (comment stripping + loop guarding). Media with a URL is
/// substituted verbatim; text assets get a freshly minted blob URL,
/// registered with the surrounding environment.
pub fn resolve_js_links_in_string(
    content: &str,
    files: &[ProjectFile],
    blobs: &mut BlobRegistry,
) -> String {
    let rewritten = scan::rewrite_string_literals(content, |candidate| {
        if !scan::is_local_media_reference(candidate, false) {
            return None;
        }
        let resolved = match resolve_path_to_file(candidate, files) {
            Some(resolved) => resolved,
            None => {
                debug!("script reference '{}' does not resolve; leaving as-is", candidate);
                return None;
            }
        };
        if let Some(url) = &resolved.url {
            return Some(url.clone());
        }
        if scan::is_text_asset(&resolved.name) {
            let url = BlobRegistry::mint_url(resolved);
            blobs.register(resolved, &url);
            return Some(url);
        }
        None
    });
    sanitize_script(&rewritten)
}

/// Rewrite quoted local-media references inside style text. Styles only
/// take direct URLs; no blob minting, no sanitizing.
pub fn resolve_css_links_in_string(content: &str, files: &[ProjectFile]) -> String {
    scan::rewrite_string_literals(content, |candidate| {
        if !scan::is_local_media_reference(candidate, false) {
            return None;
        }
        resolve_path_to_file(candidate, files).and_then(|resolved| resolved.url.clone())
    })
}

/// Parse the entry HTML and rewrite every executable/styling element
/// against the (pre-resolved) file collection. Returns the mutated
/// document tree ready for instrumentation.
pub fn assemble_body(
    entry_html: &str,
    files: &[ProjectFile],
    origin: &str,
    blobs: &mut BlobRegistry,
) -> io::Result<RcDom> {
    let dom = dom::parse_html(entry_html)?;
    let root = dom.document.clone();

    if let Some(head) = dom::document_head(&dom) {
        let href = format!("{}/", origin);
        let base = dom::create_element("base", &[("href", href.as_str())]);
        dom::append_child(&head, base);
    }

    // background, data and poster attributes also carry URLs, but the
    // editor's sketches use them rarely; only src/href are swept.
    resolve_attribute_paths("src", &root, files);
    resolve_attribute_paths("href", &root, files);

    resolve_scripts(&root, files, blobs);
    resolve_styles(&dom, files);

    Ok(dom)
}

fn resolve_attribute_paths(attr: &str, root: &Handle, files: &[ProjectFile]) {
    for element in dom::collect_elements(root, |n| dom::get_attribute(n, attr).is_some()) {
        let value = match dom::get_attribute(&element, attr) {
            Some(value) => value,
            None => continue,
        };
        if !scan::is_local_media_reference(&value, false) {
            continue;
        }
        match resolve_path_to_file(&value, files) {
            Some(resolved) => {
                if let Some(url) = &resolved.url {
                    dom::set_attribute(&element, attr, url);
                }
            }
            None => warn!("unresolved {} reference '{}' left untouched", attr, value),
        }
    }
}

fn resolve_scripts(root: &Handle, files: &[ProjectFile], blobs: &mut BlobRegistry) {
    for script in dom::collect_elements(root, |n| dom::element_name(n).as_deref() == Some("script"))
    {
        let src = dom::get_attribute(&script, "src");
        match src {
            Some(src_value) if scan::is_local_link(&src_value) => {
                let resolved = match resolve_path_to_file(&src_value, files) {
                    Some(resolved) => resolved,
                    None => {
                        warn!("unresolved script src '{}' left untouched", src_value);
                        continue;
                    }
                };
                if let Some(url) = &resolved.url {
                    dom::set_attribute(&script, "src", url);
                } else {
                    let label = format!("{}{}", FILE_TAG_PREFIX, resolved.stem());
                    dom::set_attribute(&script, FILE_TAG_ATTR, &label);
                    dom::remove_attribute(&script, "src");
                    // leading newline so the file's first line gets its
                    // own document line, keeping error attribution exact
                    dom::set_text_content(&script, &format!("\n{}", resolved.content));
                }
            }
            _ => {
                // inline body (external-src scripts have none)
                let body = dom::text_content(&script);
                if !body.trim().is_empty() {
                    dom::set_text_content(
                        &script,
                        &resolve_js_links_in_string(&body, files, blobs),
                    );
                }
            }
        }
    }
}

fn resolve_styles(tree: &RcDom, files: &[ProjectFile]) {
    let root = tree.document.clone();

    for style in dom::collect_elements(&root, |n| dom::element_name(n).as_deref() == Some("style"))
    {
        let body = dom::text_content(&style);
        if !body.trim().is_empty() {
            dom::set_text_content(&style, &resolve_css_links_in_string(&body, files));
        }
    }

    let stylesheet_links = dom::collect_elements(&root, |n| {
        dom::element_name(n).as_deref() == Some("link")
            && dom::get_attribute(n, "rel").as_deref() == Some("stylesheet")
    });
    for link in stylesheet_links {
        let href = match dom::get_attribute(&link, "href") {
            Some(href) => href,
            None => continue,
        };
        if !scan::is_local_link(&href) {
            continue;
        }
        let resolved = match resolve_path_to_file(&href, files) {
            Some(resolved) => resolved,
            None => {
                warn!("unresolved stylesheet href '{}' left untouched", href);
                continue;
            }
        };
        if let Some(url) = &resolved.url {
            dom::set_attribute(&link, "href", url);
        } else if let Some(head) = dom::document_head(tree) {
            let style = dom::create_element("style", &[]);
            dom::set_text_content(&style, &format!("\n{}", resolved.content));
            dom::append_child(&head, style);
            dom::remove_from_parent(&link);
        }
    }
}
