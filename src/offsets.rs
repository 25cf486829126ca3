//! Script offset mapping.
//!
//! Inlined script elements are tagged with a reserved attribute,
//! `data-assembled-file="@fs-<label>"`. After serialization the
//! assembled text is scanned for those open tags and each label is
//! recorded with the 1-based line its script block occupies in the
//! final document (the scan runs before the error-hijack script is
//! inserted ahead of it, so its line count is added as a constant).
//!
//! The table is embedded into the hijack script as a JSON array of
//! `[line, label]` pairs; at runtime the greatest recorded line strictly
//! below a reported error line identifies the originating file. The
//! attribute encoding keeps user string literals out of the scan: the
//! serializer escapes attribute values, so only the assembler itself
//! can produce a matching open tag.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Reserved marker attribute set on inlined script elements.
pub const FILE_TAG_ATTR: &str = "data-assembled-file";
/// Label prefix inside the marker attribute.
pub const FILE_TAG_PREFIX: &str = "@fs-";

lazy_static! {
    static ref SCRIPT_MARKER_RE: Regex =
        Regex::new(r#"<script[^>]*\bdata-assembled-file="@fs-([^"]*)""#).unwrap();
}

/// One entry of the offset table: the assembled-document line at which a
/// file's script block begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOffsetEntry {
    pub line: u32,
    pub label: String,
}

/// Scan assembled text for per-file script markers. `line_offset` is the
/// newline count of the hijack script that will be inserted before every
/// marker. Entries come back in document order, which is ascending line
/// order.
pub fn compute_offsets(assembled: &str, line_offset: u32) -> Vec<ScriptOffsetEntry> {
    let mut entries = Vec::new();
    for caps in SCRIPT_MARKER_RE.captures_iter(assembled) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        let label = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let line = assembled[..whole.start()].matches('\n').count() as u32 + 1;
        entries.push(ScriptOffsetEntry {
            line: line + line_offset,
            label: label.to_string(),
        });
    }
    entries
}

/// JSON form embedded into the hijack script: `[[line, "label"], ...]`,
/// always a single line.
pub fn offsets_to_json(entries: &[ScriptOffsetEntry]) -> String {
    let pairs: Vec<(u32, &str)> = entries
        .iter()
        .map(|entry| (entry.line, entry.label.as_str()))
        .collect();
    serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string())
}

/// Host-side mirror of the runtime lookup: the entry with the greatest
/// line strictly below `line` wins; with none, the zero-offset entry
/// (whole document, no label) applies.
pub fn lookup(entries: &[ScriptOffsetEntry], line: u32) -> (u32, &str) {
    let mut best_line = 0u32;
    let mut best_label = "";
    for entry in entries {
        if entry.line < line && entry.line > best_line {
            best_line = entry.line;
            best_label = &entry.label;
        }
    }
    (line - best_line, best_label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_scan_lines() {
        let doc = "<!DOCTYPE HTML>\n<html><head></head><body><script data-assembled-file=\"@fs-sketch\">\nvar a;\n</script><script data-assembled-file=\"@fs-util\">\nvar b;\n</script></body></html>";
        let offsets = compute_offsets(doc, 0);
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets[0], ScriptOffsetEntry { line: 2, label: "sketch".to_string() });
        assert_eq!(offsets[1], ScriptOffsetEntry { line: 4, label: "util".to_string() });
    }

    #[test]
    fn test_marker_scan_applies_constant() {
        let doc = "<script data-assembled-file=\"@fs-sketch\">";
        let offsets = compute_offsets(doc, 21);
        assert_eq!(offsets[0].line, 22);
    }

    #[test]
    fn test_marker_inside_user_string_not_scanned() {
        // A quoted occurrence of the label token alone never matches;
        // only a script open tag carrying the attribute does.
        let doc = "<script>\nvar s = \"@fs-fake\";\n</script>";
        assert!(compute_offsets(doc, 0).is_empty());
    }

    #[test]
    fn test_ordering_is_ascending() {
        let doc = "a\n<script data-assembled-file=\"@fs-one\">\n\n<script data-assembled-file=\"@fs-two\">";
        let offsets = compute_offsets(doc, 0);
        assert!(offsets.windows(2).all(|w| w[0].line < w[1].line));
    }

    #[test]
    fn test_json_is_single_line_pairs() {
        let entries = vec![
            ScriptOffsetEntry { line: 12, label: "sketch".to_string() },
            ScriptOffsetEntry { line: 40, label: "util".to_string() },
        ];
        let json = offsets_to_json(&entries);
        assert_eq!(json, "[[12,\"sketch\"],[40,\"util\"]]");
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_lookup_greatest_strictly_less() {
        let entries = vec![
            ScriptOffsetEntry { line: 10, label: "a".to_string() },
            ScriptOffsetEntry { line: 20, label: "b".to_string() },
        ];
        assert_eq!(lookup(&entries, 15), (5, "a"));
        assert_eq!(lookup(&entries, 25), (5, "b"));
        // equal line is not "strictly less"
        assert_eq!(lookup(&entries, 20), (10, "a"));
        // below every entry: zero-offset default
        assert_eq!(lookup(&entries, 5), (5, ""));
    }
}
