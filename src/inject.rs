//! Runtime instrumentation injection.
//!
//! Every assembled document gets the loop-guard runtime and the console
//! hijack runtime. When an accessible output mode is live, the
//! interceptor bundle rides along: a fixed base set plus a pair of
//! scripts per active mode (text, grid) and one for sound. The
//! generated console-errors hijack script embeds the offset table and
//! must be the first script in `<head>` so it runs before any user code.

use serde::{Deserialize, Serialize};

use crate::dom;
use crate::offsets::{offsets_to_json, ScriptOffsetEntry};
use markup5ever_rcdom::Handle;

/// Loop-guard runtime; defines `window.__loopGuard` and reports trips.
pub const LOOP_GUARD_RUNTIME: &str = "/loop-guard.min.js";
/// Console hijack runtime; forwards console traffic to the host.
pub const CONSOLE_HIJACK_RUNTIME: &str = "/console-hijack.js";

const INTERCEPTOR_BASE: &[&str] = &[
    "/interceptor/registry.js",
    "/interceptor/load-data.js",
    "/interceptor/helper-functions.js",
    "/interceptor/base-interceptor.js",
    "/interceptor/entities/entity.min.js",
    "/interceptor/name-that-color.min.js",
];
const TEXT_INTERCEPTORS: &[&str] = &[
    "/interceptor/text/interceptor-functions.js",
    "/interceptor/text/interceptor-sketch.js",
];
const GRID_INTERCEPTORS: &[&str] = &[
    "/interceptor/grid/interceptor-functions.js",
    "/interceptor/grid/interceptor-sketch.js",
];
const SOUND_INTERCEPTORS: &[&str] = &["/interceptor/sound/interceptor-sketch.js"];

/// Output-mode flags driving interceptor selection, as the editor holds
/// them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputModes {
    pub text_output: bool,
    pub grid_output: bool,
    pub sound_output: bool,
    pub is_accessible_output_playing: bool,
    pub is_playing: bool,
}

/// Scripts chosen for one render pass. At most one selection is live
/// per pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorSelection {
    pub scripts: Vec<&'static str>,
    /// Set when an interceptor bundle was required but no sub-mode was
    /// picked; the host should turn its text-output flag on.
    pub forced_text_output: bool,
}

/// Decide which instrumentation scripts this render needs.
pub fn select_instrumentation(modes: &OutputModes) -> InterceptorSelection {
    let mut scripts: Vec<&'static str> = vec![LOOP_GUARD_RUNTIME, CONSOLE_HIJACK_RUNTIME];
    let mut forced_text_output = false;

    let bundle_required = modes.is_accessible_output_playing
        || ((modes.text_output || modes.grid_output || modes.sound_output) && modes.is_playing);

    if bundle_required {
        scripts.extend_from_slice(INTERCEPTOR_BASE);

        let mut text_output = modes.text_output;
        if !modes.text_output && !modes.grid_output && !modes.sound_output {
            // no sub-mode picked: default to text output
            text_output = true;
            forced_text_output = true;
        }
        if text_output {
            scripts.extend_from_slice(TEXT_INTERCEPTORS);
        }
        if modes.grid_output {
            scripts.extend_from_slice(GRID_INTERCEPTORS);
        }
        if modes.sound_output {
            scripts.extend_from_slice(SOUND_INTERCEPTORS);
        }
    }

    InterceptorSelection { scripts, forced_text_output }
}

/// Append one `<script src>` element per selected path to `head`.
pub fn append_runtime_scripts(head: &Handle, selection: &InterceptorSelection) {
    for path in selection.scripts.iter().copied() {
        let script = dom::create_element("script", &[("src", path)]);
        dom::append_child(head, script);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSOLE ERRORS HIJACK SCRIPT
// ═══════════════════════════════════════════════════════════════════════════════

/// The offset table is spliced in for `__OFFSET_TABLE__`; everything
/// else is fixed, so the script's line count never depends on input.
const HIJACK_TEMPLATE: &str = r#"
function lookupScriptOrigin(line) {
  var offsets = __OFFSET_TABLE__;
  var bestLine = 0;
  var bestFile = '';
  for (var i = 0; i < offsets.length; i += 1) {
    if (offsets[i][0] < line && offsets[i][0] > bestLine) {
      bestLine = offsets[i][0];
      bestFile = offsets[i][1];
    }
  }
  return [line - bestLine, bestFile];
}
window.onerror = function (message, url, lineNumber, columnNumber, error) {
  var text;
  var source = '';
  if (String(message).toLowerCase().indexOf('script error') !== -1) {
    text = 'Script Error: See Browser Console for Detail';
  } else {
    var origin = lookupScriptOrigin(lineNumber);
    text = message + ' (' + origin[1] + ': line ' + origin[0] + ')';
    source = origin[1];
  }
  window.parent.postMessage([{
    method: 'error',
    arguments: text,
    source: source
  }], '*');
  return false;
};
"#;

/// Build the hijack script with the given offset table embedded.
pub fn hijack_console_errors_script(entries: &[ScriptOffsetEntry]) -> String {
    HIJACK_TEMPLATE.replace("__OFFSET_TABLE__", &offsets_to_json(entries))
}

/// Newline count of the hijack script element's content — the amount
/// every later line shifts by once the script is inserted at the head
/// of the document.
pub fn hijack_line_offset() -> u32 {
    hijack_console_errors_script(&[]).matches('\n').count() as u32
}

/// Insert the hijack script as the first child of `head`, ahead of any
/// user script.
pub fn insert_hijack_script(head: &Handle, entries: &[ScriptOffsetEntry]) {
    let script = dom::create_element("script", &[]);
    dom::set_text_content(&script, &hijack_console_errors_script(entries));
    dom::insert_first(head, script);
}
