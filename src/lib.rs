//! # Sketch Document Assembler
//!
//! Native core of the sketch editor's preview: turns a project's HTML
//! entry point and file collection into one self-contained, executable
//! document for the sandboxed preview frame.
//!
//! ## Assembly Invariants
//!
//! 1. **Fail-open resolution**: a local-looking reference that matches
//!    no project file is left exactly as written. The broken load
//!    surfaces inside the sandbox at runtime; assembly itself never
//!    aborts over it.
//! 2. **Originals are read-only**: every render pass works on shallow
//!    copies of the file records and a freshly parsed tree. Overlapping
//!    passes cannot corrupt each other; the last write wins.
//! 3. **Line stability**: the sanitizing transforms (comment stripping,
//!    loop guarding) never change a script's newline count, so offset
//!    table entries stay exact.
//! 4. **Hijack-first**: the console-errors hijack script is the first
//!    child of `<head>` and runs before any user script; the offset
//!    table it embeds already accounts for its own height.
//! 5. **Ordered offsets**: the offset table is sorted by ascending
//!    line; lookup takes the greatest entry strictly below the queried
//!    line, falling back to the zero-offset entry.
//! 6. **Wholesale rebuilds**: any relevant state change (play toggle,
//!    refresh, output-mode flag, full-view file switch) rebuilds the
//!    whole document; stopping empties the surface.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod assemble;
mod channel;
mod discovery;
mod dom;
mod inject;
mod offsets;
mod preview;
mod project;
mod rewrite;
mod sanitize;
mod scan;


pub use assemble::{assemble, AssembleOptions, AssembledDocument};
pub use channel::{
    detect_control_signal, ChannelError, ConsoleMessage, ControlSignal, MessageDispatcher,
    LOOP_TRIP_PHRASE,
};
pub use discovery::{find_entry_html, load_project_dir, ProjectLoadError};
pub use inject::{
    hijack_console_errors_script, select_instrumentation, InterceptorSelection, OutputModes,
    CONSOLE_HIJACK_RUNTIME, LOOP_GUARD_RUNTIME,
};
pub use offsets::{compute_offsets, lookup, ScriptOffsetEntry, FILE_TAG_ATTR, FILE_TAG_PREFIX};
pub use preview::{
    present_when_ready, should_rerender, Preview, PreviewState, RenderSurface, RetryPolicy,
    SurfaceError,
};
pub use project::{resolve_path_to_file, BlobRegistry, ProjectFile};
pub use rewrite::{resolve_css_links_in_string, resolve_js_links_in_string};
pub use sanitize::{protect_loops, sanitize_script, strip_comments};
pub use scan::{
    is_external_link, is_local_link, is_local_media_reference, is_text_asset, string_literals,
};

#[cfg(feature = "napi")]
pub use assemble::assemble_sketch_native;

#[cfg(feature = "napi")]
#[napi]
pub fn assembler_bridge() -> String {
    "Sketch Assembler Native Bridge Connected".to_string()
}
