//! Preview surface control.
//!
//! The assembled document is handed to an isolated execution surface
//! (sandboxed-frame equivalent). This module owns the host-side policy
//! around it: when a state change requires a full re-assembly, how to
//! wait for the surface to become ready, and what stopping means
//! (clearing the surface, not leaving stale content).
//!
//! Re-assembly is always wholesale; there is no incremental diffing and
//! no shared state between passes, so overlapping renders cannot
//! corrupt each other — the last write wins.

use log::debug;
use std::fmt;

use crate::assemble::{assemble, AssembleOptions, AssembledDocument};
use crate::inject::OutputModes;
use crate::project::{BlobRegistry, ProjectFile};

/// Editor state a render decision depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewState {
    pub is_playing: bool,
    /// The user explicitly asked for a refresh while playing.
    pub preview_is_refreshing: bool,
    pub full_view: bool,
    pub modes: OutputModes,
    /// Identity of the active file; only relevant in full view.
    pub active_file_id: Option<String>,
}

/// Does moving from `prev` to `next` require a fresh render pass?
pub fn should_rerender(prev: &PreviewState, next: &PreviewState) -> bool {
    if next.is_playing != prev.is_playing {
        return true;
    }
    if next.is_playing && next.preview_is_refreshing {
        return true;
    }
    if next.modes.is_accessible_output_playing != prev.modes.is_accessible_output_playing {
        return true;
    }
    if next.modes.text_output != prev.modes.text_output {
        return true;
    }
    if next.modes.grid_output != prev.modes.grid_output {
        return true;
    }
    if next.modes.sound_output != prev.modes.sound_output {
        return true;
    }
    if next.full_view && next.active_file_id != prev.active_file_id {
        return true;
    }
    false
}

/// The isolated execution surface the assembled document is written
/// into. Scripting, same-origin, popups and forms stay enabled inside
/// the sandbox; everything else is the embedder's concern.
pub trait RenderSurface {
    fn is_ready(&self) -> bool;
    fn set_document(&mut self, html: &str);
    /// Empty the surface completely; stale content must not survive a
    /// stop.
    fn clear(&mut self);
}

/// Bounded readiness polling. The surface is re-checked once per
/// scheduling tick until it reports ready or the attempt budget runs
/// out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 50 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceError {
    /// The surface never became ready within the attempt budget.
    NeverReady { attempts: u32 },
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeverReady { attempts } => {
                write!(f, "execution surface not ready after {} attempts", attempts)
            }
        }
    }
}

impl std::error::Error for SurfaceError {}

/// Write `html` into the surface as soon as it is ready. `tick` runs
/// between attempts (the host's scheduling tick).
pub fn present_when_ready<S, F>(
    surface: &mut S,
    html: &str,
    policy: RetryPolicy,
    tick: &mut F,
) -> Result<u32, SurfaceError>
where
    S: RenderSurface,
    F: FnMut(),
{
    let mut attempts = 0;
    while attempts < policy.max_attempts {
        attempts += 1;
        if surface.is_ready() {
            surface.set_document(html);
            return Ok(attempts);
        }
        tick();
    }
    Err(SurfaceError::NeverReady { attempts })
}

/// Host-side preview controller: tracks the last applied state and
/// re-renders the surface when a transition calls for it.
pub struct Preview<S: RenderSurface> {
    surface: S,
    state: PreviewState,
    policy: RetryPolicy,
}

impl<S: RenderSurface> Preview<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            state: PreviewState::default(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(surface: S, policy: RetryPolicy) -> Self {
        Self {
            surface,
            state: PreviewState::default(),
            policy,
        }
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Apply a state transition. Returns the fresh document when a
    /// render pass ran, `None` when nothing needed to change.
    pub fn sync(
        &mut self,
        next: PreviewState,
        entry: &ProjectFile,
        files: &[ProjectFile],
        options: &AssembleOptions,
        blobs: &mut BlobRegistry,
    ) -> Result<Option<AssembledDocument>, SurfaceError> {
        if !should_rerender(&self.state, &next) {
            self.state = next;
            return Ok(None);
        }

        if !next.is_playing {
            debug!("stopping preview; clearing the execution surface");
            self.surface.clear();
            self.state = next;
            return Ok(None);
        }

        let document = assemble(entry, files, options, blobs);
        present_when_ready(&mut self.surface, &document.html, self.policy, &mut || {})?;
        self.state = next;
        Ok(Some(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;

    #[derive(Default)]
    struct FakeSurface {
        document: Option<String>,
        /// readiness poll on which the surface first reports ready;
        /// 0 or 1 means ready immediately
        ready_on_poll: u32,
        polls: Cell<u32>,
        clears: u32,
    }

    impl RenderSurface for FakeSurface {
        fn is_ready(&self) -> bool {
            self.polls.set(self.polls.get() + 1);
            self.polls.get() >= self.ready_on_poll
        }
        fn set_document(&mut self, html: &str) {
            self.document = Some(html.to_string());
        }
        fn clear(&mut self) {
            self.document = Some(String::new());
            self.clears += 1;
        }
    }

    fn playing() -> PreviewState {
        PreviewState { is_playing: true, ..Default::default() }
    }

    #[test]
    fn test_rerender_on_play_toggle_and_refresh() {
        let stopped = PreviewState::default();
        assert!(should_rerender(&stopped, &playing()));
        assert!(should_rerender(&playing(), &stopped));
        assert!(!should_rerender(&playing(), &playing()));

        let refreshing = PreviewState { preview_is_refreshing: true, ..playing() };
        assert!(should_rerender(&playing(), &refreshing));
    }

    #[test]
    fn test_rerender_on_mode_changes() {
        let base = playing();
        let mut next = playing();
        next.modes.grid_output = true;
        assert!(should_rerender(&base, &next));

        let mut next = playing();
        next.modes.is_accessible_output_playing = true;
        assert!(should_rerender(&base, &next));
    }

    #[test]
    fn test_rerender_on_active_file_only_in_full_view() {
        let mut prev = playing();
        prev.active_file_id = Some("a".to_string());
        let mut next = playing();
        next.active_file_id = Some("b".to_string());
        assert!(!should_rerender(&prev, &next));

        let prev = PreviewState { full_view: true, ..prev };
        let next = PreviewState { full_view: true, ..next };
        assert!(should_rerender(&prev, &next));
    }

    #[test]
    fn test_bounded_retry_succeeds_then_exhausts() {
        let mut surface = FakeSurface { ready_on_poll: 4, ..Default::default() };
        let mut ticks = 0u32;
        let attempts = present_when_ready(
            &mut surface,
            "<html>",
            RetryPolicy { max_attempts: 10 },
            &mut || ticks += 1,
        )
        .unwrap();
        assert_eq!(attempts, 4);
        assert_eq!(ticks, 3);
        assert_eq!(surface.document.as_deref(), Some("<html>"));

        let mut surface = FakeSurface { ready_on_poll: 100, ..Default::default() };
        let err = present_when_ready(
            &mut surface,
            "<html>",
            RetryPolicy { max_attempts: 5 },
            &mut || {},
        );
        assert_eq!(err, Err(SurfaceError::NeverReady { attempts: 5 }));
        assert_eq!(surface.document, None);
    }

    #[test]
    fn test_stop_clears_surface_and_play_reassembles() {
        let entry = ProjectFile::new(
            "0",
            "index.html",
            "<html><body><script src=\"sketch.js\"></script></body></html>",
        );
        let files = vec![ProjectFile::new("1", "sketch.js", "var a = 1;")];
        let options = AssembleOptions::default();
        let mut blobs = BlobRegistry::new();

        let mut preview = Preview::new(FakeSurface::default());

        // play
        let doc = preview
            .sync(playing(), &entry, &files, &options, &mut blobs)
            .unwrap()
            .expect("play renders");
        assert!(!doc.offsets.is_empty());
        assert!(preview.surface().document.as_deref().unwrap().contains("@fs-sketch"));

        // stop empties the surface
        preview
            .sync(PreviewState::default(), &entry, &files, &options, &mut blobs)
            .unwrap();
        assert_eq!(preview.surface().document.as_deref(), Some(""));
        assert_eq!(preview.surface().clears, 1);

        // play again rebuilds from scratch with a fresh table
        let doc = preview
            .sync(playing(), &entry, &files, &options, &mut blobs)
            .unwrap()
            .expect("replay renders");
        assert_eq!(doc.offsets, crate::offsets::compute_offsets(&doc.html, 0));
    }
}
