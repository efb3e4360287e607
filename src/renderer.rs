//! The shared renderer lifecycle implemented by every stimulus variant.
//!
//! Lifecycle: `preload` is polled by the orchestrator during its priming
//! phase until the resource supplier produces the handles; `prepare` binds
//! GPU objects once a context exists (re-callable after a resize without
//! leaking); `render` runs every frame the stimulus is current and captures
//! the onset on the first frame content actually reaches the GPU; `cleanup`
//! releases every owned handle exactly once.

pub mod composite;
pub mod image;
pub mod media;
pub mod text;

use crate::core::{RenderContext, Timestamp};
use crate::error::CueframeResult;
use crate::gpu::GpuContext;
use crate::resources::ResourceSupplier;

/// Renderer lifecycle state. `Disposed` is terminal; `Failed` is permanently
/// not-ready after a preload failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unloaded,
    Preloading,
    Ready,
    Presenting,
    Failed,
    Disposed,
}

/// Progress of a cooperative preload poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preload {
    /// The supplier has not produced the handle yet; poll again.
    Pending,
    /// All resources are bound; the renderer can be prepared and rendered.
    Ready,
}

/// Scale/opacity ramp applied while a stimulus transitions in, driven by the
/// per-frame progress value.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionSpec {
    ZoomIn {
        #[serde(default = "default_zoom_from")]
        from_scale: f64,
    },
    FadeIn,
}

fn default_zoom_from() -> f64 {
    0.5
}

impl TransitionSpec {
    /// Extra uniform scale at `progress`.
    pub fn scale(self, progress: f64) -> f64 {
        match self {
            TransitionSpec::ZoomIn { from_scale } => {
                let p = progress.clamp(0.0, 1.0);
                from_scale + (1.0 - from_scale) * p
            }
            TransitionSpec::FadeIn => 1.0,
        }
    }

    /// Opacity multiplier at `progress`.
    pub fn opacity(self, progress: f64) -> f32 {
        match self {
            TransitionSpec::ZoomIn { .. } => 1.0,
            TransitionSpec::FadeIn => progress.clamp(0.0, 1.0) as f32,
        }
    }
}

/// Resolve a configured display box against the frame's viewport: `rect` is
/// viewport-relative, `None` fills the whole viewport.
pub(crate) fn display_rect(rect: Option<kurbo::Rect>, ctx: &RenderContext) -> kurbo::Rect {
    match rect {
        None => ctx.bounds(),
        Some(r) => kurbo::Rect::new(
            ctx.origin.x + r.x0,
            ctx.origin.y + r.y0,
            ctx.origin.x + r.x1,
            ctx.origin.y + r.y1,
        ),
    }
}

/// One stimulus renderer: Image, Text, Html, Video, Audio, or Composite.
pub trait Renderer {
    /// Stable identifier of the stimulus this renderer presents.
    fn id(&self) -> &str;

    fn phase(&self) -> Phase;

    /// Idempotent cooperative preload. A missing supplier handle keeps the
    /// renderer `Preloading` and returns [`Preload::Pending`]; an unusable
    /// handle fails it permanently with `ResourceUnavailable`.
    fn preload(&mut self, resources: &dyn ResourceSupplier) -> CueframeResult<Preload>;

    /// Allocate or recreate GPU objects. Must be safe to call again (e.g.
    /// after a resize) without leaking previously allocated handles.
    fn prepare(&mut self, gpu: &mut GpuContext) -> CueframeResult<()>;

    /// No-op unless the renderer is ready. Establishes all GPU state it
    /// depends on, and calls [`mark_onset`](Self::mark_onset) on the first
    /// frame content is actually uploaded.
    fn render(&mut self, gpu: &mut GpuContext, ctx: &RenderContext) -> CueframeResult<()>;

    /// First-write-wins; calls after the first are ignored.
    fn mark_onset(&mut self, now: Timestamp);

    fn onset(&self) -> Option<Timestamp>;

    /// Idempotent; releases every owned GPU handle exactly once. Safe to
    /// call from any non-`Disposed` state.
    fn cleanup(&mut self, gpu: &mut GpuContext);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_in_interpolates_from_start_scale() {
        let t = TransitionSpec::ZoomIn { from_scale: 0.5 };
        assert!((t.scale(0.0) - 0.5).abs() < 1e-9);
        assert!((t.scale(0.5) - 0.75).abs() < 1e-9);
        assert!((t.scale(1.0) - 1.0).abs() < 1e-9);
        assert_eq!(t.opacity(0.2), 1.0);
    }

    #[test]
    fn fade_in_ramps_opacity_only() {
        let t = TransitionSpec::FadeIn;
        assert_eq!(t.scale(0.3), 1.0);
        assert!((t.opacity(0.3) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn transition_spec_json_tag_roundtrip() {
        let t: TransitionSpec = serde_json::from_str(r#"{"kind":"zoom_in"}"#).unwrap();
        assert_eq!(t, TransitionSpec::ZoomIn { from_scale: 0.5 });
        let s = serde_json::to_string(&TransitionSpec::FadeIn).unwrap();
        assert!(s.contains("fade_in"));
    }
}
