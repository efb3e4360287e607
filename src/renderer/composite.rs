//! Composite stimulus: child renderers drawn into an offscreen framebuffer,
//! then folded into the parent target as a single layer.
//!
//! Children share one onset: the moment the composite's first frame reaches
//! the target, the same timestamp is pushed into every child.

use kurbo::{Affine, Point};

use crate::core::{BlendMode, OnsetCell, Rect, RenderContext, Timestamp};
use crate::error::{CueframeError, CueframeResult};
use crate::gpu::{FramebufferId, GpuContext};
use crate::renderer::{Phase, Preload, Renderer};
use crate::resources::ResourceSupplier;

/// How a composite partitions its display box among children.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layout {
    /// Every child covers the whole box; later children draw on top.
    Stack,
    /// Children tile a near-square grid, row-major.
    Grid,
    /// One display box per child, in child order.
    Custom { cells: Vec<Rect> },
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CompositeConfig {
    pub id: String,
    pub layout: Layout,
    /// Blend mode the children draw with inside the offscreen pass.
    #[serde(default)]
    pub blend: BlendMode,
}

pub struct CompositeRenderer {
    config: CompositeConfig,
    children: Vec<Box<dyn Renderer>>,
    fb: Option<FramebufferId>,
    phase: Phase,
    onset: OnsetCell,
}

/// Near-square tiling: columns is the ceiling square root, rows whatever is
/// needed to hold the rest.
pub(crate) fn grid_dims(n: usize) -> (usize, usize) {
    if n == 0 {
        return (0, 0);
    }
    let cols = (n as f64).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols);
    (cols, rows)
}

impl CompositeRenderer {
    pub fn new(config: CompositeConfig) -> CueframeResult<Self> {
        if config.id.trim().is_empty() {
            return Err(CueframeError::validation("composite id must be non-empty"));
        }
        Ok(Self {
            config,
            children: Vec::new(),
            fb: None,
            phase: Phase::Unloaded,
            onset: OnsetCell::default(),
        })
    }

    pub fn add_child(&mut self, child: Box<dyn Renderer>) -> CueframeResult<()> {
        if matches!(self.phase, Phase::Disposed) {
            return Err(CueframeError::validation("add_child after dispose"));
        }
        if self.children.iter().any(|c| c.id() == child.id()) {
            return Err(CueframeError::validation(format!(
                "duplicate child id '{}'",
                child.id()
            )));
        }
        self.children.push(child);
        Ok(())
    }

    /// Remove and clean up one child. Returns whether it existed.
    pub fn remove_child(&mut self, id: &str, gpu: &mut GpuContext) -> bool {
        let Some(pos) = self.children.iter().position(|c| c.id() == id) else {
            return false;
        };
        let mut child = self.children.remove(pos);
        child.cleanup(gpu);
        true
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn child(&self, id: &str) -> Option<&dyn Renderer> {
        self.children
            .iter()
            .find(|c| c.id() == id)
            .map(|c| c.as_ref())
    }

    fn child_contexts(&self, ctx: &RenderContext) -> CueframeResult<Vec<RenderContext>> {
        let n = self.children.len();
        // The configured mode governs the offscreen pass; the composed layer
        // itself folds into the parent with the parent's blend state.
        let ctx = &ctx.with_blend(self.config.blend);
        match &self.config.layout {
            Layout::Stack => Ok(vec![*ctx; n]),
            Layout::Grid => {
                let (cols, _) = grid_dims(n);
                let cell_w = ctx.width / cols.max(1) as f64;
                let cell_h = ctx.height / n.div_ceil(cols.max(1)) as f64;
                Ok((0..n)
                    .map(|i| {
                        let col = i % cols;
                        let row = i / cols;
                        ctx.cell(
                            Point::new(
                                ctx.origin.x + col as f64 * cell_w,
                                ctx.origin.y + row as f64 * cell_h,
                            ),
                            cell_w,
                            cell_h,
                        )
                    })
                    .collect())
            }
            Layout::Custom { cells } => {
                if cells.len() < n {
                    return Err(CueframeError::validation(format!(
                        "custom layout has {} cells for {} children",
                        cells.len(),
                        n
                    )));
                }
                Ok(cells
                    .iter()
                    .take(n)
                    .map(|cell| {
                        ctx.cell(
                            Point::new(ctx.origin.x + cell.x0, ctx.origin.y + cell.y0),
                            cell.width(),
                            cell.height(),
                        )
                    })
                    .collect())
            }
        }
    }
}

impl Renderer for CompositeRenderer {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn preload(&mut self, resources: &dyn ResourceSupplier) -> CueframeResult<Preload> {
        if matches!(self.phase, Phase::Disposed) {
            return Err(CueframeError::validation("preload after dispose"));
        }
        let mut all_ready = true;
        for child in &mut self.children {
            match child.preload(resources) {
                Ok(Preload::Ready) => {}
                Ok(Preload::Pending) => all_ready = false,
                Err(err) => {
                    self.phase = Phase::Failed;
                    return Err(err);
                }
            }
        }
        if all_ready {
            self.phase = Phase::Ready;
            Ok(Preload::Ready)
        } else {
            self.phase = Phase::Preloading;
            Ok(Preload::Pending)
        }
    }

    fn prepare(&mut self, gpu: &mut GpuContext) -> CueframeResult<()> {
        let (w, h) = (gpu.width(), gpu.height());
        if let Some(fb) = self.fb
            && gpu
                .framebuffer_texture(fb)
                .and_then(|tex| gpu.texture_size(tex))
                != Some((w, h))
        {
            gpu.delete_framebuffer(fb);
            self.fb = None;
        }
        if self.fb.is_none() {
            self.fb = Some(gpu.create_framebuffer(w, h)?);
        }
        for child in &mut self.children {
            child.prepare(gpu)?;
        }
        Ok(())
    }

    fn render(&mut self, gpu: &mut GpuContext, ctx: &RenderContext) -> CueframeResult<()> {
        if !matches!(self.phase, Phase::Ready | Phase::Presenting) {
            return Ok(());
        }
        let Some(fb) = self.fb else {
            return Ok(());
        };

        let previous = gpu.bound_framebuffer();
        match gpu.bind_framebuffer(fb) {
            Ok(()) => {}
            Err(CueframeError::FramebufferIncomplete(reason)) => {
                // Skip this frame rather than abort the presentation.
                tracing::warn!(id = %self.config.id, %reason, "offscreen target incomplete");
                return Ok(());
            }
            Err(err) => return Err(err),
        }
        gpu.clear([0, 0, 0, 0])?;

        let child_ctxs = self.child_contexts(ctx)?;
        let result = self
            .children
            .iter_mut()
            .zip(child_ctxs)
            .try_for_each(|(child, child_ctx)| child.render(gpu, &child_ctx));

        // Re-establish the caller's target before propagating any error.
        match previous {
            Some(prev) => gpu.bind_framebuffer(prev)?,
            None => gpu.unbind_framebuffer(),
        }
        result?;

        let tex = self
            .fb
            .and_then(|fb| gpu.framebuffer_texture(fb))
            .ok_or_else(|| CueframeError::gpu("offscreen target lost its attachment"))?;
        gpu.set_blend(ctx.blend);
        gpu.draw_texture(tex, Affine::IDENTITY, 1.0)?;
        gpu.reset_blend();

        if self.onset.mark(ctx.now) {
            tracing::debug!(id = %self.config.id, at = ctx.now.millis(), "composite onset");
        }
        // All children become visible in the same frame.
        if let Some(onset) = self.onset.get() {
            for child in &mut self.children {
                child.mark_onset(onset);
            }
        }
        self.phase = Phase::Presenting;
        Ok(())
    }

    fn mark_onset(&mut self, now: Timestamp) {
        self.onset.mark(now);
        if let Some(onset) = self.onset.get() {
            for child in &mut self.children {
                child.mark_onset(onset);
            }
        }
    }

    fn onset(&self) -> Option<Timestamp> {
        self.onset.get()
    }

    fn cleanup(&mut self, gpu: &mut GpuContext) {
        // Children first so their textures go before the shared target.
        for child in &mut self.children {
            child.cleanup(gpu);
        }
        if let Some(fb) = self.fb.take() {
            gpu.delete_framebuffer(fb);
        }
        self.phase = Phase::Disposed;
    }
}
