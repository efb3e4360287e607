//! One stimulus/response cycle: a renderer and a collector bound together.
//!
//! The collector opens in the same frame the stimulus first becomes visible.
//! The renderer's onset capture drives `start(t0)` directly; there is no
//! polling interval between the two, so reaction times carry no scheduling
//! latency floor.

use crate::collector::{InputEvent, ResponseCollector, ResponseEvent};
use crate::core::RenderContext;
use crate::error::CueframeResult;
use crate::gpu::GpuContext;
use crate::renderer::{Preload, Renderer};
use crate::resources::ResourceSupplier;

pub struct Trial {
    renderer: Box<dyn Renderer>,
    collector: ResponseCollector,
    started: bool,
}

impl Trial {
    /// Bind an armed collector to a stimulus renderer. The collector starts
    /// automatically at stimulus onset.
    pub fn new(renderer: Box<dyn Renderer>, collector: ResponseCollector) -> Self {
        Self {
            renderer,
            collector,
            started: false,
        }
    }

    pub fn preload(&mut self, resources: &dyn ResourceSupplier) -> CueframeResult<Preload> {
        self.renderer.preload(resources)
    }

    pub fn prepare(&mut self, gpu: &mut GpuContext) -> CueframeResult<()> {
        self.renderer.prepare(gpu)
    }

    /// Draw one frame. If the stimulus reached the screen for the first time
    /// this frame, the collection window opens with `t0` set to that exact
    /// onset. Also advances the collector's timeout clock; a timeout fired
    /// this frame is returned.
    pub fn render(
        &mut self,
        gpu: &mut GpuContext,
        ctx: &RenderContext,
    ) -> CueframeResult<Option<ResponseEvent>> {
        self.renderer.render(gpu, ctx)?;

        if !self.started
            && let Some(onset) = self.renderer.onset()
        {
            self.collector.start(onset)?;
            self.started = true;
            tracing::debug!(
                stimulus = %self.renderer.id(),
                t0 = onset.millis(),
                "collection window opened at onset"
            );
        }
        Ok(self.collector.tick(ctx.now))
    }

    /// Forward a host input event to the collector.
    pub fn handle_event(
        &mut self,
        ctx: &RenderContext,
        event: InputEvent,
    ) -> CueframeResult<Option<ResponseEvent>> {
        self.collector.handle_event(ctx.now, event)
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    pub fn renderer_mut(&mut self) -> &mut dyn Renderer {
        self.renderer.as_mut()
    }

    pub fn collector(&self) -> &ResponseCollector {
        &self.collector
    }

    pub fn collector_mut(&mut self) -> &mut ResponseCollector {
        &mut self.collector
    }

    pub fn cleanup(&mut self, gpu: &mut GpuContext) {
        self.renderer.cleanup(gpu);
        self.collector.stop();
    }
}
