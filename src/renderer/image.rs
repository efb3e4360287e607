//! Static image stimulus: one texture, fit-mode placement, optional
//! zoom/fade transition.

use std::sync::Arc;

use crate::core::{FitMode, OnsetCell, Rect, RenderContext, Timestamp, fit_rect, fit_transform};
use crate::error::{CueframeError, CueframeResult};
use crate::gpu::{GpuContext, TextureId};
use crate::renderer::{Phase, Preload, Renderer, TransitionSpec, display_rect};
use crate::resources::{PreparedImage, ResourceSupplier};

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ImageConfig {
    pub id: String,
    /// Resource id handed to the supplier.
    pub source: String,
    #[serde(default)]
    pub fit: FitMode,
    /// Display box relative to the viewport origin; `None` fills the viewport.
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default)]
    pub transition: Option<TransitionSpec>,
}

pub struct ImageRenderer {
    config: ImageConfig,
    phase: Phase,
    image: Option<Arc<PreparedImage>>,
    texture: Option<TextureId>,
    uploaded: bool,
    onset: OnsetCell,
}

impl ImageRenderer {
    pub fn new(config: ImageConfig) -> CueframeResult<Self> {
        if config.id.trim().is_empty() || config.source.trim().is_empty() {
            return Err(CueframeError::validation(
                "image config id and source must be non-empty",
            ));
        }
        Ok(Self {
            config,
            phase: Phase::Unloaded,
            image: None,
            texture: None,
            uploaded: false,
            onset: OnsetCell::default(),
        })
    }

    /// Update layout parameters. The source is fixed for the lifetime of the
    /// renderer; schedule a new stimulus to change it.
    pub fn set_layout(&mut self, fit: FitMode, rect: Option<Rect>) {
        self.config.fit = fit;
        self.config.rect = rect;
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }
}

impl Renderer for ImageRenderer {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn preload(&mut self, resources: &dyn ResourceSupplier) -> CueframeResult<Preload> {
        match self.phase {
            Phase::Ready | Phase::Presenting => Ok(Preload::Ready),
            Phase::Failed => Err(CueframeError::resource_unavailable(format!(
                "image '{}' previously failed to load",
                self.config.source
            ))),
            Phase::Disposed => Err(CueframeError::validation("preload after dispose")),
            Phase::Unloaded | Phase::Preloading => {
                let Some(image) = resources.image(&self.config.source) else {
                    self.phase = Phase::Preloading;
                    return Ok(Preload::Pending);
                };
                if image.width == 0
                    || image.height == 0
                    || image.rgba8_premul.len()
                        != image.width as usize * image.height as usize * 4
                {
                    self.phase = Phase::Failed;
                    tracing::warn!(source = %self.config.source, "image handle is unusable");
                    return Err(CueframeError::resource_unavailable(format!(
                        "image '{}' handle is malformed",
                        self.config.source
                    )));
                }
                self.image = Some(image);
                self.phase = Phase::Ready;
                Ok(Preload::Ready)
            }
        }
    }

    fn prepare(&mut self, gpu: &mut GpuContext) -> CueframeResult<()> {
        let Some(image) = &self.image else {
            // Not preloaded yet; the orchestrator will prepare again.
            return Ok(());
        };
        let (w, h) = (image.width, image.height);

        if let Some(tex) = self.texture
            && gpu.texture_size(tex) != Some((w, h))
        {
            gpu.delete_texture(tex);
            self.texture = None;
            self.uploaded = false;
        }
        if self.texture.is_none() {
            self.texture = Some(gpu.create_texture(w, h)?);
            self.uploaded = false;
        }
        Ok(())
    }

    fn render(&mut self, gpu: &mut GpuContext, ctx: &RenderContext) -> CueframeResult<()> {
        if !matches!(self.phase, Phase::Ready | Phase::Presenting) {
            return Ok(());
        }
        let (Some(image), Some(tex)) = (self.image.clone(), self.texture) else {
            return Ok(());
        };

        if !self.uploaded {
            gpu.upload_texture(tex, &image.rgba8_premul)?;
            if crate::core::is_power_of_two(image.width)
                && crate::core::is_power_of_two(image.height)
            {
                gpu.generate_mipmaps(tex)?;
            }
            self.uploaded = true;
        }

        let target = display_rect(self.config.rect, ctx);
        let fitted = fit_rect(
            self.config.fit,
            f64::from(image.width),
            f64::from(image.height),
            target,
        )?;
        let scale = self.config.transition.map_or(1.0, |t| t.scale(ctx.progress));
        let opacity = self
            .config
            .transition
            .map_or(1.0, |t| t.opacity(ctx.progress));
        let transform = fit_transform(
            f64::from(image.width),
            f64::from(image.height),
            fitted,
            scale,
        );
        let clip = matches!(self.config.fit, FitMode::Cover).then_some(target);

        gpu.set_blend(ctx.blend);
        gpu.draw_texture_clipped(tex, transform, opacity, clip)?;
        gpu.reset_blend();

        if self.onset.mark(ctx.now) {
            tracing::debug!(id = %self.config.id, at = ctx.now.millis(), "image onset");
        }
        self.phase = Phase::Presenting;
        Ok(())
    }

    fn mark_onset(&mut self, now: Timestamp) {
        self.onset.mark(now);
    }

    fn onset(&self) -> Option<Timestamp> {
        self.onset.get()
    }

    fn cleanup(&mut self, gpu: &mut GpuContext) {
        if let Some(tex) = self.texture.take() {
            gpu.delete_texture(tex);
        }
        self.image = None;
        self.uploaded = false;
        self.phase = Phase::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::StaticResources;

    fn checker_image(w: u32, h: u32) -> PreparedImage {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for i in 0..(w * h) {
            let v = if i % 2 == 0 { 255 } else { 0 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
        PreparedImage {
            width: w,
            height: h,
            rgba8_premul: Arc::new(data),
        }
    }

    fn config(id: &str) -> ImageConfig {
        ImageConfig {
            id: id.to_string(),
            source: "img".to_string(),
            fit: FitMode::Fill,
            rect: None,
            transition: None,
        }
    }

    #[test]
    fn render_before_preload_is_noop_and_onset_stays_null() {
        let mut gpu = GpuContext::new(4, 4).unwrap();
        let mut r = ImageRenderer::new(config("q1")).unwrap();
        let ctx = RenderContext::new(4.0, 4.0, 1.0, Timestamp(10.0)).unwrap();

        r.render(&mut gpu, &ctx).unwrap();
        assert!(r.onset().is_none());
        assert_eq!(gpu.texture_count(), 0);
        assert_eq!(gpu.read_target().unwrap(), vec![0u8; 64]);
    }

    #[test]
    fn preload_is_pending_until_supplier_produces_handle() {
        let mut res = StaticResources::new();
        let mut r = ImageRenderer::new(config("q1")).unwrap();
        assert_eq!(r.preload(&res).unwrap(), Preload::Pending);
        assert_eq!(r.phase(), Phase::Preloading);

        res.insert_image("img", checker_image(2, 2));
        assert_eq!(r.preload(&res).unwrap(), Preload::Ready);
        assert_eq!(r.phase(), Phase::Ready);
        // Idempotent.
        assert_eq!(r.preload(&res).unwrap(), Preload::Ready);
    }

    #[test]
    fn onset_is_captured_once_on_first_rendered_frame() {
        let mut res = StaticResources::new();
        res.insert_image("img", checker_image(2, 2));
        let mut gpu = GpuContext::new(4, 4).unwrap();
        let mut r = ImageRenderer::new(config("q1")).unwrap();

        r.preload(&res).unwrap();
        r.prepare(&mut gpu).unwrap();
        let ctx1 = RenderContext::new(4.0, 4.0, 1.0, Timestamp(100.0)).unwrap();
        let ctx2 = RenderContext::new(4.0, 4.0, 1.0, Timestamp(200.0)).unwrap();
        r.render(&mut gpu, &ctx1).unwrap();
        r.render(&mut gpu, &ctx2).unwrap();
        assert_eq!(r.onset(), Some(Timestamp(100.0)));
        assert_eq!(r.phase(), Phase::Presenting);
    }

    #[test]
    fn pow2_source_gets_mipmaps_npot_does_not() {
        let mut res = StaticResources::new();
        res.insert_image("img", checker_image(4, 4));
        let mut gpu = GpuContext::new(8, 8).unwrap();
        let mut r = ImageRenderer::new(config("q1")).unwrap();
        r.preload(&res).unwrap();
        r.prepare(&mut gpu).unwrap();
        let ctx = RenderContext::new(8.0, 8.0, 1.0, Timestamp(0.0)).unwrap();
        r.render(&mut gpu, &ctx).unwrap();
        assert!(gpu.mip_level_count(r.texture().unwrap()) > 0);

        let mut res2 = StaticResources::new();
        res2.insert_image("img", checker_image(3, 2));
        let mut r2 = ImageRenderer::new(config("q2")).unwrap();
        r2.preload(&res2).unwrap();
        r2.prepare(&mut gpu).unwrap();
        r2.render(&mut gpu, &ctx).unwrap();
        assert_eq!(gpu.mip_level_count(r2.texture().unwrap()), 0);
    }

    #[test]
    fn prepare_after_resize_does_not_leak_handles() {
        let mut res = StaticResources::new();
        res.insert_image("img", checker_image(2, 2));
        let mut gpu = GpuContext::new(4, 4).unwrap();
        let mut r = ImageRenderer::new(config("q1")).unwrap();
        r.preload(&res).unwrap();
        r.prepare(&mut gpu).unwrap();
        r.prepare(&mut gpu).unwrap();
        assert_eq!(gpu.texture_count(), 1);
    }

    #[test]
    fn cleanup_is_idempotent_and_releases_texture() {
        let mut res = StaticResources::new();
        res.insert_image("img", checker_image(2, 2));
        let mut gpu = GpuContext::new(4, 4).unwrap();
        let mut r = ImageRenderer::new(config("q1")).unwrap();
        r.preload(&res).unwrap();
        r.prepare(&mut gpu).unwrap();
        r.cleanup(&mut gpu);
        r.cleanup(&mut gpu);
        assert_eq!(gpu.texture_count(), 0);
        assert_eq!(r.phase(), Phase::Disposed);
    }
}
