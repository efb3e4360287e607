//! Software surface arena standing in for the shared GL context.
//!
//! Textures and framebuffers live behind opaque ids and are exclusively
//! owned by the renderer that created them; the arena itself is the one
//! shared mutable resource of a frame. Draw calls fully re-establish the
//! state they need (paint, transform, blend) so no renderer can corrupt a
//! sibling's subsequent draw by leaving state behind.

use std::collections::HashMap;
use std::sync::Arc;

use crate::blend::blend_in_place;
use crate::core::{Affine, BlendMode};
use crate::error::{CueframeError, CueframeResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(u32);

struct Texture {
    width: u32,
    height: u32,
    /// Premultiplied RGBA8, row-major, tightly packed.
    data: Vec<u8>,
    /// Downsampled levels, base level excluded. Populated only on request.
    mips: Vec<(u32, u32, Vec<u8>)>,
}

struct Framebuffer {
    color: TextureId,
}

pub struct GpuContext {
    width: u32,
    height: u32,
    /// The default (on-screen) target.
    target: Vec<u8>,
    textures: HashMap<TextureId, Texture>,
    framebuffers: HashMap<FramebufferId, Framebuffer>,
    bound: Option<FramebufferId>,
    blend: BlendMode,
    paint_cache: HashMap<TextureId, vello_cpu::Image>,
    next_texture: u32,
    next_framebuffer: u32,
}

impl GpuContext {
    pub fn new(width: u32, height: u32) -> CueframeResult<Self> {
        check_dims(width, height)?;
        Ok(Self {
            width,
            height,
            target: vec![0u8; width as usize * height as usize * 4],
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            bound: None,
            blend: BlendMode::Normal,
            paint_cache: HashMap::new(),
            next_texture: 1,
            next_framebuffer: 1,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resize the default target, clearing it to transparent.
    pub fn resize(&mut self, width: u32, height: u32) -> CueframeResult<()> {
        check_dims(width, height)?;
        self.width = width;
        self.height = height;
        self.target = vec![0u8; width as usize * height as usize * 4];
        Ok(())
    }

    pub fn create_texture(&mut self, width: u32, height: u32) -> CueframeResult<TextureId> {
        check_dims(width, height)?;
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(
            id,
            Texture {
                width,
                height,
                data: vec![0u8; width as usize * height as usize * 4],
                mips: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Upload premultiplied RGBA8 pixels into `tex`, replacing its contents.
    /// Invalidates any mip chain and cached paint for the texture.
    pub fn upload_texture(&mut self, tex: TextureId, rgba8_premul: &[u8]) -> CueframeResult<()> {
        let t = self
            .textures
            .get_mut(&tex)
            .ok_or_else(|| CueframeError::gpu("upload to unknown texture"))?;
        let expected = t.width as usize * t.height as usize * 4;
        if rgba8_premul.len() != expected {
            return Err(CueframeError::gpu(format!(
                "upload byte length mismatch: got {}, expected {expected}",
                rgba8_premul.len()
            )));
        }
        t.data.copy_from_slice(rgba8_premul);
        t.mips.clear();
        self.paint_cache.remove(&tex);
        Ok(())
    }

    /// Build a box-filtered mip chain down to 1×1. Callers gate this on
    /// power-of-two dimensions; non-pow2 textures are rejected.
    pub fn generate_mipmaps(&mut self, tex: TextureId) -> CueframeResult<()> {
        let t = self
            .textures
            .get_mut(&tex)
            .ok_or_else(|| CueframeError::gpu("generate_mipmaps on unknown texture"))?;
        if !crate::core::is_power_of_two(t.width) || !crate::core::is_power_of_two(t.height) {
            return Err(CueframeError::gpu(
                "mipmaps require power-of-two texture dimensions",
            ));
        }

        t.mips.clear();
        let (mut w, mut h) = (t.width, t.height);
        let mut src = t.data.clone();
        while w > 1 || h > 1 {
            let nw = (w / 2).max(1);
            let nh = (h / 2).max(1);
            let mut level = vec![0u8; nw as usize * nh as usize * 4];
            for y in 0..nh {
                for x in 0..nw {
                    let mut acc = [0u32; 4];
                    let mut n = 0u32;
                    for dy in 0..2u32 {
                        for dx in 0..2u32 {
                            let sx = (x * 2 + dx).min(w - 1);
                            let sy = (y * 2 + dy).min(h - 1);
                            let idx = ((sy * w + sx) * 4) as usize;
                            for c in 0..4 {
                                acc[c] += u32::from(src[idx + c]);
                            }
                            n += 1;
                        }
                    }
                    let idx = ((y * nw + x) * 4) as usize;
                    for c in 0..4 {
                        level[idx + c] = (acc[c] / n) as u8;
                    }
                }
            }
            t.mips.push((nw, nh, level.clone()));
            src = level;
            w = nw;
            h = nh;
        }
        Ok(())
    }

    pub fn mip_level_count(&self, tex: TextureId) -> usize {
        self.textures.get(&tex).map_or(0, |t| t.mips.len())
    }

    /// Release a texture. Deleting an absent id is a no-op, so owners can
    /// call this from an idempotent `cleanup()` unconditionally.
    pub fn delete_texture(&mut self, tex: TextureId) {
        self.textures.remove(&tex);
        self.paint_cache.remove(&tex);
    }

    pub fn texture_size(&self, tex: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&tex).map(|t| (t.width, t.height))
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Allocate an offscreen framebuffer with one color attachment.
    pub fn create_framebuffer(&mut self, width: u32, height: u32) -> CueframeResult<FramebufferId> {
        let color = self.create_texture(width, height)?;
        let id = FramebufferId(self.next_framebuffer);
        self.next_framebuffer += 1;
        self.framebuffers.insert(id, Framebuffer { color });
        Ok(id)
    }

    pub fn framebuffer_texture(&self, fb: FramebufferId) -> Option<TextureId> {
        self.framebuffers.get(&fb).map(|f| f.color)
    }

    /// Release a framebuffer and its color attachment. Idempotent.
    pub fn delete_framebuffer(&mut self, fb: FramebufferId) {
        if let Some(f) = self.framebuffers.remove(&fb) {
            self.delete_texture(f.color);
        }
        if self.bound == Some(fb) {
            self.bound = None;
        }
    }

    /// Direct subsequent clears/draws into `fb` instead of the default target.
    pub fn bind_framebuffer(&mut self, fb: FramebufferId) -> CueframeResult<()> {
        let f = self
            .framebuffers
            .get(&fb)
            .ok_or_else(|| CueframeError::framebuffer_incomplete("bind of unknown framebuffer"))?;
        if !self.textures.contains_key(&f.color) {
            return Err(CueframeError::framebuffer_incomplete(
                "framebuffer color attachment is missing",
            ));
        }
        self.bound = Some(fb);
        Ok(())
    }

    pub fn unbind_framebuffer(&mut self) {
        self.bound = None;
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound
    }

    pub fn set_blend(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    /// Restore the default blend state.
    pub fn reset_blend(&mut self) {
        self.blend = BlendMode::Normal;
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    /// Clear the current target to a premultiplied RGBA8 color.
    pub fn clear(&mut self, rgba8_premul: [u8; 4]) -> CueframeResult<()> {
        let (buf, _, _) = self.current_target_mut()?;
        for px in buf.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba8_premul);
        }
        self.invalidate_bound_paint();
        Ok(())
    }

    /// Draw `tex` through `transform` into the current target using the
    /// active blend mode. The quad is rasterized on a transparent scratch
    /// surface first, then folded into the target, so state never leaks
    /// between draws.
    pub fn draw_texture(
        &mut self,
        tex: TextureId,
        transform: Affine,
        opacity: f32,
    ) -> CueframeResult<()> {
        self.draw_texture_clipped(tex, transform, opacity, None)
    }

    /// [`draw_texture`](Self::draw_texture) with an optional scissor rect in
    /// target pixels; pixels outside it are dropped before the blend (used
    /// by `cover` fits, which overflow their display box by construction).
    pub fn draw_texture_clipped(
        &mut self,
        tex: TextureId,
        transform: Affine,
        opacity: f32,
        clip: Option<kurbo::Rect>,
    ) -> CueframeResult<()> {
        let (tex_w, tex_h) = self
            .texture_size(tex)
            .ok_or_else(|| CueframeError::gpu("draw of unknown texture"))?;
        let paint = self.paint_for(tex)?;

        let (_, target_w, target_h) = self.current_target_mut()?;
        let w16: u16 = target_w
            .try_into()
            .map_err(|_| CueframeError::gpu("target width exceeds u16"))?;
        let h16: u16 = target_h
            .try_into()
            .map_err(|_| CueframeError::gpu("target height exceeds u16"))?;

        let mut ctx = vello_cpu::RenderContext::new(w16, h16);
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_transform(affine_to_cpu(transform));
        ctx.set_paint(paint);
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(tex_w),
            f64::from(tex_h),
        ));
        ctx.flush();

        let mut scratch = vello_cpu::Pixmap::new(w16, h16);
        ctx.render_to_pixmap(&mut scratch);

        if let Some(clip) = clip {
            scissor_in_place(scratch.data_as_u8_slice_mut(), target_w, target_h, clip);
        }

        let mode = self.blend;
        let (buf, _, _) = self.current_target_mut()?;
        blend_in_place(buf, scratch.data_as_u8_slice(), mode, opacity)?;
        self.invalidate_bound_paint();
        Ok(())
    }

    /// Copy out the contents of the current target (bound framebuffer or the
    /// default surface).
    pub fn read_target(&mut self) -> CueframeResult<Vec<u8>> {
        let (buf, _, _) = self.current_target_mut()?;
        Ok(buf.to_vec())
    }

    pub fn read_texture(&self, tex: TextureId) -> CueframeResult<Vec<u8>> {
        self.textures
            .get(&tex)
            .map(|t| t.data.clone())
            .ok_or_else(|| CueframeError::gpu("read of unknown texture"))
    }

    fn current_target_mut(&mut self) -> CueframeResult<(&mut [u8], u32, u32)> {
        match self.bound {
            None => Ok((&mut self.target, self.width, self.height)),
            Some(fb) => {
                let color = self
                    .framebuffers
                    .get(&fb)
                    .map(|f| f.color)
                    .ok_or_else(|| {
                        CueframeError::framebuffer_incomplete("bound framebuffer was deleted")
                    })?;
                let t = self.textures.get_mut(&color).ok_or_else(|| {
                    CueframeError::framebuffer_incomplete("framebuffer color attachment is missing")
                })?;
                Ok((&mut t.data, t.width, t.height))
            }
        }
    }

    /// Drop the cached paint of the bound framebuffer's attachment after a
    /// write lands in it; the next sample of that texture rebuilds the paint.
    fn invalidate_bound_paint(&mut self) {
        if let Some(fb) = self.bound
            && let Some(f) = self.framebuffers.get(&fb)
        {
            self.paint_cache.remove(&f.color);
        }
    }

    fn paint_for(&mut self, tex: TextureId) -> CueframeResult<vello_cpu::Image> {
        if let Some(paint) = self.paint_cache.get(&tex) {
            return Ok(paint.clone());
        }
        let t = self
            .textures
            .get(&tex)
            .ok_or_else(|| CueframeError::gpu("paint for unknown texture"))?;
        let pixmap = premul_bytes_to_pixmap(&t.data, t.width, t.height)?;
        let paint = vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        };
        self.paint_cache.insert(tex, paint.clone());
        Ok(paint)
    }
}

fn check_dims(width: u32, height: u32) -> CueframeResult<()> {
    if width == 0 || height == 0 {
        return Err(CueframeError::gpu("allocation with zero dimension"));
    }
    if width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
        return Err(CueframeError::gpu("allocation exceeds u16 dimensions"));
    }
    Ok(())
}

fn scissor_in_place(buf: &mut [u8], width: u32, height: u32, clip: kurbo::Rect) {
    for y in 0..height {
        for x in 0..width {
            let cx = f64::from(x) + 0.5;
            let cy = f64::from(y) + 0.5;
            if cx < clip.x0 || cx > clip.x1 || cy < clip.y0 || cy > clip.y1 {
                let idx = ((y * width + x) * 4) as usize;
                buf[idx..idx + 4].fill(0);
            }
        }
    }
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

pub(crate) fn premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> CueframeResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| CueframeError::gpu("pixmap width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| CueframeError::gpu("pixmap height exceeds u16"))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(CueframeError::gpu("pixmap byte length mismatch"));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in rgba8_premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}
