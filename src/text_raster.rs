//! Shaping, word-wrap layout, and glyph rasterization for text stimuli.
//!
//! Parley lays out the text against a fixed logical canvas width; vello_cpu
//! draws the glyph runs into a premultiplied RGBA8 buffer that the owning
//! renderer uploads as its texture.

use std::sync::Arc;

use crate::error::{CueframeError, CueframeResult};

/// RGBA8 brush color used by Parley text layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrushRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Stateful helper for building Parley text layouts from raw font bytes.
pub struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLayoutEngine {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Shape and lay out plain text using provided font bytes and styling.
    pub fn layout_plain(
        &mut self,
        text: &str,
        font_bytes: &[u8],
        size_px: f32,
        brush: TextBrushRgba8,
        max_width_px: Option<f32>,
    ) -> CueframeResult<parley::Layout<TextBrushRgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(CueframeError::validation(
                "text size_px must be finite and > 0",
            ));
        }

        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.to_vec()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            CueframeError::validation("no font families registered from font bytes")
        })?;

        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| CueframeError::validation("registered font family has no name"))?
            .to_string();

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        if let Some(w) = max_width_px {
            layout.break_all_lines(Some(w));
            layout.align(
                Some(w),
                parley::Alignment::Start,
                parley::AlignmentOptions::default(),
            );
        } else {
            layout.break_all_lines(None);
        }

        Ok(layout)
    }
}

/// Rasterize a laid-out text block onto a transparent `width × height`
/// canvas, returning premultiplied RGBA8 bytes.
pub fn rasterize_layout(
    layout: &parley::Layout<TextBrushRgba8>,
    font_bytes: &[u8],
    width: u32,
    height: u32,
) -> CueframeResult<Vec<u8>> {
    let w16: u16 = width
        .try_into()
        .map_err(|_| CueframeError::gpu("text canvas width exceeds u16"))?;
    let h16: u16 = height
        .try_into()
        .map_err(|_| CueframeError::gpu("text canvas height exceeds u16"))?;
    if width == 0 || height == 0 {
        return Err(CueframeError::gpu("text canvas has zero dimension"));
    }

    let font = vello_cpu::peniko::FontData::new(
        vello_cpu::peniko::Blob::from(font_bytes.to_vec()),
        0,
    );

    let mut ctx = vello_cpu::RenderContext::new(w16, h16);
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);

    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };

            let brush = run.style().brush;
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                brush.r, brush.g, brush.b, brush.a,
            ));

            let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            ctx.glyph_run(&font)
                .font_size(run.run().font_size())
                .fill_glyphs(glyphs);
        }
    }

    ctx.flush();
    let mut pixmap = vello_cpu::Pixmap::new(w16, h16);
    ctx.render_to_pixmap(&mut pixmap);
    Ok(pixmap.data_as_u8_slice().to_vec())
}

/// One-shot layout + raster for a plain text block.
pub fn rasterize_text(
    engine: &mut TextLayoutEngine,
    text: &str,
    font_bytes: &Arc<Vec<u8>>,
    size_px: f32,
    brush: TextBrushRgba8,
    width: u32,
    height: u32,
    wrap: bool,
) -> CueframeResult<Vec<u8>> {
    let max_width = if wrap { Some(width as f32) } else { None };
    let layout = engine.layout_plain(text, font_bytes, size_px, brush, max_width)?;
    rasterize_layout(&layout, font_bytes, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_rejects_non_positive_size() {
        let mut engine = TextLayoutEngine::new();
        let brush = TextBrushRgba8 {
            r: 255,
            g: 255,
            b: 255,
            a: 255,
        };
        assert!(engine.layout_plain("x", &[], 0.0, brush, None).is_err());
        assert!(engine.layout_plain("x", &[], f32::NAN, brush, None).is_err());
    }

    #[test]
    fn layout_rejects_empty_font_bytes() {
        let mut engine = TextLayoutEngine::new();
        let brush = TextBrushRgba8::default();
        assert!(engine.layout_plain("hello", &[], 16.0, brush, None).is_err());
    }
}
