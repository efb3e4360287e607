//! Text stimuli: plain text and a small HTML subset, shaped with Parley and
//! rasterized once per content change.

use std::sync::Arc;

use kurbo::Affine;

use crate::core::{OnsetCell, Rect, RenderContext, Timestamp};
use crate::error::{CueframeError, CueframeResult};
use crate::gpu::{GpuContext, TextureId};
use crate::renderer::{Phase, Preload, Renderer, TransitionSpec, display_rect};
use crate::resources::{PreparedFont, ResourceSupplier};
use crate::text_raster::{TextBrushRgba8, TextLayoutEngine, rasterize_text};

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TextConfig {
    pub id: String,
    pub text: String,
    /// Font resource id handed to the supplier.
    pub font: String,
    #[serde(default = "default_size_px")]
    pub size_px: f32,
    /// Straight-alpha text color.
    #[serde(default = "default_color")]
    pub color: [u8; 4],
    /// Display box relative to the viewport origin; `None` fills the viewport.
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default = "default_wrap")]
    pub wrap: bool,
    #[serde(default)]
    pub transition: Option<TransitionSpec>,
}

fn default_size_px() -> f32 {
    24.0
}

fn default_color() -> [u8; 4] {
    [255, 255, 255, 255]
}

fn default_wrap() -> bool {
    true
}

pub struct TextRenderer {
    config: TextConfig,
    phase: Phase,
    font: Option<Arc<PreparedFont>>,
    texture: Option<TextureId>,
    /// Canvas size the current texture was rasterized at.
    raster_size: Option<(u32, u32)>,
    needs_raster: bool,
    onset: OnsetCell,
}

impl TextRenderer {
    pub fn new(config: TextConfig) -> CueframeResult<Self> {
        if config.id.trim().is_empty() || config.font.trim().is_empty() {
            return Err(CueframeError::validation(
                "text config id and font must be non-empty",
            ));
        }
        if !config.size_px.is_finite() || config.size_px <= 0.0 {
            return Err(CueframeError::validation(
                "text size_px must be finite and > 0",
            ));
        }
        Ok(Self {
            config,
            phase: Phase::Unloaded,
            font: None,
            texture: None,
            raster_size: None,
            needs_raster: true,
            onset: OnsetCell::default(),
        })
    }

    /// Replace the displayed text. The new raster is picked up on the next
    /// frame; a stimulus that has already appeared keeps its onset.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.config.text = text.into();
        self.needs_raster = true;
    }

    pub fn set_color(&mut self, color: [u8; 4]) {
        self.config.color = color;
        self.needs_raster = true;
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    fn brush(&self) -> TextBrushRgba8 {
        let [r, g, b, a] = self.config.color;
        TextBrushRgba8 { r, g, b, a }
    }
}

impl Renderer for TextRenderer {
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
                "font '{}' previously failed to load",
                self.config.font
            ))),
            Phase::Disposed => Err(CueframeError::validation("preload after dispose")),
            Phase::Unloaded | Phase::Preloading => {
                let Some(font) = resources.font(&self.config.font) else {
                    self.phase = Phase::Preloading;
                    return Ok(Preload::Pending);
                };
                if font.bytes.is_empty() {
                    self.phase = Phase::Failed;
                    tracing::warn!(font = %self.config.font, "font handle is empty");
                    return Err(CueframeError::resource_unavailable(format!(
                        "font '{}' handle is empty",
                        self.config.font
                    )));
                }
                self.font = Some(font);
                self.phase = Phase::Ready;
                Ok(Preload::Ready)
            }
        }
    }

    fn prepare(&mut self, _gpu: &mut GpuContext) -> CueframeResult<()> {
        // Rasterization is deferred to render, where the canvas size is known.
        Ok(())
    }

    fn render(&mut self, gpu: &mut GpuContext, ctx: &RenderContext) -> CueframeResult<()> {
        if !matches!(self.phase, Phase::Ready | Phase::Presenting) {
            return Ok(());
        }
        let Some(font) = self.font.clone() else {
            return Ok(());
        };

        let target = display_rect(self.config.rect, ctx);
        let canvas_w = target.width().max(1.0).round() as u32;
        let canvas_h = target.height().max(1.0).round() as u32;

        if self.raster_size != Some((canvas_w, canvas_h)) {
            self.needs_raster = true;
        }
        if self.needs_raster {
            let mut engine = TextLayoutEngine::new();
            let pixels = rasterize_text(
                &mut engine,
                &self.config.text,
                &font.bytes,
                self.config.size_px,
                self.brush(),
                canvas_w,
                canvas_h,
                self.config.wrap,
            )?;
            if let Some(tex) = self.texture
                && gpu.texture_size(tex) != Some((canvas_w, canvas_h))
            {
                gpu.delete_texture(tex);
                self.texture = None;
            }
            let tex = match self.texture {
                Some(tex) => tex,
                None => {
                    let tex = gpu.create_texture(canvas_w, canvas_h)?;
                    self.texture = Some(tex);
                    tex
                }
            };
            gpu.upload_texture(tex, &pixels)?;
            self.raster_size = Some((canvas_w, canvas_h));
            self.needs_raster = false;
        }

        let Some(tex) = self.texture else {
            return Ok(());
        };
        let scale = self.config.transition.map_or(1.0, |t| t.scale(ctx.progress));
        let opacity = self
            .config
            .transition
            .map_or(1.0, |t| t.opacity(ctx.progress));
        let center = target.center();
        let transform = Affine::translate((center.x, center.y))
            * Affine::scale(scale)
            * Affine::translate((-center.x, -center.y))
            * Affine::translate((target.x0, target.y0));

        gpu.set_blend(ctx.blend);
        gpu.draw_texture(tex, transform, opacity)?;
        gpu.reset_blend();

        if self.onset.mark(ctx.now) {
            tracing::debug!(id = %self.config.id, at = ctx.now.millis(), "text onset");
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
        self.font = None;
        self.raster_size = None;
        self.phase = Phase::Disposed;
    }
}

/// Renders a restricted HTML fragment by flattening it to styled plain text.
///
/// Supported markup: `<p>`, `<br>`, `<b>`, `<strong>`, `<i>`, `<em>`,
/// `<span>`, `<div>` and the common named entities. Inline styling tags are
/// stripped; block tags become line breaks.
pub struct HtmlRenderer {
    inner: TextRenderer,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct HtmlConfig {
    pub id: String,
    pub html: String,
    pub font: String,
    #[serde(default = "default_size_px")]
    pub size_px: f32,
    #[serde(default = "default_color")]
    pub color: [u8; 4],
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default)]
    pub transition: Option<TransitionSpec>,
}

impl HtmlRenderer {
    pub fn new(config: HtmlConfig) -> CueframeResult<Self> {
        let text = flatten_html(&config.html);
        let inner = TextRenderer::new(TextConfig {
            id: config.id,
            text,
            font: config.font,
            size_px: config.size_px,
            color: config.color,
            rect: config.rect,
            wrap: true,
            transition: config.transition,
        })?;
        Ok(Self { inner })
    }

    pub fn set_html(&mut self, html: &str) {
        self.inner.set_text(flatten_html(html));
    }
}

impl Renderer for HtmlRenderer {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn phase(&self) -> Phase {
        self.inner.phase()
    }

    fn preload(&mut self, resources: &dyn ResourceSupplier) -> CueframeResult<Preload> {
        self.inner.preload(resources)
    }

    fn prepare(&mut self, gpu: &mut GpuContext) -> CueframeResult<()> {
        self.inner.prepare(gpu)
    }

    fn render(&mut self, gpu: &mut GpuContext, ctx: &RenderContext) -> CueframeResult<()> {
        self.inner.render(gpu, ctx)
    }

    fn mark_onset(&mut self, now: Timestamp) {
        self.inner.mark_onset(now);
    }

    fn onset(&self) -> Option<Timestamp> {
        self.inner.onset()
    }

    fn cleanup(&mut self, gpu: &mut GpuContext) {
        self.inner.cleanup(gpu);
    }
}

/// Flatten an HTML fragment to plain text. Block-level tags introduce line
/// breaks, inline tags are dropped, entities are decoded, runs of whitespace
/// inside a line collapse to one space.
pub(crate) fn flatten_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut chars = html.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '<' => {
                let rest = &html[i + 1..];
                let Some(end) = rest.find('>') else {
                    // Unterminated tag, keep the literal text.
                    out.push('<');
                    continue;
                };
                let tag = rest[..end].trim().to_ascii_lowercase();
                let name = tag
                    .trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or("");
                match name {
                    "br" => out.push('\n'),
                    "p" | "div" if tag.starts_with('/') => out.push('\n'),
                    "p" | "div" if !out.is_empty() && !out.ends_with('\n') => out.push('\n'),
                    _ => {}
                }
                // Skip past '>' at byte i + 1 + end.
                while let Some(&(j, _)) = chars.peek() {
                    if j > i + 1 + end {
                        break;
                    }
                    chars.next();
                }
            }
            '&' => {
                let rest = &html[i + 1..];
                let entity_end = rest.find(';').filter(|&n| n <= 8);
                match entity_end.map(|n| &rest[..n]) {
                    Some("amp") => out.push('&'),
                    Some("lt") => out.push('<'),
                    Some("gt") => out.push('>'),
                    Some("quot") => out.push('"'),
                    Some("#39") | Some("apos") => out.push('\''),
                    Some("nbsp") => out.push(' '),
                    Some(other) => {
                        out.push('&');
                        out.push_str(other);
                        out.push(';');
                    }
                    None => out.push('&'),
                }
                // Skip past ';' at byte i + 1 + n.
                if let Some(n) = entity_end {
                    while let Some(&(j, _)) = chars.peek() {
                        if j > i + 1 + n {
                            break;
                        }
                        chars.next();
                    }
                }
            }
            c if c.is_whitespace() && c != '\n' => {
                if !out.is_empty() && !out.ends_with([' ', '\n']) {
                    out.push(' ');
                }
            }
            '\n' => {
                if !out.is_empty() && !out.ends_with([' ', '\n']) {
                    out.push(' ');
                }
            }
            c => out.push(c),
        }
    }

    // Trim trailing layout whitespace per line and overall.
    let flattened: Vec<&str> = out.lines().map(str::trim_end).collect();
    flattened.join("\n").trim_end().to_string()
}
