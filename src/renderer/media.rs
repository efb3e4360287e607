//! Time-based stimuli: video playback with windowed loop/freeze semantics
//! and audio playback with an optional waveform or spectrum visualization.
//!
//! Playback position is driven entirely by the timestamps the orchestrator
//! passes through [`RenderContext`]; the renderers never read a wall clock.

use std::sync::Arc;

use kurbo::Affine;

use crate::analysis::{mixdown_mono, power_spectrum, waveform_columns};
use crate::core::{FitMode, OnsetCell, Rect, RenderContext, Timestamp, fit_rect, fit_transform};
use crate::error::{CueframeError, CueframeResult};
use crate::gpu::{GpuContext, TextureId};
use crate::renderer::{Phase, Preload, Renderer, display_rect};
use crate::resources::{PreparedAudio, PreparedVideo, ResourceSupplier};

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct VideoConfig {
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub fit: FitMode,
    #[serde(default)]
    pub rect: Option<Rect>,
    /// Playback window start within the clip, in milliseconds.
    #[serde(default)]
    pub start_ms: f64,
    /// Playback window end; `None` plays to the end of the clip.
    #[serde(default)]
    pub end_ms: Option<f64>,
    /// Wrap back to the window start when the window ends; otherwise the
    /// last frame freezes on screen.
    #[serde(default, rename = "loop")]
    pub looping: bool,
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
}

fn default_autoplay() -> bool {
    true
}

pub struct VideoRenderer {
    config: VideoConfig,
    phase: Phase,
    video: Option<Arc<PreparedVideo>>,
    texture: Option<TextureId>,
    uploaded_frame: Option<usize>,
    /// Offset into the playback window, in milliseconds.
    position_ms: f64,
    playing: bool,
    last_now: Option<Timestamp>,
    onset: OnsetCell,
}

impl VideoRenderer {
    pub fn new(config: VideoConfig) -> CueframeResult<Self> {
        if config.id.trim().is_empty() || config.source.trim().is_empty() {
            return Err(CueframeError::validation(
                "video config id and source must be non-empty",
            ));
        }
        if config.start_ms < 0.0 || !config.start_ms.is_finite() {
            return Err(CueframeError::validation("video start_ms must be >= 0"));
        }
        if let Some(end) = config.end_ms
            && (!end.is_finite() || end <= config.start_ms)
        {
            return Err(CueframeError::validation(
                "video end_ms must be greater than start_ms",
            ));
        }
        let playing = config.autoplay;
        Ok(Self {
            config,
            phase: Phase::Unloaded,
            video: None,
            texture: None,
            uploaded_frame: None,
            position_ms: 0.0,
            playing,
            last_now: None,
            onset: OnsetCell::default(),
        })
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Jump to an offset within the playback window. Clamped to the window.
    pub fn seek(&mut self, offset_ms: f64) {
        let span = self.window_span();
        self.position_ms = offset_ms.clamp(0.0, span);
    }

    pub fn position_ms(&self) -> f64 {
        self.position_ms
    }

    /// Index of the clip frame currently shown, if any.
    pub fn frame_index(&self) -> Option<usize> {
        self.uploaded_frame
    }

    fn window_span(&self) -> f64 {
        let Some(video) = &self.video else {
            return 0.0;
        };
        let duration = video.duration_ms();
        let end = self.config.end_ms.unwrap_or(duration).min(duration);
        (end - self.config.start_ms).max(0.0)
    }

    fn advance(&mut self, now: Timestamp) {
        let dt = self.last_now.map_or(0.0, |prev| now.since(prev).max(0.0));
        self.last_now = Some(now);
        if !self.playing {
            return;
        }
        let span = self.window_span();
        if span <= 0.0 {
            return;
        }
        self.position_ms += dt;
        if self.position_ms >= span {
            if self.config.looping {
                self.position_ms %= span;
            } else {
                self.position_ms = span;
                self.playing = false;
            }
        }
    }
}

impl Renderer for VideoRenderer {
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
                "video '{}' previously failed to load",
                self.config.source
            ))),
            Phase::Disposed => Err(CueframeError::validation("preload after dispose")),
            Phase::Unloaded | Phase::Preloading => {
                let Some(video) = resources.video(&self.config.source) else {
                    self.phase = Phase::Preloading;
                    return Ok(Preload::Pending);
                };
                let frame_len = video.width as usize * video.height as usize * 4;
                if video.width == 0
                    || video.height == 0
                    || video.fps <= 0.0
                    || video.frames.is_empty()
                    || video.frames.iter().any(|f| f.len() != frame_len)
                {
                    self.phase = Phase::Failed;
                    tracing::warn!(source = %self.config.source, "video handle is unusable");
                    return Err(CueframeError::resource_unavailable(format!(
                        "video '{}' handle is malformed",
                        self.config.source
                    )));
                }
                if self.config.start_ms >= video.duration_ms() {
                    self.phase = Phase::Failed;
                    return Err(CueframeError::validation(format!(
                        "video '{}' playback window starts after the clip ends",
                        self.config.source
                    )));
                }
                self.video = Some(video);
                self.phase = Phase::Ready;
                Ok(Preload::Ready)
            }
        }
    }

    fn prepare(&mut self, gpu: &mut GpuContext) -> CueframeResult<()> {
        let Some(video) = &self.video else {
            return Ok(());
        };
        let (w, h) = (video.width, video.height);
        if let Some(tex) = self.texture
            && gpu.texture_size(tex) != Some((w, h))
        {
            gpu.delete_texture(tex);
            self.texture = None;
            self.uploaded_frame = None;
        }
        if self.texture.is_none() {
            self.texture = Some(gpu.create_texture(w, h)?);
            self.uploaded_frame = None;
        }
        Ok(())
    }

    fn render(&mut self, gpu: &mut GpuContext, ctx: &RenderContext) -> CueframeResult<()> {
        if !matches!(self.phase, Phase::Ready | Phase::Presenting) {
            return Ok(());
        }
        let (Some(video), Some(tex)) = (self.video.clone(), self.texture) else {
            return Ok(());
        };

        self.advance(ctx.now);

        let frame = video.frame_index_at(self.config.start_ms + self.position_ms);
        if self.uploaded_frame != Some(frame) {
            gpu.upload_texture(tex, &video.frames[frame])?;
            self.uploaded_frame = Some(frame);
        }

        let target = display_rect(self.config.rect, ctx);
        let fitted = fit_rect(
            self.config.fit,
            f64::from(video.width),
            f64::from(video.height),
            target,
        )?;
        let transform = fit_transform(f64::from(video.width), f64::from(video.height), fitted, 1.0);
        let clip = matches!(self.config.fit, FitMode::Cover).then_some(target);

        gpu.set_blend(ctx.blend);
        gpu.draw_texture_clipped(tex, transform, 1.0, clip)?;
        gpu.reset_blend();

        if self.onset.mark(ctx.now) {
            tracing::debug!(id = %self.config.id, at = ctx.now.millis(), "video onset");
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
        self.video = None;
        self.uploaded_frame = None;
        self.phase = Phase::Disposed;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationKind {
    Waveform,
    Spectrum,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct VisualizationSpec {
    pub kind: VisualizationKind,
    #[serde(default)]
    pub rect: Option<Rect>,
    /// Minimum milliseconds between visualization redraws.
    #[serde(default = "default_viz_interval")]
    pub update_interval_ms: f64,
    /// Length of the analysis window that feeds each redraw.
    #[serde(default = "default_viz_window")]
    pub window_ms: f64,
}

fn default_viz_interval() -> f64 {
    50.0
}

fn default_viz_window() -> f64 {
    100.0
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AudioConfig {
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub visualization: Option<VisualizationSpec>,
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
}

pub struct AudioRenderer {
    config: AudioConfig,
    phase: Phase,
    audio: Option<Arc<PreparedAudio>>,
    viz_texture: Option<TextureId>,
    position_ms: f64,
    playing: bool,
    last_now: Option<Timestamp>,
    /// Playback position the visualization was last drawn for.
    viz_drawn_at: Option<f64>,
    onset: OnsetCell,
}

impl AudioRenderer {
    pub fn new(config: AudioConfig) -> CueframeResult<Self> {
        if config.id.trim().is_empty() || config.source.trim().is_empty() {
            return Err(CueframeError::validation(
                "audio config id and source must be non-empty",
            ));
        }
        if let Some(viz) = &config.visualization
            && (viz.update_interval_ms <= 0.0 || viz.window_ms <= 0.0)
        {
            return Err(CueframeError::validation(
                "visualization intervals must be > 0",
            ));
        }
        let playing = config.autoplay;
        Ok(Self {
            config,
            phase: Phase::Unloaded,
            audio: None,
            viz_texture: None,
            position_ms: 0.0,
            playing,
            last_now: None,
            viz_drawn_at: None,
            onset: OnsetCell::default(),
        })
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn seek(&mut self, offset_ms: f64) {
        let duration = self.audio.as_ref().map_or(0.0, |a| a.duration_ms());
        self.position_ms = offset_ms.clamp(0.0, duration);
    }

    pub fn position_ms(&self) -> f64 {
        self.position_ms
    }

    fn advance(&mut self, now: Timestamp) {
        let dt = self.last_now.map_or(0.0, |prev| now.since(prev).max(0.0));
        self.last_now = Some(now);
        if !self.playing {
            return;
        }
        let duration = self.audio.as_ref().map_or(0.0, |a| a.duration_ms());
        self.position_ms += dt;
        if self.position_ms >= duration {
            self.position_ms = duration;
            self.playing = false;
        }
    }

    /// Redraw and composite the visualization texture. Called by the host on
    /// its own cadence, independent of the per-frame `render()` call. No-op
    /// without a configured visualization or before preload completes.
    pub fn draw_visualization(
        &mut self,
        gpu: &mut GpuContext,
        now: Timestamp,
    ) -> CueframeResult<()> {
        if !matches!(self.phase, Phase::Ready | Phase::Presenting) {
            return Ok(());
        }
        let Some(viz) = self.config.visualization.clone() else {
            return Ok(());
        };
        let Some(audio) = self.audio.clone() else {
            return Ok(());
        };
        self.advance(now);

        let target = viz.rect.unwrap_or_else(|| {
            Rect::new(0.0, 0.0, f64::from(gpu.width()), f64::from(gpu.height()))
        });
        let w = target.width().max(1.0).round() as u32;
        let h = target.height().max(1.0).round() as u32;

        if let Some(tex) = self.viz_texture
            && gpu.texture_size(tex) != Some((w, h))
        {
            gpu.delete_texture(tex);
            self.viz_texture = None;
            self.viz_drawn_at = None;
        }
        let tex = match self.viz_texture {
            Some(tex) => tex,
            None => {
                let tex = gpu.create_texture(w, h)?;
                self.viz_texture = Some(tex);
                tex
            }
        };

        let due = self
            .viz_drawn_at
            .is_none_or(|at| (self.position_ms - at).abs() >= viz.update_interval_ms);
        if due {
            let ch = audio.channels.max(1) as usize;
            let start_frame = (self.position_ms / 1000.0 * f64::from(audio.sample_rate)) as usize;
            let window_frames = (viz.window_ms / 1000.0 * f64::from(audio.sample_rate)) as usize;
            let total_frames = audio.interleaved_f32.len() / ch;
            let start = start_frame.min(total_frames);
            let end = (start_frame + window_frames).min(total_frames);
            let mono = mixdown_mono(&audio.interleaved_f32[start * ch..end * ch], audio.channels);

            let pixels = match viz.kind {
                VisualizationKind::Waveform => paint_waveform(&mono, w, h),
                VisualizationKind::Spectrum => paint_spectrum(&mono, w, h),
            };
            gpu.upload_texture(tex, &pixels)?;
            self.viz_drawn_at = Some(self.position_ms);
        }

        gpu.draw_texture(tex, Affine::translate((target.x0, target.y0)), 1.0)?;
        Ok(())
    }
}

impl Renderer for AudioRenderer {
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
                "audio '{}' previously failed to load",
                self.config.source
            ))),
            Phase::Disposed => Err(CueframeError::validation("preload after dispose")),
            Phase::Unloaded | Phase::Preloading => {
                let Some(audio) = resources.audio(&self.config.source) else {
                    self.phase = Phase::Preloading;
                    return Ok(Preload::Pending);
                };
                if audio.sample_rate == 0
                    || audio.channels == 0
                    || audio.interleaved_f32.is_empty()
                {
                    self.phase = Phase::Failed;
                    tracing::warn!(source = %self.config.source, "audio handle is unusable");
                    return Err(CueframeError::resource_unavailable(format!(
                        "audio '{}' handle is malformed",
                        self.config.source
                    )));
                }
                self.audio = Some(audio);
                self.phase = Phase::Ready;
                Ok(Preload::Ready)
            }
        }
    }

    fn prepare(&mut self, _gpu: &mut GpuContext) -> CueframeResult<()> {
        // Visualization textures are sized at draw time.
        Ok(())
    }

    fn render(&mut self, _gpu: &mut GpuContext, ctx: &RenderContext) -> CueframeResult<()> {
        if !matches!(self.phase, Phase::Ready | Phase::Presenting) {
            return Ok(());
        }
        if self.audio.is_none() {
            return Ok(());
        }

        let was_started = self.onset.is_set();
        self.advance(ctx.now);

        // An audible stimulus "appears" when playback starts, whether or not
        // it draws anything.
        if !was_started && self.playing && self.onset.mark(ctx.now) {
            tracing::debug!(id = %self.config.id, at = ctx.now.millis(), "audio onset");
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
        if let Some(tex) = self.viz_texture.take() {
            gpu.delete_texture(tex);
        }
        self.audio = None;
        self.viz_drawn_at = None;
        self.phase = Phase::Disposed;
    }
}

/// Paint a min/max waveform into a premultiplied RGBA8 canvas.
fn paint_waveform(mono: &[f32], width: u32, height: u32) -> Vec<u8> {
    let mut pixels = vec![0u8; (width * height * 4) as usize];
    let cols = waveform_columns(mono, width as usize);
    let half = f64::from(height) / 2.0;
    for (x, &(lo, hi)) in cols.iter().enumerate() {
        let y_top = ((1.0 - f64::from(hi.clamp(-1.0, 1.0))) * half) as u32;
        let y_bot = ((1.0 - f64::from(lo.clamp(-1.0, 1.0))) * half) as u32;
        for y in y_top..=y_bot.min(height.saturating_sub(1)) {
            let idx = ((y * width + x as u32) * 4) as usize;
            pixels[idx..idx + 4].copy_from_slice(&[255, 255, 255, 255]);
        }
    }
    pixels
}

/// Paint vertical spectrum bars into a premultiplied RGBA8 canvas.
fn paint_spectrum(mono: &[f32], width: u32, height: u32) -> Vec<u8> {
    let mut pixels = vec![0u8; (width * height * 4) as usize];
    let bins = 32.min(width.max(1) as usize);
    let powers = power_spectrum(mono, bins);
    let bar_w = (width as usize / bins).max(1);
    for (k, &p) in powers.iter().enumerate() {
        let bar_h = (f64::from(p) * f64::from(height)) as u32;
        let x0 = k * bar_w;
        for x in x0..(x0 + bar_w).min(width as usize) {
            for y in height.saturating_sub(bar_h)..height {
                let idx = ((y * width + x as u32) * 4) as usize;
                pixels[idx..idx + 4].copy_from_slice(&[255, 255, 255, 255]);
            }
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::StaticResources;

    fn solid_frame(w: u32, h: u32, v: u8) -> Arc<Vec<u8>> {
        Arc::new(vec![v; (w * h * 4) as usize])
    }

    fn two_second_video() -> PreparedVideo {
        // 2 fps, 4 frames, 2000 ms.
        PreparedVideo {
            width: 2,
            height: 2,
            fps: 2.0,
            frames: (0u8..4).map(|i| solid_frame(2, 2, i * 60)).collect(),
        }
    }

    fn video_config(looping: bool) -> VideoConfig {
        VideoConfig {
            id: "v1".to_string(),
            source: "clip".to_string(),
            fit: FitMode::Fill,
            rect: None,
            start_ms: 0.0,
            end_ms: None,
            looping,
            autoplay: true,
        }
    }

    fn video_supplier() -> StaticResources {
        let mut res = StaticResources::new();
        res.insert_video("clip", two_second_video());
        res
    }

    fn ctx_at(t: f64) -> RenderContext {
        RenderContext::new(4.0, 4.0, 1.0, Timestamp(t)).unwrap()
    }

    #[test]
    fn frame_upload_only_when_index_changes() {
        let mut gpu = GpuContext::new(4, 4).unwrap();
        let mut r = VideoRenderer::new(video_config(false)).unwrap();
        r.preload(&video_supplier()).unwrap();
        r.prepare(&mut gpu).unwrap();

        r.render(&mut gpu, &ctx_at(0.0)).unwrap();
        assert_eq!(r.frame_index(), Some(0));
        r.render(&mut gpu, &ctx_at(100.0)).unwrap();
        assert_eq!(r.frame_index(), Some(0));
        r.render(&mut gpu, &ctx_at(600.0)).unwrap();
        assert_eq!(r.frame_index(), Some(1));
    }

    #[test]
    fn video_freezes_on_last_frame_without_loop() {
        let mut gpu = GpuContext::new(4, 4).unwrap();
        let mut r = VideoRenderer::new(video_config(false)).unwrap();
        r.preload(&video_supplier()).unwrap();
        r.prepare(&mut gpu).unwrap();

        r.render(&mut gpu, &ctx_at(0.0)).unwrap();
        r.render(&mut gpu, &ctx_at(5000.0)).unwrap();
        assert!(!r.is_playing());
        assert_eq!(r.frame_index(), Some(3));
        r.render(&mut gpu, &ctx_at(6000.0)).unwrap();
        assert_eq!(r.frame_index(), Some(3));
    }

    #[test]
    fn video_loops_within_its_window() {
        let mut gpu = GpuContext::new(4, 4).unwrap();
        let mut config = video_config(true);
        config.start_ms = 0.0;
        config.end_ms = Some(1000.0);
        let mut r = VideoRenderer::new(config).unwrap();
        r.preload(&video_supplier()).unwrap();
        r.prepare(&mut gpu).unwrap();

        r.render(&mut gpu, &ctx_at(0.0)).unwrap();
        // 1100 ms into a 1000 ms window wraps to 100 ms.
        r.render(&mut gpu, &ctx_at(1100.0)).unwrap();
        assert!(r.is_playing());
        assert!((r.position_ms() - 100.0).abs() < 1e-9);
        assert_eq!(r.frame_index(), Some(0));
    }

    #[test]
    fn video_onset_marked_once() {
        let mut gpu = GpuContext::new(4, 4).unwrap();
        let mut r = VideoRenderer::new(video_config(true)).unwrap();
        r.preload(&video_supplier()).unwrap();
        r.prepare(&mut gpu).unwrap();
        r.render(&mut gpu, &ctx_at(42.0)).unwrap();
        r.render(&mut gpu, &ctx_at(90.0)).unwrap();
        assert_eq!(r.onset(), Some(Timestamp(42.0)));
    }

    #[test]
    fn seek_clamps_to_window() {
        let mut r = VideoRenderer::new(video_config(false)).unwrap();
        r.preload(&video_supplier()).unwrap();
        r.seek(99_999.0);
        assert!((r.position_ms() - 2000.0).abs() < 1e-9);
        r.seek(-5.0);
        assert_eq!(r.position_ms(), 0.0);
    }

    fn one_second_audio() -> PreparedAudio {
        PreparedAudio {
            sample_rate: 1000,
            channels: 1,
            interleaved_f32: Arc::new(vec![0.5; 1000]),
        }
    }

    fn audio_supplier() -> StaticResources {
        let mut res = StaticResources::new();
        res.insert_audio("snd", one_second_audio());
        res
    }

    #[test]
    fn audio_onset_at_playback_start_without_visuals() {
        let mut gpu = GpuContext::new(4, 4).unwrap();
        let mut r = AudioRenderer::new(AudioConfig {
            id: "a1".to_string(),
            source: "snd".to_string(),
            visualization: None,
            autoplay: true,
        })
        .unwrap();
        r.preload(&audio_supplier()).unwrap();
        r.render(&mut gpu, &ctx_at(7.0)).unwrap();
        assert_eq!(r.onset(), Some(Timestamp(7.0)));
        assert_eq!(gpu.texture_count(), 0);
    }

    #[test]
    fn audio_stops_at_end_of_samples() {
        let mut gpu = GpuContext::new(4, 4).unwrap();
        let mut r = AudioRenderer::new(AudioConfig {
            id: "a1".to_string(),
            source: "snd".to_string(),
            visualization: None,
            autoplay: true,
        })
        .unwrap();
        r.preload(&audio_supplier()).unwrap();
        r.render(&mut gpu, &ctx_at(0.0)).unwrap();
        r.render(&mut gpu, &ctx_at(5000.0)).unwrap();
        assert!(!r.is_playing());
        assert!((r.position_ms() - 1000.0).abs() < 1e-9);
    }

    fn waveform_audio() -> AudioRenderer {
        AudioRenderer::new(AudioConfig {
            id: "a1".to_string(),
            source: "snd".to_string(),
            visualization: Some(VisualizationSpec {
                kind: VisualizationKind::Waveform,
                rect: None,
                update_interval_ms: 50.0,
                window_ms: 100.0,
            }),
            autoplay: true,
        })
        .unwrap()
    }

    #[test]
    fn visualization_runs_on_its_own_cadence() {
        let mut gpu = GpuContext::new(8, 8).unwrap();
        let mut r = waveform_audio();
        r.preload(&audio_supplier()).unwrap();

        // The per-frame render never touches the visualization texture.
        r.render(&mut gpu, &ctx_at(0.0)).unwrap();
        assert_eq!(gpu.texture_count(), 0);

        r.draw_visualization(&mut gpu, Timestamp(0.0)).unwrap();
        assert_eq!(gpu.texture_count(), 1);
        let first = r.viz_drawn_at;

        // 10 ms later, below the 50 ms cadence, no redraw.
        r.draw_visualization(&mut gpu, Timestamp(10.0)).unwrap();
        assert_eq!(r.viz_drawn_at, first);
        // 60 ms in, redraw.
        r.draw_visualization(&mut gpu, Timestamp(60.0)).unwrap();
        assert_ne!(r.viz_drawn_at, first);
    }

    #[test]
    fn visualization_works_without_render_frames() {
        let mut gpu = GpuContext::new(8, 8).unwrap();
        let mut r = waveform_audio();
        r.preload(&audio_supplier()).unwrap();

        r.draw_visualization(&mut gpu, Timestamp(0.0)).unwrap();
        r.draw_visualization(&mut gpu, Timestamp(200.0)).unwrap();
        assert_eq!(gpu.texture_count(), 1);
        assert!((r.position_ms() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_video_handle_fails_permanently() {
        let mut res = StaticResources::new();
        res.insert_video(
            "clip",
            PreparedVideo {
                width: 2,
                height: 2,
                fps: 0.0,
                frames: vec![solid_frame(2, 2, 0)],
            },
        );
        let mut r = VideoRenderer::new(video_config(false)).unwrap();
        assert!(r.preload(&res).is_err());
        assert_eq!(r.phase(), Phase::Failed);
        assert!(r.preload(&res).is_err());
    }
}
