//! Decoded media handles and the supplier seam.
//!
//! Decode and cache policy live outside this core: a [`ResourceSupplier`]
//! hands over ready-to-use handles. `None` means "not available yet" and the
//! requesting renderer stays pending and retries; only a supplier that will
//! never produce the asset should make the renderer fail its preload.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context as _;

use crate::error::CueframeResult;

#[derive(Clone, Debug)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    /// Premultiplied RGBA8, row-major, tightly packed.
    pub rgba8_premul: Arc<Vec<u8>>,
}

/// A fully decoded frame sequence. Frame `i` covers
/// `[i/fps, (i+1)/fps)` seconds of media time.
#[derive(Clone, Debug)]
pub struct PreparedVideo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Premultiplied RGBA8 frames.
    pub frames: Vec<Arc<Vec<u8>>>,
}

impl PreparedVideo {
    pub fn duration_ms(&self) -> f64 {
        if self.fps <= 0.0 {
            0.0
        } else {
            self.frames.len() as f64 * 1000.0 / self.fps
        }
    }

    /// Frame index for a media-time position, clamped to the last frame.
    pub fn frame_index_at(&self, position_ms: f64) -> usize {
        if self.frames.is_empty() || self.fps <= 0.0 {
            return 0;
        }
        let idx = (position_ms.max(0.0) / 1000.0 * self.fps).floor() as usize;
        idx.min(self.frames.len() - 1)
    }
}

#[derive(Clone, Debug)]
pub struct PreparedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Arc<Vec<f32>>,
}

impl PreparedAudio {
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        let frames = self.interleaved_f32.len() / usize::from(self.channels);
        frames as f64 * 1000.0 / f64::from(self.sample_rate)
    }
}

#[derive(Clone, Debug)]
pub struct PreparedFont {
    pub bytes: Arc<Vec<u8>>,
}

/// External supplier of decoded media handles.
///
/// `None` is a retryable "not yet"; renderers re-request on their next
/// preload poll.
pub trait ResourceSupplier {
    fn image(&self, id: &str) -> Option<Arc<PreparedImage>>;
    fn video(&self, id: &str) -> Option<Arc<PreparedVideo>>;
    fn audio(&self, id: &str) -> Option<Arc<PreparedAudio>>;
    fn font(&self, id: &str) -> Option<Arc<PreparedFont>>;
}

/// In-memory supplier for tests and embedding hosts that preload everything
/// up front.
#[derive(Default)]
pub struct StaticResources {
    images: HashMap<String, Arc<PreparedImage>>,
    videos: HashMap<String, Arc<PreparedVideo>>,
    audio: HashMap<String, Arc<PreparedAudio>>,
    fonts: HashMap<String, Arc<PreparedFont>>,
}

impl StaticResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_image(&mut self, id: impl Into<String>, image: PreparedImage) {
        self.images.insert(id.into(), Arc::new(image));
    }

    pub fn insert_video(&mut self, id: impl Into<String>, video: PreparedVideo) {
        self.videos.insert(id.into(), Arc::new(video));
    }

    pub fn insert_audio(&mut self, id: impl Into<String>, audio: PreparedAudio) {
        self.audio.insert(id.into(), Arc::new(audio));
    }

    pub fn insert_font(&mut self, id: impl Into<String>, font: PreparedFont) {
        self.fonts.insert(id.into(), Arc::new(font));
    }
}

impl ResourceSupplier for StaticResources {
    fn image(&self, id: &str) -> Option<Arc<PreparedImage>> {
        self.images.get(id).cloned()
    }

    fn video(&self, id: &str) -> Option<Arc<PreparedVideo>> {
        self.videos.get(id).cloned()
    }

    fn audio(&self, id: &str) -> Option<Arc<PreparedAudio>> {
        self.audio.get(id).cloned()
    }

    fn font(&self, id: &str) -> Option<Arc<PreparedFont>> {
        self.fonts.get(id).cloned()
    }
}

pub fn decode_image(bytes: &[u8]) -> CueframeResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

pub fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn decode_image_png_dimensions_and_premul() {
        let src_rgba = vec![100u8, 50u8, 200u8, 128u8];
        let img = image::RgbaImage::from_raw(1, 1, src_rgba).unwrap();

        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let prepared = decode_image(&buf).unwrap();
        assert_eq!(prepared.width, 1);
        assert_eq!(prepared.height, 1);
        assert_eq!(
            prepared.rgba8_premul.as_slice(),
            &[
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128u8
            ]
        );
    }

    #[test]
    fn video_frame_index_clamps_to_last_frame() {
        let video = PreparedVideo {
            width: 1,
            height: 1,
            fps: 10.0,
            frames: vec![Arc::new(vec![0u8; 4]); 5],
        };
        assert_eq!(video.frame_index_at(0.0), 0);
        assert_eq!(video.frame_index_at(250.0), 2);
        assert_eq!(video.frame_index_at(10_000.0), 4);
        assert!((video.duration_ms() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn audio_duration_accounts_for_channels() {
        let audio = PreparedAudio {
            sample_rate: 1000,
            channels: 2,
            interleaved_f32: Arc::new(vec![0.0; 4000]),
        };
        assert!((audio.duration_ms() - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn static_supplier_returns_none_for_unknown_ids() {
        let res = StaticResources::new();
        assert!(res.image("missing").is_none());
        assert!(res.audio("missing").is_none());
    }
}
