use crate::error::{CueframeError, CueframeResult};

pub use kurbo::{Affine, Point, Rect, Vec2};

/// A moment on the orchestrator's clock, in milliseconds.
///
/// The origin is arbitrary (the clock only needs to be monotonic); the core
/// never reads a wall clock itself. Reaction times are differences between
/// two of these.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub fn millis(self) -> f64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`. Negative if `earlier` is later.
    pub fn since(self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }
}

/// Nullable onset timestamp with first-write-wins semantics.
///
/// Set only at the moment a renderer's content is first actually made
/// visible, never merely because `render()` was invoked.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OnsetCell(Option<Timestamp>);

impl OnsetCell {
    /// Record the onset. Returns true only for the write that took effect.
    pub fn mark(&mut self, now: Timestamp) -> bool {
        if self.0.is_some() {
            return false;
        }
        self.0 = Some(now);
        true
    }

    pub fn get(self) -> Option<Timestamp> {
        self.0
    }

    pub fn is_set(self) -> bool {
        self.0.is_some()
    }
}

/// Per-frame render parameters, supplied fresh by the orchestrator.
///
/// Never owned or retained by a renderer. Composites derive child contexts
/// from their own (cell origin/size for grid layouts, the configured blend
/// mode for all children).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderContext {
    /// Top-left of the viewport in target pixels.
    pub origin: Point,
    /// Viewport width in pixels.
    pub width: f64,
    /// Viewport height in pixels.
    pub height: f64,
    /// Transition progress in `0..=1` (1.0 when no transition is active).
    pub progress: f64,
    /// Current time on the orchestrator's frame clock.
    pub now: Timestamp,
    /// Blend mode a renderer must establish before its draw.
    pub blend: BlendMode,
}

impl RenderContext {
    pub fn new(width: f64, height: f64, progress: f64, now: Timestamp) -> CueframeResult<Self> {
        if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
            return Err(CueframeError::validation(
                "render context width/height must be finite and > 0",
            ));
        }
        Ok(Self {
            origin: Point::ORIGIN,
            width,
            height,
            progress: progress.clamp(0.0, 1.0),
            now,
            blend: BlendMode::Normal,
        })
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.origin.x,
            self.origin.y,
            self.origin.x + self.width,
            self.origin.y + self.height,
        )
    }

    /// A copy of this context covering one cell of a partitioned viewport.
    pub fn cell(&self, origin: Point, width: f64, height: f64) -> Self {
        Self {
            origin,
            width,
            height,
            ..*self
        }
    }

    pub fn with_blend(&self, blend: BlendMode) -> Self {
        Self { blend, ..*self }
    }
}

/// Policy mapping a source asset's aspect ratio into a target display box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Rendered box fully inside the target, aspect preserved.
    #[default]
    Contain,
    /// Rendered box fully covers the target, aspect preserved, overflow clipped.
    Cover,
    /// Stretch to the target, aspect ignored.
    Fill,
    /// Native pixel size, centered.
    None,
}

/// Compute the rendered box for a `src_w × src_h` source inside `target`.
pub fn fit_rect(mode: FitMode, src_w: f64, src_h: f64, target: Rect) -> CueframeResult<Rect> {
    if src_w <= 0.0 || src_h <= 0.0 {
        return Err(CueframeError::validation(
            "fit_rect source dimensions must be > 0",
        ));
    }
    let (tw, th) = (target.width(), target.height());

    let (w, h) = match mode {
        FitMode::Contain => {
            let s = (tw / src_w).min(th / src_h);
            (src_w * s, src_h * s)
        }
        FitMode::Cover => {
            let s = (tw / src_w).max(th / src_h);
            (src_w * s, src_h * s)
        }
        FitMode::Fill => (tw, th),
        FitMode::None => (src_w, src_h),
    };

    let x = target.x0 + (tw - w) / 2.0;
    let y = target.y0 + (th - h) / 2.0;
    Ok(Rect::new(x, y, x + w, y + h))
}

/// Affine mapping source pixel space `(0,0)..(src_w,src_h)` onto `fitted`,
/// with an extra uniform `scale` applied about the fitted box center (used by
/// zoom transitions).
pub fn fit_transform(src_w: f64, src_h: f64, fitted: Rect, scale: f64) -> Affine {
    let sx = fitted.width() / src_w;
    let sy = fitted.height() / src_h;
    let center = fitted.center();
    Affine::translate(center.to_vec2())
        * Affine::scale(scale)
        * Affine::translate(-center.to_vec2())
        * Affine::translate(Vec2::new(fitted.x0, fitted.y0))
        * Affine::scale_non_uniform(sx, sy)
}

/// Compositing function controlling how a drawn layer combines with what is
/// already in the target buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Additive,
}

pub(crate) fn is_power_of_two(v: u32) -> bool {
    v != 0 && v.is_power_of_two()
}
