#![forbid(unsafe_code)]

pub mod analysis;
pub mod blend;
pub mod collector;
pub mod core;
pub mod error;
pub mod gpu;
pub mod renderer;
pub mod resources;
pub mod text_raster;
pub mod trial;

pub use collector::{
    CollectorConfig, CollectorState, Handlers, InputEvent, Key, ResponseCollector, ResponseEvent,
    ResponseKind, ResponseValue,
};
pub use core::{BlendMode, FitMode, OnsetCell, RenderContext, Timestamp};
pub use error::{CueframeError, CueframeResult};
pub use gpu::{FramebufferId, GpuContext, TextureId};
pub use renderer::{Phase, Preload, Renderer, TransitionSpec};
pub use resources::{ResourceSupplier, StaticResources};
pub use trial::Trial;
