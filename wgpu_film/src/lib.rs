//! Real-time film grading on the GPU: a `.cube` LUT, film grain and
//! halation composited in one wgpu render pass.

mod config;
mod error;
mod formats;
mod gpu;
mod params;
mod render;
mod runner;
mod session;
mod source;
mod surface;
mod utils;

pub use config::{PowerPreference, SessionConfig, DEFAULT_MAX_PREVIEW_SIZE};
pub use error::{Error, FetchError, GpuInitError, LutLoadError, RenderError, Result};
pub use formats::{cube as parse_cube, LutGrid, ParseError};
pub use gpu::{Bitmap, GpuContext, GpuResources, ImageSlot, ResidentLut};
pub use params::{
	from_percent, FilterParameters, Uniforms, GRAIN_CAP, HALATION_GAIN, HALATION_SCALE,
	HALATION_THRESHOLD, HALATION_TINT,
};
pub use render::{FrameStatus, RenderState, Renderer};
pub use runner::{CancelToken, LoopHandle, RenderLoop};
pub use session::{FilterSession, LutRequests};
pub use source::{DirSource, FetchFuture, FilmStock, LutSource, MemorySource};
pub use surface::RenderSurface;
pub use utils::fit_dimensions;
