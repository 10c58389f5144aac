//! The filter session: owns the GPU state and reacts to image, parameter and
//! LUT changes.

use crate::{
	config::SessionConfig,
	error::{GpuInitError, LutLoadError, RenderError},
	formats::{self, LutGrid},
	gpu::{Bitmap, GpuContext, GpuResources},
	params::FilterParameters,
	render::{FrameStatus, RenderState, Renderer},
	source::LutSource,
	surface::RenderSurface,
};
use async_std::channel::{self, Receiver, Sender};
use image::RgbaImage;
use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};
use tracing::{debug, info, warn};

/// Tracks LUT requests by generation. Only the newest request may change
/// the resident LUT; older results that arrive late are dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LutRequests {
	latest: u64,
	settled: u64,
	selector: Option<String>,
}

impl LutRequests {
	/// Register a request for `selector` and return its generation.
	pub fn begin(&mut self, selector: &str) -> u64 {
		self.latest += 1;
		self.selector = Some(selector.to_string());
		self.latest
	}

	/// Record that `generation` finished. Returns true when its result
	/// should be applied, false when a newer request superseded it.
	pub fn settle(&mut self, generation: u64) -> bool {
		if generation != self.latest {
			return false;
		}
		self.settled = generation;
		true
	}

	pub fn is_loading(&self) -> bool {
		self.settled < self.latest
	}

	/// Selector of the newest request.
	pub fn requested(&self) -> Option<&str> {
		self.selector.as_deref()
	}
}

#[derive(Debug)]
struct LutLoaded {
	generation: u64,
	selector: String,
	result: Result<LutGrid, LutLoadError>,
}

pub struct FilterSession {
	config: SessionConfig,
	ctx: GpuContext,
	resources: GpuResources,
	surface: RenderSurface,
	renderer: Renderer,
	params: FilterParameters,
	image: Option<Bitmap>,
	source: Arc<dyn LutSource>,
	requests: LutRequests,
	loaded_tx: Sender<LutLoaded>,
	loaded_rx: Receiver<LutLoaded>,
	loading: Arc<AtomicBool>,
	last_error: Option<LutLoadError>,
	released: bool,
}

impl FilterSession {
	/// Create the device, compile the program and upload the static quad.
	/// Any failure here ends the session before it starts.
	pub async fn new(config: SessionConfig, source: Arc<dyn LutSource>) -> Result<Self, GpuInitError> {
		let ctx = GpuContext::new(&config).await?;
		let mut resources = GpuResources::new();
		resources.ensure_program(&ctx).await?;
		resources.ensure_static_buffers(&ctx);

		let (loaded_tx, loaded_rx) = channel::unbounded();
		info!(max_preview_size = config.max_preview_size, "filter session started");

		Ok(Self {
			renderer: Renderer::new(config.max_preview_size),
			config,
			ctx,
			resources,
			surface: RenderSurface::new(),
			params: FilterParameters::default(),
			image: None,
			source,
			requests: LutRequests::default(),
			loaded_tx,
			loaded_rx,
			loading: Arc::new(AtomicBool::new(false)),
			last_error: None,
			released: false,
		})
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	pub fn adapter_info(&self) -> wgpu::AdapterInfo {
		self.ctx.adapter_info()
	}

	pub fn params(&self) -> &FilterParameters {
		&self.params
	}

	pub fn image(&self) -> Option<&Bitmap> {
		self.image.as_ref()
	}

	pub fn state(&self) -> RenderState {
		self.renderer.state()
	}

	pub fn frames_drawn(&self) -> u64 {
		self.renderer.frames_drawn()
	}

	pub fn surface_size(&self) -> Option<(u32, u32)> {
		self.surface.size()
	}

	/// Selector of the LUT currently on the GPU.
	pub fn active_lut(&self) -> Option<&str> {
		self.resources.lut().map(|l| l.selector.as_str())
	}

	/// True while the newest LUT request has not settled.
	pub fn is_loading(&self) -> bool {
		self.requests.is_loading()
	}

	/// Shared view of [`FilterSession::is_loading`] for other threads.
	pub fn loading_flag(&self) -> Arc<AtomicBool> {
		Arc::clone(&self.loading)
	}

	/// Why the newest settled LUT request failed, if it did.
	pub fn last_error(&self) -> Option<&LutLoadError> {
		self.last_error.as_ref()
	}

	/// Bind a new image, or clear it with `None`. Rebinding the same bitmap
	/// keeps the existing texture.
	pub fn set_image(&mut self, bitmap: Option<Bitmap>) -> Result<(), RenderError> {
		match bitmap {
			Some(bitmap) => {
				self.resources.upload_image_texture(&self.ctx, &bitmap)?;
				self.renderer.image_bound();
				self.image = Some(bitmap);
			}
			None => {
				self.resources.release_image_texture();
				self.surface.release();
				self.renderer.image_cleared();
				self.image = None;
			}
		}
		Ok(())
	}

	/// Replace the parameters. A new selector starts loading its LUT.
	pub fn set_params(&mut self, params: FilterParameters) {
		if !params.lut_selector.is_empty() {
			self.select_lut(&params.lut_selector);
		}
		self.params = params;
	}

	/// Start fetching and parsing `selector` off the render thread. The
	/// current LUT keeps rendering until the new one is ready. Selecting the
	/// LUT that is already loading or resident does nothing.
	pub fn select_lut(&mut self, selector: &str) {
		self.params.lut_selector = selector.to_string();
		let current = if self.is_loading() {
			self.requests.requested()
		} else {
			self.active_lut()
		};
		if current == Some(selector) {
			return;
		}

		let generation = self.requests.begin(selector);
		self.loading.store(true, Ordering::Release);
		debug!(selector, generation, "requested lut");

		let source = Arc::clone(&self.source);
		let tx = self.loaded_tx.clone();
		let selector = selector.to_string();
		async_std::task::spawn(async move {
			let result = match source.fetch(&selector).await {
				Ok(text) => formats::cube(&text).map_err(LutLoadError::from),
				Err(e) => Err(LutLoadError::from(e)),
			};
			// the session may be gone, nothing to deliver to then
			let _ = tx
				.send(LutLoaded {
					generation,
					selector,
					result,
				})
				.await;
		});
	}

	/// Apply every finished LUT load. Runs on the render thread, so the
	/// texture swap happens between frames.
	pub fn poll_luts(&mut self) {
		while let Ok(loaded) = self.loaded_rx.try_recv() {
			self.apply_loaded(loaded);
		}
	}

	/// Wait until the newest LUT request settles and report its outcome.
	pub async fn settle_luts(&mut self) -> Result<(), LutLoadError> {
		self.poll_luts();
		while self.requests.is_loading() {
			match self.loaded_rx.recv().await {
				Ok(loaded) => self.apply_loaded(loaded),
				Err(_) => break,
			}
		}
		match &self.last_error {
			Some(e) => Err(e.clone()),
			None => Ok(()),
		}
	}

	fn apply_loaded(&mut self, loaded: LutLoaded) {
		let LutLoaded {
			generation,
			selector,
			result,
		} = loaded;

		if !self.requests.settle(generation) || self.released {
			debug!(%selector, generation, "dropped stale lut result");
			return;
		}
		self.loading.store(false, Ordering::Release);

		let outcome = result.and_then(|grid| {
			self.resources
				.upload_lut_texture(&self.ctx, &selector, &grid)
				.map_err(|e| match e {
					RenderError::LutTooLarge { edge, limit } => LutLoadError::TooLarge { edge, limit },
					other => LutLoadError::Upload(other.to_string()),
				})
		});
		match outcome {
			Ok(()) => {
				info!(%selector, "lut ready");
				self.last_error = None;
			}
			Err(e) => {
				warn!(%selector, error = %e, "lut load failed, keeping previous lut");
				self.last_error = Some(e);
			}
		}
	}

	/// Apply finished LUT loads, then draw one frame.
	pub fn render_frame(&mut self) -> Result<FrameStatus, RenderError> {
		if self.released {
			return Err(RenderError::Released);
		}
		self.poll_luts();
		self.renderer
			.render_frame(&self.ctx, &self.resources, &mut self.surface, &self.params)
	}

	/// The last drawn frame, or `None` when nothing is on the surface.
	pub fn read_frame(&self) -> Result<Option<RgbaImage>, RenderError> {
		self.surface.read_pixels(&self.ctx)
	}

	/// Tear down: surface, buffers and textures, then the program. The
	/// device goes when the session is dropped.
	pub fn shutdown(mut self) {
		self.release();
	}

	fn release(&mut self) {
		if self.released {
			return;
		}
		self.released = true;
		self.renderer.image_cleared();
		self.surface.release();
		self.resources.release();
		self.loading.store(false, Ordering::Release);
		info!("filter session released");
	}
}

impl Drop for FilterSession {
	fn drop(&mut self) {
		self.release();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn latest_request_wins() {
		let mut r = LutRequests::default();
		assert!(!r.is_loading());

		let first = r.begin("ektachrome");
		let second = r.begin("portra-400");
		assert!(r.is_loading());
		assert_eq!(r.requested(), Some("portra-400"));

		// second resolves first, then the slow first one arrives
		assert!(r.settle(second));
		assert!(!r.is_loading());
		assert!(!r.settle(first));
		assert!(!r.is_loading());
	}

	#[test]
	fn stale_result_keeps_loading_until_latest_settles() {
		let mut r = LutRequests::default();
		let first = r.begin("a");
		let second = r.begin("b");
		assert!(!r.settle(first));
		assert!(r.is_loading());
		assert!(r.settle(second));
		assert!(!r.is_loading());
	}

	#[test]
	fn failed_request_still_settles() {
		let mut r = LutRequests::default();
		let g = r.begin("missing");
		assert!(r.settle(g));
		assert!(!r.is_loading());
		let g2 = r.begin("missing");
		assert!(g2 > g);
		assert!(r.is_loading());
	}
}
