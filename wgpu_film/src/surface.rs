use crate::{error::RenderError, gpu::GpuContext, gpu::SURFACE_FORMAT, utils::RowAlign};
use image::RgbaImage;
use tracing::debug;

#[derive(Debug)]
struct Target {
	texture: wgpu::Texture,
	view: wgpu::TextureView,
	width: u32,
	height: u32,
}

/// Offscreen destination of the composite pass. The host reads finished
/// frames back with [`RenderSurface::read_pixels`].
#[derive(Debug, Default)]
pub struct RenderSurface {
	target: Option<Target>,
	// false between a resize and the next draw
	drawn: bool,
}

impl RenderSurface {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn size(&self) -> Option<(u32, u32)> {
		self.target.as_ref().map(|t| (t.width, t.height))
	}

	pub fn is_drawn(&self) -> bool {
		self.drawn
	}

	pub(crate) fn mark_drawn(&mut self) {
		self.drawn = true;
	}

	pub(crate) fn view(&self) -> Option<&wgpu::TextureView> {
		self.target.as_ref().map(|t| &t.view)
	}

	/// Resize to `width x height`, dropping the old contents. Returns false
	/// when the size is unchanged and nothing happened.
	pub fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32) -> bool {
		if self.size() == Some((width, height)) {
			return false;
		}
		self.release();

		let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
			label: Some("wgpu_film_surface"),
			size: wgpu::Extent3d {
				width,
				height,
				depth_or_array_layers: 1,
			},
			mip_level_count: 1,
			sample_count: 1,
			dimension: wgpu::TextureDimension::D2,
			format: SURFACE_FORMAT,
			usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
			view_formats: &[],
		});
		let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
		debug!(width, height, "resized surface");
		self.target = Some(Target {
			texture,
			view,
			width,
			height,
		});
		true
	}

	/// Copy the current frame back to the CPU. Blocks until the GPU is done.
	/// `None` while nothing has been drawn since the last resize.
	pub fn read_pixels(&self, ctx: &GpuContext) -> Result<Option<RgbaImage>, RenderError> {
		let target = match (&self.target, self.drawn) {
			(Some(t), true) => t,
			_ => return Ok(None),
		};
		let align = RowAlign::new(target.width, target.height, 4);

		let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
			label: Some("wgpu_film_readback"),
			size: align.buffer_size(),
			usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
			mapped_at_creation: false,
		});

		let mut encoder = ctx
			.device
			.create_command_encoder(&wgpu::CommandEncoderDescriptor {
				label: Some("wgpu_film_readback_encoder"),
			});
		encoder.copy_texture_to_buffer(
			wgpu::TexelCopyTextureInfo {
				texture: &target.texture,
				mip_level: 0,
				origin: wgpu::Origin3d::ZERO,
				aspect: wgpu::TextureAspect::All,
			},
			wgpu::TexelCopyBufferInfo {
				buffer: &staging,
				layout: wgpu::TexelCopyBufferLayout {
					offset: 0,
					bytes_per_row: Some(align.padded_bytes_per_row),
					rows_per_image: Some(target.height),
				},
			},
			wgpu::Extent3d {
				width: target.width,
				height: target.height,
				depth_or_array_layers: 1,
			},
		);
		ctx.queue.submit(Some(encoder.finish()));

		let slice = staging.slice(..);
		let (tx, rx) = std::sync::mpsc::channel();
		slice.map_async(wgpu::MapMode::Read, move |r| {
			let _ = tx.send(r);
		});
		ctx.device.poll(wgpu::Maintain::Wait);

		rx.recv()
			.map_err(|_| RenderError::Readback("map channel closed".to_string()))?
			.map_err(|e| RenderError::Readback(e.to_string()))?;

		let pixels = {
			let mapped = slice.get_mapped_range();
			align.unpad(&mapped)
		};
		staging.unmap();
		staging.destroy();

		RgbaImage::from_raw(target.width, target.height, pixels)
			.map(Some)
			.ok_or_else(|| RenderError::Readback("short readback buffer".to_string()))
	}

	pub fn release(&mut self) {
		if let Some(t) = self.target.take() {
			t.texture.destroy();
		}
		self.drawn = false;
	}
}
