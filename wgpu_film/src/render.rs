//! One frame of the composite pass.

use crate::{
	error::RenderError,
	gpu::{GpuContext, GpuResources, ImageSlot, QUAD_VERTICES},
	params::{FilterParameters, Uniforms},
	surface::RenderSurface,
	utils::fit_dimensions,
};
use tracing::trace;

/// Noise phase advance per frame. Only has to grow, it is not a clock.
const TIME_STEP: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
	/// No image bound.
	Idle,
	/// Image bound and resident, waiting for the next frame.
	Ready,
	/// A draw is being encoded.
	Rendering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
	Idle,
	Drawn { width: u32, height: u32, resized: bool },
}

#[derive(Debug)]
pub struct Renderer {
	state: RenderState,
	frame: u64,
	max_preview_size: u32,
}

impl Renderer {
	pub fn new(max_preview_size: u32) -> Self {
		Self {
			state: RenderState::Idle,
			frame: 0,
			max_preview_size,
		}
	}

	pub fn state(&self) -> RenderState {
		self.state
	}

	pub fn frames_drawn(&self) -> u64 {
		self.frame
	}

	pub(crate) fn image_bound(&mut self) {
		if self.state == RenderState::Idle {
			self.state = RenderState::Ready;
		}
	}

	pub(crate) fn image_cleared(&mut self) {
		self.state = RenderState::Idle;
	}

	/// Draw one frame into `surface`. Resizes the surface first when the
	/// image's preview size changed; a resize is always followed by the draw.
	pub fn render_frame(
		&mut self,
		ctx: &GpuContext,
		resources: &GpuResources,
		surface: &mut RenderSurface,
		params: &FilterParameters,
	) -> Result<FrameStatus, RenderError> {
		if self.state == RenderState::Idle {
			return Ok(FrameStatus::Idle);
		}
		let (image_view, width, height) = match resources.image() {
			ImageSlot::Bound {
				view,
				width,
				height,
				..
			} => (view, *width, *height),
			ImageSlot::Unbound => {
				self.state = RenderState::Idle;
				return Ok(FrameStatus::Idle);
			}
		};
		let program = resources.program().ok_or(RenderError::Released)?;
		let buffers = resources.static_buffers().ok_or(RenderError::Released)?;
		let lut_view = resources.lut_view().ok_or(RenderError::Released)?;

		let (target_w, target_h) = fit_dimensions(width, height, self.max_preview_size);
		let resized = surface.resize(ctx, target_w, target_h);
		let surface_view = surface.view().ok_or(RenderError::Released)?;

		self.state = RenderState::Rendering;
		self.frame += 1;
		let uniforms = Uniforms::for_frame(
			params,
			resources.lut().is_some(),
			self.frame as f32 * TIME_STEP,
		);
		ctx.queue
			.write_buffer(&program.uniforms, 0, bytemuck::bytes_of(&uniforms));

		let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
			label: Some("wgpu_film_composite_bind_group"),
			layout: &program.layout,
			entries: &[
				wgpu::BindGroupEntry {
					binding: 0,
					resource: wgpu::BindingResource::TextureView(image_view),
				},
				wgpu::BindGroupEntry {
					binding: 1,
					resource: wgpu::BindingResource::Sampler(&program.image_sampler),
				},
				wgpu::BindGroupEntry {
					binding: 2,
					resource: wgpu::BindingResource::TextureView(lut_view),
				},
				wgpu::BindGroupEntry {
					binding: 3,
					resource: wgpu::BindingResource::Sampler(&program.lut_sampler),
				},
				wgpu::BindGroupEntry {
					binding: 4,
					resource: program.uniforms.as_entire_binding(),
				},
			],
		});

		let mut encoder = ctx
			.device
			.create_command_encoder(&wgpu::CommandEncoderDescriptor {
				label: Some("wgpu_film_frame_encoder"),
			});
		{
			let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
				label: Some("wgpu_film_composite_pass"),
				color_attachments: &[Some(wgpu::RenderPassColorAttachment {
					view: surface_view,
					resolve_target: None,
					ops: wgpu::Operations {
						load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
						store: wgpu::StoreOp::Store,
					},
				})],
				depth_stencil_attachment: None,
				timestamp_writes: None,
				occlusion_query_set: None,
			});
			pass.set_pipeline(&program.pipeline);
			pass.set_bind_group(0, &bind_group, &[]);
			pass.set_vertex_buffer(0, buffers.positions.slice(..));
			pass.set_vertex_buffer(1, buffers.tex_coords.slice(..));
			pass.draw(0..QUAD_VERTICES, 0..1);
		}
		ctx.queue.submit(Some(encoder.finish()));

		surface.mark_drawn();
		self.state = RenderState::Ready;
		trace!(frame = self.frame, target_w, target_h, resized, "drew frame");

		Ok(FrameStatus::Drawn {
			width: target_w,
			height: target_h,
			resized,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn state_follows_image_binding() {
		let mut r = Renderer::new(2048);
		assert_eq!(r.state(), RenderState::Idle);
		r.image_bound();
		assert_eq!(r.state(), RenderState::Ready);
		r.image_bound();
		assert_eq!(r.state(), RenderState::Ready);
		r.image_cleared();
		assert_eq!(r.state(), RenderState::Idle);
		assert_eq!(r.frames_drawn(), 0);
	}
}
