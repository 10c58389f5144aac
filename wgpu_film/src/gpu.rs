//! GPU object lifetimes: device, program, static quad, image and LUT textures.

use crate::{
	config::SessionConfig,
	error::{GpuInitError, RenderError},
	formats::LutGrid,
	params::Uniforms,
};
use image::RgbaImage;
use std::{
	mem::size_of,
	num::NonZeroU64,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};
use tracing::{debug, info};
use wgpu::util::DeviceExt;

/// Format of the image texture and of the render surface.
pub const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

// clip-space square as two triangles
const QUAD_POSITIONS: [[f32; 2]; 6] = [
	[-1.0, -1.0],
	[1.0, -1.0],
	[-1.0, 1.0],
	[-1.0, 1.0],
	[1.0, -1.0],
	[1.0, 1.0],
];
// image row 0 is the top of the texture, clip y = 1 is the top of the target
const QUAD_TEX_COORDS: [[f32; 2]; 6] = [
	[0.0, 1.0],
	[1.0, 1.0],
	[0.0, 0.0],
	[0.0, 0.0],
	[1.0, 1.0],
	[1.0, 0.0],
];
pub const QUAD_VERTICES: u32 = QUAD_POSITIONS.len() as u32;

const POSITION_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const TEX_COORD_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];

static NEXT_BITMAP_VERSION: AtomicU64 = AtomicU64::new(1);

/// A decoded RGBA image with a content identity. Clones share the identity;
/// every `Bitmap::new` gets a fresh one.
#[derive(Debug, Clone)]
pub struct Bitmap {
	pixels: Arc<RgbaImage>,
	version: u64,
}

impl Bitmap {
	pub fn new(pixels: RgbaImage) -> Self {
		Self {
			pixels: Arc::new(pixels),
			version: NEXT_BITMAP_VERSION.fetch_add(1, Ordering::Relaxed),
		}
	}

	pub fn version(&self) -> u64 {
		self.version
	}

	pub fn width(&self) -> u32 {
		self.pixels.width()
	}

	pub fn height(&self) -> u32 {
		self.pixels.height()
	}

	pub fn pixels(&self) -> &RgbaImage {
		&self.pixels
	}
}

impl From<RgbaImage> for Bitmap {
	fn from(pixels: RgbaImage) -> Self {
		Self::new(pixels)
	}
}

/// Adapter, device and queue for one session.
#[derive(Debug)]
pub struct GpuContext {
	pub(crate) adapter: wgpu::Adapter,
	pub(crate) device: wgpu::Device,
	pub(crate) queue: wgpu::Queue,
}

impl GpuContext {
	pub async fn new(config: &SessionConfig) -> Result<Self, GpuInitError> {
		let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
			backends: wgpu::Backends::all(),
			flags: if config.validation {
				wgpu::InstanceFlags::debugging()
			} else {
				wgpu::InstanceFlags::default()
			},
			..Default::default()
		});

		let adapter = instance
			.request_adapter(&wgpu::RequestAdapterOptions {
				power_preference: config.power_preference.into(),
				compatible_surface: None,
				force_fallback_adapter: false,
			})
			.await
			.ok_or(GpuInitError::NoAdapter)?;

		let adapter_info = adapter.get_info();
		info!(
			adapter = %adapter_info.name,
			backend = ?adapter_info.backend,
			"selected adapter"
		);

		let (device, queue) = adapter
			.request_device(
				&wgpu::DeviceDescriptor {
					label: Some("wgpu_film_device"),
					required_features: wgpu::Features::empty(),
					required_limits: adapter.limits(),
					memory_hints: wgpu::MemoryHints::Performance,
				},
				None,
			)
			.await?;

		Ok(Self {
			adapter,
			device,
			queue,
		})
	}

	pub fn adapter_info(&self) -> wgpu::AdapterInfo {
		self.adapter.get_info()
	}

	pub fn max_texture_dimension_2d(&self) -> u32 {
		self.device.limits().max_texture_dimension_2d
	}

	pub fn max_texture_dimension_3d(&self) -> u32 {
		self.device.limits().max_texture_dimension_3d
	}
}

/// Compiled composite program plus the state that goes with it.
#[derive(Debug)]
pub struct Program {
	pub(crate) pipeline: wgpu::RenderPipeline,
	pub(crate) layout: wgpu::BindGroupLayout,
	pub(crate) image_sampler: wgpu::Sampler,
	pub(crate) lut_sampler: wgpu::Sampler,
	pub(crate) uniforms: wgpu::Buffer,
}

impl Program {
	async fn compile(device: &wgpu::Device) -> Result<Self, GpuInitError> {
		device.push_error_scope(wgpu::ErrorFilter::Validation);

		let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
			label: Some("wgpu_film_composite_shader"),
			source: wgpu::ShaderSource::Wgsl(include_str!("shaders/composite.wgsl").into()),
		});

		let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
			label: Some("wgpu_film_composite_layout"),
			entries: &[
				texture_entry(0, wgpu::TextureViewDimension::D2),
				sampler_entry(1),
				texture_entry(2, wgpu::TextureViewDimension::D3),
				sampler_entry(3),
				wgpu::BindGroupLayoutEntry {
					binding: 4,
					visibility: wgpu::ShaderStages::FRAGMENT,
					ty: wgpu::BindingType::Buffer {
						ty: wgpu::BufferBindingType::Uniform,
						has_dynamic_offset: false,
						min_binding_size: NonZeroU64::new(size_of::<Uniforms>() as u64),
					},
					count: None,
				},
			],
		});

		let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
			label: Some("wgpu_film_composite_pipeline_layout"),
			bind_group_layouts: &[&layout],
			push_constant_ranges: &[],
		});

		let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
			label: Some("wgpu_film_composite_pipeline"),
			layout: Some(&pipeline_layout),
			vertex: wgpu::VertexState {
				module: &shader,
				entry_point: Some("vs_main"),
				compilation_options: wgpu::PipelineCompilationOptions::default(),
				buffers: &[
					wgpu::VertexBufferLayout {
						array_stride: size_of::<[f32; 2]>() as wgpu::BufferAddress,
						step_mode: wgpu::VertexStepMode::Vertex,
						attributes: &POSITION_ATTRS,
					},
					wgpu::VertexBufferLayout {
						array_stride: size_of::<[f32; 2]>() as wgpu::BufferAddress,
						step_mode: wgpu::VertexStepMode::Vertex,
						attributes: &TEX_COORD_ATTRS,
					},
				],
			},
			primitive: wgpu::PrimitiveState::default(),
			depth_stencil: None,
			multisample: wgpu::MultisampleState::default(),
			fragment: Some(wgpu::FragmentState {
				module: &shader,
				entry_point: Some("fs_main"),
				compilation_options: wgpu::PipelineCompilationOptions::default(),
				targets: &[Some(wgpu::ColorTargetState {
					format: SURFACE_FORMAT,
					blend: None,
					write_mask: wgpu::ColorWrites::ALL,
				})],
			}),
			multiview: None,
			cache: None,
		});

		if let Some(err) = device.pop_error_scope().await {
			return Err(GpuInitError::Program(err.to_string()));
		}

		let image_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
			label: Some("wgpu_film_image_sampler"),
			address_mode_u: wgpu::AddressMode::ClampToEdge,
			address_mode_v: wgpu::AddressMode::ClampToEdge,
			mag_filter: wgpu::FilterMode::Linear,
			min_filter: wgpu::FilterMode::Linear,
			..Default::default()
		});

		let lut_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
			label: Some("wgpu_film_lut_sampler"),
			address_mode_u: wgpu::AddressMode::ClampToEdge,
			address_mode_v: wgpu::AddressMode::ClampToEdge,
			address_mode_w: wgpu::AddressMode::ClampToEdge,
			mag_filter: wgpu::FilterMode::Linear,
			min_filter: wgpu::FilterMode::Linear,
			..Default::default()
		});

		let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
			label: Some("wgpu_film_uniforms"),
			size: size_of::<Uniforms>() as u64,
			usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
			mapped_at_creation: false,
		});

		Ok(Self {
			pipeline,
			layout,
			image_sampler,
			lut_sampler,
			uniforms,
		})
	}
}

fn texture_entry(binding: u32, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
	wgpu::BindGroupLayoutEntry {
		binding,
		visibility: wgpu::ShaderStages::FRAGMENT,
		ty: wgpu::BindingType::Texture {
			sample_type: wgpu::TextureSampleType::Float { filterable: true },
			view_dimension,
			multisampled: false,
		},
		count: None,
	}
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
	wgpu::BindGroupLayoutEntry {
		binding,
		visibility: wgpu::ShaderStages::FRAGMENT,
		ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
		count: None,
	}
}

/// Full-screen quad positions and texture coordinates. Never written after
/// creation.
#[derive(Debug)]
pub struct StaticBuffers {
	pub(crate) positions: wgpu::Buffer,
	pub(crate) tex_coords: wgpu::Buffer,
}

impl StaticBuffers {
	fn new(device: &wgpu::Device) -> Self {
		let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
			label: Some("wgpu_film_quad_positions"),
			contents: bytemuck::cast_slice(&QUAD_POSITIONS),
			usage: wgpu::BufferUsages::VERTEX,
		});
		let tex_coords = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
			label: Some("wgpu_film_quad_tex_coords"),
			contents: bytemuck::cast_slice(&QUAD_TEX_COORDS),
			usage: wgpu::BufferUsages::VERTEX,
		});
		Self {
			positions,
			tex_coords,
		}
	}

	fn release(self) {
		self.positions.destroy();
		self.tex_coords.destroy();
	}
}

/// Image texture binding, keyed on the bitmap's identity.
#[derive(Debug, Default)]
pub enum ImageSlot {
	#[default]
	Unbound,
	Bound {
		version: u64,
		width: u32,
		height: u32,
		texture: wgpu::Texture,
		view: wgpu::TextureView,
	},
}

impl ImageSlot {
	pub fn version(&self) -> Option<u64> {
		match self {
			ImageSlot::Bound { version, .. } => Some(*version),
			ImageSlot::Unbound => None,
		}
	}

	pub(crate) fn view(&self) -> Option<&wgpu::TextureView> {
		match self {
			ImageSlot::Bound { view, .. } => Some(view),
			ImageSlot::Unbound => None,
		}
	}

	fn release(&mut self) {
		if let ImageSlot::Bound { texture, version, .. } = std::mem::take(self) {
			debug!(version, "released image texture");
			texture.destroy();
		}
	}
}

/// The LUT volume currently on the GPU.
#[derive(Debug)]
pub struct ResidentLut {
	pub selector: String,
	pub edge_length: u32,
	texture: wgpu::Texture,
	pub(crate) view: wgpu::TextureView,
}

fn create_lut_texture(
	device: &wgpu::Device,
	queue: &wgpu::Queue,
	grid: &LutGrid,
	label: &str,
) -> wgpu::Texture {
	let dim = grid.edge_length();
	let size = wgpu::Extent3d {
		width: dim,
		height: dim,
		depth_or_array_layers: dim,
	};
	// no 3-channel 8-bit format exists, alpha rides along at 255
	let texture = device.create_texture(&wgpu::TextureDescriptor {
		label: Some(label),
		size,
		mip_level_count: 1,
		sample_count: 1,
		dimension: wgpu::TextureDimension::D3,
		format: wgpu::TextureFormat::Rgba8Unorm,
		usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
		view_formats: &[],
	});

	queue.write_texture(
		wgpu::TexelCopyTextureInfo {
			texture: &texture,
			mip_level: 0,
			origin: wgpu::Origin3d::ZERO,
			aspect: wgpu::TextureAspect::All,
		},
		&grid.to_rgba8(),
		wgpu::TexelCopyBufferLayout {
			offset: 0,
			bytes_per_row: Some(4 * dim),
			rows_per_image: Some(dim),
		},
		size,
	);

	texture
}

/// Every GPU object a session owns apart from its surface.
#[derive(Debug)]
pub struct GpuResources {
	program: Option<Program>,
	buffers: Option<StaticBuffers>,
	image: ImageSlot,
	lut: Option<ResidentLut>,
	// bound in place of a LUT when none is resident; never sampled with a
	// non-zero intensity
	placeholder_lut: Option<(wgpu::Texture, wgpu::TextureView)>,
}

impl Default for GpuResources {
	fn default() -> Self {
		Self::new()
	}
}

impl GpuResources {
	pub fn new() -> Self {
		Self {
			program: None,
			buffers: None,
			image: ImageSlot::Unbound,
			lut: None,
			placeholder_lut: None,
		}
	}

	/// Compile the program on first use. A failure is fatal for the session.
	pub async fn ensure_program(&mut self, ctx: &GpuContext) -> Result<&Program, GpuInitError> {
		if self.program.is_none() {
			let program = Program::compile(&ctx.device).await?;
			debug!("compiled composite program");
			self.program = Some(program);
		}
		if self.placeholder_lut.is_none() {
			let texture = create_lut_texture(
				&ctx.device,
				&ctx.queue,
				&LutGrid::identity(2),
				"wgpu_film_placeholder_lut",
			);
			let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
			self.placeholder_lut = Some((texture, view));
		}
		self.program.as_ref().ok_or_else(|| GpuInitError::Program("program missing".to_string()))
	}

	pub fn ensure_static_buffers(&mut self, ctx: &GpuContext) -> &StaticBuffers {
		self.buffers.get_or_insert_with(|| StaticBuffers::new(&ctx.device))
	}

	pub fn program(&self) -> Option<&Program> {
		self.program.as_ref()
	}

	pub fn static_buffers(&self) -> Option<&StaticBuffers> {
		self.buffers.as_ref()
	}

	pub fn image(&self) -> &ImageSlot {
		&self.image
	}

	pub fn lut(&self) -> Option<&ResidentLut> {
		self.lut.as_ref()
	}

	/// View to bind at the LUT slot: the resident LUT, or the placeholder.
	pub(crate) fn lut_view(&self) -> Option<&wgpu::TextureView> {
		self.lut
			.as_ref()
			.map(|l| &l.view)
			.or_else(|| self.placeholder_lut.as_ref().map(|(_, v)| v))
	}

	/// Bind `bitmap` as the image texture. The same bitmap identity is a
	/// no-op; any other replaces the whole texture.
	pub fn upload_image_texture(&mut self, ctx: &GpuContext, bitmap: &Bitmap) -> Result<(), RenderError> {
		if self.image.version() == Some(bitmap.version()) {
			return Ok(());
		}

		let (width, height) = (bitmap.width(), bitmap.height());
		let limit = ctx.max_texture_dimension_2d();
		if width == 0 || height == 0 {
			return Err(RenderError::EmptyImage { width, height });
		}
		if width > limit || height > limit {
			return Err(RenderError::ImageTooLarge { width, height, limit });
		}

		self.image.release();

		let size = wgpu::Extent3d {
			width,
			height,
			depth_or_array_layers: 1,
		};
		let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
			label: Some("wgpu_film_image_texture"),
			size,
			mip_level_count: 1,
			sample_count: 1,
			dimension: wgpu::TextureDimension::D2,
			format: SURFACE_FORMAT,
			usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
			view_formats: &[],
		});
		ctx.queue.write_texture(
			wgpu::TexelCopyTextureInfo {
				texture: &texture,
				mip_level: 0,
				origin: wgpu::Origin3d::ZERO,
				aspect: wgpu::TextureAspect::All,
			},
			bitmap.pixels().as_raw(),
			wgpu::TexelCopyBufferLayout {
				offset: 0,
				bytes_per_row: Some(4 * width),
				rows_per_image: Some(height),
			},
			size,
		);
		let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

		debug!(version = bitmap.version(), width, height, "bound image texture");
		self.image = ImageSlot::Bound {
			version: bitmap.version(),
			width,
			height,
			texture,
			view,
		};
		Ok(())
	}

	pub fn release_image_texture(&mut self) {
		self.image.release();
	}

	/// Replace the resident LUT. The old texture is released before the new
	/// one is created, so at most one LUT lives on the GPU. A grid the device
	/// can not hold leaves the resident LUT in place.
	pub fn upload_lut_texture(
		&mut self,
		ctx: &GpuContext,
		selector: &str,
		grid: &LutGrid,
	) -> Result<(), RenderError> {
		let limit = ctx.max_texture_dimension_3d();
		if grid.edge_length() > limit {
			return Err(RenderError::LutTooLarge {
				edge: grid.edge_length(),
				limit,
			});
		}
		self.release_lut_texture();
		let texture = create_lut_texture(&ctx.device, &ctx.queue, grid, "wgpu_film_lut_texture_3d");
		let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
		debug!(selector, edge = grid.edge_length(), "uploaded lut texture");
		self.lut = Some(ResidentLut {
			selector: selector.to_string(),
			edge_length: grid.edge_length(),
			texture,
			view,
		});
		Ok(())
	}

	pub fn release_lut_texture(&mut self) {
		if let Some(lut) = self.lut.take() {
			debug!(selector = %lut.selector, "released lut texture");
			lut.texture.destroy();
		}
	}

	/// Release everything: buffers and textures first, the program last.
	/// Calling it again is a no-op.
	pub fn release(&mut self) {
		if let Some(buffers) = self.buffers.take() {
			buffers.release();
		}
		self.image.release();
		self.release_lut_texture();
		if let Some((texture, _)) = self.placeholder_lut.take() {
			texture.destroy();
		}
		if self.program.take().is_some() {
			debug!("released composite program");
		}
	}
}
