use crate::formats::ParseError;
use thiserror::Error;

/// The session cannot start: no usable adapter, device or program.
#[derive(Debug, Error)]
pub enum GpuInitError {
	#[error("can not find a usable adapter")]
	NoAdapter,
	#[error("can not create device: {0}")]
	Device(#[from] wgpu::RequestDeviceError),
	#[error("shader program failed to compile or link: {0}")]
	Program(String),
}

/// Retrieving LUT bytes failed. The resident LUT is left untouched.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
	#[error("unknown lut '{0}'")]
	NotFound(String),
	#[error("invalid lut selector '{0}'")]
	InvalidSelector(String),
	#[error("can not read lut '{selector}': {message}")]
	Io { selector: String, message: String },
}

#[derive(Debug, Error)]
pub enum RenderError {
	#[error("frame readback failed: {0}")]
	Readback(String),
	#[error("image of {width}x{height} has no pixels")]
	EmptyImage { width: u32, height: u32 },
	#[error("image of {width}x{height} exceeds the device texture limit {limit}")]
	ImageTooLarge { width: u32, height: u32, limit: u32 },
	#[error("lut of edge {edge} exceeds the device 3d texture limit {limit}")]
	LutTooLarge { edge: u32, limit: u32 },
	#[error("session resources were already released")]
	Released,
}

/// Why the most recent LUT request did not produce a texture.
#[derive(Debug, Clone, Error)]
pub enum LutLoadError {
	#[error(transparent)]
	Fetch(#[from] FetchError),
	#[error("can not parse lut: {0}")]
	Parse(#[from] ParseError),
	#[error("lut of edge {edge} exceeds the device 3d texture limit {limit}")]
	TooLarge { edge: u32, limit: u32 },
	#[error("can not upload lut: {0}")]
	Upload(String),
}

/// Loading a [`SessionConfig`](crate::SessionConfig) failed.
#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid config: {0}")]
	Config(String),
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
