use bytemuck::{Pod, Zeroable};

/// Strength above which grain would swamp the graded image.
pub const GRAIN_CAP: f32 = 0.4;
/// Luminance where halation starts to bloom.
pub const HALATION_THRESHOLD: f32 = 0.8;
pub const HALATION_GAIN: f32 = 5.0;
pub const HALATION_SCALE: f32 = 0.2;
pub const HALATION_TINT: [f32; 3] = [1.0, 0.3, 0.1];

/// Caller-facing grading parameters, mutated between frames.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParameters {
	pub lut_selector: String,
	pub intensity: f32,
	pub grain_amount: f32,
	pub halation_amount: f32,
	pub show_original: bool,
}

impl Default for FilterParameters {
	fn default() -> Self {
		Self {
			lut_selector: String::new(),
			intensity: 0.7,
			grain_amount: 0.0,
			halation_amount: 0.0,
			show_original: false,
		}
	}
}

/// Slider position 0..=100 to a unit amount. Out-of-range positions clamp.
pub fn from_percent(value: i32) -> f32 {
	value.clamp(0, 100) as f32 / 100.0
}

fn unit(v: f32) -> f32 {
	if v.is_nan() {
		0.0
	} else {
		v.clamp(0.0, 1.0)
	}
}

impl FilterParameters {
	pub fn new(lut_selector: impl Into<String>) -> Self {
		Self {
			lut_selector: lut_selector.into(),
			..Self::default()
		}
	}

	pub fn with_percentages(mut self, intensity: i32, grain: i32, halation: i32) -> Self {
		self.intensity = from_percent(intensity);
		self.grain_amount = from_percent(grain);
		self.halation_amount = from_percent(halation);
		self
	}

	/// Copy with every amount clamped into `[0, 1]`; NaN becomes 0.
	pub fn clamped(&self) -> Self {
		Self {
			lut_selector: self.lut_selector.clone(),
			intensity: unit(self.intensity),
			grain_amount: unit(self.grain_amount),
			halation_amount: unit(self.halation_amount),
			show_original: self.show_original,
		}
	}
}

/// Uniform block of the composite shader. Layout matches `Params` in
/// `composite.wgsl`, padded to 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Uniforms {
	pub intensity: f32,
	pub grain_amount: f32,
	pub halation_amount: f32,
	pub time: f32,
	pub show_original: u32,
	_pad: [u32; 3],
}

impl Uniforms {
	/// Build the block for one frame. Without a resident LUT the intensity
	/// is forced to zero.
	pub fn for_frame(params: &FilterParameters, lut_resident: bool, time: f32) -> Self {
		let p = params.clamped();
		Self {
			intensity: if lut_resident { p.intensity } else { 0.0 },
			grain_amount: p.grain_amount,
			halation_amount: p.halation_amount,
			time,
			show_original: p.show_original as u32,
			_pad: [0; 3],
		}
	}
}
