use crate::error::{Error, Result};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf, time::Duration};

/// Longest preview edge, in pixels.
pub const DEFAULT_MAX_PREVIEW_SIZE: u32 = 2048;
const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreference {
	HighPerformance,
	LowPower,
}

impl From<PowerPreference> for wgpu::PowerPreference {
	fn from(p: PowerPreference) -> Self {
		match p {
			PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
			PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
		}
	}
}

/// Session and render loop settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	pub max_preview_size: u32,
	pub frame_interval_ms: u64,
	pub power_preference: PowerPreference,
	pub lut_dir: PathBuf,
	/// Turn on backend validation layers.
	pub validation: bool,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			max_preview_size: DEFAULT_MAX_PREVIEW_SIZE,
			frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
			power_preference: PowerPreference::HighPerformance,
			lut_dir: PathBuf::from("luts"),
			validation: false,
		}
	}
}

impl SessionConfig {
	pub fn from_toml_str(s: &str) -> Result<Self> {
		let config: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
		if config.max_preview_size == 0 {
			return Err(Error::Config("max_preview_size must be positive".to_string()));
		}
		Ok(config)
	}

	pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
		Self::from_toml_str(&fs::read_to_string(path)?)
	}

	pub fn frame_interval(&self) -> Duration {
		Duration::from_millis(self.frame_interval_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_file_gives_defaults() {
		assert_eq!(SessionConfig::from_toml_str("").unwrap(), SessionConfig::default());
	}

	#[test]
	fn fields_override_defaults() {
		let c = SessionConfig::from_toml_str(
			r#"
			max_preview_size = 1024
			power_preference = "low-power"
			lut_dir = "/srv/luts"
			"#,
		)
		.unwrap();
		assert_eq!(c.max_preview_size, 1024);
		assert_eq!(c.power_preference, PowerPreference::LowPower);
		assert_eq!(c.lut_dir, PathBuf::from("/srv/luts"));
		assert_eq!(c.frame_interval(), Duration::from_millis(16));
	}

	#[test]
	fn zero_preview_size_is_rejected() {
		assert!(matches!(
			SessionConfig::from_toml_str("max_preview_size = 0"),
			Err(Error::Config(_))
		));
	}

	#[test]
	fn unknown_power_preference_is_rejected() {
		assert!(SessionConfig::from_toml_str("power_preference = \"turbo\"").is_err());
	}
}
