//! Where LUT text comes from.

use crate::error::FetchError;
use dashmap::DashMap;
use std::{
	future::Future,
	io::ErrorKind,
	path::PathBuf,
	pin::Pin,
	sync::Arc,
};

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>>;

/// Resolves a LUT selector to `.cube` text. Fetches run off the render
/// thread, so implementations must be shareable across threads.
pub trait LutSource: Send + Sync {
	fn fetch<'a>(&'a self, selector: &'a str) -> FetchFuture<'a>;
}

/// Reads `<dir>/<selector>.cube`.
#[derive(Debug, Clone)]
pub struct DirSource {
	dir: PathBuf,
}

impl DirSource {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	fn path_for(&self, selector: &str) -> Result<PathBuf, FetchError> {
		if selector.is_empty()
			|| selector.contains(['/', '\\'])
			|| selector.split('.').any(|part| part.is_empty())
		{
			return Err(FetchError::InvalidSelector(selector.to_string()));
		}
		Ok(self.dir.join(format!("{}.cube", selector)))
	}
}

impl LutSource for DirSource {
	fn fetch<'a>(&'a self, selector: &'a str) -> FetchFuture<'a> {
		Box::pin(async move {
			let path = self.path_for(selector)?;
			async_std::fs::read_to_string(&path)
				.await
				.map_err(|e| match e.kind() {
					ErrorKind::NotFound => FetchError::NotFound(selector.to_string()),
					_ => FetchError::Io {
						selector: selector.to_string(),
						message: e.to_string(),
					},
				})
		})
	}
}

/// Named LUT texts held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
	luts: DashMap<String, Arc<str>>,
}

impl MemorySource {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, name: &str, text: impl Into<Arc<str>>) {
		self.luts.insert(name.to_string(), text.into());
	}

	pub fn remove(&self, name: &str) -> bool {
		self.luts.remove(name).is_some()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.luts.contains_key(name)
	}
}

impl LutSource for MemorySource {
	fn fetch<'a>(&'a self, selector: &'a str) -> FetchFuture<'a> {
		// clone out of the map so no shard lock is held across the await
		let found = self.luts.get(selector).map(|text| text.value().to_string());
		Box::pin(async move { found.ok_or_else(|| FetchError::NotFound(selector.to_string())) })
	}
}

/// The bundled film looks. Their selectors double as `.cube` file stems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilmStock {
	#[default]
	Ektachrome,
	Portra400,
	AgfaVista400,
	Kodachrome64,
}

impl FilmStock {
	pub const ALL: [FilmStock; 4] = [
		FilmStock::Ektachrome,
		FilmStock::Portra400,
		FilmStock::AgfaVista400,
		FilmStock::Kodachrome64,
	];

	/// Intensity a stock starts at, as a slider position.
	pub const DEFAULT_INTENSITY: i32 = 70;

	pub fn selector(self) -> &'static str {
		match self {
			FilmStock::Ektachrome => "ektachrome",
			FilmStock::Portra400 => "portra-400",
			FilmStock::AgfaVista400 => "agfa-vista-400",
			FilmStock::Kodachrome64 => "kodachrome-64",
		}
	}

	pub fn label(self) -> &'static str {
		match self {
			FilmStock::Ektachrome => "Ektachrome",
			FilmStock::Portra400 => "Portra 400",
			FilmStock::AgfaVista400 => "Agfa Vista 400",
			FilmStock::Kodachrome64 => "Kodachrome 64",
		}
	}

	pub fn from_selector(selector: &str) -> Option<Self> {
		Self::ALL.iter().copied().find(|s| s.selector() == selector)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_std::task::block_on;
	use std::fs;

	#[test]
	fn dir_source_reads_cube_files() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("portra-400.cube"), "LUT_3D_SIZE 2\n").unwrap();
		let src = DirSource::new(dir.path());
		let text = block_on(src.fetch("portra-400")).unwrap();
		assert_eq!(text, "LUT_3D_SIZE 2\n");
	}

	#[test]
	fn dir_source_missing_file_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let src = DirSource::new(dir.path());
		assert!(matches!(
			block_on(src.fetch("kodachrome-64")),
			Err(FetchError::NotFound(s)) if s == "kodachrome-64"
		));
	}

	#[test]
	fn dir_source_rejects_path_escapes() {
		let src = DirSource::new("luts");
		for bad in ["", "../secret", "a/b", "a\\b", "..", ".hidden"] {
			assert!(
				matches!(block_on(src.fetch(bad)), Err(FetchError::InvalidSelector(_))),
				"{:?} should be rejected",
				bad
			);
		}
	}

	#[test]
	fn memory_source_insert_remove() {
		let src = MemorySource::new();
		src.insert("test", "0 0 0\n");
		assert!(src.contains("test"));
		assert_eq!(block_on(src.fetch("test")).unwrap(), "0 0 0\n");
		assert!(src.remove("test"));
		assert!(matches!(block_on(src.fetch("test")), Err(FetchError::NotFound(_))));
	}

	#[test]
	fn stocks_round_trip_selectors() {
		for stock in FilmStock::ALL {
			assert_eq!(FilmStock::from_selector(stock.selector()), Some(stock));
		}
		assert_eq!(FilmStock::default().selector(), "ektachrome");
		assert_eq!(FilmStock::from_selector("velvia"), None);
	}
}
