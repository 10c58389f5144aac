use thiserror::Error;

/// Errors produced while reading `.cube` text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
	#[error("LUT_3D_SIZE is not a valid size: '{0}'")]
	MalformedSize(String),
	#[error("no data triples found")]
	EmptyData,
	#[error("need {expected} triples for the declared grid, got {actual}")]
	SizeMismatch { expected: usize, actual: usize },
}

/// A dense cubic grid of 8-bit color samples.
///
/// Samples are kept in file order, so the red axis varies fastest:
/// `index = r + g * N + b * N * N`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LutGrid {
	edge_length: u32,
	samples: Vec<[u8; 3]>,
}

impl LutGrid {
	pub fn new(edge_length: u32, samples: Vec<[u8; 3]>) -> Result<Self, ParseError> {
		let expected = cube_len(edge_length);
		if edge_length < 2 || samples.len() != expected {
			return Err(ParseError::SizeMismatch {
				expected,
				actual: samples.len(),
			});
		}
		Ok(Self {
			edge_length,
			samples,
		})
	}

	/// Identity grid of the given edge length, every sample maps to itself.
	pub fn identity(edge_length: u32) -> Self {
		let n = edge_length.max(2);
		let step = |i: u32| ((i * 255) / (n - 1)) as u8;
		let mut samples = Vec::with_capacity(cube_len(n));
		for b in 0..n {
			for g in 0..n {
				for r in 0..n {
					samples.push([step(r), step(g), step(b)]);
				}
			}
		}
		Self {
			edge_length: n,
			samples,
		}
	}

	pub fn edge_length(&self) -> u32 {
		self.edge_length
	}

	pub fn samples(&self) -> &[[u8; 3]] {
		&self.samples
	}

	/// Samples widened to RGBA with an opaque alpha, the layout 8-bit 3D
	/// textures are uploaded in.
	pub fn to_rgba8(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(self.samples.len() * 4);
		for [r, g, b] in &self.samples {
			out.extend_from_slice(&[*r, *g, *b, u8::MAX]);
		}
		out
	}
}

fn cube_len(n: u32) -> usize {
	let n = n as usize;
	n.saturating_mul(n).saturating_mul(n)
}

fn to_byte(v: f64) -> u8 {
	(v * 255.0).floor().clamp(0.0, 255.0) as u8
}

fn parse_triple(line: &str) -> Option<[u8; 3]> {
	let mut tokens = line.split_whitespace();
	let mut out = [0u8; 3];
	for slot in out.iter_mut() {
		let v = tokens.next()?.parse::<f64>().ok().filter(|v| v.is_finite())?;
		*slot = to_byte(v);
	}
	if tokens.next().is_some() {
		return None;
	}
	Some(out)
}

fn parse_size(line: &str) -> Result<u32, ParseError> {
	let token = line.split_whitespace().nth(1).unwrap_or("");
	let size = token
		.trim_matches('"')
		.parse::<u32>()
		.map_err(|_| ParseError::MalformedSize(token.to_string()))?;
	if !(2..65536).contains(&size) {
		return Err(ParseError::MalformedSize(token.to_string()));
	}
	Ok(size)
}

fn infer_edge(count: usize) -> Result<u32, ParseError> {
	let edge = (count as f64).cbrt().round() as usize;
	if edge < 2 || edge * edge * edge != count {
		return Err(ParseError::SizeMismatch {
			expected: edge * edge * edge,
			actual: count,
		});
	}
	u32::try_from(edge).map_err(|_| ParseError::SizeMismatch {
		expected: edge,
		actual: count,
	})
}

/// Parse `.cube` text into a [`LutGrid`].
///
/// Comments, `TITLE`, `DOMAIN_*` and unknown directives are skipped. Data
/// lines must hold exactly three floats; each value is mapped to a byte with
/// `clamp(floor(v * 255), 0, 255)`. Without `LUT_3D_SIZE` the edge length is
/// inferred from the number of triples.
pub fn parse(text: &str) -> Result<LutGrid, ParseError> {
	let mut dim: Option<u32> = None;
	let mut samples = Vec::new();

	for line in text.lines().map(str::trim) {
		if line.is_empty()
			|| line.starts_with('#')
			|| line.starts_with("TITLE")
			|| line.starts_with("DOMAIN_")
		{
			continue;
		} else if line.starts_with("LUT_3D_SIZE") {
			dim = Some(parse_size(line)?);
		} else if let Some(triple) = parse_triple(line) {
			samples.push(triple);
		}
	}

	if samples.is_empty() {
		return Err(ParseError::EmptyData);
	}

	let dim = match dim {
		Some(d) => d,
		None => infer_edge(samples.len())?,
	};
	LutGrid::new(dim, samples)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn synthetic(size: Option<u32>, triples: &[[f32; 3]]) -> String {
		let mut s = String::from("TITLE \"synthetic\"\n# generated\n");
		if let Some(n) = size {
			s.push_str(&format!("LUT_3D_SIZE {}\n", n));
		}
		s.push_str("DOMAIN_MIN 0.0 0.0 0.0\nDOMAIN_MAX 1.0 1.0 1.0\n\n");
		for [r, g, b] in triples {
			s.push_str(&format!("{} {} {}\n", r, g, b));
		}
		s
	}

	fn ramp(count: usize) -> Vec<[f32; 3]> {
		(0..count)
			.map(|i| {
				let v = i as f32 / count as f32;
				[v, 1.0 - v, v * 0.5]
			})
			.collect()
	}

	#[test]
	fn size_two_maps_known_bytes() {
		let triples = [
			[0.0, 0.0, 0.0],
			[1.0, 0.0, 0.5],
			[0.0, 1.0, 0.0],
			[1.0, 1.0, 0.0],
			[0.0, 0.0, 1.0],
			[1.0, 0.0, 1.0],
			[0.25, 0.75, 1.0],
			[1.0, 1.0, 1.0],
		];
		let grid = parse(&synthetic(Some(2), &triples)).unwrap();
		assert_eq!(grid.edge_length(), 2);
		assert_eq!(
			grid.samples(),
			&[
				[0, 0, 0],
				[255, 0, 127],
				[0, 255, 0],
				[255, 255, 0],
				[0, 0, 255],
				[255, 0, 255],
				[63, 191, 255],
				[255, 255, 255],
			]
		);
	}

	#[test]
	fn explicit_size_yields_cube_of_samples() {
		for n in [2u32, 3, 5, 17] {
			let count = (n * n * n) as usize;
			let grid = parse(&synthetic(Some(n), &ramp(count))).unwrap();
			assert_eq!(grid.samples().len(), count);
			assert_eq!(grid.edge_length(), n);
		}
	}

	#[test]
	fn out_of_range_values_clamp() {
		let mut triples = ramp(7);
		triples.push([1.7, -0.3, 0.999]);
		let grid = parse(&synthetic(Some(2), &triples)).unwrap();
		assert_eq!(grid.samples()[7], [255, 0, 254]);
	}

	#[test]
	fn infers_edge_from_27_triples() {
		let grid = parse(&synthetic(None, &ramp(27))).unwrap();
		assert_eq!(grid.edge_length(), 3);
	}

	#[test]
	fn non_cube_count_without_size_fails() {
		let err = parse(&synthetic(None, &ramp(10))).unwrap_err();
		assert!(matches!(err, ParseError::SizeMismatch { actual: 10, .. }));
	}

	#[test]
	fn declared_size_must_match_data() {
		let err = parse(&synthetic(Some(3), &ramp(8))).unwrap_err();
		assert_eq!(
			err,
			ParseError::SizeMismatch {
				expected: 27,
				actual: 8
			}
		);
	}

	#[test]
	fn huge_declared_size_is_a_mismatch() {
		let err = parse("LUT_3D_SIZE 65535\n0 0 0\n").unwrap_err();
		assert!(matches!(err, ParseError::SizeMismatch { actual: 1, .. }));
	}

	#[test]
	fn non_finite_lines_are_not_data() {
		let mut text = String::from("nan 0 0\n0 inf 0\n0 0 -infinity\nNaN NaN NaN\n");
		text.push_str(&synthetic(Some(2), &ramp(8)));
		let grid = parse(&text).unwrap();
		assert_eq!(grid.samples().len(), 8);
		assert_eq!(parse("nan 0 0\n").unwrap_err(), ParseError::EmptyData);
	}

	#[test]
	fn malformed_size_fails() {
		let err = parse("LUT_3D_SIZE abc\n0 0 0\n").unwrap_err();
		assert_eq!(err, ParseError::MalformedSize("abc".to_string()));
		assert!(matches!(
			parse("LUT_3D_SIZE\n0 0 0\n"),
			Err(ParseError::MalformedSize(_))
		));
	}

	#[test]
	fn empty_data_fails() {
		assert_eq!(parse("").unwrap_err(), ParseError::EmptyData);
		assert_eq!(
			parse("TITLE \"x\"\nLUT_3D_SIZE 2\n# nothing\n").unwrap_err(),
			ParseError::EmptyData
		);
	}

	#[test]
	fn unknown_lines_are_skipped() {
		let mut text = String::from("LUT_1D_INPUT_RANGE 0.0 1.0\nFOO bar baz\n1 2\n1 2 3 4\n");
		text.push_str(&synthetic(Some(2), &ramp(8)));
		text.push_str("LUT_3D_INPUT_RANGE 0 1\n");
		let grid = parse(&text).unwrap();
		assert_eq!(grid.samples().len(), 8);
	}

	#[test]
	fn crlf_and_indentation_are_tolerated() {
		let text = synthetic(Some(2), &ramp(8))
			.lines()
			.map(|l| format!("  {}\r\n", l))
			.collect::<String>();
		assert_eq!(parse(&text).unwrap().edge_length(), 2);
	}

	#[test]
	fn identity_grid_corners() {
		let grid = LutGrid::identity(3);
		assert_eq!(grid.samples().len(), 27);
		assert_eq!(grid.samples()[0], [0, 0, 0]);
		assert_eq!(grid.samples()[1], [127, 0, 0]);
		assert_eq!(grid.samples()[26], [255, 255, 255]);
		assert_eq!(grid.to_rgba8().len(), 27 * 4);
	}
}
