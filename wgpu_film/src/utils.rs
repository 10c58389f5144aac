/// Row layout of a texture copied through a buffer, whose rows must be
/// padded to `wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowAlign {
	pub height: u32,
	pub unpadded_bytes_per_row: u32,
	pub padded_bytes_per_row: u32,
}

impl RowAlign {
	pub fn new(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
		let unpadded_bytes_per_row = width * bytes_per_pixel;
		let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
		let padding = (align - unpadded_bytes_per_row % align) % align;
		Self {
			height,
			unpadded_bytes_per_row,
			padded_bytes_per_row: unpadded_bytes_per_row + padding,
		}
	}

	pub fn buffer_size(&self) -> u64 {
		self.padded_bytes_per_row as u64 * self.height as u64
	}

	/// Strip row padding from a mapped readback buffer.
	pub fn unpad(&self, padded: &[u8]) -> Vec<u8> {
		let mut out = Vec::with_capacity(self.unpadded_bytes_per_row as usize * self.height as usize);
		for row in padded
			.chunks(self.padded_bytes_per_row as usize)
			.take(self.height as usize)
		{
			out.extend_from_slice(&row[..self.unpadded_bytes_per_row as usize]);
		}
		out
	}
}

/// Fit `width x height` inside a `max x max` box, keeping the aspect ratio.
/// Images already inside the box keep their size. The long axis lands on
/// `max`, the short axis is floored and never collapses below one pixel.
pub fn fit_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
	if width <= max && height <= max {
		return (width, height);
	}
	let scale = |v: u32, long: u32| ((v as u64 * max as u64 / long as u64) as u32).max(1);
	if width >= height {
		(max, scale(height, width))
	} else {
		(scale(width, height), max)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rows_pad_to_alignment() {
		let a = RowAlign::new(3, 2, 4);
		assert_eq!(a.unpadded_bytes_per_row, 12);
		assert_eq!(a.padded_bytes_per_row, 256);
		assert_eq!(a.buffer_size(), 512);

		let a = RowAlign::new(64, 1, 4);
		assert_eq!(a.padded_bytes_per_row, 256);
	}

	#[test]
	fn unpad_drops_row_tails() {
		let a = RowAlign::new(1, 2, 4);
		let mut padded = vec![0u8; a.buffer_size() as usize];
		padded[..4].copy_from_slice(&[1, 2, 3, 4]);
		padded[256..260].copy_from_slice(&[5, 6, 7, 8]);
		assert_eq!(a.unpad(&padded), vec![1, 2, 3, 4, 5, 6, 7, 8]);
	}

	#[test]
	fn fit_keeps_small_images() {
		assert_eq!(fit_dimensions(640, 480, 2048), (640, 480));
		assert_eq!(fit_dimensions(2048, 2048, 2048), (2048, 2048));
	}

	#[test]
	fn fit_scales_long_axis_to_cap() {
		assert_eq!(fit_dimensions(4096, 2048, 2048), (2048, 1024));
		assert_eq!(fit_dimensions(3000, 4000, 2048), (1536, 2048));
		assert_eq!(fit_dimensions(6000, 4000, 2048), (2048, 1365));
		assert_eq!(fit_dimensions(100_000, 10, 2048), (2048, 1));
	}
}
