use anyhow::Error;
use async_std::task::block_on;
use criterion::{criterion_group, criterion_main, Criterion};
use image::RgbaImage;
use std::{fmt::Write, sync::Arc};
use wgpu_film::{parse_cube, Bitmap, FilterParameters, FilterSession, MemorySource, SessionConfig};

fn identity_cube(size: u32) -> String {
	let mut s = format!("LUT_3D_SIZE {}\n", size);
	let max = (size - 1) as f32;
	for b in 0..size {
		for g in 0..size {
			for r in 0..size {
				let _ = writeln!(s, "{:.6} {:.6} {:.6}", r as f32 / max, g as f32 / max, b as f32 / max);
			}
		}
	}
	s
}

fn session(width: u32, height: u32) -> Option<FilterSession> {
	let source = MemorySource::new();
	source.insert("identity", identity_cube(33));
	source.insert("small", identity_cube(17));

	let s = block_on(async {
		let mut s = FilterSession::new(SessionConfig::default(), Arc::new(source)).await?;
		s.set_params(FilterParameters::new("identity"));
		s.settle_luts().await?;

		let img = RgbaImage::from_fn(width, height, |x, y| {
			image::Rgba([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8, 255])
		});
		s.set_image(Some(Bitmap::new(img)))?;

		Ok::<FilterSession, Error>(s)
	});
	match s {
		Ok(s) => Some(s),
		Err(e) => {
			eprintln!("skipping gpu benches: {}", e);
			None
		}
	}
}

fn parse(c: &mut Criterion) {
	let text = identity_cube(33);
	c.bench_function("parse cube 33", |b| b.iter(|| parse_cube(&text).unwrap()));
}

fn process(c: &mut Criterion) {
	let Some(mut s) = session(1280, 768) else {
		return;
	};

	c.bench_function("render lut only", |b| {
		s.set_params(FilterParameters::new("identity").with_percentages(70, 0, 0));
		b.iter(|| s.render_frame().unwrap())
	});

	c.bench_function("render all effects", |b| {
		s.set_params(FilterParameters::new("identity").with_percentages(70, 40, 60));
		b.iter(|| s.render_frame().unwrap())
	});

	c.bench_function("render and read back", |b| {
		b.iter(|| {
			s.render_frame().unwrap();
			s.read_frame().unwrap()
		})
	});

	c.bench_function("swap lut", |b| {
		let mut flip = false;
		b.iter(|| {
			flip = !flip;
			s.select_lut(if flip { "small" } else { "identity" });
			block_on(s.settle_luts()).unwrap();
		})
	});

	s.shutdown();
}

criterion_group!(benches, parse, process);

criterion_main!(benches);
