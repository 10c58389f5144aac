use anyhow::{anyhow, bail, Context, Result};
use async_std::task::block_on;
use clap::Parser;
use std::{fs, path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wgpu_film::{
	Bitmap, DirSource, FilmStock, FilterParameters, FilterSession, LutSource, MemorySource,
	SessionConfig,
};

/// Apply a film look to an image.
#[derive(Parser)]
#[command(name = "apply", version)]
struct Cli {
	/// Input image
	input: PathBuf,

	/// Output image, defaults to filmlab-<stock>.png
	output: Option<PathBuf>,

	/// Bundled film stock, looked up as <lut-dir>/<stock>.cube
	#[arg(short, long, conflicts_with = "lut")]
	stock: Option<String>,

	/// A .cube file to use instead of a bundled stock
	#[arg(short, long)]
	lut: Option<PathBuf>,

	/// LUT strength, 0-100
	#[arg(short, long, default_value_t = FilmStock::DEFAULT_INTENSITY)]
	intensity: i32,

	/// Film grain, 0-100
	#[arg(short, long, default_value_t = 0)]
	grain: i32,

	/// Highlight halation, 0-100
	#[arg(long, default_value_t = 0)]
	halation: i32,

	/// Session config (TOML)
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Directory holding the stock .cube files
	#[arg(long)]
	lut_dir: Option<PathBuf>,

	/// Largest output edge in pixels
	#[arg(long)]
	max_size: Option<u32>,
}

fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new("wgpu_film=info,wgpu_core=warn")),
		)
		.init();

	let cli = Cli::parse();

	let mut config = match &cli.config {
		Some(path) => SessionConfig::from_toml_file(path)
			.with_context(|| format!("reading config {}", path.display()))?,
		None => SessionConfig::default(),
	};
	if let Some(dir) = &cli.lut_dir {
		config.lut_dir = dir.clone();
	}
	if let Some(max) = cli.max_size {
		config.max_preview_size = max;
	}

	let (selector, source): (String, Arc<dyn LutSource>) = match &cli.lut {
		Some(path) => {
			let memory = MemorySource::new();
			memory.insert("custom", fs::read_to_string(path)?);
			("custom".to_string(), Arc::new(memory))
		}
		None => {
			let stock = match &cli.stock {
				Some(s) => FilmStock::from_selector(s).ok_or_else(|| {
					let known: Vec<_> = FilmStock::ALL.iter().map(|s| s.selector()).collect();
					anyhow!("unknown stock '{}', expected one of {}", s, known.join(", "))
				})?,
				None => FilmStock::default(),
			};
			info!(stock = stock.label(), "using bundled stock");
			(
				stock.selector().to_string(),
				Arc::new(DirSource::new(config.lut_dir.clone())),
			)
		}
	};

	let output = cli
		.output
		.clone()
		.unwrap_or_else(|| PathBuf::from(format!("filmlab-{}.png", selector)));

	let img = image::open(&cli.input)
		.with_context(|| format!("decoding {}", cli.input.display()))?
		.to_rgba8();

	block_on(async {
		let mut session = FilterSession::new(config, source).await?;

		session.set_params(
			FilterParameters::new(selector.as_str()).with_percentages(
				cli.intensity,
				cli.grain,
				cli.halation,
			),
		);
		session.settle_luts().await?;
		session.set_image(Some(Bitmap::new(img)))?;
		session.render_frame()?;

		let frame = match session.read_frame()? {
			Some(frame) => frame,
			None => bail!("nothing was rendered"),
		};
		frame
			.save(&output)
			.with_context(|| format!("writing {}", output.display()))?;
		info!(output = %output.display(), "saved");

		session.shutdown();
		Ok::<(), anyhow::Error>(())
	})
}
