//! Render loop on a dedicated thread: render one frame, wait for the next
//! frame deadline or a command, repeat until cancelled.

use crate::{
	error::RenderError,
	gpu::Bitmap,
	params::FilterParameters,
	render::RenderState,
	session::FilterSession,
};
use async_std::{
	channel::{self, Receiver, Sender, TryRecvError},
	future::timeout,
	task::block_on,
};
use image::RgbaImage;
use std::{
	io,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc,
	},
	thread::{self, JoinHandle},
	time::Instant,
};
use tracing::{debug, warn};

/// Shared stop flag for the render loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::Release);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Acquire)
	}
}

type Snapshot = Result<Option<RgbaImage>, RenderError>;

enum Command {
	SetImage(Option<Bitmap>),
	SetParams(FilterParameters),
	SelectLut(String),
	Snapshot(Sender<Snapshot>),
}

pub struct RenderLoop;

impl RenderLoop {
	/// Move `session` onto its own thread and start drawing. All GPU work
	/// for the session happens on that thread from now on.
	pub fn spawn(session: FilterSession) -> io::Result<LoopHandle> {
		let (commands, rx) = channel::unbounded();
		let cancel = CancelToken::new();
		let loading = session.loading_flag();
		let queued_luts = Arc::new(AtomicUsize::new(0));

		let token = cancel.clone();
		let queued = Arc::clone(&queued_luts);
		let thread = thread::Builder::new()
			.name("wgpu_film-render".to_string())
			.spawn(move || run(session, rx, token, queued))?;

		Ok(LoopHandle {
			commands,
			cancel,
			loading,
			queued_luts,
			thread: Some(thread),
		})
	}
}

/// Whether the command may change the LUT and was counted as queued.
fn selects_lut(command: &Command) -> bool {
	match command {
		Command::SetParams(params) => !params.lut_selector.is_empty(),
		Command::SelectLut(_) => true,
		_ => false,
	}
}

fn apply(session: &mut FilterSession, command: Command, queued_luts: &AtomicUsize) {
	let selects = selects_lut(&command);
	match command {
		Command::SetImage(bitmap) => {
			if let Err(e) = session.set_image(bitmap) {
				warn!(error = %e, "can not bind image");
			}
		}
		Command::SetParams(params) => session.set_params(params),
		Command::SelectLut(selector) => session.select_lut(&selector),
		Command::Snapshot(reply) => {
			// draw first so the snapshot reflects every command before it
			let frame = session.render_frame().and_then(|_| session.read_frame());
			let _ = reply.try_send(frame);
		}
	}
	// the session flag is up by now if a load started
	if selects {
		queued_luts.fetch_sub(1, Ordering::AcqRel);
	}
}

fn run(
	mut session: FilterSession,
	commands: Receiver<Command>,
	cancel: CancelToken,
	queued_luts: Arc<AtomicUsize>,
) {
	let interval = session.config().frame_interval();
	let mut next_frame = Instant::now();

	'frames: while !cancel.is_cancelled() {
		loop {
			match commands.try_recv() {
				Ok(command) => apply(&mut session, command, &queued_luts),
				Err(TryRecvError::Empty) => break,
				// every handle is gone
				Err(TryRecvError::Closed) => break 'frames,
			}
		}

		// nothing to draw: no frames, only finish pending LUT loads
		if session.state() == RenderState::Idle {
			match block_on(timeout(interval, commands.recv())) {
				Ok(Ok(command)) => apply(&mut session, command, &queued_luts),
				Ok(Err(_)) => break,
				Err(_) => session.poll_luts(),
			}
			next_frame = Instant::now();
			continue;
		}

		let now = Instant::now();
		if now < next_frame {
			match block_on(timeout(next_frame - now, commands.recv())) {
				Ok(Ok(command)) => {
					apply(&mut session, command, &queued_luts);
					continue;
				}
				Ok(Err(_)) => break,
				Err(_) => {}
			}
		}

		if let Err(e) = session.render_frame() {
			warn!(error = %e, "frame failed");
		}
		next_frame = Instant::now() + interval;
	}

	debug!(frames = session.frames_drawn(), "render loop stopped");
	session.shutdown();
}

/// Caller side of a running [`RenderLoop`].
pub struct LoopHandle {
	commands: Sender<Command>,
	cancel: CancelToken,
	loading: Arc<AtomicBool>,
	// LUT changes sent but not yet seen by the render thread
	queued_luts: Arc<AtomicUsize>,
	thread: Option<JoinHandle<()>>,
}

impl LoopHandle {
	fn send(&self, command: Command) {
		let selects = selects_lut(&command);
		if selects {
			self.queued_luts.fetch_add(1, Ordering::AcqRel);
		}
		if self.commands.try_send(command).is_err() {
			if selects {
				self.queued_luts.fetch_sub(1, Ordering::AcqRel);
			}
			debug!("render loop is gone, command dropped");
		}
	}

	pub fn set_image(&self, bitmap: Option<Bitmap>) {
		self.send(Command::SetImage(bitmap));
	}

	pub fn set_params(&self, params: FilterParameters) {
		self.send(Command::SetParams(params));
	}

	pub fn select_lut(&self, selector: &str) {
		self.send(Command::SelectLut(selector.to_string()));
	}

	/// True while a LUT swap is pending; exports should wait for it. Turns
	/// true as soon as a LUT change is sent.
	pub fn is_loading(&self) -> bool {
		self.queued_luts.load(Ordering::Acquire) > 0 || self.loading.load(Ordering::Acquire)
	}

	pub fn cancel_token(&self) -> CancelToken {
		self.cancel.clone()
	}

	/// Draw and read back the current frame. Blocks the caller until the
	/// render thread answers.
	pub fn snapshot(&self) -> Snapshot {
		let (tx, rx) = channel::bounded(1);
		self.send(Command::Snapshot(tx));
		block_on(rx.recv()).unwrap_or(Err(RenderError::Released))
	}

	/// Cancel the loop and wait for the session to be torn down.
	pub fn stop(mut self) {
		self.shutdown();
	}

	fn shutdown(&mut self) {
		self.cancel.cancel();
		self.commands.close();
		if let Some(thread) = self.thread.take() {
			if thread.join().is_err() {
				warn!("render thread panicked");
			}
		}
	}
}

impl Drop for LoopHandle {
	fn drop(&mut self) {
		self.shutdown();
	}
}
