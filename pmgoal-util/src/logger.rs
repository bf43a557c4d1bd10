//! Logger
//!
//! Logs to stderr, filtered by `RUST_LOG` (`info` by default), and optionally
//! to a file, filtered by `RUST_LOG_FILE` (`debug` by default).

// Imports
use {
	std::{
		fs,
		io,
		path::Path,
		sync::{Mutex, PoisonError},
	},
	tracing::{metadata::LevelFilter, Level},
	tracing_subscriber::{fmt, prelude::*, EnvFilter},
};

/// Messages logged before the logger was initialized
static PRE_INIT_MESSAGES: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());

/// Logging before initialization
pub mod pre_init {
	// Imports
	use tracing::Level;

	/// Queues a debug message
	pub fn debug(message: impl Into<String>) {
		super::push_pre_init(Level::DEBUG, message.into());
	}

	/// Queues a warning message
	pub fn warn(message: impl Into<String>) {
		super::push_pre_init(Level::WARN, message.into());
	}
}

fn push_pre_init(level: Level, message: String) {
	PRE_INIT_MESSAGES
		.lock()
		.unwrap_or_else(PoisonError::into_inner)
		.push((level, message));
}

/// Initializes the logger.
///
/// Any messages queued through [`pre_init`] are emitted afterwards.
pub fn init(log_file: Option<&Path>, log_file_append: bool) {
	// Create the terminal layer
	let term_layer = fmt::layer()
		.with_writer(io::stderr)
		.with_filter(self::env_filter("RUST_LOG", LevelFilter::INFO));

	// Create the file layer, if requested
	let mut file_open_err = None;
	let file_layer = log_file.and_then(|log_file| {
		let file = fs::OpenOptions::new()
			.create(true)
			.write(true)
			.append(log_file_append)
			.truncate(!log_file_append)
			.open(log_file);

		match file {
			Ok(file) => Some(
				fmt::layer()
					.with_ansi(false)
					.with_writer(Mutex::new(file))
					.with_filter(self::env_filter("RUST_LOG_FILE", LevelFilter::DEBUG)),
			),
			Err(err) => {
				file_open_err = Some((log_file.to_path_buf(), err));
				None
			},
		}
	});

	if let Err(err) = tracing_subscriber::registry()
		.with(term_layer)
		.with(file_layer)
		.try_init()
	{
		eprintln!("Unable to initialize logger: {err}");
		return;
	}

	if let Some((log_file, err)) = file_open_err {
		tracing::warn!(?log_file, ?err, "Unable to open log file");
	}

	// Then flush all the pre-init messages
	let messages = std::mem::take(&mut *PRE_INIT_MESSAGES.lock().unwrap_or_else(PoisonError::into_inner));
	for (level, message) in messages {
		if level == Level::WARN || level == Level::ERROR {
			tracing::warn!("{message}");
		} else {
			tracing::debug!("{message}");
		}
	}
}

/// Creates an env filter from `var`, falling back to `default`
fn env_filter(var: &str, default: LevelFilter) -> EnvFilter {
	EnvFilter::builder()
		.with_default_directive(default.into())
		.with_env_var(var)
		.from_env_lossy()
}
