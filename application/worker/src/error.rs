//! Worker side errors.
//!
//! Task failures are turned into a [`crate::executor::TaskOutcome`], these only leave the
//! binary as a non zero exit status.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use transcode_task::{MetadataError, SchedulerError, SubmissionError};

#[derive(Debug, Error)]
pub enum WorkerError {
	#[error("transcoder executable not found: {0}")]
	TranscoderNotFound(String),

	#[error("transcoder exited with status {exit_code:?}")]
	TranscoderFailed {
		exit_code: Option<i32>,
		diagnostics: Vec<String>,
	},

	#[error("staging {path} failed: {source}")]
	Staging {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("no frame of {pattern} in range {range}")]
	NoFramesStaged { pattern: String, range: String },

	#[error("invalid settings file {path}: {message}")]
	Settings { path: PathBuf, message: String },

	#[error(transparent)]
	Metadata(#[from] MetadataError),

	#[error(transparent)]
	Submission(#[from] SubmissionError),

	#[error(transparent)]
	Scheduler(#[from] SchedulerError),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] io::Error),
}

impl WorkerError {
	pub(crate) fn staging(path: impl Into<PathBuf>, source: io::Error) -> WorkerError {
		WorkerError::Staging {
			path: path.into(),
			source,
		}
	}

	///Last diagnostic lines of a failed transcoder run, empty for other errors
	pub fn diagnostics(&self) -> &[String] {
		match self {
			WorkerError::TranscoderFailed { diagnostics, .. } => diagnostics,
			_ => &[],
		}
	}
}
