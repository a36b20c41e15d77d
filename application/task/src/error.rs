//! Error types shared by the planning side of the job.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
	#[error("task {position} does not exist, job has {task_count} tasks")]
	TaskOutOfRange { position: u32, task_count: u32 },

	#[error("a chunked job needs at least 2 chunks, metadata has {0}")]
	TooFewChunks(usize),

	#[error("invalid job metadata: {0}")]
	Invalid(#[from] serde_json::Error),
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum ParseNameError {
	#[error("unknown codec {0:?}")]
	Codec(String),

	#[error("unknown prores profile {0:?}")]
	ProResProfile(String),
}

#[derive(Debug, Error)]
pub enum GraphError {
	#[error("a chunk plan with {0} entries must be encoded directly")]
	NotWorthChunking(usize),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
	#[error("job {0} not found")]
	JobNotFound(String),

	#[error("task {task} not found in job {job}")]
	TaskNotFound { job: String, task: u32 },

	#[error("dependency on task {0} which does not exist")]
	InvalidDependency(u32),

	#[error("submission failed: {0}")]
	Submit(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SubmissionError {
	#[error("frame rate could not be determined, set an override or use an fps token")]
	FrameRate,

	#[error("render job has no frames")]
	NoFrames,

	#[error(transparent)]
	Graph(#[from] GraphError),

	#[error(transparent)]
	Metadata(#[from] MetadataError),

	#[error(transparent)]
	Scheduler(#[from] SchedulerError),
}
