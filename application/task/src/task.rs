//! # Task crate
//! This crate defines the chunked transcode job: how frames are split into chunks, how the
//! encode and join tasks are described, and the farm scheduler trait the job is submitted to.
//!
//! Everything here is free of process spawning, the worker crate runs the tasks.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod arguments;
pub mod audio;
pub mod codec;
pub mod concurrency;
pub mod error;
pub mod graph;
pub mod manager;
pub mod metadata;
pub mod naming;
pub mod planner;
pub mod sequence;
pub mod submission;
pub mod tokens;

pub use error::{GraphError, MetadataError, ParseNameError, SchedulerError, SubmissionError};

///Inclusive range of frame numbers encoded by a single chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
	start: i64,
	end: i64,
	///Number of input frames in the range, lower than the span for sparse sequences
	len: usize,
}

impl FrameRange {
	pub(crate) fn new(start: i64, end: i64, len: usize) -> FrameRange {
		debug_assert!(end >= start);
		debug_assert!(len > 0);
		FrameRange { start, end, len }
	}

	///Dense range with every frame from `start` to `end` present
	pub fn span(start: i64, end: i64) -> Option<FrameRange> {
		let len = usize::try_from(end.checked_sub(start)?).ok()? + 1;
		Some(FrameRange { start, end, len })
	}

	pub fn start(&self) -> i64 {
		self.start
	}

	pub fn end(&self) -> i64 {
		self.end
	}

	///Frames the transcoder should read for this range
	pub fn count(&self) -> usize {
		self.len
	}

	pub fn contains(&self, frame: i64) -> bool {
		(self.start..=self.end).contains(&frame)
	}
}

impl fmt::Display for FrameRange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}-{}", self.start, self.end)
	}
}

///Ordered, gap-free chunk ranges covering every input frame once
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
	ranges: Vec<FrameRange>,
}

impl ChunkPlan {
	pub(crate) fn from_ranges(ranges: Vec<FrameRange>) -> ChunkPlan {
		ChunkPlan { ranges }
	}

	pub fn ranges(&self) -> &[FrameRange] {
		&self.ranges
	}

	pub fn len(&self) -> usize {
		self.ranges.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ranges.is_empty()
	}

	///Total frames across all chunks
	pub fn frame_count(&self) -> usize {
		self.ranges.iter().map(FrameRange::count).sum()
	}

	pub fn into_ranges(self) -> Vec<FrameRange> {
		self.ranges
	}
}

///Role of a task inside a chunked job, derived only from its position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskRole {
	Encode(u32),
	Join,
	///The only task of a job that was not worth chunking
	Direct,
}

impl TaskRole {
	///Positions `0..chunk_count` encode, `chunk_count` joins
	pub fn resolve(position: u32, chunk_count: u32) -> Result<TaskRole, MetadataError> {
		match position.cmp(&chunk_count) {
			std::cmp::Ordering::Less => Ok(TaskRole::Encode(position)),
			std::cmp::Ordering::Equal => Ok(TaskRole::Join),
			std::cmp::Ordering::Greater => Err(MetadataError::TaskOutOfRange {
				position,
				task_count: chunk_count + 1,
			}),
		}
	}
}

impl fmt::Display for TaskRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TaskRole::Encode(index) => write!(f, "encode chunk {}", index + 1),
			TaskRole::Join => write!(f, "join"),
			TaskRole::Direct => write!(f, "direct encode"),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct EncodeTask {
	pub index: u32,
	pub frame_range: FrameRange,
	pub input: String,
	pub output: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinTask {
	pub chunk_count: u32,
	///In concatenation order
	pub chunks: Vec<PathBuf>,
	pub manifest: PathBuf,
	pub output: PathBuf,
	pub audio: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectTask {
	pub first_frame: i64,
	pub input: String,
	pub output: PathBuf,
	pub audio: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TaskDescriptor {
	Encode(EncodeTask),
	Join(JoinTask),
	Direct(DirectTask),
}

impl TaskDescriptor {
	pub fn role(&self) -> TaskRole {
		match self {
			TaskDescriptor::Encode(task) => TaskRole::Encode(task.index),
			TaskDescriptor::Join(_) => TaskRole::Join,
			TaskDescriptor::Direct(_) => TaskRole::Direct,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn positions_before_chunk_count_encode() {
		assert_eq!(TaskRole::resolve(0, 3).unwrap(), TaskRole::Encode(0));
		assert_eq!(TaskRole::resolve(2, 3).unwrap(), TaskRole::Encode(2));
	}

	#[test]
	fn position_equal_to_chunk_count_joins() {
		assert_eq!(TaskRole::resolve(3, 3).unwrap(), TaskRole::Join);
	}

	#[test]
	fn position_past_join_is_error() {
		let err = TaskRole::resolve(4, 3).unwrap_err();
		assert!(matches!(
			err,
			MetadataError::TaskOutOfRange {
				position: 4,
				task_count: 4
			}
		));
	}

	#[test]
	fn span_counts_every_frame() {
		let range = FrameRange::span(-2, 2).unwrap();
		assert_eq!(range.count(), 5);
		assert_eq!(FrameRange::span(3, 2), None);
	}

	#[test]
	fn frame_range_contains_bounds() {
		let range = FrameRange::new(10, 20, 11);
		assert!(range.contains(10));
		assert!(range.contains(20));
		assert!(!range.contains(21));
		assert_eq!(range.to_string(), "10-20");
	}
}
