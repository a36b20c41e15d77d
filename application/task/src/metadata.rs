//! Static job metadata, written once at submission and read by every task of the job.
//!
//! A worker only gets a task position, its role and paths are derived again from this.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::arguments::ArgList;
use crate::codec::{Codec, HardwareMode};
use crate::graph::{self, DependencyEdge, OutputTemplate};
use crate::{ChunkPlan, DirectTask, FrameRange, MetadataError, TaskDescriptor, TaskRole};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobMode {
	Chunked { chunks: Vec<FrameRange> },
	Direct { first_frame: i64 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
	pub name: String,
	pub codec: Codec,
	pub hardware_mode: HardwareMode,
	///Transcoder input, `%04d` form for sequences
	pub input: String,
	pub input_args: ArgList,
	pub output_args: ArgList,
	pub output: OutputTemplate,
	#[serde(default)]
	pub audio: Option<PathBuf>,
	#[serde(default)]
	pub audio_args: ArgList,
	#[serde(default)]
	pub keep_intermediates: bool,
	pub mode: JobMode,
}

impl JobMetadata {
	pub fn from_json(json: &str) -> Result<JobMetadata, MetadataError> {
		Ok(serde_json::from_str(json)?)
	}

	pub fn to_json(&self) -> Result<String, MetadataError> {
		Ok(serde_json::to_string_pretty(self)?)
	}

	pub fn chunk_count(&self) -> Option<u32> {
		match &self.mode {
			JobMode::Chunked { chunks } => Some(chunks.len() as u32),
			JobMode::Direct { .. } => None,
		}
	}

	pub fn task_count(&self) -> u32 {
		self.chunk_count().map_or(1, |chunks| chunks + 1)
	}

	pub fn role(&self, position: u32) -> Result<TaskRole, MetadataError> {
		match self.chunk_count() {
			Some(chunks) => TaskRole::resolve(position, chunks),
			None if position == 0 => Ok(TaskRole::Direct),
			None => Err(MetadataError::TaskOutOfRange {
				position,
				task_count: 1,
			}),
		}
	}

	fn graph(&self, chunks: &[FrameRange]) -> Result<graph::TaskGraph, MetadataError> {
		let plan = ChunkPlan::from_ranges(chunks.to_vec());
		graph::build(
			&plan,
			&self.input,
			&self.output,
			&self.output_args,
			self.audio.as_deref(),
		)
		.map_err(|_| MetadataError::TooFewChunks(chunks.len()))
	}

	///Rebuild the descriptor of the task at `position`
	pub fn descriptor(&self, position: u32) -> Result<TaskDescriptor, MetadataError> {
		self.role(position)?;
		match &self.mode {
			JobMode::Chunked { chunks } => {
				let mut graph = self.graph(chunks)?;
				Ok(graph.tasks.swap_remove(position as usize))
			}
			JobMode::Direct { first_frame } => Ok(TaskDescriptor::Direct(DirectTask {
				first_frame: *first_frame,
				input: self.input.clone(),
				output: self.output.final_output(),
				audio: self.audio.clone(),
			})),
		}
	}

	///Edges the scheduler must honour, empty for a direct job
	pub fn dependencies(&self) -> Result<Vec<DependencyEdge>, MetadataError> {
		match &self.mode {
			JobMode::Chunked { chunks } => Ok(self.graph(chunks)?.edges),
			JobMode::Direct { .. } => Ok(Vec::new()),
		}
	}
}

#[cfg(test)]
pub(crate) mod test {
	use std::path::Path;

	use super::*;

	pub(crate) fn chunked() -> JobMetadata {
		JobMetadata {
			name: "shot".to_string(),
			codec: Codec::H265,
			hardware_mode: HardwareMode::Gpu,
			input: "/shots/beauty.%04d.exr".to_string(),
			input_args: ArgList::new().pair("-r", 24),
			output_args: ArgList::new().pair("-c:v", "hevc_nvenc"),
			output: OutputTemplate::from_output(Path::new("/renders/shot_h265.mp4")),
			audio: None,
			audio_args: ArgList::new(),
			keep_intermediates: false,
			mode: JobMode::Chunked {
				chunks: vec![
					FrameRange::new(1, 134, 134),
					FrameRange::new(135, 268, 134),
					FrameRange::new(269, 400, 132),
				],
			},
		}
	}

	#[test]
	fn positions_resolve_to_roles() {
		let metadata = chunked();
		assert_eq!(metadata.task_count(), 4);
		assert_eq!(metadata.role(1).unwrap(), TaskRole::Encode(1));
		assert_eq!(metadata.role(3).unwrap(), TaskRole::Join);
		assert!(metadata.role(4).is_err());
	}

	#[test]
	fn descriptor_rebuilt_from_position() {
		let metadata = chunked();
		let TaskDescriptor::Encode(encode) = metadata.descriptor(1).unwrap() else {
			panic!("Should be an encode task");
		};
		assert_eq!(encode.frame_range.start(), 135);
		assert_eq!(encode.output, PathBuf::from("/renders/shot_h265_chunk002.mp4"));
		let TaskDescriptor::Join(join) = metadata.descriptor(3).unwrap() else {
			panic!("Should be the join task");
		};
		assert_eq!(join.chunks.len(), 3);
		assert_eq!(join.output, PathBuf::from("/renders/shot_h265.mp4"));
	}

	#[test]
	fn direct_job_has_a_single_task() {
		let metadata = JobMetadata {
			mode: JobMode::Direct { first_frame: 1 },
			..chunked()
		};
		assert_eq!(metadata.task_count(), 1);
		assert!(metadata.dependencies().unwrap().is_empty());
		assert_eq!(metadata.descriptor(0).unwrap().role(), TaskRole::Direct);
		assert!(matches!(
			metadata.descriptor(1),
			Err(MetadataError::TaskOutOfRange { position: 1, .. })
		));
	}

	#[test]
	fn single_chunk_metadata_is_invalid() {
		let metadata = JobMetadata {
			mode: JobMode::Chunked {
				chunks: vec![FrameRange::new(1, 10, 10)],
			},
			..chunked()
		};
		assert!(matches!(
			metadata.descriptor(0),
			Err(MetadataError::TooFewChunks(1))
		));
	}

	#[test]
	fn json_round_trip_keeps_descriptors() {
		let metadata = chunked();
		let json = metadata.to_json().unwrap();
		assert!(json.contains("\"kind\": \"chunked\""));
		let back = JobMetadata::from_json(&json).unwrap();
		assert_eq!(back.descriptor(2).unwrap(), metadata.descriptor(2).unwrap());
	}

	#[test]
	fn invalid_json_is_an_error() {
		assert!(matches!(
			JobMetadata::from_json("{}"),
			Err(MetadataError::Invalid(_))
		));
	}
}
