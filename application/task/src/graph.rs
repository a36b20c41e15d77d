//! Builds the encode and join tasks of a chunked job and the edges that hold the join back.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::arguments::ArgList;
use crate::naming::{chunk_file_name, manifest_file_name};
use crate::{ChunkPlan, EncodeTask, GraphError, JoinTask, TaskDescriptor};

///Where the final output and every intermediate of a job are written
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTemplate {
	pub directory: PathBuf,
	pub basename: String,
	pub container: String,
}

impl OutputTemplate {
	///Split a final output path into directory, basename and container
	pub fn from_output(output: &Path) -> OutputTemplate {
		let directory = output.parent().map(Path::to_path_buf).unwrap_or_default();
		let basename = output
			.file_stem()
			.map(|stem| stem.to_string_lossy().into_owned())
			.unwrap_or_default();
		let container = output
			.extension()
			.map(|ext| ext.to_string_lossy().into_owned())
			.unwrap_or_default();
		OutputTemplate {
			directory,
			basename,
			container,
		}
	}

	pub fn chunk_path(&self, index: u32) -> PathBuf {
		self.directory
			.join(chunk_file_name(&self.basename, index, &self.container))
	}

	pub fn manifest_path(&self) -> PathBuf {
		self.directory.join(manifest_file_name(&self.basename))
	}

	pub fn final_output(&self) -> PathBuf {
		self.directory
			.join(format!("{}.{}", self.basename, self.container))
	}
}

///`join` may only run after `encode` succeeded
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
	pub join: u32,
	pub encode: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaskGraph {
	///Indexed by task id, the join is last
	pub tasks: Vec<TaskDescriptor>,
	pub edges: Vec<DependencyEdge>,
	///Encoder arguments shared by every encode task
	pub output_args: ArgList,
}

impl TaskGraph {
	pub fn chunk_count(&self) -> u32 {
		self.tasks.len() as u32 - 1
	}

	pub fn join_id(&self) -> u32 {
		self.chunk_count()
	}

	///Ids of the tasks `task` waits for
	pub fn dependencies_of(&self, task: u32) -> Vec<u32> {
		self.edges
			.iter()
			.filter(|edge| edge.join == task)
			.map(|edge| edge.encode)
			.collect()
	}
}

///One encode task per plan entry plus one join task that waits on all of them.
///
///A plan with a single entry has nothing to join and is rejected, it should be encoded directly.
pub fn build(
	plan: &ChunkPlan,
	input: &str,
	template: &OutputTemplate,
	codec_args: &ArgList,
	audio: Option<&Path>,
) -> Result<TaskGraph, GraphError> {
	if plan.len() <= 1 {
		return Err(GraphError::NotWorthChunking(plan.len()));
	}
	let chunk_count = plan.len() as u32;
	let mut tasks: Vec<TaskDescriptor> = plan
		.ranges()
		.iter()
		.zip(0..)
		.map(|(range, index)| {
			TaskDescriptor::Encode(EncodeTask {
				index,
				frame_range: *range,
				input: input.to_string(),
				output: template.chunk_path(index),
			})
		})
		.collect();
	tasks.push(TaskDescriptor::Join(JoinTask {
		chunk_count,
		chunks: (0..chunk_count).map(|i| template.chunk_path(i)).collect(),
		manifest: template.manifest_path(),
		output: template.final_output(),
		audio: audio.map(Path::to_path_buf),
	}));
	let edges = (0..chunk_count)
		.map(|encode| DependencyEdge {
			join: chunk_count,
			encode,
		})
		.collect();
	Ok(TaskGraph {
		tasks,
		edges,
		output_args: codec_args.clone(),
	})
}

#[cfg(test)]
mod test {
	use std::num::NonZeroUsize;

	use super::*;
	use crate::planner::plan;
	use crate::TaskRole;

	fn template() -> OutputTemplate {
		OutputTemplate::from_output(Path::new("/renders/shot_h265.mp4"))
	}

	fn three_chunks() -> ChunkPlan {
		let frames: Vec<i64> = (1..=400).collect();
		let size = NonZeroUsize::new(150).unwrap();
		let min = NonZeroUsize::new(2).unwrap();
		plan(&frames, size, min).unwrap()
	}

	#[test]
	fn template_from_output_path() {
		let template = template();
		assert_eq!(template.directory, PathBuf::from("/renders"));
		assert_eq!(template.basename, "shot_h265");
		assert_eq!(template.container, "mp4");
		assert_eq!(template.final_output(), PathBuf::from("/renders/shot_h265.mp4"));
		assert_eq!(
			template.manifest_path(),
			PathBuf::from("/renders/shot_h265_concat.txt")
		);
	}

	#[test]
	fn encode_tasks_then_join() {
		let graph = build(&three_chunks(), "in.%04d.exr", &template(), &ArgList::new(), None).unwrap();
		assert_eq!(graph.tasks.len(), 4);
		let roles: Vec<_> = graph.tasks.iter().map(TaskDescriptor::role).collect();
		assert_eq!(
			roles,
			[
				TaskRole::Encode(0),
				TaskRole::Encode(1),
				TaskRole::Encode(2),
				TaskRole::Join
			]
		);
	}

	#[test]
	fn join_waits_on_every_encode() {
		let graph = build(&three_chunks(), "in.%04d.exr", &template(), &ArgList::new(), None).unwrap();
		assert_eq!(graph.edges.len(), 3);
		assert_eq!(graph.dependencies_of(graph.join_id()), [0, 1, 2]);
		assert!(graph.dependencies_of(0).is_empty());
	}

	#[test]
	fn join_chunks_match_encode_outputs() {
		let audio = PathBuf::from("/renders/audio.wav");
		let graph = build(
			&three_chunks(),
			"in.%04d.exr",
			&template(),
			&ArgList::new(),
			Some(audio.as_path()),
		)
		.unwrap();
		let outputs: Vec<_> = graph
			.tasks
			.iter()
			.filter_map(|task| match task {
				TaskDescriptor::Encode(encode) => Some(encode.output.clone()),
				_ => None,
			})
			.collect();
		let TaskDescriptor::Join(join) = &graph.tasks[3] else {
			panic!("Last task should join");
		};
		assert_eq!(join.chunks, outputs);
		assert_eq!(join.chunks[0], PathBuf::from("/renders/shot_h265_chunk001.mp4"));
		assert_eq!(join.audio.as_ref(), Some(&audio));
		assert_eq!(join.chunk_count, 3);
	}

	#[test]
	fn single_chunk_is_rejected() {
		let frames: Vec<i64> = (0..10).collect();
		let one = NonZeroUsize::new(1).unwrap();
		let ten = NonZeroUsize::new(10).unwrap();
		let single = plan(&frames, ten, one).unwrap();
		assert_eq!(single.len(), 1);
		let res = build(&single, "in.%04d.exr", &template(), &ArgList::new(), None);
		assert!(matches!(res, Err(GraphError::NotWorthChunking(1))));
	}
}
