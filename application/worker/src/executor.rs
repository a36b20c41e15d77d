//! # Task executor
//!
//! A worker receives a job id and a task position, everything else comes from the job metadata.
//! A task goes through
//! `Start -> RoleResolved -> (Staged) -> Invoked -> (StagedBack) -> Done | Failed`,
//! with the staging steps only when a scratch area is configured.
//!
//! Only the join of a job cleans up the intermediate files, and only after it succeeded and its
//! output reached shared storage. When the copy back fails the scratch area is kept, it holds the
//! only joined output.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{error, info, info_span, warn, Instrument};
use transcode_task::arguments::{self, ArgList};
use transcode_task::manager::{JobId, TaskReport};
use transcode_task::metadata::JobMetadata;
use transcode_task::naming::manifest_contents;
use transcode_task::sequence::SequencePattern;
use transcode_task::{DirectTask, EncodeTask, FrameRange, JoinTask, TaskDescriptor, TaskRole};
use uuid::Uuid;

use crate::cleanup::{CleanupEngine, CleanupReport, CleanupSettings, FileRemover, Sleeper};
use crate::ffmpeg_runner::Transcoder;
use crate::staging::{self, ScratchArea};
use crate::WorkerError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorSettings {
	///Scratch root, tasks run on shared storage directly when `None`
	pub scratch: Option<PathBuf>,
	pub cleanup_local_files: bool,
	pub cleanup: CleanupSettings,
}

impl Default for ExecutorSettings {
	fn default() -> Self {
		ExecutorSettings {
			scratch: None,
			cleanup_local_files: true,
			cleanup: CleanupSettings::default(),
		}
	}
}

#[derive(Clone, Debug)]
pub struct TaskContext {
	pub job_id: JobId,
	pub position: u32,
	///Unique per allocation, keeps scratch areas of reruns and same named jobs apart
	pub instance: Uuid,
	pub metadata: Arc<JobMetadata>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome {
	Succeeded {
		role: TaskRole,
		///Problems that did not fail the task, like a failed copy back
		warnings: Vec<String>,
		cleanup: Option<CleanupReport>,
	},
	Failed {
		///`None` when the position could not be resolved
		role: Option<TaskRole>,
		reason: String,
		diagnostics: Vec<String>,
	},
}

impl TaskOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, TaskOutcome::Succeeded { .. })
	}

	pub fn report(&self) -> TaskReport {
		match self {
			TaskOutcome::Succeeded { .. } => TaskReport::success(),
			TaskOutcome::Failed {
				reason,
				diagnostics,
				..
			} => {
				let mut lines = Vec::with_capacity(diagnostics.len() + 1);
				lines.push(reason.clone());
				lines.extend(diagnostics.iter().cloned());
				TaskReport::failure(lines)
			}
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
	Start,
	RoleResolved,
	Staged,
	Invoked,
	StagedBack,
	Done,
	Failed,
}

impl fmt::Display for State {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			State::Start => "start",
			State::RoleResolved => "role resolved",
			State::Staged => "staged",
			State::Invoked => "invoked",
			State::StagedBack => "staged back",
			State::Done => "done",
			State::Failed => "failed",
		};
		f.write_str(name)
	}
}

fn transition(state: State, role: Option<TaskRole>) {
	match role {
		Some(role) => info!(state = %state, role = %role, "task state"),
		None => info!(state = %state, "task state"),
	}
}

///Transcoder call for a task, `output` is where the transcoder writes and `destination` where
///the file must end up
struct Invocation {
	args: ArgList,
	output: PathBuf,
	destination: PathBuf,
}

pub struct TaskExecutor<T, R, S> {
	transcoder: T,
	cleanup: CleanupEngine<R, S>,
	settings: ExecutorSettings,
}

impl<T, R, S> TaskExecutor<T, R, S>
where
	T: Transcoder,
	R: FileRemover,
	S: Sleeper,
{
	pub fn new(transcoder: T, remover: R, sleeper: S, settings: ExecutorSettings) -> Self {
		TaskExecutor {
			transcoder,
			cleanup: CleanupEngine::new(remover, sleeper, settings.cleanup),
			settings,
		}
	}

	pub async fn execute(&self, context: &TaskContext) -> TaskOutcome {
		let span = info_span!(
			"task",
			job_id = %context.job_id,
			task = context.position,
			instance = %context.instance
		);
		self.run(context).instrument(span).await
	}

	async fn run(&self, context: &TaskContext) -> TaskOutcome {
		transition(State::Start, None);
		let metadata = context.metadata.as_ref();
		let role = match metadata.role(context.position) {
			Ok(role) => role,
			Err(err) => return fail(None, err.into()),
		};
		let descriptor = match metadata.descriptor(context.position) {
			Ok(descriptor) => descriptor,
			Err(err) => return fail(Some(role), err.into()),
		};
		transition(State::RoleResolved, Some(role));

		let scratch = match &self.settings.scratch {
			Some(root) => {
				let area = ScratchArea::create(
					root,
					context.job_id.as_str(),
					context.position,
					context.instance,
				)
				.await;
				match area {
					Ok(area) => Some(area),
					Err(err) => return fail(Some(role), err),
				}
			}
			None => None,
		};
		let mut warnings = Vec::new();
		let result = self
			.transcode(metadata, &descriptor, scratch.as_ref(), &mut warnings)
			.await;
		let stranded = matches!(result, Ok(Some(_)));
		if let Some(area) = scratch.filter(|_| self.settings.cleanup_local_files && !stranded) {
			let root = area.root().to_path_buf();
			if let Err(err) = area.remove().await {
				warn!(path = %root.display(), %err, "scratch area could not be removed");
			}
		}
		let stranded = match result {
			Ok(stranded) => stranded,
			Err(err) => return fail(Some(role), err),
		};

		let cleanup = match &descriptor {
			TaskDescriptor::Join(_) if stranded.is_some() => {
				if !metadata.keep_intermediates {
					warn!("joined output missing from shared storage, intermediates kept");
					warnings.push(
						"intermediate files kept, the join output never reached its destination"
							.to_string(),
					);
				}
				None
			}
			TaskDescriptor::Join(join) if !metadata.keep_intermediates => {
				let report = self.cleanup.cleanup(&join.chunks, &join.manifest).await;
				if !report.is_complete() {
					warnings.push(format!(
						"{} intermediate files could not be removed",
						report.failed.len()
					));
				}
				Some(report)
			}
			_ => None,
		};
		transition(State::Done, Some(role));
		TaskOutcome::Succeeded {
			role,
			warnings,
			cleanup,
		}
	}

	///Returns the scratch output when it could not be copied back to shared storage
	async fn transcode(
		&self,
		metadata: &JobMetadata,
		descriptor: &TaskDescriptor,
		scratch: Option<&ScratchArea>,
		warnings: &mut Vec<String>,
	) -> Result<Option<PathBuf>, WorkerError> {
		let role = descriptor.role();
		let invocation = match descriptor {
			TaskDescriptor::Encode(encode) => encode_invocation(metadata, encode, scratch).await?,
			TaskDescriptor::Join(join) => join_invocation(metadata, join, scratch).await?,
			TaskDescriptor::Direct(direct) => direct_invocation(metadata, direct, scratch).await?,
		};
		if scratch.is_some() {
			transition(State::Staged, Some(role));
		} else if let Some(parent) = invocation.output.parent() {
			fs::create_dir_all(parent).await?;
		}

		self.transcoder.transcode(&invocation.args).await?;
		transition(State::Invoked, Some(role));

		if invocation.output == invocation.destination {
			return Ok(None);
		}
		if let Err(err) = staging::copy_back(&invocation.output, &invocation.destination).await {
			warn!(
				path = %invocation.destination.display(),
				kept = %invocation.output.display(),
				%err,
				"copy back failed"
			);
			warnings.push(format!(
				"copying {} back failed: {err}, output kept at {}",
				invocation.destination.display(),
				invocation.output.display()
			));
			return Ok(Some(invocation.output));
		}
		transition(State::StagedBack, Some(role));
		Ok(None)
	}
}

fn fail(role: Option<TaskRole>, err: WorkerError) -> TaskOutcome {
	transition(State::Failed, role);
	error!(%err, "task failed");
	TaskOutcome::Failed {
		role,
		reason: err.to_string(),
		diagnostics: err.diagnostics().to_vec(),
	}
}

///Stage the input and return what the transcoder should read
async fn stage_input(
	input: &str,
	range: Option<&FrameRange>,
	scratch: &ScratchArea,
) -> Result<String, WorkerError> {
	match SequencePattern::parse(input) {
		Some(pattern) => {
			staging::stage_frames(&pattern, range, scratch.input_dir()).await?;
			Ok(pattern.relocate(scratch.input_dir()).printf())
		}
		None => {
			let staged = staging::stage_file(Path::new(input), scratch.input_dir()).await?;
			Ok(staged.to_string_lossy().into_owned())
		}
	}
}

async fn stage_audio(
	audio: Option<&Path>,
	scratch: Option<&ScratchArea>,
) -> Result<Option<PathBuf>, WorkerError> {
	match (audio, scratch) {
		(Some(audio), Some(scratch)) => Ok(Some(staging::stage_file(audio, scratch.input_dir()).await?)),
		(audio, _) => Ok(audio.map(Path::to_path_buf)),
	}
}

fn output_path(destination: &Path, scratch: Option<&ScratchArea>) -> PathBuf {
	match scratch {
		Some(scratch) => scratch.output_for(destination),
		None => destination.to_path_buf(),
	}
}

async fn encode_invocation(
	metadata: &JobMetadata,
	encode: &EncodeTask,
	scratch: Option<&ScratchArea>,
) -> Result<Invocation, WorkerError> {
	let input = match scratch {
		Some(scratch) => stage_input(&encode.input, Some(&encode.frame_range), scratch).await?,
		None => encode.input.clone(),
	};
	let output = output_path(&encode.output, scratch);
	info!(frames = %encode.frame_range, count = encode.frame_range.count(), "encoding chunk");
	Ok(Invocation {
		args: arguments::encode_arguments(
			&metadata.input_args,
			&encode.frame_range,
			&input,
			&metadata.output_args,
			&output,
		),
		output,
		destination: encode.output.clone(),
	})
}

async fn join_invocation(
	metadata: &JobMetadata,
	join: &JoinTask,
	scratch: Option<&ScratchArea>,
) -> Result<Invocation, WorkerError> {
	let (chunks, manifest) = match scratch {
		Some(scratch) => {
			let mut chunks = Vec::with_capacity(join.chunks.len());
			for chunk in &join.chunks {
				chunks.push(staging::stage_file(chunk, scratch.input_dir()).await?);
			}
			(chunks, scratch.input_for(&join.manifest))
		}
		None => (join.chunks.clone(), join.manifest.clone()),
	};
	let audio = stage_audio(join.audio.as_deref(), scratch).await?;
	fs::write(&manifest, manifest_contents(&chunks))
		.await
		.map_err(|err| WorkerError::staging(&manifest, err))?;
	info!(path = %manifest.display(), chunks = chunks.len(), "manifest written");
	let output = output_path(&join.output, scratch);
	Ok(Invocation {
		args: arguments::join_arguments(
			&manifest,
			audio.as_deref().map(|audio| (audio, &metadata.audio_args)),
			&output,
		),
		output,
		destination: join.output.clone(),
	})
}

async fn direct_invocation(
	metadata: &JobMetadata,
	direct: &DirectTask,
	scratch: Option<&ScratchArea>,
) -> Result<Invocation, WorkerError> {
	let input = match scratch {
		Some(scratch) => stage_input(&direct.input, None, scratch).await?,
		None => direct.input.clone(),
	};
	let audio = stage_audio(direct.audio.as_deref(), scratch).await?;
	let output = output_path(&direct.output, scratch);
	Ok(Invocation {
		args: arguments::direct_arguments(
			&metadata.input_args,
			direct.first_frame,
			&input,
			audio.as_deref().map(|audio| (audio, &metadata.audio_args)),
			&metadata.output_args,
			&output,
		),
		output,
		destination: direct.output.clone(),
	})
}
