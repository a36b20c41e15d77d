//! Ways of getting a transcode job onto a farm.
//!
//! [`CommandLineFarm`] hands the job to the farm's submission command. [`simulate`] runs the
//! whole job in this process against a [`LocalFarm`], which is handy for trying settings out.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};
use transcode_task::graph::OutputTemplate;
use transcode_task::manager::db::JobState;
use transcode_task::manager::{FarmScheduler, JobId, JobSubmission, LocalFarm, TaskReport};
use transcode_task::submission::{self, Submission, TASK_PLUGIN};
use transcode_task::SchedulerError;

use crate::cleanup::{FileRemover, Sleeper};
use crate::executor::{TaskContext, TaskExecutor};
use crate::ffmpeg_runner::Transcoder;
use crate::WorkerError;

///Where the job metadata is written for the workers to read
pub fn metadata_path(output: &OutputTemplate) -> PathBuf {
	output.directory.join(format!("{}_job.json", output.basename))
}

///Submits through `<command> [arguments] <job info file> <plugin info file>`.
///
///Workers report back through their exit status, so [`FarmScheduler::report`] has nothing to do.
#[derive(Clone, Debug)]
pub struct CommandLineFarm {
	command: PathBuf,
	arguments: Vec<String>,
}

impl CommandLineFarm {
	pub fn new(command: impl Into<PathBuf>) -> CommandLineFarm {
		CommandLineFarm {
			command: command.into(),
			arguments: Vec::new(),
		}
	}

	///Arguments placed before the two info files
	pub fn with_arguments(mut self, arguments: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.arguments = arguments.into_iter().map(Into::into).collect();
		self
	}

	async fn run(&self, job_info: &Path, plugin_info: &Path) -> Result<JobId, SchedulerError> {
		let output = Command::new(&self.command)
			.args(&self.arguments)
			.arg(job_info)
			.arg(plugin_info)
			.output()
			.await?;
		let stdout = String::from_utf8_lossy(&output.stdout);
		if !output.status.success() {
			let stderr = String::from_utf8_lossy(&output.stderr);
			return Err(SchedulerError::Submit(format!(
				"{} exited with {}: {}{}",
				self.command.display(),
				output.status,
				stdout.trim(),
				stderr.trim()
			)));
		}
		parse_job_id(&stdout).ok_or_else(|| {
			SchedulerError::Submit(format!("no JobID in submission output: {}", stdout.trim()))
		})
	}
}

fn parse_job_id(output: &str) -> Option<JobId> {
	output
		.lines()
		.find_map(|line| line.trim().strip_prefix("JobID="))
		.map(str::trim)
		.filter(|id| !id.is_empty())
		.map(JobId::new)
}

fn job_info(job: &JobSubmission) -> String {
	let mut info = String::new();
	let output = &job.metadata.output;
	let _ = writeln!(info, "Plugin={TASK_PLUGIN}");
	let _ = writeln!(info, "Name={}", job.name);
	let _ = writeln!(info, "Frames={}", job.frames());
	let _ = writeln!(info, "ChunkSize=1");
	let _ = writeln!(info, "ConcurrentTasks={}", job.concurrency);
	let _ = writeln!(info, "Priority={}", job.priority);
	let _ = writeln!(info, "OnJobComplete=Delete");
	let _ = writeln!(info, "OutputDirectory0={}", output.directory.display());
	let _ = writeln!(
		info,
		"OutputFilename0={}",
		output.final_output().file_name().unwrap_or_default().to_string_lossy()
	);
	if !job.edges.is_empty() {
		let _ = writeln!(info, "IsFrameDependent=true");
		let _ = writeln!(info, "FrameDependencies={}", job.frame_dependencies());
	}
	for (key, value) in job.placement.iter().filter(|(_, value)| !value.is_empty()) {
		let _ = writeln!(info, "{key}={value}");
	}
	info
}

impl FarmScheduler for CommandLineFarm {
	async fn submit(&self, job: JobSubmission) -> Result<JobId, SchedulerError> {
		let output = &job.metadata.output;
		let metadata = metadata_path(output);
		let json = job
			.metadata
			.to_json()
			.map_err(|err| SchedulerError::Submit(err.to_string()))?;
		fs::write(&metadata, json).await?;
		let job_info_path = output.directory.join(format!("{}_job_info.job", output.basename));
		let plugin_info_path = output.directory.join(format!("{}_plugin_info.job", output.basename));
		fs::write(&job_info_path, job_info(&job)).await?;
		fs::write(
			&plugin_info_path,
			format!("MetadataFile={}\n", metadata.display()),
		)
		.await?;
		debug!(job_info = %job_info_path.display(), plugin_info = %plugin_info_path.display(), "submission files written");

		let result = self.run(&job_info_path, &plugin_info_path).await;
		for path in [&job_info_path, &plugin_info_path] {
			if let Err(err) = fs::remove_file(path).await {
				warn!(path = %path.display(), %err, "submission file not removed");
			}
		}
		let job_id = result?;
		info!(job_id = %job_id, name = %job.name, "job submitted to farm");
		Ok(job_id)
	}

	async fn report(&self, job: JobId, task: u32, report: TaskReport) -> Result<(), SchedulerError> {
		debug!(job_id = %job, task, status = ?report.status, "reported through exit status");
		Ok(())
	}
}

///Submit to `farm` and run every task in this process, at most the job's concurrency at once.
///
///Stops when nothing runs and nothing can be allocated, a failed encode leaves the join unrun.
pub async fn simulate<T, R, S>(
	farm: &LocalFarm,
	executor: &TaskExecutor<T, R, S>,
	job: &Submission,
) -> Result<JobState, WorkerError>
where
	T: Transcoder,
	R: FileRemover,
	S: Sleeper,
{
	let job_id = submission::submit(farm, job).await?;
	let mut running = FuturesUnordered::new();
	loop {
		while let Some(allocation) = farm.allocate_task() {
			let context = TaskContext {
				job_id: allocation.job,
				position: allocation.task,
				instance: allocation.instance,
				metadata: allocation.metadata,
			};
			running.push(async move {
				let outcome = executor.execute(&context).await;
				(context, outcome)
			});
		}
		let Some((context, outcome)) = running.next().await else {
			break;
		};
		farm.report(context.job_id, context.position, outcome.report())
			.await?;
	}
	let state = farm.job_state(&job_id)?;
	info!(job_id = %job_id, state = ?state, "simulation finished");
	Ok(state)
}
