use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use transcode_task::manager::db::JobState;
use transcode_task::manager::{JobId, LocalFarm};
use transcode_task::metadata::JobMetadata;
use transcode_task::submission::{self, RenderJob, Submission};
use transcode_worker::cleanup::{TokioRemover, TokioSleeper};
use transcode_worker::config::Settings;
use transcode_worker::executor::{TaskContext, TaskExecutor, TaskOutcome};
use transcode_worker::farm::{self, CommandLineFarm};
use transcode_worker::ffmpeg_runner::FfmpegTranscoder;
use transcode_worker::{logging, WorkerError};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
	///Settings file, TOML or JSON
	#[arg(short, long, global = true, env = "TRANSCODE_SETTINGS")]
	settings: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	///Run one task of a submitted job
	Run {
		///Job metadata written at submission
		#[arg(short, long, env = "TRANSCODE_METADATA")]
		metadata: PathBuf,
		///Task position, the last one joins
		#[arg(short, long, env = "TRANSCODE_TASK")]
		task: u32,
		///Farm job id, names the scratch directory of the task
		#[arg(long, env = "TRANSCODE_JOB_ID", default_value = "local")]
		job_id: String,
	},
	///Plan a finished render and write its job metadata
	Plan {
		///Render job description, JSON
		#[arg(short, long)]
		render: PathBuf,
		///Metadata destination, stdout when omitted
		#[arg(short, long)]
		out: Option<PathBuf>,
	},
	///Plan a finished render and submit it to the farm
	Submit {
		#[arg(short, long)]
		render: PathBuf,
		///Farm submission command, called with the job and plugin info files
		#[arg(long, env = "TRANSCODE_FARM_COMMAND")]
		farm_command: PathBuf,
		///Argument passed to the farm command before the info files, repeatable
		#[arg(long = "farm-arg", allow_hyphen_values = true)]
		farm_args: Vec<String>,
	},
	///Plan a finished render and run the whole job here
	Simulate {
		#[arg(short, long)]
		render: PathBuf,
	},
}

type Executor = TaskExecutor<FfmpegTranscoder, TokioRemover, TokioSleeper>;

fn executor(settings: &Settings) -> Result<Executor, WorkerError> {
	let transcoder = FfmpegTranscoder::locate(settings.transcoder.executable.as_deref())?;
	Ok(TaskExecutor::new(
		transcoder,
		TokioRemover,
		TokioSleeper,
		settings.executor_settings(),
	))
}

async fn prepare(settings: &Settings, render: &Path) -> Result<Option<Submission>, WorkerError> {
	let render: RenderJob = serde_json::from_str(&tokio::fs::read_to_string(render).await?)?;
	let prepared = submission::prepare(&render, &settings.submission_settings())?;
	if prepared.is_none() {
		info!(name = %render.name, "render job skipped");
	}
	Ok(prepared)
}

async fn run_task(settings: &Settings, metadata: &Path, task: u32, job_id: JobId) -> Result<bool, WorkerError> {
	let metadata = JobMetadata::from_json(&tokio::fs::read_to_string(metadata).await?)?;
	let context = TaskContext {
		job_id,
		position: task,
		instance: Uuid::new_v4(),
		metadata: Arc::new(metadata),
	};
	let outcome = executor(settings)?.execute(&context).await;
	match &outcome {
		TaskOutcome::Succeeded { role, warnings, .. } => {
			for warning in warnings {
				warn!(role = %role, "{warning}");
			}
		}
		TaskOutcome::Failed { reason, diagnostics, .. } => {
			for line in diagnostics {
				error!(diagnostic = %line);
			}
			error!(reason = %reason, "task failed");
		}
	}
	Ok(outcome.is_success())
}

///`Ok(false)` when the work ran but did not succeed
async fn run(args: Args) -> Result<bool, WorkerError> {
	let settings = Settings::load(args.settings.as_deref())?;
	match args.command {
		Command::Run {
			metadata,
			task,
			job_id,
		} => run_task(&settings, &metadata, task, JobId::new(job_id)).await,
		Command::Plan { render, out } => {
			let Some(job) = prepare(&settings, &render).await? else {
				return Ok(true);
			};
			let json = job.metadata.to_json()?;
			match out {
				Some(path) => tokio::fs::write(path, json).await?,
				None => println!("{json}"),
			}
			Ok(true)
		}
		Command::Submit {
			render,
			farm_command,
			farm_args,
		} => {
			let Some(job) = prepare(&settings, &render).await? else {
				return Ok(true);
			};
			let farm = CommandLineFarm::new(farm_command).with_arguments(farm_args);
			let job_id = submission::submit(&farm, &job).await?;
			println!("JobID={job_id}");
			Ok(true)
		}
		Command::Simulate { render } => {
			let Some(job) = prepare(&settings, &render).await? else {
				return Ok(true);
			};
			let local = LocalFarm::default();
			let state = farm::simulate(&local, &executor(&settings)?, &job).await?;
			Ok(state == JobState::Completed)
		}
	}
}

#[tokio::main]
async fn main() {
	logging::init();
	let args = Args::parse();
	match run(args).await {
		Ok(true) => {}
		Ok(false) => std::process::exit(1),
		Err(err) => {
			error!(%err, "worker failed");
			std::process::exit(1);
		}
	}
}
