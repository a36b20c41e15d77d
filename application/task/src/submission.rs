//! Turns a finished render job into a transcode job.
//!
//! [`prepare`] decides whether the render should be transcoded at all, picks the codec and
//! frame rate, and plans the chunks. [`submit`] hands the result to a [`FarmScheduler`].

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::arguments::ArgList;
use crate::audio::find_audio_file;
use crate::codec::{self, Codec, CodecSettings};
use crate::concurrency::ConcurrencyPolicy;
use crate::graph::OutputTemplate;
use crate::manager::{FarmScheduler, JobId, JobSubmission, PLACEMENT_KEYS};
use crate::metadata::{JobMetadata, JobMode};
use crate::planner;
use crate::sequence::SequencePattern;
use crate::tokens::{self, FilenameTokens};
use crate::SubmissionError;

///Plugin name of the jobs this crate submits
pub const TASK_PLUGIN: &str = "TranscodeTask";

const FRAME_RATE_KEYS: [&str; 7] = [
	"FrameRate",
	"FPS",
	"FramesPerSecond",
	"OutputFrameRate",
	"RenderFrameRate",
	"ProjectFrameRate",
	"SceneFrameRate",
];
const COMMON_RATES: [f64; 8] = [23.976, 24.0, 25.0, 29.97, 30.0, 50.0, 59.94, 60.0];
const NAME_PATTERNS: [(&str, f64); 18] = [
	("23.976", 23.976),
	("23976", 23.976),
	("29.97", 29.97),
	("2997", 29.97),
	("59.94", 59.94),
	("5994", 59.94),
	("24fps", 24.0),
	("_24_", 24.0),
	("p24", 24.0),
	("25fps", 25.0),
	("_25_", 25.0),
	("p25", 25.0),
	("30fps", 30.0),
	("_30_", 30.0),
	("p30", 30.0),
	("60fps", 60.0),
	("_60_", 60.0),
	("p60", 60.0),
];

static NAME_FPS: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)fps").expect("valid fps regex"));
static NAME_UNDERSCORE_RATE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"_(\d+(?:\.\d+)?)_").expect("valid rate regex"));

///A render job that just finished on the farm
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
	pub name: String,
	#[serde(default)]
	pub plugin: String,
	pub frames: Vec<i64>,
	///Rendered images, a `####` or `%04d` sequence or a single file
	pub input: String,
	///Requested output, the extension is replaced by the codec's container
	pub output: PathBuf,
	#[serde(default)]
	pub info: BTreeMap<String, String>,
	#[serde(default)]
	pub plugin_info: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerMode {
	Disabled,
	#[default]
	TokenBased,
	Always,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionSettings {
	pub trigger_mode: TriggerMode,
	pub require_tokens: bool,
	pub audio_search: bool,
	pub chunking_enabled: bool,
	pub chunk_size: NonZeroUsize,
	pub min_chunks: NonZeroUsize,
	pub concurrent_tasks: u32,
	pub keep_intermediates: bool,
	pub default_codec: Codec,
	pub enable_gpu: bool,
	pub crf: u8,
	pub prores_profile: codec::ProResProfile,
	pub input_args: ArgList,
	pub output_args: ArgList,
	pub frame_rate_override: f64,
	pub priority: u32,
	pub ceilings: ConcurrencyPolicy,
}

impl Default for SubmissionSettings {
	fn default() -> Self {
		SubmissionSettings {
			trigger_mode: TriggerMode::default(),
			require_tokens: true,
			audio_search: false,
			chunking_enabled: true,
			chunk_size: NonZeroUsize::new(150).unwrap_or(NonZeroUsize::MIN),
			min_chunks: NonZeroUsize::new(2).unwrap_or(NonZeroUsize::MIN),
			concurrent_tasks: 3,
			keep_intermediates: false,
			default_codec: Codec::H265,
			enable_gpu: true,
			crf: 23,
			prores_profile: codec::ProResProfile::default(),
			input_args: ArgList::new(),
			output_args: ArgList::new(),
			frame_rate_override: 0.0,
			priority: 50,
			ceilings: ConcurrencyPolicy::default(),
		}
	}
}

///A transcode job ready to be submitted
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
	pub job_name: String,
	pub metadata: JobMetadata,
	pub concurrency: u32,
	pub priority: u32,
	pub placement: BTreeMap<String, String>,
}

impl Submission {
	pub fn is_chunked(&self) -> bool {
		matches!(self.metadata.mode, JobMode::Chunked { .. })
	}
}

fn is_own_job(job: &RenderJob) -> bool {
	job.plugin == TASK_PLUGIN || job.name.ends_with("_Encode") || job.name.ends_with("_Concat")
}

fn find_tokens(job: &RenderJob, mode: TriggerMode) -> Option<FilenameTokens> {
	let output = job.output.to_string_lossy();
	let sources = match mode {
		TriggerMode::Disabled => vec![],
		TriggerMode::TokenBased => vec![job.name.as_str(), job.input.as_str(), &*output],
		TriggerMode::Always => vec![job.input.as_str(), job.name.as_str()],
	};
	sources.into_iter().find_map(tokens::parse)
}

///Frame rate from the render job's info maps, then from patterns in its name
pub fn predict_frame_rate(job: &RenderJob) -> Option<f64> {
	let from_info = [&job.info, &job.plugin_info].into_iter().find_map(|map| {
		FRAME_RATE_KEYS
			.iter()
			.filter_map(|key| map.get(*key))
			.filter_map(|value| value.trim().parse::<f64>().ok())
			.find(|fps| (1.0..=120.0).contains(fps))
	});
	if from_info.is_some() {
		return from_info;
	}
	let name = job.name.to_lowercase();
	if let Some(fps) = NAME_FPS
		.captures(&name)
		.and_then(|captures| captures[1].parse().ok())
	{
		return Some(fps);
	}
	if let Some(fps) = NAME_UNDERSCORE_RATE
		.captures(&name)
		.and_then(|captures| captures[1].parse::<f64>().ok())
		.filter(|fps| COMMON_RATES.contains(fps))
	{
		return Some(fps);
	}
	NAME_PATTERNS
		.iter()
		.find(|(pattern, _)| name.contains(pattern))
		.map(|(_, fps)| *fps)
}

///Token fps, then the configured override, then whatever the render job tells
pub fn resolve_frame_rate(
	tokens: Option<&FilenameTokens>,
	settings: &SubmissionSettings,
	job: &RenderJob,
) -> Option<f64> {
	tokens
		.and_then(|tokens| tokens.fps)
		.or((settings.frame_rate_override > 0.0).then_some(settings.frame_rate_override))
		.or_else(|| predict_frame_rate(job))
}

///Output path with any codec suffix replaced by `codec`'s suffix and container
pub fn codec_output_path(output: &Path, codec: Codec) -> PathBuf {
	let stem = output
		.file_stem()
		.map(|stem| stem.to_string_lossy().into_owned())
		.unwrap_or_default();
	let stem = Codec::ALL.iter().fold(stem, |stem, other| {
		stem.strip_suffix(other.suffix())
			.map(str::to_string)
			.unwrap_or(stem)
	});
	output.with_file_name(format!("{stem}{}.{}", codec.suffix(), codec.container()))
}

///Decide what to do with a finished render job.
///
///`Ok(None)` means the job is skipped: it is one of ours, triggering is disabled, or no token
///asked for it.
pub fn prepare(
	job: &RenderJob,
	settings: &SubmissionSettings,
) -> Result<Option<Submission>, SubmissionError> {
	if is_own_job(job) {
		info!(name = %job.name, plugin = %job.plugin, "skipping transcode job");
		return Ok(None);
	}
	let tokens = match settings.trigger_mode {
		TriggerMode::Disabled => {
			info!(name = %job.name, "triggering is disabled");
			return Ok(None);
		}
		TriggerMode::TokenBased => match find_tokens(job, TriggerMode::TokenBased) {
			Some(tokens) => Some(tokens),
			None => {
				info!(name = %job.name, "no encoding tokens found");
				return Ok(None);
			}
		},
		TriggerMode::Always => {
			let tokens = find_tokens(job, TriggerMode::Always);
			if tokens.is_none() && settings.require_tokens {
				info!(name = %job.name, "no tokens and tokens are required, skipping");
				return Ok(None);
			}
			tokens
		}
	};
	if job.frames.is_empty() {
		return Err(SubmissionError::NoFrames);
	}

	let codec = tokens
		.as_ref()
		.and_then(|tokens| tokens.codec)
		.unwrap_or(settings.default_codec);
	let output = codec_output_path(&job.output, codec);
	let template = OutputTemplate::from_output(&output);
	info!(codec = codec.name(), output = %output.display(), "using codec");

	let codec_settings = CodecSettings {
		codec,
		enable_gpu: settings.enable_gpu,
		crf: settings.crf,
		prores_profile: tokens
			.as_ref()
			.and_then(|tokens| tokens.prores_profile)
			.unwrap_or(settings.prores_profile),
		hap_variant: tokens
			.as_ref()
			.and_then(|tokens| tokens.hap_variant)
			.unwrap_or_default(),
	};
	let output_args = codec::codec_arguments(&codec_settings).extend(&settings.output_args);
	let fps = resolve_frame_rate(tokens.as_ref(), settings, job).ok_or_else(|| {
		warn!(name = %job.name, "frame rate could not be determined");
		SubmissionError::FrameRate
	})?;
	let input_args = settings.input_args.clone().prepend("-r", fps);

	let wants_audio = settings.audio_search || tokens.as_ref().is_some_and(|tokens| tokens.audio);
	let audio = wants_audio
		.then(|| find_audio_file(&template.directory, &template.basename))
		.flatten();
	match &audio {
		Some(audio) => info!(audio = %audio.display(), "found audio file"),
		None if wants_audio => info!("no audio file found"),
		None => {}
	}

	let mode = codec_settings.hardware_mode();
	let concurrency = settings
		.ceilings
		.cap(settings.concurrent_tasks, codec, mode);
	let input = SequencePattern::parse(&job.input)
		.map(|pattern| pattern.printf())
		.unwrap_or_else(|| job.input.clone());

	let plan = settings
		.chunking_enabled
		.then(|| planner::plan(&job.frames, settings.chunk_size, settings.min_chunks))
		.flatten()
		.filter(|plan| plan.len() > 1);
	let first_frame = job.frames.iter().copied().min().unwrap_or_default();
	let job_mode = match plan {
		Some(plan) => {
			info!(frames = plan.frame_count(), chunks = plan.len(), "chunked encode");
			JobMode::Chunked {
				chunks: plan.into_ranges(),
			}
		}
		None => {
			info!(frames = job.frames.len(), "direct encode");
			JobMode::Direct { first_frame }
		}
	};

	let placement = PLACEMENT_KEYS
		.iter()
		.filter_map(|key| {
			job.info
				.get(*key)
				.filter(|value| !value.is_empty())
				.map(|value| (key.to_string(), value.clone()))
		})
		.collect();

	Ok(Some(Submission {
		job_name: job.name.clone(),
		metadata: JobMetadata {
			name: job.name.clone(),
			codec,
			hardware_mode: mode,
			input,
			input_args,
			output_args,
			audio_args: codec::audio_arguments(&template.container),
			output: template,
			audio,
			keep_intermediates: settings.keep_intermediates,
			mode: job_mode,
		},
		concurrency,
		priority: settings.priority,
		placement,
	}))
}

///Submit the prepared job once, with its dependency edges and capped concurrency
pub async fn submit<S: FarmScheduler>(
	scheduler: &S,
	submission: &Submission,
) -> Result<JobId, SubmissionError> {
	let metadata = &submission.metadata;
	let job = JobSubmission {
		name: format!("{}_Encode", submission.job_name),
		task_count: metadata.task_count(),
		edges: metadata.dependencies()?,
		metadata: Arc::new(metadata.clone()),
		concurrency: submission.concurrency,
		priority: submission.priority,
		placement: submission.placement.clone(),
	};
	let job_id = scheduler.submit(job).await?;
	info!(job_id = %job_id, tasks = metadata.task_count(), "transcode job submitted");
	Ok(job_id)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::codec::HardwareMode;
	use crate::manager::MockFarmScheduler;

	fn render(name: &str, frames: std::ops::RangeInclusive<i64>) -> RenderJob {
		RenderJob {
			name: name.to_string(),
			plugin: "Nuke".to_string(),
			frames: frames.collect(),
			input: "/shots/beauty.####.exr".to_string(),
			output: PathBuf::from("/renders/beauty.mov"),
			info: BTreeMap::from([
				("Pool".to_string(), "gpu".to_string()),
				("Whitelist".to_string(), String::new()),
			]),
			plugin_info: BTreeMap::new(),
		}
	}

	#[test]
	fn own_jobs_are_skipped() {
		let settings = SubmissionSettings::default();
		let mut job = render("beauty_[h264]_Encode", 1..=400);
		assert!(prepare(&job, &settings).unwrap().is_none());
		job.name = "beauty_[h264]".to_string();
		job.plugin = TASK_PLUGIN.to_string();
		assert!(prepare(&job, &settings).unwrap().is_none());
	}

	#[test]
	fn disabled_trigger_skips() {
		let settings = SubmissionSettings {
			trigger_mode: TriggerMode::Disabled,
			..Default::default()
		};
		let job = render("beauty_[h264]_[24fps]", 1..=400);
		assert!(prepare(&job, &settings).unwrap().is_none());
	}

	#[test]
	fn token_based_without_tokens_skips() {
		let job = render("beauty_v003", 1..=400);
		assert!(prepare(&job, &SubmissionSettings::default()).unwrap().is_none());
	}

	#[test]
	fn always_mode_without_required_tokens_uses_default_codec() {
		let settings = SubmissionSettings {
			trigger_mode: TriggerMode::Always,
			require_tokens: false,
			frame_rate_override: 25.0,
			..Default::default()
		};
		let job = render("beauty_v003", 1..=400);
		let submission = prepare(&job, &settings).unwrap().unwrap();
		assert_eq!(submission.metadata.codec, Codec::H265);
		assert_eq!(submission.metadata.input_args.value_of("-r"), Some("25"));
	}

	#[test]
	fn chunked_submission() {
		let job = render("beauty_[h264]_[24fps]", 1..=400);
		let submission = prepare(&job, &SubmissionSettings::default())
			.unwrap()
			.unwrap();
		let metadata = &submission.metadata;
		assert!(submission.is_chunked());
		assert_eq!(metadata.chunk_count(), Some(3));
		assert_eq!(metadata.codec, Codec::H264);
		assert_eq!(metadata.hardware_mode, HardwareMode::Gpu);
		assert_eq!(metadata.input, "/shots/beauty.%04d.exr");
		assert_eq!(metadata.output.final_output(), PathBuf::from("/renders/beauty_h264.mp4"));
		assert_eq!(metadata.input_args.to_argv(), ["-r", "24"]);
		assert_eq!(metadata.output_args.value_of("-c:v"), Some("h264_nvenc"));
		assert_eq!(submission.concurrency, 2);
		assert_eq!(
			submission.placement,
			BTreeMap::from([("Pool".to_string(), "gpu".to_string())])
		);
	}

	#[test]
	fn short_render_is_encoded_directly() {
		let job = render("beauty_[prores]_[24fps]", 101..=110);
		let submission = prepare(&job, &SubmissionSettings::default())
			.unwrap()
			.unwrap();
		assert!(!submission.is_chunked());
		assert_eq!(submission.metadata.mode, JobMode::Direct { first_frame: 101 });
		assert_eq!(submission.concurrency, 1);
		assert_eq!(submission.metadata.audio_args.value_of("-c:a"), Some("pcm_s16le"));
	}

	#[test]
	fn chunking_disabled_is_direct() {
		let settings = SubmissionSettings {
			chunking_enabled: false,
			..Default::default()
		};
		let job = render("beauty_[h265]_[24fps]", 1..=400);
		let submission = prepare(&job, &settings).unwrap().unwrap();
		assert!(!submission.is_chunked());
	}

	#[test]
	fn missing_frame_rate_is_an_error() {
		let job = render("beauty_[h265]", 1..=400);
		let res = prepare(&job, &SubmissionSettings::default());
		assert!(matches!(res, Err(SubmissionError::FrameRate)));
	}

	#[test]
	fn empty_render_is_an_error() {
		let job = render("beauty_[h265]_[24fps]", 1..=0);
		let res = prepare(&job, &SubmissionSettings::default());
		assert!(matches!(res, Err(SubmissionError::NoFrames)));
	}

	#[test]
	fn frame_rate_priority() {
		let mut job = render("beauty_30fps", 1..=2);
		job.info.insert("FrameRate".to_string(), "240".to_string());
		job.plugin_info.insert("FPS".to_string(), "25".to_string());
		let tokens = FilenameTokens {
			fps: Some(48.0),
			..Default::default()
		};
		let settings = SubmissionSettings {
			frame_rate_override: 12.0,
			..Default::default()
		};
		assert_eq!(resolve_frame_rate(Some(&tokens), &settings, &job), Some(48.0));
		assert_eq!(resolve_frame_rate(None, &settings, &job), Some(12.0));
		let settings = SubmissionSettings::default();
		assert_eq!(resolve_frame_rate(None, &settings, &job), Some(25.0));
		job.plugin_info.clear();
		assert_eq!(resolve_frame_rate(None, &settings, &job), Some(30.0));
	}

	#[test]
	fn frame_rate_from_name_patterns() {
		let rate = |name: &str| predict_frame_rate(&render(name, 1..=1));
		assert_eq!(rate("comp_23.976_v2"), Some(23.976));
		assert_eq!(rate("comp_25_v2"), Some(25.0));
		assert_eq!(rate("comp_v2_1080p30"), Some(30.0));
		assert_eq!(rate("comp_17_v2"), None);
	}

	#[test]
	fn output_suffix_is_replaced() {
		let output = codec_output_path(Path::new("/r/shot_h264.mov"), Codec::Prores);
		assert_eq!(output, PathBuf::from("/r/shot_prores.mov"));
		let output = codec_output_path(Path::new("/r/shot.exr"), Codec::H265);
		assert_eq!(output, PathBuf::from("/r/shot_h265.mp4"));
	}

	#[tokio::test]
	async fn submit_sends_edges_and_capped_concurrency() {
		let job = render("beauty_[h265]_[24fps]", 1..=400);
		let submission = prepare(&job, &SubmissionSettings::default())
			.unwrap()
			.unwrap();
		let mut scheduler = MockFarmScheduler::new();
		scheduler
			.expect_submit()
			.withf(|job| {
				job.name == "beauty_[h265]_[24fps]_Encode"
					&& job.task_count == 4
					&& job.concurrency == 2
					&& job.frame_dependencies() == "3:0,3:1,3:2"
			})
			.times(1)
			.returning(|_| Ok(JobId::new("42")));
		let id = submit(&scheduler, &submission).await.unwrap();
		assert_eq!(id, JobId::new("42"));
	}
}
