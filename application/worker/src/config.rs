//! Worker settings file.
//!
//! TOML or JSON, picked by extension. Every field has a default so an empty file is valid.
//!
//! ```toml
//! [trigger]
//! mode = "token-based"
//!
//! [chunking]
//! chunk_size = 150
//! concurrent_tasks = 3
//!
//! [[ceilings]]
//! codec = "h265"
//! mode = "gpu"
//! limit = 2
//!
//! [staging]
//! enabled = true
//! path = "/var/tmp/transcode"
//! ```

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use transcode_task::arguments::ArgList;
use transcode_task::codec::{Codec, ProResProfile};
use transcode_task::concurrency::{CeilingEntry, ConcurrencyPolicy};
use transcode_task::submission::{SubmissionSettings, TriggerMode};

use crate::cleanup::CleanupSettings;
use crate::executor::ExecutorSettings;
use crate::WorkerError;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
	pub trigger: TriggerSection,
	pub chunking: ChunkingSection,
	pub encoding: EncodingSection,
	pub ceilings: Vec<CeilingEntry>,
	pub staging: StagingSection,
	pub cleanup: CleanupSection,
	pub transcoder: TranscoderSection,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TriggerSection {
	pub mode: TriggerMode,
	pub require_tokens: bool,
	pub audio_search: bool,
}

impl Default for TriggerSection {
	fn default() -> Self {
		TriggerSection {
			mode: TriggerMode::default(),
			require_tokens: true,
			audio_search: false,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChunkingSection {
	pub enabled: bool,
	pub chunk_size: usize,
	pub min_chunks: usize,
	pub concurrent_tasks: u32,
	pub keep_intermediates: bool,
}

impl Default for ChunkingSection {
	fn default() -> Self {
		ChunkingSection {
			enabled: true,
			chunk_size: 150,
			min_chunks: 2,
			concurrent_tasks: 3,
			keep_intermediates: false,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EncodingSection {
	pub default_codec: Codec,
	pub enable_gpu: bool,
	pub crf: u8,
	pub prores_profile: ProResProfile,
	///Extra tokens placed before the input
	pub input_args: Vec<String>,
	///Extra tokens placed after the codec arguments
	pub output_args: Vec<String>,
	///Used when positive
	pub frame_rate_override: f64,
	pub priority: u32,
}

impl Default for EncodingSection {
	fn default() -> Self {
		EncodingSection {
			default_codec: Codec::H265,
			enable_gpu: true,
			crf: 23,
			prores_profile: ProResProfile::default(),
			input_args: Vec::new(),
			output_args: Vec::new(),
			frame_rate_override: 0.0,
			priority: 50,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct StagingSection {
	pub enabled: bool,
	///Scratch root, the system temporary directory when unset
	pub path: Option<PathBuf>,
	pub cleanup_local_files: bool,
}

impl Default for StagingSection {
	fn default() -> Self {
		StagingSection {
			enabled: false,
			path: None,
			cleanup_local_files: true,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CleanupSection {
	pub grace_period_ms: u64,
	pub max_attempts: u32,
	pub manifest_attempts: u32,
	pub base_delay_ms: u64,
	pub max_delay_ms: u64,
}

impl Default for CleanupSection {
	fn default() -> Self {
		CleanupSection {
			grace_period_ms: 2000,
			max_attempts: 5,
			manifest_attempts: 3,
			base_delay_ms: 500,
			max_delay_ms: 8000,
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TranscoderSection {
	///`ffmpeg` from the `PATH` when unset
	pub executable: Option<PathBuf>,
}

impl Settings {
	///Defaults when `path` is `None`
	pub fn load(path: Option<&Path>) -> Result<Settings, WorkerError> {
		match path {
			Some(path) => Settings::load_from_file(path),
			None => Ok(Settings::default()),
		}
	}

	pub fn load_from_file(path: &Path) -> Result<Settings, WorkerError> {
		let invalid = |message: String| WorkerError::Settings {
			path: path.to_path_buf(),
			message,
		};
		let contents = std::fs::read_to_string(path).map_err(|err| invalid(err.to_string()))?;
		let extension = path
			.extension()
			.and_then(|ext| ext.to_str())
			.map(str::to_ascii_lowercase);
		let settings: Settings = match extension.as_deref() {
			Some("json") => serde_json::from_str(&contents).map_err(|err| invalid(err.to_string()))?,
			Some("toml") | Some("tml") => {
				toml::from_str(&contents).map_err(|err| invalid(err.to_string()))?
			}
			_ => match toml::from_str(&contents) {
				Ok(settings) => settings,
				Err(toml_err) => serde_json::from_str(&contents).map_err(|json_err| {
					invalid(format!("not TOML ({toml_err}) nor JSON ({json_err})"))
				})?,
			},
		};
		settings.validate().map_err(invalid)?;
		debug!(path = %path.display(), "settings loaded");
		Ok(settings)
	}

	fn validate(&self) -> Result<(), String> {
		if self.chunking.chunk_size == 0 {
			return Err("chunking.chunk_size must be at least 1".to_string());
		}
		if self.chunking.min_chunks == 0 {
			return Err("chunking.min_chunks must be at least 1".to_string());
		}
		if self.chunking.concurrent_tasks == 0 {
			return Err("chunking.concurrent_tasks must be at least 1".to_string());
		}
		if self.encoding.crf > 51 {
			return Err("encoding.crf must be between 0 and 51".to_string());
		}
		Ok(())
	}

	pub fn submission_settings(&self) -> SubmissionSettings {
		SubmissionSettings {
			trigger_mode: self.trigger.mode,
			require_tokens: self.trigger.require_tokens,
			audio_search: self.trigger.audio_search,
			chunking_enabled: self.chunking.enabled,
			chunk_size: NonZeroUsize::new(self.chunking.chunk_size).unwrap_or(NonZeroUsize::MIN),
			min_chunks: NonZeroUsize::new(self.chunking.min_chunks).unwrap_or(NonZeroUsize::MIN),
			concurrent_tasks: self.chunking.concurrent_tasks.max(1),
			keep_intermediates: self.chunking.keep_intermediates,
			default_codec: self.encoding.default_codec,
			enable_gpu: self.encoding.enable_gpu,
			crf: self.encoding.crf,
			prores_profile: self.encoding.prores_profile,
			input_args: ArgList::from_tokens(&self.encoding.input_args),
			output_args: ArgList::from_tokens(&self.encoding.output_args),
			frame_rate_override: self.encoding.frame_rate_override,
			priority: self.encoding.priority,
			ceilings: ConcurrencyPolicy::from_entries(&self.ceilings),
		}
	}

	pub fn cleanup_settings(&self) -> CleanupSettings {
		CleanupSettings {
			grace_period: Duration::from_millis(self.cleanup.grace_period_ms),
			max_attempts: self.cleanup.max_attempts.max(1),
			manifest_attempts: self.cleanup.manifest_attempts.max(1),
			base_delay: Duration::from_millis(self.cleanup.base_delay_ms),
			max_delay: Duration::from_millis(self.cleanup.max_delay_ms),
		}
	}

	pub fn executor_settings(&self) -> ExecutorSettings {
		let scratch = self.staging.enabled.then(|| {
			self.staging
				.path
				.clone()
				.unwrap_or_else(|| std::env::temp_dir().join("transcode-scratch"))
		});
		ExecutorSettings {
			scratch,
			cleanup_local_files: self.staging.cleanup_local_files,
			cleanup: self.cleanup_settings(),
		}
	}
}
