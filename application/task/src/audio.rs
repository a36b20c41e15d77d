//! Finds the audio track rendered next to a video output.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

const EXTENSIONS: [&str; 4] = ["wav", "mp3", "aac", "m4a"];

static CODEC_SUFFIX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"_(h265|h264|prores|hap)$").expect("valid codec suffix regex"));

///Search for `name.{wav,mp3,aac,m4a}` or `audio.*` around `output_dir`.
///
///Locations in order: `dir/name`, `dir/audio`, `dir/audio/name`, `dir/audio/audio`, `../audio/name`.
///The codec suffix and trailing underscores are removed from `base_name` first.
pub fn find_audio_file(output_dir: &Path, base_name: &str) -> Option<PathBuf> {
	let name = CODEC_SUFFIX.replace(base_name, "");
	let name = name.trim_end_matches('_');
	let audio_dir = output_dir.join("audio");
	let parent_audio_dir = output_dir
		.parent()
		.map(|parent| parent.join("audio"))
		.unwrap_or_else(|| PathBuf::from("audio"));
	let candidates = [
		(output_dir.to_path_buf(), name),
		(output_dir.to_path_buf(), "audio"),
		(audio_dir.clone(), name),
		(audio_dir, "audio"),
		(parent_audio_dir, name),
	];
	candidates
		.iter()
		.filter(|(dir, _)| dir.is_dir())
		.flat_map(|(dir, stem)| {
			EXTENSIONS
				.iter()
				.map(move |ext| dir.join(format!("{stem}.{ext}")))
		})
		.inspect(|path| debug!(path = %path.display(), "checking for audio"))
		.find(|path| path.is_file())
}
