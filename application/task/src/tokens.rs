//! Encoding hints carried in render names, `shot_[h264]_[30fps]` and friends.

use std::sync::LazyLock;

use regex::Regex;

use crate::codec::{Codec, HapVariant, ProResProfile};

static TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\[ffmpeg\]|_ffmpeg_|\[h265\]|\[h264\]|\[prores|\[hap|_h265_|_h264_|_prores|_hap_")
		.expect("valid trigger regex")
});
static CODECS: LazyLock<[(Regex, Codec); 4]> = LazyLock::new(|| {
	[
		(r"\[h265\]|_h265_", Codec::H265),
		(r"\[h264\]|_h264_", Codec::H264),
		(r"\[prores|_prores", Codec::Prores),
		(r"\[hap|_hap_", Codec::Hap),
	]
	.map(|(pattern, codec)| (Regex::new(pattern).expect("valid codec regex"), codec))
});
static FPS: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\[(\d+(?:\.\d+)?)fps\]|_(\d+(?:\.\d+)?)fps_|_(\d+(?:\.\d+)?)fps")
		.expect("valid fps regex")
});
static AUDIO: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\[audio\]|_audio_").expect("valid audio regex"));
static PRORES_PROFILE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"prores(4444xq|4444|422hq|422|proxy|lt)").expect("valid prores profile regex")
});

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilenameTokens {
	pub codec: Option<Codec>,
	pub fps: Option<f64>,
	pub audio: bool,
	pub prores_profile: Option<ProResProfile>,
	pub hap_variant: Option<HapVariant>,
}

///Tokens found in `name`, or `None` when it carries no trigger token. Matching ignores case.
pub fn parse(name: &str) -> Option<FilenameTokens> {
	let name = name.to_lowercase();
	if !TRIGGER.is_match(&name) {
		return None;
	}
	let codec = CODECS
		.iter()
		.find(|(pattern, _)| pattern.is_match(&name))
		.map(|(_, codec)| *codec);
	let fps = FPS.captures(&name).and_then(|captures| {
		captures
			.iter()
			.skip(1)
			.flatten()
			.next()
			.and_then(|value| value.as_str().parse().ok())
	});
	let prores_profile = PRORES_PROFILE
		.captures(&name)
		.and_then(|captures| captures[1].parse().ok());
	let hap_variant = if name.contains("hapalpha") {
		Some(HapVariant::Alpha)
	} else if name.contains("hapq") {
		Some(HapVariant::Q)
	} else {
		None
	};
	Some(FilenameTokens {
		codec,
		fps,
		audio: AUDIO.is_match(&name),
		prores_profile,
		hap_variant,
	})
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn no_trigger_no_tokens() {
		assert!(parse("beauty_v003.exr").is_none());
		assert!(parse("h264_without_delimiters.exr").is_none());
	}

	#[test]
	fn bracket_tokens() {
		let tokens = parse("render_[ffmpeg]_[h264]_[30fps].exr").unwrap();
		assert_eq!(
			tokens,
			FilenameTokens {
				codec: Some(Codec::H264),
				fps: Some(30.0),
				..Default::default()
			}
		);
	}

	#[test]
	fn underscore_tokens_with_prores_profile() {
		let tokens = parse("render_ffmpeg_prores422_24fps.exr").unwrap();
		assert_eq!(tokens.codec, Some(Codec::Prores));
		assert_eq!(tokens.fps, Some(24.0));
		assert_eq!(tokens.prores_profile, Some(ProResProfile::Standard));
	}

	#[test]
	fn longest_prores_profile_wins() {
		let tokens = parse("shot_[prores4444xq].exr").unwrap();
		assert_eq!(tokens.prores_profile, Some(ProResProfile::FourFourFourFourXq));
		let tokens = parse("shot_[prores422hq].exr").unwrap();
		assert_eq!(tokens.prores_profile, Some(ProResProfile::Hq));
	}

	#[test]
	fn audio_and_hap() {
		let tokens = parse("render_[audio]_[hap].exr").unwrap();
		assert_eq!(tokens.codec, Some(Codec::Hap));
		assert!(tokens.audio);
		assert_eq!(tokens.fps, None);
		let tokens = parse("Render_[HAPQ]").unwrap();
		assert_eq!(tokens.hap_variant, Some(HapVariant::Q));
	}

	#[test]
	fn fractional_fps() {
		let tokens = parse("comp_[ffmpeg]_[23.976fps]").unwrap();
		assert_eq!(tokens.fps, Some(23.976));
		assert_eq!(tokens.codec, None);
	}
}
