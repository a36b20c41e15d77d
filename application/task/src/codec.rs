//! Supported output codecs and the encoder arguments used for each.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::arguments::ArgList;
use crate::ParseNameError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
	H265,
	H264,
	Prores,
	Hap,
}

impl Codec {
	pub const ALL: [Codec; 4] = [Codec::H265, Codec::H264, Codec::Prores, Codec::Hap];

	pub fn name(&self) -> &'static str {
		match self {
			Codec::H265 => "H.265/HEVC",
			Codec::H264 => "H.264/AVC",
			Codec::Prores => "Apple ProRes",
			Codec::Hap => "HAP",
		}
	}

	pub fn id(&self) -> &'static str {
		match self {
			Codec::H265 => "h265",
			Codec::H264 => "h264",
			Codec::Prores => "prores",
			Codec::Hap => "hap",
		}
	}

	pub fn container(&self) -> &'static str {
		match self {
			Codec::H265 | Codec::H264 => "mp4",
			Codec::Prores | Codec::Hap => "mov",
		}
	}

	pub fn gpu_encoder(&self) -> Option<&'static str> {
		match self {
			Codec::H265 => Some("hevc_nvenc"),
			Codec::H264 => Some("h264_nvenc"),
			Codec::Prores | Codec::Hap => None,
		}
	}

	pub fn cpu_encoder(&self) -> &'static str {
		match self {
			Codec::H265 => "libx265",
			Codec::H264 => "libx264",
			Codec::Prores => "prores_ks",
			Codec::Hap => "hap",
		}
	}

	///Appended to the output basename, `_h265` and so on
	pub fn suffix(&self) -> &'static str {
		match self {
			Codec::H265 => "_h265",
			Codec::H264 => "_h264",
			Codec::Prores => "_prores",
			Codec::Hap => "_hap",
		}
	}

	///GPU only when it is enabled and this codec has a GPU encoder
	pub fn hardware_mode(&self, enable_gpu: bool) -> HardwareMode {
		if enable_gpu && self.gpu_encoder().is_some() {
			HardwareMode::Gpu
		} else {
			HardwareMode::Cpu
		}
	}
}

impl fmt::Display for Codec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.id())
	}
}

impl FromStr for Codec {
	type Err = ParseNameError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let lower = s.trim().to_ascii_lowercase();
		Codec::ALL
			.into_iter()
			.find(|codec| codec.id() == lower)
			.ok_or_else(|| ParseNameError::Codec(s.to_string()))
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareMode {
	Gpu,
	Cpu,
}

impl fmt::Display for HardwareMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HardwareMode::Gpu => f.write_str("gpu"),
			HardwareMode::Cpu => f.write_str("cpu"),
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProResProfile {
	#[serde(rename = "proxy")]
	Proxy,
	#[serde(rename = "lt")]
	Lt,
	#[serde(rename = "422")]
	Standard,
	#[default]
	#[serde(rename = "422hq")]
	Hq,
	#[serde(rename = "4444")]
	FourFourFourFour,
	#[serde(rename = "4444xq")]
	FourFourFourFourXq,
}

impl ProResProfile {
	///`prores_ks` profile index
	pub fn index(&self) -> u8 {
		match self {
			ProResProfile::Proxy => 0,
			ProResProfile::Lt => 1,
			ProResProfile::Standard => 2,
			ProResProfile::Hq => 3,
			ProResProfile::FourFourFourFour => 4,
			ProResProfile::FourFourFourFourXq => 5,
		}
	}

	pub fn has_alpha(&self) -> bool {
		matches!(
			self,
			ProResProfile::FourFourFourFour | ProResProfile::FourFourFourFourXq
		)
	}
}

impl FromStr for ProResProfile {
	type Err = ParseNameError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"proxy" => Ok(ProResProfile::Proxy),
			"lt" => Ok(ProResProfile::Lt),
			"422" => Ok(ProResProfile::Standard),
			"422hq" => Ok(ProResProfile::Hq),
			"4444" => Ok(ProResProfile::FourFourFourFour),
			"4444xq" => Ok(ProResProfile::FourFourFourFourXq),
			_ => Err(ParseNameError::ProResProfile(s.to_string())),
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HapVariant {
	#[default]
	Standard,
	Alpha,
	Q,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CodecSettings {
	pub codec: Codec,
	pub enable_gpu: bool,
	pub crf: u8,
	pub prores_profile: ProResProfile,
	pub hap_variant: HapVariant,
}

impl CodecSettings {
	pub fn new(codec: Codec) -> CodecSettings {
		CodecSettings {
			codec,
			enable_gpu: true,
			crf: 23,
			prores_profile: ProResProfile::default(),
			hap_variant: HapVariant::default(),
		}
	}

	pub fn hardware_mode(&self) -> HardwareMode {
		self.codec.hardware_mode(self.enable_gpu)
	}
}

const BT709_LIMITED: &str = "zscale=tin=linear:t=bt709:m=bt709:r=limited";
const BT709_FULL: &str = "zscale=tin=linear:t=bt709:m=bt709:r=full";

fn bt709_tags(args: ArgList) -> ArgList {
	args.pair("-color_trc", "bt709")
		.pair("-color_primaries", "bt709")
		.pair("-colorspace", "bt709")
}

///Video encoder arguments for the chosen codec, placed after the input
pub fn codec_arguments(settings: &CodecSettings) -> ArgList {
	let codec = settings.codec;
	match codec {
		Codec::H265 | Codec::H264 => {
			let mut args = ArgList::new();
			match (settings.hardware_mode(), codec.gpu_encoder()) {
				(HardwareMode::Gpu, Some(encoder)) => {
					args = args
						.pair("-c:v", encoder)
						.pair("-preset", "p4")
						.pair("-tune", "hq")
						.pair("-rc", "vbr")
						.pair("-cq", settings.crf)
						.pair("-b:v", 0)
						.pair("-maxrate", "50M")
						.pair("-bufsize", "100M")
						.pair("-bf", 3)
						.pair("-spatial_aq", 1)
						.pair("-temporal_aq", 1);
				}
				_ => {
					args = args
						.pair("-c:v", codec.cpu_encoder())
						.pair("-preset", "medium")
						.pair("-crf", settings.crf);
					if codec == Codec::H265 {
						args = args.pair("-x265-params", "log-level=error");
					}
				}
			}
			bt709_tags(
				args.pair("-vf", BT709_LIMITED)
					.pair("-pix_fmt", "yuv420p"),
			)
			.pair("-movflags", "+faststart")
		}
		Codec::Prores => {
			let profile = settings.prores_profile;
			let pix_fmt = if profile.has_alpha() {
				"yuva444p10le"
			} else {
				"yuv422p10le"
			};
			bt709_tags(
				ArgList::new()
					.pair("-c:v", codec.cpu_encoder())
					.pair("-profile:v", profile.index())
					.pair("-pix_fmt", pix_fmt)
					.pair("-vf", BT709_FULL),
			)
		}
		Codec::Hap => {
			let (format, pix_fmt) = match settings.hap_variant {
				HapVariant::Standard => ("hap", "rgb24"),
				HapVariant::Alpha => ("hap_alpha", "rgba"),
				HapVariant::Q => ("hap_q", "rgb24"),
			};
			ArgList::new()
				.pair("-c:v", codec.cpu_encoder())
				.pair("-format", format)
				.pair("-vf", BT709_LIMITED)
				.pair("-pix_fmt", pix_fmt)
		}
	}
}

///Audio codec arguments for the container the audio is muxed into
pub fn audio_arguments(container: &str) -> ArgList {
	if container.eq_ignore_ascii_case("mp4") {
		ArgList::new().pair("-c:a", "aac").pair("-b:a", "192k")
	} else {
		ArgList::new().pair("-c:a", "pcm_s16le")
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn parse_codec_names() {
		assert_eq!("H265".parse::<Codec>().unwrap(), Codec::H265);
		assert_eq!(" prores ".parse::<Codec>().unwrap(), Codec::Prores);
		assert_eq!(
			"vp9".parse::<Codec>(),
			Err(ParseNameError::Codec("vp9".to_string()))
		);
	}

	#[test]
	fn gpu_only_for_codecs_with_gpu_encoder() {
		assert_eq!(Codec::H265.hardware_mode(true), HardwareMode::Gpu);
		assert_eq!(Codec::H265.hardware_mode(false), HardwareMode::Cpu);
		assert_eq!(Codec::Prores.hardware_mode(true), HardwareMode::Cpu);
		assert_eq!(Codec::Hap.hardware_mode(true), HardwareMode::Cpu);
	}

	#[test]
	fn nvenc_arguments() {
		let args = codec_arguments(&CodecSettings::new(Codec::H265));
		assert_eq!(args.value_of("-c:v"), Some("hevc_nvenc"));
		assert_eq!(args.value_of("-cq"), Some("23"));
		assert_eq!(args.value_of("-movflags"), Some("+faststart"));
		assert!(!args.contains_flag("-crf"));
	}

	#[test]
	fn cpu_h264_uses_crf() {
		let settings = CodecSettings {
			enable_gpu: false,
			crf: 18,
			..CodecSettings::new(Codec::H264)
		};
		let args = codec_arguments(&settings);
		assert_eq!(args.value_of("-c:v"), Some("libx264"));
		assert_eq!(args.value_of("-crf"), Some("18"));
		assert!(!args.contains_flag("-x265-params"));
	}

	#[test]
	fn prores_profile_selects_pixel_format() {
		let settings = CodecSettings {
			prores_profile: ProResProfile::FourFourFourFour,
			..CodecSettings::new(Codec::Prores)
		};
		let args = codec_arguments(&settings);
		assert_eq!(args.value_of("-profile:v"), Some("4"));
		assert_eq!(args.value_of("-pix_fmt"), Some("yuva444p10le"));
		let args = codec_arguments(&CodecSettings::new(Codec::Prores));
		assert_eq!(args.value_of("-profile:v"), Some("3"));
		assert_eq!(args.value_of("-pix_fmt"), Some("yuv422p10le"));
		assert!(!args.contains_flag("-movflags"));
	}

	#[test]
	fn hap_alpha() {
		let settings = CodecSettings {
			hap_variant: HapVariant::Alpha,
			..CodecSettings::new(Codec::Hap)
		};
		let args = codec_arguments(&settings);
		assert_eq!(args.value_of("-format"), Some("hap_alpha"));
		assert_eq!(args.value_of("-pix_fmt"), Some("rgba"));
	}

	#[test]
	fn audio_codec_depends_on_container() {
		assert_eq!(audio_arguments("mp4").value_of("-c:a"), Some("aac"));
		assert_eq!(audio_arguments("mov").value_of("-c:a"), Some("pcm_s16le"));
	}

	#[test]
	fn prores_profile_round_trip_names() {
		let profile: ProResProfile = serde_json::from_str("\"4444xq\"").unwrap();
		assert_eq!(profile, ProResProfile::FourFourFourFourXq);
		assert_eq!("422".parse::<ProResProfile>().unwrap(), ProResProfile::Standard);
		let err = "444".parse::<ProResProfile>().unwrap_err();
		assert_eq!(err, ParseNameError::ProResProfile("444".to_string()));
		assert_eq!(err.to_string(), "unknown prores profile \"444\"");
	}
}
