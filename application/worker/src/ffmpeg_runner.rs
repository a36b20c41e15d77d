use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};
use transcode_task::arguments::ArgList;

use crate::WorkerError;

///Diagnostic segments kept for the failure report
pub const DIAGNOSTIC_TAIL: usize = 20;

#[allow(async_fn_in_trait)]
pub trait Transcoder {
	///Run to completion, a non zero exit is [`WorkerError::TranscoderFailed`]
	async fn transcode(&self, args: &ArgList) -> Result<(), WorkerError>;
}

#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
	executable: PathBuf,
}

impl FfmpegTranscoder {
	///Use `configured` when set, otherwise look for `ffmpeg` on the `PATH`
	pub fn locate(configured: Option<&Path>) -> Result<FfmpegTranscoder, WorkerError> {
		let wanted = configured.unwrap_or(Path::new("ffmpeg"));
		let executable = which::which(wanted)
			.map_err(|_| WorkerError::TranscoderNotFound(wanted.display().to_string()))?;
		debug!(path = %executable.display(), "transcoder found");
		Ok(FfmpegTranscoder { executable })
	}

	pub fn executable(&self) -> &Path {
		&self.executable
	}
}

impl Transcoder for FfmpegTranscoder {
	async fn transcode(&self, args: &ArgList) -> Result<(), WorkerError> {
		let mut transcoder = Command::new(&self.executable);
		transcoder
			.args(args.to_argv())
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		info!(executable = %self.executable.display(), %args, "running transcoder");
		let mut child = transcoder.spawn()?;
		let stderr = child
			.stderr
			.take()
			.ok_or_else(|| io::Error::other("transcoder diagnostics not captured"))?;
		let diagnostics = read_diagnostics(BufReader::new(stderr), DIAGNOSTIC_TAIL).await?;
		let status = child.wait().await?;
		if status.success() {
			info!("transcoder finished");
			return Ok(());
		}
		Err(WorkerError::TranscoderFailed {
			exit_code: status.code(),
			diagnostics: diagnostics.into(),
		})
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Segment {
	Error,
	Progress,
	Other,
}

fn classify(segment: &str) -> Segment {
	if segment.to_ascii_lowercase().contains("error") {
		Segment::Error
	} else if segment.contains("frame=") {
		Segment::Progress
	} else {
		Segment::Other
	}
}

///Progress lines end in `\r`, everything else in `\n`, both end a segment
async fn read_diagnostics(
	mut stream: impl AsyncBufRead + Unpin,
	keep: usize,
) -> io::Result<VecDeque<String>> {
	let mut tail = VecDeque::with_capacity(keep);
	let mut segment = Vec::new();
	loop {
		let buffer = stream.fill_buf().await?;
		if buffer.is_empty() {
			break;
		}
		let len = buffer.len();
		for &byte in buffer {
			if byte == b'\n' || byte == b'\r' {
				end_segment(&mut segment, &mut tail, keep);
			} else {
				segment.push(byte);
			}
		}
		stream.consume(len);
	}
	end_segment(&mut segment, &mut tail, keep);
	Ok(tail)
}

fn end_segment(segment: &mut Vec<u8>, tail: &mut VecDeque<String>, keep: usize) {
	let text = String::from_utf8_lossy(segment).trim().to_string();
	segment.clear();
	if text.is_empty() {
		return;
	}
	match classify(&text) {
		Segment::Error => warn!(diagnostic = %text, "transcoder reported an error"),
		Segment::Progress => info!(progress = %text),
		Segment::Other => debug!(diagnostic = %text),
	}
	if keep == 0 {
		return;
	}
	if tail.len() == keep {
		tail.pop_front();
	}
	tail.push_back(text);
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn segments_are_classified() {
		assert_eq!(classify("frame=  120 fps= 30 q=28.0"), Segment::Progress);
		assert_eq!(classify("Error while decoding stream #0:0"), Segment::Error);
		assert_eq!(classify("[hevc_nvenc] ERROR: no capable devices"), Segment::Error);
		assert_eq!(classify("Stream mapping:"), Segment::Other);
	}

	#[tokio::test]
	async fn carriage_returns_split_progress() {
		let stderr = b"frame=    1\rframe=    2\rdone\n\nError opening output\n";
		let tail = read_diagnostics(BufReader::new(&stderr[..]), DIAGNOSTIC_TAIL)
			.await
			.unwrap();
		assert_eq!(
			tail,
			["frame=    1", "frame=    2", "done", "Error opening output"]
		);
	}

	#[tokio::test]
	async fn only_last_segments_are_kept() {
		let stderr: String = (0..25).map(|line| format!("line {line}\n")).collect();
		let tail = read_diagnostics(BufReader::new(stderr.as_bytes()), DIAGNOSTIC_TAIL)
			.await
			.unwrap();
		assert_eq!(tail.len(), DIAGNOSTIC_TAIL);
		assert_eq!(tail.front().unwrap(), "line 5");
		assert_eq!(tail.back().unwrap(), "line 24");
	}

	#[tokio::test]
	async fn last_segment_without_newline_is_kept() {
		let tail = read_diagnostics(BufReader::new(&b"a\nb"[..]), 2).await.unwrap();
		assert_eq!(tail, ["a", "b"]);
	}

	#[test]
	fn missing_executable() {
		let missing = Path::new("/nonexistent/bin/ffmpeg");
		assert!(matches!(
			FfmpegTranscoder::locate(Some(missing)),
			Err(WorkerError::TranscoderNotFound(_))
		));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn non_zero_exit_fails_with_diagnostics() {
		let transcoder = FfmpegTranscoder::locate(Some(Path::new("sh"))).unwrap();
		let args = ArgList::from_tokens([
			"-c",
			"printf 'frame=  1\\rframe=  2\\nError while decoding\\n' >&2; exit 3",
		]);
		let err = transcoder.transcode(&args).await.unwrap_err();
		let WorkerError::TranscoderFailed {
			exit_code,
			diagnostics,
		} = err
		else {
			panic!("Should be a transcoder failure");
		};
		assert_eq!(exit_code, Some(3));
		assert_eq!(diagnostics, ["frame=  1", "frame=  2", "Error while decoding"]);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn zero_exit_succeeds() {
		let transcoder = FfmpegTranscoder::locate(Some(Path::new("sh"))).unwrap();
		let args = ArgList::from_tokens(["-c", "echo frame=1 >&2"]);
		transcoder.transcode(&args).await.unwrap();
	}
}
