//! Local scratch area used when tasks should not read from or write to shared storage
//! while the transcoder runs.
//!
//! Layout is `{scratch}/{job}/{task}/{instance}/input` and `.../{instance}/output`, the instance
//! being unique per allocation so two jobs with the same id never share a directory.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};
use transcode_task::sequence::SequencePattern;
use transcode_task::FrameRange;
use uuid::Uuid;

use crate::WorkerError;

#[derive(Debug)]
pub struct ScratchArea {
	root: PathBuf,
	input: PathBuf,
	output: PathBuf,
}

impl ScratchArea {
	///Create the area, anything left at the same path is removed first
	pub async fn create(
		scratch: &Path,
		job: &str,
		task: u32,
		instance: Uuid,
	) -> Result<ScratchArea, WorkerError> {
		let root = scratch
			.join(job)
			.join(task.to_string())
			.join(instance.to_string());
		remove_dir(&root)
			.await
			.map_err(|err| WorkerError::staging(&root, err))?;
		let input = root.join("input");
		let output = root.join("output");
		for dir in [&input, &output] {
			fs::create_dir_all(dir)
				.await
				.map_err(|err| WorkerError::staging(dir, err))?;
		}
		debug!(path = %root.display(), "scratch area created");
		Ok(ScratchArea {
			root,
			input,
			output,
		})
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn input_dir(&self) -> &Path {
		&self.input
	}

	pub fn output_dir(&self) -> &Path {
		&self.output
	}

	///Path in the input directory with the file name of `shared`
	pub fn input_for(&self, shared: &Path) -> PathBuf {
		in_dir(&self.input, shared)
	}

	///Path in the output directory for the file that ends up at `destination`
	pub fn output_for(&self, destination: &Path) -> PathBuf {
		in_dir(&self.output, destination)
	}

	pub async fn remove(self) -> io::Result<()> {
		remove_dir(&self.root).await?;
		debug!(path = %self.root.display(), "scratch area removed");
		Ok(())
	}
}

fn in_dir(dir: &Path, shared: &Path) -> PathBuf {
	match shared.file_name() {
		Some(name) => dir.join(name),
		None => dir.join("unnamed"),
	}
}

async fn remove_dir(dir: &Path) -> io::Result<()> {
	match fs::remove_dir_all(dir).await {
		Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
		_ => Ok(()),
	}
}

///Copy the frames of `pattern` into `into`, only those inside `range` when given.
///
///Returns the number of frames copied, none at all is an error.
pub async fn stage_frames(
	pattern: &SequencePattern,
	range: Option<&FrameRange>,
	into: &Path,
) -> Result<usize, WorkerError> {
	let source = pattern.directory();
	let source = if source.as_os_str().is_empty() {
		Path::new(".")
	} else {
		source
	};
	let mut entries = fs::read_dir(source)
		.await
		.map_err(|err| WorkerError::staging(source, err))?;
	let mut copied = 0;
	while let Some(entry) = entries
		.next_entry()
		.await
		.map_err(|err| WorkerError::staging(source, err))?
	{
		let name = entry.file_name();
		let Some(frame) = name.to_str().and_then(|name| pattern.frame_of(name)) else {
			continue;
		};
		if range.is_some_and(|range| !range.contains(frame)) {
			continue;
		}
		let target = into.join(&name);
		fs::copy(entry.path(), &target)
			.await
			.map_err(|err| WorkerError::staging(entry.path(), err))?;
		copied += 1;
	}
	if copied == 0 {
		return Err(WorkerError::NoFramesStaged {
			pattern: pattern.file_pattern(),
			range: range.map_or_else(|| "all".to_string(), FrameRange::to_string),
		});
	}
	info!(frames = copied, from = %source.display(), "input frames staged");
	Ok(copied)
}

///Copy a single file into `into`, keeping its name
pub async fn stage_file(source: &Path, into: &Path) -> Result<PathBuf, WorkerError> {
	let name = source
		.file_name()
		.ok_or_else(|| WorkerError::staging(source, io::ErrorKind::InvalidInput.into()))?;
	let target = into.join(name);
	fs::copy(source, &target)
		.await
		.map_err(|err| WorkerError::staging(source, err))?;
	debug!(from = %source.display(), to = %target.display(), "file staged");
	Ok(target)
}

///Copy a finished output to shared storage.
///
///The file is written next to the destination under a temporary name and renamed, so readers
///never see a partial output.
pub async fn copy_back(source: &Path, destination: &Path) -> io::Result<()> {
	if let Some(parent) = destination.parent() {
		fs::create_dir_all(parent).await?;
	}
	let mut partial = destination.as_os_str().to_owned();
	partial.push(".partial");
	let partial = PathBuf::from(partial);
	if let Err(err) = fs::copy(source, &partial).await {
		let _ = fs::remove_file(&partial).await;
		return Err(err);
	}
	if let Err(err) = fs::rename(&partial, destination).await {
		let _ = fs::remove_file(&partial).await;
		return Err(err);
	}
	debug!(from = %source.display(), to = %destination.display(), "output copied back");
	Ok(())
}
