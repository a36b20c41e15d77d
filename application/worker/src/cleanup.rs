//! Deletes the chunk files and the manifest after a successful join.
//!
//! Shared storage often holds a file open for a moment after the transcoder exits, so every
//! removal is retried with backoff. Nothing in here can fail the job: files that could not be
//! removed end up in [`CleanupReport::failed`] and are logged.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;

#[cfg_attr(test, mockall::automock)]
#[allow(async_fn_in_trait)]
pub trait Sleeper {
	async fn sleep(&self, duration: Duration);
}

#[allow(async_fn_in_trait)]
pub trait FileRemover {
	async fn remove(&self, path: &Path) -> io::Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
	async fn sleep(&self, duration: Duration) {
		tokio::time::sleep(duration).await
	}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioRemover;

impl FileRemover for TokioRemover {
	async fn remove(&self, path: &Path) -> io::Result<()> {
		tokio::fs::remove_file(path).await
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleanupSettings {
	pub grace_period: Duration,
	pub max_attempts: u32,
	pub manifest_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
}

impl Default for CleanupSettings {
	fn default() -> Self {
		CleanupSettings {
			grace_period: Duration::from_secs(2),
			max_attempts: 5,
			manifest_attempts: 3,
			base_delay: Duration::from_millis(500),
			max_delay: Duration::from_secs(8),
		}
	}
}

impl CleanupSettings {
	fn policy(&self, attempts: u32) -> RetryPolicy {
		RetryPolicy::new(attempts)
			.with_base_delay(self.base_delay)
			.with_max_delay(self.max_delay)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Removal {
	Deleted,
	///Already gone, counts as deleted
	Absent,
	Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupReport {
	pub deleted: Vec<PathBuf>,
	pub absent: Vec<PathBuf>,
	pub failed: Vec<PathBuf>,
	pub manifest: Removal,
}

impl CleanupReport {
	pub fn is_complete(&self) -> bool {
		self.failed.is_empty() && self.manifest != Removal::Failed
	}
}

pub struct CleanupEngine<R, S> {
	remover: R,
	sleeper: S,
	settings: CleanupSettings,
}

impl<R: FileRemover, S: Sleeper> CleanupEngine<R, S> {
	pub fn new(remover: R, sleeper: S, settings: CleanupSettings) -> Self {
		CleanupEngine {
			remover,
			sleeper,
			settings,
		}
	}

	pub async fn cleanup(&self, chunks: &[PathBuf], manifest: &Path) -> CleanupReport {
		if !self.settings.grace_period.is_zero() {
			self.sleeper.sleep(self.settings.grace_period).await;
		}
		let chunk_policy = self.settings.policy(self.settings.max_attempts);
		let mut report = CleanupReport {
			deleted: Vec::new(),
			absent: Vec::new(),
			failed: Vec::new(),
			manifest: Removal::Absent,
		};
		for chunk in chunks {
			let list = match self.remove(chunk, &chunk_policy).await {
				Removal::Deleted => &mut report.deleted,
				Removal::Absent => &mut report.absent,
				Removal::Failed => &mut report.failed,
			};
			list.push(chunk.clone());
		}
		let manifest_policy = self.settings.policy(self.settings.manifest_attempts);
		report.manifest = self.remove(manifest, &manifest_policy).await;
		if report.is_complete() {
			info!(
				deleted = report.deleted.len(),
				absent = report.absent.len(),
				"intermediate files removed"
			);
		} else {
			warn!(
				failed = ?report.failed,
				manifest = ?report.manifest,
				"some intermediate files could not be removed"
			);
		}
		report
	}

	async fn remove(&self, path: &Path, policy: &RetryPolicy) -> Removal {
		let mut attempt = 1;
		loop {
			match self.remover.remove(path).await {
				Ok(()) => {
					debug!(path = %path.display(), attempt, "deleted");
					return Removal::Deleted;
				}
				Err(err) if err.kind() == io::ErrorKind::NotFound => return Removal::Absent,
				Err(err) if policy.should_retry(attempt) => {
					let delay = policy.delay_for_attempt(attempt);
					debug!(path = %path.display(), attempt, ?delay, %err, "delete failed, retrying");
					self.sleeper.sleep(delay).await;
					attempt += 1;
				}
				Err(err) => {
					warn!(path = %path.display(), attempt, %err, "giving up on delete");
					return Removal::Failed;
				}
			}
		}
	}
}

#[cfg(test)]
mod test {
	use std::collections::HashSet;
	use std::sync::Mutex;

	use tempfile::TempDir;

	use super::*;

	#[derive(Default)]
	struct RecordingSleeper {
		slept: Mutex<Vec<Duration>>,
	}

	impl Sleeper for &RecordingSleeper {
		async fn sleep(&self, duration: Duration) {
			self.slept.lock().unwrap().push(duration);
		}
	}

	///Deletes by forgetting names, `stuck` paths always fail with a permission error
	struct FlakyRemover {
		present: Mutex<HashSet<PathBuf>>,
		stuck: HashSet<PathBuf>,
		calls: Mutex<Vec<PathBuf>>,
	}

	impl FlakyRemover {
		fn new(present: &[&str], stuck: &[&str]) -> FlakyRemover {
			FlakyRemover {
				present: Mutex::new(present.iter().map(PathBuf::from).collect()),
				stuck: stuck.iter().map(PathBuf::from).collect(),
				calls: Mutex::new(Vec::new()),
			}
		}

		fn calls_for(&self, path: &str) -> usize {
			let calls = self.calls.lock().unwrap();
			calls.iter().filter(|call| call.as_path() == Path::new(path)).count()
		}
	}

	impl FileRemover for &FlakyRemover {
		async fn remove(&self, path: &Path) -> io::Result<()> {
			self.calls.lock().unwrap().push(path.to_path_buf());
			if self.stuck.contains(path) {
				return Err(io::Error::from(io::ErrorKind::PermissionDenied));
			}
			if self.present.lock().unwrap().remove(path) {
				Ok(())
			} else {
				Err(io::Error::from(io::ErrorKind::NotFound))
			}
		}
	}

	fn chunks() -> Vec<PathBuf> {
		["/out/a_chunk001.mp4", "/out/a_chunk002.mp4", "/out/a_chunk003.mp4"]
			.iter()
			.map(PathBuf::from)
			.collect()
	}

	#[tokio::test]
	async fn persistent_failure_on_one_chunk() {
		let remover = FlakyRemover::new(
			&["/out/a_chunk001.mp4", "/out/a_chunk003.mp4", "/out/a_concat.txt"],
			&["/out/a_chunk002.mp4"],
		);
		let sleeper = RecordingSleeper::default();
		let engine = CleanupEngine::new(&remover, &sleeper, CleanupSettings::default());
		let report = engine
			.cleanup(&chunks(), Path::new("/out/a_concat.txt"))
			.await;
		assert_eq!(
			report.deleted,
			[PathBuf::from("/out/a_chunk001.mp4"), PathBuf::from("/out/a_chunk003.mp4")]
		);
		assert_eq!(report.failed, [PathBuf::from("/out/a_chunk002.mp4")]);
		assert_eq!(report.manifest, Removal::Deleted);
		assert!(!report.is_complete());
		assert_eq!(remover.calls_for("/out/a_chunk002.mp4"), 5);
		let slept: Vec<u64> = sleeper
			.slept
			.lock()
			.unwrap()
			.iter()
			.map(|delay| delay.as_millis() as u64)
			.collect();
		assert_eq!(slept, [2000, 500, 1000, 2000, 4000]);
	}

	#[tokio::test]
	async fn stuck_manifest_uses_its_own_attempts() {
		let remover = FlakyRemover::new(&[], &["/out/a_concat.txt"]);
		let sleeper = RecordingSleeper::default();
		let engine = CleanupEngine::new(&remover, &sleeper, CleanupSettings::default());
		let report = engine
			.cleanup(&chunks(), Path::new("/out/a_concat.txt"))
			.await;
		assert_eq!(report.absent.len(), 3);
		assert_eq!(report.manifest, Removal::Failed);
		assert_eq!(remover.calls_for("/out/a_concat.txt"), 3);
	}

	#[tokio::test]
	async fn second_run_finds_nothing() {
		let dir = TempDir::new().unwrap();
		let chunks: Vec<PathBuf> = (1..=3)
			.map(|index| dir.path().join(format!("a_chunk{index:03}.mp4")))
			.collect();
		for chunk in &chunks {
			std::fs::write(chunk, b"chunk").unwrap();
		}
		let manifest = dir.path().join("a_concat.txt");
		std::fs::write(&manifest, b"").unwrap();
		let sleeper = RecordingSleeper::default();
		let engine = CleanupEngine::new(TokioRemover, &sleeper, CleanupSettings::default());

		let first = engine.cleanup(&chunks, &manifest).await;
		assert_eq!(first.deleted, chunks);
		assert_eq!(first.manifest, Removal::Deleted);

		let second = engine.cleanup(&chunks, &manifest).await;
		assert!(second.deleted.is_empty());
		assert_eq!(second.absent, chunks);
		assert_eq!(second.manifest, Removal::Absent);
		assert!(second.is_complete());
	}

	#[tokio::test]
	async fn only_grace_period_when_everything_deletes() {
		let remover = FlakyRemover::new(&["/out/a_chunk001.mp4", "/out/a_concat.txt"], &[]);
		let mut sleeper = MockSleeper::new();
		sleeper
			.expect_sleep()
			.withf(|duration| *duration == Duration::from_secs(2))
			.times(1)
			.returning(|_| ());
		let engine = CleanupEngine::new(&remover, sleeper, CleanupSettings::default());
		let report = engine
			.cleanup(&chunks()[..1], Path::new("/out/a_concat.txt"))
			.await;
		assert_eq!(report.deleted.len(), 1);
		assert_eq!(report.manifest, Removal::Deleted);
	}

	#[tokio::test]
	async fn no_grace_period_means_no_sleep() {
		let remover = FlakyRemover::new(&[], &[]);
		let mut sleeper = MockSleeper::new();
		sleeper.expect_sleep().never();
		let settings = CleanupSettings {
			grace_period: Duration::ZERO,
			..CleanupSettings::default()
		};
		let engine = CleanupEngine::new(&remover, sleeper, settings);
		let report = engine.cleanup(&[], Path::new("/out/a_concat.txt")).await;
		assert_eq!(report.manifest, Removal::Absent);
	}
}
