//! # Farm scheduler module
//!
//! The farm owns dispatch, retries and ordering. This crate only talks to it through
//! [`FarmScheduler`]:
//! - submit a job with its task count, concurrency and dependency edges
//! - report the result of a task
//!
//! Task ids are the positions `0..=chunk_count`, the last one is the join.
//! [`db::LocalFarm`] is an in memory farm used for local runs and tests.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::graph::DependencyEdge;
use crate::metadata::JobMetadata;
use crate::SchedulerError;

pub mod db;

pub use db::LocalFarm;

///Placement keys copied from the render job onto the transcode job
pub const PLACEMENT_KEYS: [&str; 4] = ["Pool", "SecondaryPool", "Whitelist", "Blacklist"];

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(String);

impl JobId {
	pub fn new(id: impl Into<String>) -> JobId {
		JobId(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<Uuid> for JobId {
	fn from(value: Uuid) -> Self {
		JobId(value.to_string())
	}
}

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobSubmission {
	pub name: String,
	pub metadata: Arc<JobMetadata>,
	pub task_count: u32,
	pub concurrency: u32,
	pub edges: Vec<DependencyEdge>,
	pub priority: u32,
	pub placement: BTreeMap<String, String>,
}

impl JobSubmission {
	///Task ids as a farm frame list, `0,1,...,N`
	pub fn frames(&self) -> String {
		(0..self.task_count)
			.map(|task| task.to_string())
			.collect::<Vec<_>>()
			.join(",")
	}

	///`join:encode` pairs, comma separated
	pub fn frame_dependencies(&self) -> String {
		self.edges
			.iter()
			.map(|edge| format!("{}:{}", edge.join, edge.encode))
			.collect::<Vec<_>>()
			.join(",")
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
	Success,
	Failure,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskReport {
	pub status: TaskStatus,
	pub diagnostics: Vec<String>,
}

impl TaskReport {
	pub fn success() -> TaskReport {
		TaskReport {
			status: TaskStatus::Success,
			diagnostics: Vec::new(),
		}
	}

	pub fn failure(diagnostics: Vec<String>) -> TaskReport {
		TaskReport {
			status: TaskStatus::Failure,
			diagnostics,
		}
	}
}

#[cfg_attr(test, mockall::automock)]
#[allow(async_fn_in_trait)]
pub trait FarmScheduler {
	///Submit the whole job once, returns the farm's id for it
	async fn submit(&self, job: JobSubmission) -> Result<JobId, SchedulerError>;
	async fn report(&self, job: JobId, task: u32, report: TaskReport) -> Result<(), SchedulerError>;
}
