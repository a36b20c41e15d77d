//! # In memory farm
//!
//! Stores submitted jobs and hands out tasks whose dependencies are fulfilled.
//!
//! ## Operations
//!
//! - Submit job, with dependency edges checked against the task count
//! - Allocate task, honouring the job's concurrency limit
//! - Report task, a success fulfills the tasks waiting on it
//! - Query task and job state
//!
//! A failed task never fulfills its dependents, so a join behind it stays blocked.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{FarmScheduler, JobId, JobSubmission, TaskReport, TaskStatus};
use crate::metadata::JobMetadata;
use crate::SchedulerError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
	Pending,
	Running,
	Succeeded,
	Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
	Queued,
	Running,
	Completed,
	Failed,
}

///A task handed to a worker
#[derive(Clone, Debug)]
pub struct Allocation {
	pub job: JobId,
	pub task: u32,
	pub instance: Uuid,
	pub metadata: Arc<JobMetadata>,
}

struct TaskEntry {
	state: TaskState,
	waiting_on: BTreeSet<u32>,
	diagnostics: Vec<String>,
}

struct JobEntry {
	submission: JobSubmission,
	tasks: Vec<TaskEntry>,
}

impl JobEntry {
	fn running(&self) -> usize {
		self.tasks
			.iter()
			.filter(|task| task.state == TaskState::Running)
			.count()
	}

	fn state(&self) -> JobState {
		let count = |state| self.tasks.iter().filter(|task| task.state == state).count();
		if count(TaskState::Failed) > 0 {
			JobState::Failed
		} else if count(TaskState::Succeeded) == self.tasks.len() {
			JobState::Completed
		} else if count(TaskState::Pending) == self.tasks.len() {
			JobState::Queued
		} else {
			JobState::Running
		}
	}
}

type LocalMap = HashMap<JobId, JobEntry>;

#[derive(Default)]
pub struct LocalFarm {
	jobs: Mutex<LocalMap>,
}

impl LocalFarm {
	fn lock(&self) -> MutexGuard<'_, LocalMap> {
		self.jobs
			.lock()
			.unwrap_or_else(|poison| poison.into_inner())
	}

	///Hand out a pending task with no unfulfilled dependency, if its job is below its concurrency
	pub fn allocate_task(&self) -> Option<Allocation> {
		let mut binding = self.lock();
		let (job_id, job) = binding.iter_mut().find(|(_, job)| {
			job.running() < job.submission.concurrency as usize
				&& job.tasks.iter().any(|task| is_eligible(task))
		})?;
		let (position, task) = job
			.tasks
			.iter_mut()
			.enumerate()
			.find(|(_, task)| is_eligible(task))?;
		let instance = Uuid::new_v4();
		task.state = TaskState::Running;
		debug!(job_id = %job_id, task = position, %instance, "allocated task");
		Some(Allocation {
			job: job_id.clone(),
			task: position as u32,
			instance,
			metadata: job.submission.metadata.clone(),
		})
	}

	pub fn task_state(&self, job_id: &JobId, task: u32) -> Result<TaskState, SchedulerError> {
		let binding = self.lock();
		let job = binding
			.get(job_id)
			.ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
		job.tasks
			.get(task as usize)
			.map(|entry| entry.state)
			.ok_or_else(|| SchedulerError::TaskNotFound {
				job: job_id.to_string(),
				task,
			})
	}

	pub fn job_state(&self, job_id: &JobId) -> Result<JobState, SchedulerError> {
		self.lock()
			.get(job_id)
			.map(JobEntry::state)
			.ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))
	}

	///Diagnostics of the last report for `task`
	pub fn diagnostics(&self, job_id: &JobId, task: u32) -> Result<Vec<String>, SchedulerError> {
		let binding = self.lock();
		let job = binding
			.get(job_id)
			.ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
		job.tasks
			.get(task as usize)
			.map(|entry| entry.diagnostics.clone())
			.ok_or_else(|| SchedulerError::TaskNotFound {
				job: job_id.to_string(),
				task,
			})
	}

	fn fulfill(job: &mut JobEntry, task: u32) {
		for entry in job.tasks.iter_mut() {
			entry.waiting_on.remove(&task);
		}
	}
}

fn is_eligible(task: &TaskEntry) -> bool {
	task.state == TaskState::Pending && task.waiting_on.is_empty()
}

impl FarmScheduler for LocalFarm {
	async fn submit(&self, job: JobSubmission) -> Result<JobId, SchedulerError> {
		let mut tasks: Vec<TaskEntry> = (0..job.task_count)
			.map(|_| TaskEntry {
				state: TaskState::Pending,
				waiting_on: BTreeSet::new(),
				diagnostics: Vec::new(),
			})
			.collect();
		for edge in &job.edges {
			if edge.encode >= job.task_count || edge.encode == edge.join {
				return Err(SchedulerError::InvalidDependency(edge.encode));
			}
			let join = tasks
				.get_mut(edge.join as usize)
				.ok_or(SchedulerError::InvalidDependency(edge.join))?;
			join.waiting_on.insert(edge.encode);
		}
		let key = JobId::from(Uuid::new_v4());
		info!(job_id = %key, name = %job.name, tasks = job.task_count, concurrency = job.concurrency, "job submitted");
		self.lock().insert(
			key.clone(),
			JobEntry {
				submission: job,
				tasks,
			},
		);
		Ok(key)
	}

	async fn report(&self, job_id: JobId, task: u32, report: TaskReport) -> Result<(), SchedulerError> {
		let mut binding = self.lock();
		let job = binding
			.get_mut(&job_id)
			.ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
		let entry = job
			.tasks
			.get_mut(task as usize)
			.ok_or_else(|| SchedulerError::TaskNotFound {
				job: job_id.to_string(),
				task,
			})?;
		entry.diagnostics = report.diagnostics;
		match report.status {
			TaskStatus::Success => {
				entry.state = TaskState::Succeeded;
				LocalFarm::fulfill(job, task);
			}
			TaskStatus::Failure => {
				entry.state = TaskState::Failed;
				warn!(job_id = %job_id, task, "task failed, dependents stay blocked");
			}
		}
		Ok(())
	}
}
