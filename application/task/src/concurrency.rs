//! Per codec concurrency ceilings.
//!
//! A ceiling only ever lowers the concurrency a job asks for.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codec::{Codec, HardwareMode};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeilingEntry {
	pub codec: Codec,
	pub mode: HardwareMode,
	pub limit: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcurrencyPolicy {
	ceilings: BTreeMap<(Codec, HardwareMode), u32>,
}

impl Default for ConcurrencyPolicy {
	fn default() -> Self {
		use Codec::*;
		use HardwareMode::*;
		let ceilings = [
			((Prores, Gpu), 1),
			((Prores, Cpu), 1),
			((H264, Gpu), 2),
			((H264, Cpu), 4),
			((H265, Gpu), 2),
			((H265, Cpu), 4),
			((Hap, Gpu), 4),
			((Hap, Cpu), 4),
		];
		ConcurrencyPolicy {
			ceilings: BTreeMap::from(ceilings),
		}
	}
}

impl ConcurrencyPolicy {
	///A policy without any ceiling
	pub fn unlimited() -> ConcurrencyPolicy {
		ConcurrencyPolicy {
			ceilings: BTreeMap::new(),
		}
	}

	///Defaults overridden by `entries`
	pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a CeilingEntry>) -> ConcurrencyPolicy {
		let mut policy = ConcurrencyPolicy::default();
		for entry in entries {
			policy.set(entry.codec, entry.mode, entry.limit);
		}
		policy
	}

	pub fn set(&mut self, codec: Codec, mode: HardwareMode, limit: u32) {
		self.ceilings.insert((codec, mode), limit);
	}

	pub fn ceiling(&self, codec: Codec, mode: HardwareMode) -> Option<u32> {
		self.ceilings.get(&(codec, mode)).copied()
	}

	///`min(requested, ceiling)`, or `requested` when there is no ceiling for the pair
	pub fn cap(&self, requested: u32, codec: Codec, mode: HardwareMode) -> u32 {
		let capped = match self.ceiling(codec, mode) {
			Some(ceiling) => requested.min(ceiling),
			None => requested,
		};
		if capped != requested {
			info!(%codec, %mode, "capping concurrent tasks from {requested} to {capped}");
		}
		capped
	}
}
