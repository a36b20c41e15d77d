//! Splits a frame list into balanced contiguous chunks.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use crate::{ChunkPlan, FrameRange};

///Plan the chunks for `frames`, or `None` when the sequence is shorter than
///`target_chunk_size * min_chunks` and should be encoded in one piece.
///
///Frames are sorted and deduplicated first. Boundaries are frame numbers, so sparse
///sequences keep their holes inside the chunk that spans them.
pub fn plan(
	frames: &[i64],
	target_chunk_size: NonZeroUsize,
	min_chunks: NonZeroUsize,
) -> Option<ChunkPlan> {
	let frames: Vec<i64> = frames.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
	let total = frames.len();
	let target = target_chunk_size.get();
	let min_chunks = min_chunks.get();
	if total < target.saturating_mul(min_chunks) {
		return None;
	}
	let chunk_count = min_chunks.max(total.div_ceil(target));
	let chunk_size = total.div_ceil(chunk_count);
	let ranges = frames
		.chunks(chunk_size)
		.map(|chunk| {
			let first = chunk[0];
			let last = chunk[chunk.len() - 1];
			FrameRange::new(first, last, chunk.len())
		})
		.collect();
	Some(ChunkPlan::from_ranges(ranges))
}
