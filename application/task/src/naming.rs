//! Deterministic names for the artifacts a chunked job leaves on shared storage.
//!
//! The join task and the cleanup both rebuild these names from `(basename, index, container)`,
//! nothing is ever listed from disk.

use std::path::Path;

///`{basename}_chunk{index+1:03}.{container}`
pub fn chunk_file_name(basename: &str, index: u32, container: &str) -> String {
	format!("{basename}_chunk{:03}.{container}", index + 1)
}

pub fn manifest_file_name(basename: &str) -> String {
	format!("{basename}_concat.txt")
}

///Concat demuxer list, one `file '<path>'` line per chunk with forward slashes
pub fn manifest_contents<P: AsRef<Path>>(chunks: &[P]) -> String {
	chunks
		.iter()
		.map(|chunk| {
			let path = chunk.as_ref().to_string_lossy().replace('\\', "/");
			format!("file '{}'\n", path.replace('\'', r"'\''"))
		})
		.collect()
}
