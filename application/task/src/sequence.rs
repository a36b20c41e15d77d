//! Image sequence patterns, `shot.####.exr` or `shot.%04d.exr`.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

static HASH_PADDING: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^(?P<head>.+?)(?P<padding>#+)(?P<tail>\.\w+)$").expect("valid hash padding regex")
});
static PRINTF_PADDING: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^(?P<head>.+)%(?P<padding>0?\d?)d(?P<tail>\.\w+)$").expect("valid printf padding regex")
});

#[derive(Clone, Debug)]
pub struct SequencePattern {
	directory: PathBuf,
	prefix: String,
	///Zero padding width, 0 for `%d`
	padding: usize,
	tail: String,
	matcher: Regex,
}

impl PartialEq for SequencePattern {
	fn eq(&self, other: &Self) -> bool {
		self.directory == other.directory
			&& self.prefix == other.prefix
			&& self.padding == other.padding
			&& self.tail == other.tail
	}
}

impl SequencePattern {
	///`None` when `pattern` names a single file
	pub fn parse(pattern: &str) -> Option<SequencePattern> {
		let (head, padding, tail) = if let Some(captures) = HASH_PADDING.captures(pattern) {
			(
				captures["head"].to_string(),
				captures["padding"].len(),
				captures["tail"].to_string(),
			)
		} else {
			let captures = PRINTF_PADDING.captures(pattern)?;
			let padding = captures["padding"].trim_start_matches('0');
			(
				captures["head"].to_string(),
				padding.parse().unwrap_or(0),
				captures["tail"].to_string(),
			)
		};
		let (directory, prefix) = match head.rfind(['/', '\\']) {
			Some(split) => (PathBuf::from(&head[..split]), head[split + 1..].to_string()),
			None => (PathBuf::new(), head),
		};
		let matcher = Regex::new(&format!(
			r"^{}(-?\d+){}$",
			regex::escape(&prefix),
			regex::escape(&tail)
		))
		.ok()?;
		Some(SequencePattern {
			directory,
			prefix,
			padding,
			tail,
			matcher,
		})
	}

	pub fn is_sequence(pattern: &str) -> bool {
		HASH_PADDING.is_match(pattern) || PRINTF_PADDING.is_match(pattern)
	}

	pub fn directory(&self) -> &std::path::Path {
		&self.directory
	}

	///File name part with the frame number replaced by `*`
	pub fn file_pattern(&self) -> String {
		format!("{}*{}", self.prefix, self.tail)
	}

	fn file_name(&self, frame_field: &str) -> String {
		format!("{}{frame_field}{}", self.prefix, self.tail)
	}

	///Path in the form the transcoder expects, `%04d` style
	pub fn printf(&self) -> String {
		let field = match self.padding {
			0 => "%d".to_string(),
			width => format!("%0{width}d"),
		};
		self.directory
			.join(self.file_name(&field))
			.to_string_lossy()
			.into_owned()
	}

	pub fn frame_path(&self, frame: i64) -> PathBuf {
		let field = format!("{frame:0width$}", width = self.padding);
		self.directory.join(self.file_name(&field))
	}

	///Frame number of a file that belongs to this sequence
	pub fn frame_of(&self, file_name: &str) -> Option<i64> {
		let captures = self.matcher.captures(file_name)?;
		let digits = captures.get(1)?.as_str();
		if digits.trim_start_matches('-').len() < self.padding {
			return None;
		}
		digits.parse().ok()
	}

	///Same sequence under another directory, used when frames are staged locally
	pub fn relocate(&self, directory: impl Into<PathBuf>) -> SequencePattern {
		SequencePattern {
			directory: directory.into(),
			..self.clone()
		}
	}
}
