//! Typed transcoder argument lists.
//!
//! Arguments are kept as ordered `(flag, value)` pairs and only flattened into an argv at the
//! process boundary, so every builder here can be tested without spawning anything.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::FrameRange;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arg {
	pub flag: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgList(Vec<Arg>);

impl ArgList {
	pub fn new() -> ArgList {
		ArgList::default()
	}

	///Parse user supplied tokens, a flag takes the next token as value unless that is a flag too
	pub fn from_tokens<I, S>(tokens: I) -> ArgList
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut list = ArgList::new();
		let mut tokens = tokens.into_iter().map(Into::into).peekable();
		while let Some(token) = tokens.next() {
			let takes_value = token.starts_with('-')
				&& tokens.peek().is_some_and(|next| !is_flag(next));
			let value = if takes_value { tokens.next() } else { None };
			list.0.push(Arg { flag: token, value });
		}
		list
	}

	pub fn flag(mut self, flag: impl Into<String>) -> ArgList {
		self.push(flag, None::<String>);
		self
	}

	pub fn pair(mut self, flag: impl Into<String>, value: impl ToString) -> ArgList {
		self.push(flag, Some(value.to_string()));
		self
	}

	pub fn path(self, flag: impl Into<String>, path: &Path) -> ArgList {
		self.pair(flag, path.to_string_lossy())
	}

	pub fn extend(mut self, other: &ArgList) -> ArgList {
		self.0.extend(other.0.iter().cloned());
		self
	}

	pub fn push(&mut self, flag: impl Into<String>, value: Option<impl Into<String>>) {
		self.0.push(Arg {
			flag: flag.into(),
			value: value.map(Into::into),
		});
	}

	///Insert at the front, used for options that must precede user arguments
	pub fn prepend(mut self, flag: impl Into<String>, value: impl ToString) -> ArgList {
		self.0.insert(
			0,
			Arg {
				flag: flag.into(),
				value: Some(value.to_string()),
			},
		);
		self
	}

	pub fn contains_flag(&self, flag: &str) -> bool {
		self.0.iter().any(|arg| arg.flag == flag)
	}

	pub fn value_of(&self, flag: &str) -> Option<&str> {
		self.0
			.iter()
			.find(|arg| arg.flag == flag)
			.and_then(|arg| arg.value.as_deref())
	}

	pub fn iter(&self) -> impl Iterator<Item = &Arg> {
		self.0.iter()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn to_argv(&self) -> Vec<String> {
		self.0
			.iter()
			.flat_map(|arg| std::iter::once(arg.flag.clone()).chain(arg.value.clone()))
			.collect()
	}
}

fn is_flag(token: &str) -> bool {
	token.starts_with('-') && token.parse::<f64>().is_err()
}

impl fmt::Display for ArgList {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_argv().join(" "))
	}
}

///`<input_args> -start_number <start> -i <input> -vframes <count> <output_args> -y <output>`
pub fn encode_arguments(
	input_args: &ArgList,
	range: &FrameRange,
	input: &str,
	output_args: &ArgList,
	output: &Path,
) -> ArgList {
	ArgList::new()
		.extend(input_args)
		.pair("-start_number", range.start())
		.pair("-i", input)
		.pair("-vframes", range.count())
		.extend(output_args)
		.path("-y", output)
}

///Concatenate the chunks listed in `manifest` with stream copy, optionally muxing audio
pub fn join_arguments(manifest: &Path, audio: Option<(&Path, &ArgList)>, output: &Path) -> ArgList {
	let mut args = ArgList::new()
		.pair("-f", "concat")
		.pair("-safe", 0)
		.path("-i", manifest);
	if let Some((audio, audio_args)) = audio {
		args = args.path("-i", audio).extend(audio_args);
	}
	args.pair("-c:v", "copy")
		.pair("-movflags", "+faststart")
		.path("-y", output)
}

///Single pass encode of a whole sequence, used when chunking is not worth it
pub fn direct_arguments(
	input_args: &ArgList,
	first_frame: i64,
	input: &str,
	audio: Option<(&Path, &ArgList)>,
	output_args: &ArgList,
	output: &Path,
) -> ArgList {
	let mut args = ArgList::new().extend(input_args);
	if !input_args.contains_flag("-start_number") {
		args = args.pair("-start_number", first_frame);
	}
	args = args.pair("-i", input);
	if let Some((audio, _)) = audio {
		args = args.path("-i", audio);
	}
	args = args.extend(output_args);
	if let Some((_, audio_args)) = audio {
		args = args.extend(audio_args);
	}
	args.path("-y", output)
}
