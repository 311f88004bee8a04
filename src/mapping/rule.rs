use crate::error::Result;
use crate::mapping::pattern::{CaseMode, Pattern};
use serde::Deserialize;
use std::fmt;

/// Which half of a rule a query starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
	/// Source to target.
	Lhs,
	/// Target to source.
	Rhs,
}

impl Direction {
	pub fn other(self) -> Self {
		match self {
			Direction::Lhs => Direction::Rhs,
			Direction::Rhs => Direction::Lhs,
		}
	}

	pub(crate) fn index(self) -> usize {
		match self {
			Direction::Lhs => 0,
			Direction::Rhs => 1,
		}
	}
}

/// What a matching rule does to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
	#[default]
	Map,
	/// Excludes the paths it matches.
	Unmap,
	/// Overlay mapping.
	Remap,
	Havemap,
	/// Adds a target without displacing the ordinary mapping.
	Andmap,
	StreamPaths,
	StreamRemapped,
	StreamIgnored,
	StreamShared,
	StreamPublic,
	StreamPrivate,
	StreamExcluded,
}

impl RuleKind {
	/// Kind marker used in view lines.
	pub fn from_prefix(c: char) -> Option<Self> {
		match c {
			'-' => Some(RuleKind::Unmap),
			'+' => Some(RuleKind::Remap),
			'$' => Some(RuleKind::Havemap),
			'&' => Some(RuleKind::Andmap),
			_ => None,
		}
	}

	pub fn prefix(self) -> &'static str {
		match self {
			RuleKind::Unmap => "-",
			RuleKind::Remap => "+",
			RuleKind::Havemap => "$",
			RuleKind::Andmap => "&",
			_ => "",
		}
	}

	/// Remap and Havemap rules overlay others instead of replacing them.
	pub fn is_additive(self) -> bool {
		matches!(self, RuleKind::Remap | RuleKind::Havemap)
	}

	pub fn is_stream(self) -> bool {
		matches!(
			self,
			RuleKind::StreamPaths
				| RuleKind::StreamRemapped
				| RuleKind::StreamIgnored
				| RuleKind::StreamShared
				| RuleKind::StreamPublic
				| RuleKind::StreamPrivate
				| RuleKind::StreamExcluded
		)
	}

	/// Kind of a rule produced by joining a rule of kind `a` with one of kind `b`.
	pub fn compose(a: RuleKind, b: RuleKind) -> RuleKind {
		let either = |kind: RuleKind| a == kind || b == kind;

		if either(RuleKind::Unmap) {
			RuleKind::Unmap
		} else if either(RuleKind::Havemap) {
			RuleKind::Havemap
		} else if either(RuleKind::Remap) {
			RuleKind::Remap
		} else if either(RuleKind::Andmap) {
			RuleKind::Andmap
		} else if a.is_stream() {
			a
		} else if b.is_stream() {
			b
		} else {
			RuleKind::Map
		}
	}

	/// Numeric code mixed into table fingerprints.
	pub(crate) fn code(self) -> u32 {
		match self {
			RuleKind::Map => 0,
			RuleKind::Unmap => 1,
			RuleKind::Remap => 2,
			RuleKind::Havemap => 3,
			RuleKind::Andmap => 4,
			RuleKind::StreamPaths => 5,
			RuleKind::StreamRemapped => 6,
			RuleKind::StreamIgnored => 7,
			RuleKind::StreamShared => 8,
			RuleKind::StreamPublic => 9,
			RuleKind::StreamPrivate => 10,
			RuleKind::StreamExcluded => 11,
		}
	}
}

impl fmt::Display for RuleKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			RuleKind::Map => "map",
			RuleKind::Unmap => "unmap",
			RuleKind::Remap => "remap",
			RuleKind::Havemap => "havemap",
			RuleKind::Andmap => "andmap",
			RuleKind::StreamPaths => "stream-paths",
			RuleKind::StreamRemapped => "stream-remapped",
			RuleKind::StreamIgnored => "stream-ignored",
			RuleKind::StreamShared => "stream-shared",
			RuleKind::StreamPublic => "stream-public",
			RuleKind::StreamPrivate => "stream-private",
			RuleKind::StreamExcluded => "stream-excluded",
		})
	}
}

/// One line of a view: a source pattern, a target pattern and a kind.
///
/// A rule does not know its precedence; that is its position in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
	source: Pattern,
	target: Pattern,
	kind: RuleKind,
}

impl Rule {
	/// Compile and validate both halves.
	pub fn new(source: &str, target: &str, kind: RuleKind, case_mode: CaseMode) -> Result<Self> {
		let source = Pattern::compile(source, case_mode)?;
		let target = Pattern::compile(target, case_mode)?;
		source.validate_pair(&target)?;

		Ok(Rule {
			source,
			target,
			kind,
		})
	}

	/// Assemble a rule from already compiled halves without validating.
	pub(crate) fn from_patterns(source: Pattern, target: Pattern, kind: RuleKind) -> Self {
		Rule {
			source,
			target,
			kind,
		}
	}

	pub fn source(&self) -> &Pattern {
		&self.source
	}

	pub fn target(&self) -> &Pattern {
		&self.target
	}

	pub fn kind(&self) -> RuleKind {
		self.kind
	}

	/// The half a query in `dir` matches against.
	pub fn pattern(&self, dir: Direction) -> &Pattern {
		match dir {
			Direction::Lhs => &self.source,
			Direction::Rhs => &self.target,
		}
	}

	/// The half a query in `dir` translates into.
	pub fn opposite(&self, dir: Direction) -> &Pattern {
		self.pattern(dir.other())
	}

	pub fn is_parent_of(&self, other: &Rule, dir: Direction) -> bool {
		self.pattern(dir).is_parent_of(other.pattern(dir))
	}

	pub(crate) fn swapped(&self) -> Rule {
		Rule {
			source: self.target.clone(),
			target: self.source.clone(),
			kind: self.kind,
		}
	}

	pub(crate) fn set_case_mode(&mut self, case_mode: CaseMode) {
		self.source.set_case_mode(case_mode);
		self.target.set_case_mode(case_mode);
	}
}

fn quoted(text: &str) -> String {
	if text.contains(' ') {
		format!("\"{text}\"")
	} else {
		text.to_string()
	}
}

impl fmt::Display for Rule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let source = quoted(self.source.text());
		let target = quoted(self.target.text());

		// The kind marker goes inside the quotes.
		if source.starts_with('"') {
			write!(f, "\"{}{}\" {}", self.kind.prefix(), &source[1..source.len() - 1], target)
		} else {
			write!(f, "{}{} {}", self.kind.prefix(), source, target)
		}
	}
}
