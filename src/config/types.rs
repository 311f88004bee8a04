use crate::error::MapError;
use crate::mapping::{CaseMode, JoinLimits, RuleKind};
use serde::Deserialize;
use std::path::PathBuf;

/// Top-level contents of a view file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ViewConfig {
	/// How patterns compare characters.
	#[serde(default)]
	pub case: CaseMode,

	/// Overrides for join limits.
	#[serde(default)]
	pub limits: JoinLimits,

	/// View lines, lowest precedence first.
	#[serde(default)]
	pub view: Vec<String>,

	/// Structured rules, appended after the view lines.
	#[serde(default)]
	pub rules: Vec<RuleSpec>,
}

/// One structured rule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleSpec {
	/// A full view line (mutually exclusive with source and target).
	pub line: Option<String>,

	pub source: Option<String>,

	/// Defaults to the source when omitted.
	pub target: Option<String>,

	#[serde(default)]
	pub kind: RuleKind,
}

/// A parsed view file with the path it came from.
#[derive(Debug, Clone)]
pub struct LoadedView {
	pub config: ViewConfig,
	pub path: PathBuf,
}

impl RuleSpec {
	/// Validate that a rule is given one way only.
	pub fn validate(&self) -> Result<(), MapError> {
		let given = [
			("line", self.line.is_some()),
			("source", self.source.is_some()),
			("target", self.target.is_some()),
		];

		let set_fields: Vec<_> = given
			.iter()
			.filter(|(_, is_set)| *is_set)
			.map(|(name, _)| *name)
			.collect();

		match set_fields.as_slice() {
			[] => Err(MapError::InvalidViewLine {
				line: String::new(),
				reason: "rule needs a line or a source".to_string(),
			}),
			["line", other, ..] => Err(MapError::MutuallyExclusive {
				option1: "line".to_string(),
				option2: other.to_string(),
			}),
			["target"] => Err(MapError::InvalidViewLine {
				line: self.target.clone().unwrap_or_default(),
				reason: "rule has a target but no source".to_string(),
			}),
			_ => Ok(()),
		}
	}
}

impl ViewConfig {
	/// Validate all structured rules.
	pub fn validate(&self) -> Result<(), MapError> {
		for rule in &self.rules {
			rule.validate()?;
		}
		Ok(())
	}
}
