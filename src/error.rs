use std::path::PathBuf;

/// Library-level structured errors for viewmap.
///
/// Use `thiserror` for structured errors that library consumers can match on.
/// The CLI binary wraps these with `anyhow` for rich context chains.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
	#[error("Too many '...' wildcards in pattern: {pattern}")]
	ExtraDots { pattern: String },

	#[error("Too many '*' wildcards in pattern: {pattern}")]
	ExtraStars { pattern: String },

	#[error("Wildcard referenced more than once in pattern: {pattern}")]
	Duplicate { pattern: String },

	#[error("Adjacent wildcards in pattern: {pattern}")]
	Juxtaposed { pattern: String },

	#[error("Wildcards differ between '{source_half}' and '{target_half}'")]
	WildMismatch {
		source_half: String,
		target_half: String,
	},

	#[error("Too many wildcards in pattern: {pattern} (limit {limit})")]
	TooWild { pattern: String, limit: usize },

	#[error("Failed to read view file: {path}")]
	ConfigReadError {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse view file: {path}")]
	ConfigParseError {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("Invalid view line: {line} ({reason})")]
	InvalidViewLine { line: String, reason: String },

	#[error("Mutually exclusive options: {option1} and {option2}")]
	MutuallyExclusive { option1: String, option2: String },
}

/// Result type alias using MapError.
pub type Result<T> = std::result::Result<T, MapError>;
