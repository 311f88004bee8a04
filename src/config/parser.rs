use crate::config::types::{RuleSpec, ViewConfig};
use crate::error::{MapError, Result};
use crate::mapping::{MapOptions, RuleKind, RuleTable};
use std::path::Path;

/// Parse a view file from the given path.
pub fn parse_view_file(path: &Path) -> Result<ViewConfig> {
	let content = std::fs::read_to_string(path).map_err(|source| MapError::ConfigReadError {
		path: path.to_path_buf(),
		source,
	})?;

	parse_view_str(&content, path)
}

/// Parse a view from a string (useful for testing).
pub fn parse_view_str(content: &str, path: &Path) -> Result<ViewConfig> {
	let config: ViewConfig =
		toml::from_str(content).map_err(|source| MapError::ConfigParseError {
			path: path.to_path_buf(),
			source,
		})?;

	// Validate the parsed config, then make sure every pattern compiles
	config.validate()?;
	build_table(&config)?;

	Ok(config)
}

/// Split a view line into its source, target and kind.
///
/// Halves are separated by whitespace. Double quotes protect spaces and may
/// enclose the kind prefix (`"-//a b/..." //c/...`) or follow it
/// (`-"//a b/..." //c/...`). A line with a single half maps it to itself.
pub fn parse_view_line(line: &str) -> Result<(String, String, RuleKind)> {
	let invalid = |reason: &str| MapError::InvalidViewLine {
		line: line.to_string(),
		reason: reason.to_string(),
	};

	let mut halves = Vec::new();
	let mut current = String::new();
	let mut in_half = false;
	let mut quoted = false;

	for c in line.chars() {
		match c {
			'"' => {
				quoted = !quoted;
				in_half = true;
			}
			c if c.is_whitespace() && !quoted => {
				if in_half {
					halves.push(std::mem::take(&mut current));
					in_half = false;
				}
			}
			c => {
				current.push(c);
				in_half = true;
			}
		}
	}

	if quoted {
		return Err(invalid("unterminated quote"));
	}
	if in_half {
		halves.push(current);
	}

	let (mut source, target) = match halves.as_slice() {
		[single] => (single.clone(), None),
		[source, target] => (source.clone(), Some(target.clone())),
		[] => return Err(invalid("empty line")),
		_ => return Err(invalid("more than two halves")),
	};

	let mut kind = RuleKind::Map;
	if let Some(prefixed) = source.chars().next().and_then(RuleKind::from_prefix) {
		kind = prefixed;
		source.remove(0);
	}

	let target = target.unwrap_or_else(|| source.clone());
	if source.is_empty() || target.is_empty() {
		return Err(invalid("empty half"));
	}

	Ok((source, target, kind))
}

fn resolve_spec(spec: &RuleSpec) -> Result<(String, String, RuleKind)> {
	if let Some(line) = &spec.line {
		let (source, target, kind) = parse_view_line(line)?;
		// A prefix on the line wins over the structured kind.
		let kind = if kind == RuleKind::Map { spec.kind } else { kind };
		return Ok((source, target, kind));
	}

	let source = spec.source.clone().ok_or_else(|| MapError::InvalidViewLine {
		line: String::new(),
		reason: "rule needs a line or a source".to_string(),
	})?;
	let target = spec.target.clone().unwrap_or_else(|| source.clone());
	Ok((source, target, spec.kind))
}

/// Build the rule table a view file describes.
pub fn build_table(config: &ViewConfig) -> Result<RuleTable> {
	let mut table = RuleTable::with_options(MapOptions {
		case_mode: config.case,
		limits: config.limits.clone(),
	});

	for line in &config.view {
		let (source, target, kind) = parse_view_line(line)?;
		table.insert(&source, &target, kind)?;
	}

	for spec in &config.rules {
		let (source, target, kind) = resolve_spec(spec)?;
		table.insert(&source, &target, kind)?;
	}

	Ok(table)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mapping::{CaseMode, Direction};
	use std::path::PathBuf;

	#[test]
	fn test_parse_empty_view() {
		let path = PathBuf::from("test.toml");
		let config = parse_view_str("", &path).unwrap();

		assert_eq!(config.case, CaseMode::Sensitive);
		assert!(config.view.is_empty());
		assert!(config.rules.is_empty());
		assert_eq!(config.limits.dedup_window, 8);
	}

	#[test]
	fn test_parse_basic_view() {
		let content = r#"
case = "insensitive"
view = [
    "//depot/... //client/...",
    "-//depot/secret/... //client/secret/...",
]

[limits]
max-wildcards = 4
"#;
		let path = PathBuf::from("test.toml");
		let config = parse_view_str(content, &path).unwrap();

		assert_eq!(config.case, CaseMode::Insensitive);
		assert_eq!(config.view.len(), 2);
		assert_eq!(config.limits.max_wildcards, 4);
		assert_eq!(config.limits.max_rows, 100_000);

		let table = build_table(&config).unwrap();
		assert_eq!(table.len(), 2);
		assert_eq!(table.case_mode(), CaseMode::Insensitive);
		assert_eq!(table.options().limits.max_wildcards, 4);
		assert!(table.check(Direction::Lhs, "//DEPOT/Secret/x").is_none());
	}

	#[test]
	fn test_parse_rules_array_of_tables() {
		let content = r#"
view = ["//depot/... //client/..."]

[[rules]]
source = "//depot/doc/..."
target = "//client/doc/..."
kind = "andmap"

[[rules]]
line = "$//depot/lib/... //client/lib/..."

[[rules]]
source = "//depot/only"
"#;
		let path = PathBuf::from("test.toml");
		let config = parse_view_str(content, &path).unwrap();
		assert_eq!(config.rules.len(), 3);
		assert_eq!(config.rules[0].kind, RuleKind::Andmap);

		let table = build_table(&config).unwrap();
		assert_eq!(table.len(), 4);
		assert_eq!(table.get(1).unwrap().kind(), RuleKind::Andmap);
		assert_eq!(table.get(2).unwrap().kind(), RuleKind::Havemap);
		assert_eq!(table.get(3).unwrap().target().text(), "//depot/only");
	}

	#[test]
	fn test_mutually_exclusive_line_and_source() {
		let content = r#"
[[rules]]
line = "//depot/... //client/..."
source = "//depot/..."
"#;
		let path = PathBuf::from("test.toml");
		let result = parse_view_str(content, &path);

		match result.unwrap_err() {
			MapError::MutuallyExclusive { option1, option2 } => {
				assert_eq!(option1, "line");
				assert_eq!(option2, "source");
			}
			other => panic!("Expected MutuallyExclusive error, got {other:?}"),
		}
	}

	#[test]
	fn test_invalid_pattern_rejected() {
		let content = r#"view = ["//depot/*... //client/*..."]"#;
		let path = PathBuf::from("test.toml");
		let err = parse_view_str(content, &path).unwrap_err();
		assert!(matches!(err, MapError::Juxtaposed { .. }));
	}

	#[test]
	fn test_bad_toml() {
		let path = PathBuf::from("test.toml");
		let err = parse_view_str("view = [", &path).unwrap_err();
		assert!(matches!(err, MapError::ConfigParseError { .. }));
	}

	#[test]
	fn test_parse_view_line_forms() {
		assert_eq!(
			parse_view_line("  //depot/...   //client/... ").unwrap(),
			("//depot/...".to_string(), "//client/...".to_string(), RuleKind::Map)
		);
		assert_eq!(
			parse_view_line("-//depot/x/... //client/x/...").unwrap().2,
			RuleKind::Unmap
		);
		assert_eq!(
			parse_view_line("//depot/a").unwrap(),
			("//depot/a".to_string(), "//depot/a".to_string(), RuleKind::Map)
		);
	}

	#[test]
	fn test_parse_view_line_quotes() {
		let inside = parse_view_line("\"&//depot/my dir/...\" //client/x/...").unwrap();
		assert_eq!(
			inside,
			("//depot/my dir/...".to_string(), "//client/x/...".to_string(), RuleKind::Andmap)
		);

		let outside = parse_view_line("+\"//depot/my dir/...\" \"//client/my dir/...\"").unwrap();
		assert_eq!(outside.0, "//depot/my dir/...");
		assert_eq!(outside.1, "//client/my dir/...");
		assert_eq!(outside.2, RuleKind::Remap);
	}

	#[test]
	fn test_parse_view_line_errors() {
		for line in ["", "   ", "a b c", "\"//depot/open", "- //client/..."] {
			let err = parse_view_line(line).unwrap_err();
			assert!(matches!(err, MapError::InvalidViewLine { .. }), "{line}");
		}
	}
}
