use viewmap::mapping::{Direction, EmptyReason, JoinLimits, MapOptions, RuleKind, RuleTable};
use viewmap::{MapError, Rule};

fn view(lines: &[&str]) -> RuleTable {
	let mut table = RuleTable::new();
	for line in lines {
		let (source, target, kind) = viewmap::config::parse_view_line(line).unwrap();
		table.insert(&source, &target, kind).unwrap();
	}
	table
}

fn translated(table: &RuleTable, dir: Direction, path: &str) -> Option<String> {
	table.translate(dir, path).map(|t| t.path)
}

/// Rules from highest precedence down.
fn lines(table: &RuleTable) -> Vec<String> {
	table.iter().rev().map(Rule::to_string).collect()
}

const SAMPLE: &[&str] = &[
	"//depot/a/... //client/a/...",
	"//depot/%%1/%%2 //client/sub/%%2/%%1",
	"//depot/deep/.../* //client/.../deep/*",
];

// ============================================================================
// Translation
// ============================================================================

#[test]
fn test_sample_view_forward() {
	let table = view(SAMPLE);

	let cases = [
		("//depot/a/b", Some("//client/sub/b/a")),
		("//depot/a/b/c/d", Some("//client/a/b/c/d")),
		("//depot/f/j", Some("//client/sub/j/f")),
		("//depot/numberall", None),
		("//depot/deep/here/there/everywhere", Some("//client/here/there/deep/everywhere")),
		("//depot/choosy/little/beggars", None),
	];

	for (path, expected) in cases {
		assert_eq!(translated(&table, Direction::Lhs, path).as_deref(), expected, "{path}");
	}
}

#[test]
fn test_precedence_follows_declaration_order() {
	let mut table = view(&["//depot/... //out1/...", "//depot/sub/... //out2/..."]);
	assert_eq!(translated(&table, Direction::Lhs, "//depot/sub/x").as_deref(), Some("//out2/x"));
	assert_eq!(table.check(Direction::Lhs, "//depot/sub/x").unwrap().precedence, 1);

	table.reverse();
	assert_eq!(translated(&table, Direction::Lhs, "//depot/sub/x").as_deref(), Some("//out1/sub/x"));
}

#[test]
fn test_unmap_excludes_both_directions() {
	let table = view(&["//depot/... //client/...", "-//depot/tmp/... //client/tmp/..."]);
	assert!(table.check(Direction::Lhs, "//depot/tmp/x").is_none());
	assert!(table.check(Direction::Rhs, "//client/tmp/x").is_none());
	assert_eq!(translated(&table, Direction::Rhs, "//client/src/x").as_deref(), Some("//depot/src/x"));
}

#[test]
fn test_andmaps_explode() {
	let table = view(&[
		"//depot/... //client/...",
		"&//depot/doc/... //mirror1/doc/...",
		"&//depot/doc/... //mirror2/doc/...",
	]);

	let found: Vec<String> = table
		.explode(Direction::Lhs, "//depot/doc/readme")
		.into_iter()
		.map(|t| t.path)
		.collect();
	assert_eq!(found, vec!["//mirror2/doc/readme", "//mirror1/doc/readme", "//client/doc/readme"]);

	// The ordinary rule still decides a plain lookup.
	assert_eq!(
		translated(&table, Direction::Lhs, "//depot/doc/readme").as_deref(),
		Some("//client/doc/readme")
	);
}

#[test]
fn test_unmap_under_andmap_decides_no_match() {
	let table = view(&[
		"//depot/... //client/...",
		"-//depot/x/...",
		"&//depot/x/... //client/y/...",
	]);

	assert!(table.check(Direction::Lhs, "//depot/x/f").is_none());
	assert!(translated(&table, Direction::Lhs, "//depot/x/f").is_none());
	assert_eq!(translated(&table, Direction::Lhs, "//depot/z/f").as_deref(), Some("//client/z/f"));
}

// ============================================================================
// Disambiguation
// ============================================================================

#[test]
fn test_sample_view_disambiguated() {
	let mut table = view(SAMPLE);
	table.disambiguate().unwrap();

	let found = lines(&table);
	assert_eq!(found.first().map(String::as_str), Some("//depot/deep/.../* //client/.../deep/*"));
	assert_eq!(found.last().map(String::as_str), Some("//depot/a/... //client/a/..."));
	for expected in [
		"-//depot/%%1/deep //client/sub/deep/%%1",
		"//depot/%%1/%%2 //client/sub/%%2/%%1",
		"-//depot/a/%%1 //client/a/%%1",
	] {
		assert!(found.iter().any(|line| line == expected), "missing {expected}: {found:?}");
	}

	// Forward translation is unchanged.
	assert_eq!(translated(&table, Direction::Lhs, "//depot/a/b").as_deref(), Some("//client/sub/b/a"));
	assert_eq!(translated(&table, Direction::Lhs, "//depot/a/b/c/d").as_deref(), Some("//client/a/b/c/d"));
}

#[test]
fn test_sample_view_disambiguated_backward() {
	let mut table = view(SAMPLE);
	table.disambiguate().unwrap();

	let cases = [
		("//client/a/b", None),
		("//client/a/b/c/d", Some("//depot/a/b/c/d")),
		("//client/sub/j/f", Some("//depot/f/j")),
		("//client/numberall", None),
		("//client/here/there/deep/everywhere", Some("//depot/deep/here/there/everywhere")),
		("//client/deep/here/there/everywhere", None),
		("//client/a/test", None),
	];

	for (path, expected) in cases {
		assert_eq!(translated(&table, Direction::Rhs, path).as_deref(), expected, "{path}");
	}
}

#[test]
fn test_disambiguate_twice_behaves_the_same() {
	let mut once = view(SAMPLE);
	once.disambiguate().unwrap();
	let mut twice = once.clone();
	twice.disambiguate().unwrap();

	for path in ["//depot/a/b", "//depot/a/b/c/d", "//depot/deep/x/y", "//depot/q/r"] {
		assert_eq!(
			translated(&once, Direction::Lhs, path),
			translated(&twice, Direction::Lhs, path),
			"{path}"
		);
	}
	for path in ["//client/a/b", "//client/sub/b/a", "//client/x/deep/y"] {
		assert_eq!(
			translated(&once, Direction::Rhs, path),
			translated(&twice, Direction::Rhs, path),
			"{path}"
		);
	}
}

// ============================================================================
// Joins
// ============================================================================

#[test]
fn test_join_through_branch() {
	let depot_to_branch = view(&["//depot/... //branch/..."]);
	let branch_to_client = view(&["//branch/... //client/..."]);

	let joined = depot_to_branch.join(Direction::Rhs, &branch_to_client, Direction::Lhs);
	assert_eq!(lines(&joined), vec!["//depot/... //client/..."]);
	assert_eq!(
		translated(&joined, Direction::Lhs, "//depot/x/y.c").as_deref(),
		Some("//client/x/y.c")
	);
}

#[test]
fn test_join_with_identity_maps() {
	let client = view(&["//depot/... //client/..."]);
	let files = view(&["//depot/foo/...", "//depot/bar/..."]);

	let joined = client.join(Direction::Lhs, &files, Direction::Lhs);
	assert_eq!(
		lines(&joined),
		vec!["//client/bar/... //depot/bar/...", "//client/foo/... //depot/foo/..."]
	);

	let restricted = client.join2(Direction::Lhs, &files, Direction::Lhs);
	assert_eq!(
		lines(&restricted),
		vec!["//depot/bar/... //client/bar/...", "//depot/foo/... //client/foo/..."]
	);
}

#[test]
fn test_restrict_sample_view_to_everything() {
	let table = view(SAMPLE);
	let everything = view(&["..."]);

	let restricted = table.join2(Direction::Lhs, &everything, Direction::Lhs);
	let found = lines(&restricted);
	for expected in [
		"//depot/deep/.../%%1 //client/.../deep/%%1",
		"//depot/%%1/%%2 //client/sub/%%2/%%1",
		"//depot/a/... //client/a/...",
	] {
		assert!(found.iter().any(|line| line == expected), "missing {expected}: {found:?}");
	}
}

#[test]
fn test_join_disjoint_keeps_reason() {
	let a = view(&["//depot/... //branch/..."]);
	let b = view(&["//other/... //client/..."]);

	let joined = a.join_with_reason(Direction::Rhs, &b, Direction::Lhs, "nothing in common");
	assert!(joined.is_empty());
	assert_eq!(joined.empty_reason(), Some(&EmptyReason::Reason("nothing in common".to_string())));
	assert!(!joined.join_error());

	// An empty input passes its reason on.
	let again = joined.join_with_reason(Direction::Rhs, &a, Direction::Lhs, "second");
	assert_eq!(again.empty_reason(), Some(&EmptyReason::Reason("nothing in common".to_string())));
}

#[test]
fn test_join_check() {
	let table = view(&["//depot/main/... //client/..."]);
	assert!(table.join_check(Direction::Lhs, "//depot/main/src/..."));
	assert!(table.join_check(Direction::Lhs, "//depot/..."));
	assert!(!table.join_check(Direction::Lhs, "//depot/dev/..."));
}

#[test]
fn test_join_row_limit_empties_table() {
	let options = MapOptions {
		limits: JoinLimits {
			max_rows: 0,
			row_cap: 2,
			..JoinLimits::default()
		},
		..MapOptions::default()
	};
	let mut a = RuleTable::with_options(options);
	for name in ["a", "b", "c"] {
		a.insert(&format!("//depot/{name}/..."), &format!("//client/{name}/..."), RuleKind::Map)
			.unwrap();
	}
	let everything = view(&["//... //..."]);

	let joined = a.join(Direction::Lhs, &everything, Direction::Lhs);
	assert!(joined.is_empty());
	assert_eq!(joined.empty_reason(), Some(&EmptyReason::TooWild));
}

#[test]
fn test_join_too_many_wildcards_is_an_error() {
	let stars = "/*".repeat(10);
	let wide = view(&[&format!("//a{stars} //b{stars}")]);
	let onward = view(&["//b/... //c/..."]);

	let joined = wide.join(Direction::Rhs, &onward, Direction::Lhs);
	assert!(joined.is_empty());
	assert!(joined.join_error());
	assert_eq!(joined.empty_reason(), Some(&EmptyReason::TooWild));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_eleven_ellipses_are_too_wild() {
	let pattern = format!("//depot{}", "/...x".repeat(11));
	let mut table = RuleTable::new();
	let err = table.insert(&pattern, &pattern, RuleKind::Map).unwrap_err();
	assert!(matches!(err, MapError::TooWild { .. }), "{err:?}");
}

#[test]
fn test_mismatched_wildcards_rejected() {
	let mut table = RuleTable::new();
	let err = table
		.insert("//depot/%%1/%%2", "//client/%%1", RuleKind::Map)
		.unwrap_err();
	assert!(matches!(err, MapError::WildMismatch { .. }));
}
