use crate::error::Result;
use crate::mapping::join::JoinState;
use crate::mapping::pattern::Pattern;
use crate::mapping::rule::{Rule, RuleKind};
use crate::mapping::table::RuleTable;

impl RuleTable {
	/// Make precedence explicit.
	///
	/// Wherever a higher rule overlaps a lower one, the lower rule is
	/// preceded by Unmaps carving out the overlap, so every path is matched
	/// by at most one ordinary rule. Unmap lines themselves are dropped once
	/// they have been applied to the rules below them. Overlay rules do not
	/// hide anything beneath them and carve nothing.
	///
	/// Running it on a table it already produced changes nothing. An overlap
	/// whose composition needs more than `max_wildcards` wildcards is not
	/// carved; the rest of the table still is.
	#[tracing::instrument(level = "debug", skip_all, fields(rules = self.len()))]
	pub fn disambiguate(&mut self) -> Result<()> {
		let case_mode = self.case_mode();
		let max_wildcards = self.options().limits.max_wildcards;
		let rules: Vec<Rule> = self.iter().cloned().collect();
		let mut out = RuleTable::with_options(self.options().clone());

		for (index, rule) in rules.iter().enumerate().rev() {
			if rule.kind() == RuleKind::Unmap {
				continue;
			}

			for higher in rules[index + 1..].iter().rev() {
				let mut carve = |state: &JoinState<'_>| {
					let source = rule.source().expand(state.buffer(), state.right());
					let target = rule.target().expand(state.buffer(), state.right());
					out.insert_no_duplicates_rule(Rule::from_patterns(
						Pattern::parse(&source, case_mode),
						Pattern::parse(&target, case_mode),
						RuleKind::Unmap,
					));
				};

				let pairs = match higher.kind() {
					RuleKind::Remap | RuleKind::Havemap => Vec::new(),
					RuleKind::Andmap => vec![
						(higher.source(), higher.target()),
						(higher.target(), rule.target()),
					],
					_ => vec![
						(higher.source(), rule.source()),
						(higher.target(), rule.target()),
					],
				};

				for (upper, lower) in pairs {
					// An overlap too wild to spell out is left uncarved.
					if let Err(err) = upper.join(lower, max_wildcards, &mut carve) {
						tracing::debug!(error = %err, %upper, %lower, "Skipping overlap");
					}
				}
			}

			out.insert_rule(rule.clone());
		}

		// Built from the highest rule down.
		out.reverse();

		tracing::debug!(before = rules.len(), after = out.len(), "Disambiguated");
		self.replace_rules(out.iter().cloned().collect());
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::mapping::rule::{Direction, RuleKind};
	use crate::mapping::table::RuleTable;

	fn lines(table: &RuleTable) -> Vec<String> {
		table.iter().rev().map(|r| r.to_string()).collect()
	}

	#[test]
	fn test_overlap_is_carved_out() {
		let mut t = RuleTable::new();
		t.insert("//depot/...", "//client/...", RuleKind::Map).unwrap();
		t.insert("//depot/x/...", "//client/y/...", RuleKind::Map).unwrap();
		t.disambiguate().unwrap();

		let found = lines(&t);
		assert_eq!(found.first().map(String::as_str), Some("//depot/x/... //client/y/..."));
		assert_eq!(found.last().map(String::as_str), Some("//depot/... //client/..."));
		assert!(found.contains(&"-//depot/x/... //client/x/...".to_string()));
		assert!(found.contains(&"-//depot/y/... //client/y/...".to_string()));
	}

	#[test]
	fn test_unmap_line_is_dropped() {
		let mut t = RuleTable::new();
		t.insert("//depot/...", "//client/...", RuleKind::Map).unwrap();
		t.insert("//depot/secret/...", "//client/secret/...", RuleKind::Unmap).unwrap();
		t.disambiguate().unwrap();

		assert_eq!(
			lines(&t),
			vec![
				"-//depot/secret/... //client/secret/...".to_string(),
				"//depot/... //client/...".to_string(),
			]
		);
		assert!(t.check(Direction::Lhs, "//depot/secret/a").is_none());
		assert!(t.check(Direction::Lhs, "//depot/open/a").is_some());
	}

	#[test]
	fn test_overlays_do_not_carve() {
		let mut t = RuleTable::new();
		t.insert("//depot/...", "//client/...", RuleKind::Map).unwrap();
		t.insert("//depot/x/...", "//client/x/...", RuleKind::Remap).unwrap();
		t.disambiguate().unwrap();
		assert_eq!(t.len(), 2);
		assert_eq!(t.count_kind(RuleKind::Unmap), 0);
	}

	#[test]
	fn test_translations_survive() {
		let mut t = RuleTable::new();
		t.insert("//depot/...", "//client/...", RuleKind::Map).unwrap();
		t.insert("//depot/x/...", "//client/y/...", RuleKind::Map).unwrap();
		let before = t.clone();
		t.disambiguate().unwrap();

		for path in ["//depot/a", "//depot/x/b"] {
			assert_eq!(
				t.translate(Direction::Lhs, path).map(|t| t.path),
				before.translate(Direction::Lhs, path).map(|t| t.path),
				"{path}"
			);
		}

		// //client/y/c belongs to //depot/x/c now, so //depot/y/c goes nowhere.
		assert!(before.check(Direction::Lhs, "//depot/y/c").is_some());
		assert!(t.check(Direction::Lhs, "//depot/y/c").is_none());
		assert_eq!(
			t.translate(Direction::Rhs, "//client/y/c").map(|t| t.path).as_deref(),
			Some("//depot/x/c")
		);
	}

	#[test]
	fn test_too_wild_overlap_is_skipped() {
		let stars = "/*".repeat(10);
		let mut t = RuleTable::new();
		t.insert(&format!("//a{stars}"), &format!("//b{stars}"), RuleKind::Map).unwrap();
		t.insert("//a/...", "//b/...", RuleKind::Map).unwrap();
		t.disambiguate().unwrap();

		let found = lines(&t);
		assert_eq!(found.first().map(String::as_str), Some("//a/... //b/..."));
		assert_eq!(found.last(), Some(&format!("//a{stars} //b{stars}")));
		assert_eq!(t.count_kind(RuleKind::Map), 2);
	}

	#[test]
	fn test_idempotent() {
		let mut t = RuleTable::new();
		t.insert("//depot/...", "//client/...", RuleKind::Map).unwrap();
		t.insert("//depot/x/...", "//client/y/...", RuleKind::Map).unwrap();
		t.disambiguate().unwrap();
		let once = t.to_string();
		t.disambiguate().unwrap();
		assert_eq!(t.to_string(), once);
	}
}
