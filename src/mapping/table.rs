use crate::error::Result;
use crate::mapping::pattern::{Captures, CaseMode, Pattern};
use crate::mapping::rule::{Direction, Rule, RuleKind};
use crate::mapping::tree::{self, Hit, PrecedenceTree};
use serde::Deserialize;
use std::fmt;
use std::sync::OnceLock;

/// Bounds on table joins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct JoinLimits {
	/// Rows a join may produce beyond the size of its inputs.
	pub max_rows: usize,

	/// Absolute ceiling on rows produced by a join.
	pub row_cap: usize,

	/// Wildcards a composed pattern may carry.
	pub max_wildcards: usize,

	/// How many recent rows a no-duplicates insert compares against.
	pub dedup_window: usize,
}

impl Default for JoinLimits {
	fn default() -> Self {
		JoinLimits {
			max_rows: 100_000,
			row_cap: 100_000,
			max_wildcards: 10,
			dedup_window: 8,
		}
	}
}

/// Per-table settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapOptions {
	pub case_mode: CaseMode,
	pub limits: JoinLimits,
}

/// Why a table produced by a join is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyReason {
	/// A composition produced too many wildcards or too many rows.
	TooWild,
	/// Supplied by the caller of the join.
	Reason(String),
}

impl fmt::Display for EmptyReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EmptyReason::TooWild => f.write_str("too many wildcards"),
			EmptyReason::Reason(reason) => f.write_str(reason),
		}
	}
}

/// The rule that decided a [`RuleTable::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
	/// Index of the rule in the table.
	pub precedence: usize,
	pub kind: RuleKind,
}

/// A path rewritten into the opposite namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
	pub path: String,
	pub precedence: usize,
	pub kind: RuleKind,
}

/// A literal prefix under which a table maps something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixString {
	pub prefix: String,

	/// Paths below the prefix can sit in subdirectories.
	pub has_sub_dirs: bool,
}

/// An ordered view: rules in declaration order, later rules taking
/// precedence over earlier ones.
///
/// Search trees for both directions are built on first use and dropped by
/// every mutation.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
	rules: Vec<Rule>,
	options: MapOptions,
	trees: [OnceLock<PrecedenceTree>; 2],
	empty_reason: Option<EmptyReason>,
	join_error: bool,
}

impl RuleTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_case_mode(case_mode: CaseMode) -> Self {
		Self::with_options(MapOptions {
			case_mode,
			..MapOptions::default()
		})
	}

	pub fn with_options(options: MapOptions) -> Self {
		RuleTable {
			options,
			..Self::default()
		}
	}

	pub fn options(&self) -> &MapOptions {
		&self.options
	}

	pub fn case_mode(&self) -> CaseMode {
		self.options.case_mode
	}

	pub fn set_case_mode(&mut self, case_mode: CaseMode) {
		self.options.case_mode = case_mode;
		for rule in &mut self.rules {
			rule.set_case_mode(case_mode);
		}
		self.invalidate();
	}

	pub fn set_limits(&mut self, limits: JoinLimits) {
		self.options.limits = limits;
	}

	/// Drop the cached search trees.
	pub fn invalidate(&mut self) {
		self.trees = Default::default();
	}

	/// Append a validated rule at the highest precedence.
	pub fn insert(&mut self, source: &str, target: &str, kind: RuleKind) -> Result<()> {
		let rule = Rule::new(source, target, kind, self.case_mode())?;
		self.insert_rule(rule);
		Ok(())
	}

	/// Insert a validated rule at `precedence`, shifting later rules up.
	pub fn insert_at(&mut self, precedence: usize, source: &str, target: &str, kind: RuleKind) -> Result<()> {
		let mut rule = Rule::new(source, target, kind, self.case_mode())?;
		rule.set_case_mode(self.case_mode());
		self.rules.insert(precedence.min(self.rules.len()), rule);
		self.invalidate();
		Ok(())
	}

	pub fn insert_rule(&mut self, mut rule: Rule) {
		rule.set_case_mode(self.case_mode());
		self.rules.push(rule);
		self.invalidate();
	}

	/// Insert unless one of the most recent rules already masks the new one.
	pub fn insert_no_duplicates(&mut self, source: &str, target: &str, kind: RuleKind) -> Result<bool> {
		let rule = Rule::new(source, target, kind, self.case_mode())?;
		Ok(self.insert_no_duplicates_rule(rule))
	}

	pub(crate) fn insert_no_duplicates_rule(&mut self, rule: Rule) -> bool {
		let window = self.options.limits.dedup_window;

		let masked = self.rules.iter().rev().take(window).any(|existing| {
			if rule.kind().is_additive() || existing.kind().is_additive() {
				// Overlays add to each other, so only literal repeats go.
				existing.source().text() == rule.source().text()
					&& existing.target().text() == rule.target().text()
			} else {
				existing.source().covers(rule.source()) && existing.target().covers(rule.target())
			}
		});

		if !masked {
			self.insert_rule(rule);
		}
		!masked
	}

	/// Generalize a pair of concrete paths into a rule.
	///
	/// The longest common tail after the depot name is replaced by `...`
	/// (or `*` when it holds no directory separator).
	pub fn insert_by_pattern(&mut self, source: &str, target: &str, kind: RuleKind) -> Result<bool> {
		let lc: Vec<char> = source.chars().collect();
		let rc: Vec<char> = target.chars().collect();
		if lc.is_empty() || rc.is_empty() {
			return self.insert_no_duplicates(source, target, kind);
		}

		let skip_depot = |chars: &[char], end: usize| {
			let mut at = 0;
			let mut slashes = 0;
			while slashes < 3 && at < end {
				if chars[at] == '/' {
					slashes += 1;
				}
				at += 1;
			}
			at
		};

		let mut l = lc.len() - 1;
		let mut r = rc.len() - 1;
		let ls = skip_depot(&lc, l);
		let rs = skip_depot(&rc, r);

		let mut slashes = 0usize;
		while l > ls && r > rs && lc[l - 1] == rc[r - 1] {
			l -= 1;
			r -= 1;
			if lc[l] == '/' {
				slashes += 1;
			}
		}

		// Keep the last differing separator.
		if l < lc.len() - 1 && lc[l] == '/' {
			l += 1;
			r += 1;
			slashes = slashes.saturating_sub(1);
		}

		let dot_before = |chars: &[char], at: usize| at < chars.len() - 1 && at > 0 && chars[at - 1] == '.';
		if (dot_before(&lc, l) || dot_before(&rc, r)) && slashes != 0 {
			l += 1;
			r += 1;
		}

		let head = |chars: &[char], at: usize, wild: &str| {
			let mut s: String = chars[..at.min(chars.len())].iter().collect();
			s.push_str(wild);
			s
		};

		if slashes != 0 && l + 4 < lc.len() {
			self.insert_no_duplicates(&head(&lc, l, "..."), &head(&rc, r, "..."), kind)
		} else if slashes == 0 && l + 2 < lc.len() {
			self.insert_no_duplicates(&head(&lc, l, "*"), &head(&rc, r, "*"), kind)
		} else {
			self.insert_no_duplicates(source, target, kind)
		}
	}

	/// Remove the rule at `precedence`.
	pub fn remove(&mut self, precedence: usize) -> Option<Rule> {
		if precedence >= self.rules.len() {
			return None;
		}
		let rule = self.rules.remove(precedence);
		self.invalidate();
		Some(rule)
	}

	/// Reverse the precedence order.
	pub fn reverse(&mut self) {
		self.rules.reverse();
		self.invalidate();
	}

	pub fn clear(&mut self) {
		self.rules.clear();
		self.invalidate();
	}

	pub(crate) fn replace_rules(&mut self, rules: Vec<Rule>) {
		self.rules = rules;
		self.invalidate();
	}

	pub fn len(&self) -> usize {
		self.rules.len()
	}

	/// True when no rule maps anything (only Unmaps, or no rules).
	pub fn is_empty(&self) -> bool {
		self.rules.iter().all(|r| r.kind() == RuleKind::Unmap)
	}

	pub fn get(&self, precedence: usize) -> Option<&Rule> {
		self.rules.get(precedence)
	}

	/// Rules in declaration order, lowest precedence first.
	pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
		self.rules.iter()
	}

	pub fn has_overlays(&self) -> bool {
		self.rules.iter().any(|r| r.kind().is_additive())
	}

	pub fn has_havemaps(&self) -> bool {
		self.count_kind(RuleKind::Havemap) > 0
	}

	pub fn has_andmaps(&self) -> bool {
		self.count_kind(RuleKind::Andmap) > 0
	}

	pub fn count_kind(&self, kind: RuleKind) -> usize {
		self.rules.iter().filter(|r| r.kind() == kind).count()
	}

	/// The highest-precedence rule maps one literal path to another.
	pub fn is_single_literal_mapping(&self) -> bool {
		self.rules
			.last()
			.is_some_and(|r| !r.source().is_wild() && !r.target().is_wild())
	}

	pub fn empty_reason(&self) -> Option<&EmptyReason> {
		self.empty_reason.as_ref()
	}

	pub(crate) fn set_empty_reason(&mut self, reason: Option<EmptyReason>) {
		self.empty_reason = reason;
	}

	/// A join producing this table failed on a wildcard explosion.
	pub fn join_error(&self) -> bool {
		self.join_error
	}

	pub(crate) fn set_join_error(&mut self, join_error: bool) {
		self.join_error = join_error;
	}

	fn tree(&self, dir: Direction) -> &PrecedenceTree {
		self.trees[dir.index()].get_or_init(|| PrecedenceTree::build(&self.rules, dir))
	}

	/// Find the rule that decides where `path` goes.
	///
	/// Returns `None` when nothing matches or the deciding rule is an Unmap.
	pub fn check(&self, dir: Direction, path: &str) -> Option<Match> {
		let input: Vec<char> = path.chars().collect();
		self.decide(dir, &input)
	}

	fn decide(&self, dir: Direction, input: &[char]) -> Option<Match> {
		let (best, hits) = self.tree(dir).search(&self.rules, input, false);
		let best = best?;

		// With Andmaps around, an ordinary rule below them still decides.
		let winner = match hits {
			Some(hits) => {
				let hits = by_precedence(hits);
				hits.iter()
					.find(|hit| hit.kind != RuleKind::Andmap)
					.or(hits.first())
					.copied()
					.unwrap_or(best)
			}
			None => best,
		};

		(winner.kind != RuleKind::Unmap).then_some(Match {
			precedence: winner.precedence,
			kind: winner.kind,
		})
	}

	/// Rewrite `path` through the deciding rule.
	pub fn translate(&self, dir: Direction, path: &str) -> Option<Translation> {
		let input: Vec<char> = path.chars().collect();
		let decided = self.decide(dir, &input)?;
		let rule = &self.rules[decided.precedence];

		let mut captures = Captures::new();
		if !rule.pattern(dir).match_full(&input, &mut captures) {
			return None;
		}

		let out = rule.opposite(dir).expand(&input, &captures);
		tracing::trace!(from = path, to = %out, precedence = decided.precedence, "Translated");

		Some(Translation {
			path: out,
			precedence: decided.precedence,
			kind: decided.kind,
		})
	}

	/// Every translation of `path`: all matching Andmaps plus the best
	/// ordinary rule, highest precedence first, cut off by an Unmap.
	pub fn explode(&self, dir: Direction, path: &str) -> Vec<Translation> {
		let input: Vec<char> = path.chars().collect();
		let (_, hits) = self.tree(dir).search(&self.rules, &input, true);

		let mut out = Vec::new();
		let mut ordinary = false;

		for hit in by_precedence(hits.unwrap_or_default()) {
			if hit.kind == RuleKind::Unmap {
				break;
			}
			if hit.kind != RuleKind::Andmap {
				if ordinary {
					continue;
				}
				ordinary = true;
			}

			let rule = &self.rules[hit.precedence];
			let mut captures = Captures::new();
			if !rule.pattern(dir).match_full(&input, &mut captures) {
				continue;
			}

			out.push(Translation {
				path: rule.opposite(dir).expand(&input, &captures),
				precedence: hit.precedence,
				kind: hit.kind,
			});
		}

		tracing::trace!(from = path, results = out.len(), "Exploded");
		out
	}

	/// Translate `path` through one specific rule, ignoring the others.
	pub fn translate_with(&self, precedence: usize, dir: Direction, path: &str) -> Option<String> {
		let rule = self.get(precedence)?;
		if rule.kind() == RuleKind::Unmap {
			return None;
		}

		let input: Vec<char> = path.chars().collect();
		let mut captures = Captures::new();
		rule.pattern(dir)
			.match_path(&input, &mut captures)
			.then(|| rule.opposite(dir).expand(&input, &captures))
	}

	/// Hash of the rules, for cheap change detection.
	pub fn fingerprint(&self) -> u64 {
		let step = |h: u64, c: u64| h.wrapping_mul(293).wrapping_add(c);

		self.rules.iter().rev().fold(0, |mut h, rule| {
			for c in rule.source().text().chars().chain(rule.target().text().chars()) {
				h = step(h, c as u64);
			}
			step(h, rule.kind().code() as u64)
		})
	}

	pub fn tree_depth(&self, dir: Direction) -> usize {
		self.tree(dir).depth()
	}

	/// Is this table quicker to search than `other`?
	pub fn better(&self, other: &RuleTable, dir: Direction) -> bool {
		self.tree_depth(dir) < other.tree_depth(dir)
	}

	/// The distinct literal prefixes of the mapped side `dir`.
	pub fn prefix_strings(&self, dir: Direction) -> Vec<PrefixString> {
		let mut out = Vec::new();
		let mut held: Option<&Pattern> = None;
		let mut held_sub_dirs = false;

		for index in tree::sort_order(&self.rules, dir) {
			let rule = &self.rules[index];
			if rule.kind() == RuleKind::Unmap {
				continue;
			}
			let half = rule.pattern(dir);

			if let Some(prev) = held {
				let common = prev.common_len(half);

				// Prefix already covered by the held one.
				if common == prev.fixed_len() {
					held_sub_dirs |= half.has_sub_dirs(common);
					continue;
				}

				if half.fixed_len() > common {
					out.push(PrefixString {
						prefix: prev.fixed_prefix(),
						has_sub_dirs: held_sub_dirs,
					});
				}
			}

			held = Some(half);
			held_sub_dirs = half.has_sub_dirs(half.fixed_len());
		}

		if let Some(prev) = held {
			out.push(PrefixString {
				prefix: prev.fixed_prefix(),
				has_sub_dirs: held_sub_dirs,
			});
		}

		out
	}

	pub fn dump_tree(&self, dir: Direction) -> String {
		self.tree(dir).dump(&self.rules)
	}

	/// Copy without the rules of `kind`.
	pub fn without_kind(&self, kind: RuleKind) -> RuleTable {
		let mut out = RuleTable::with_options(self.options.clone());
		out.rules = self
			.rules
			.iter()
			.filter(|r| r.kind() != kind)
			.cloned()
			.collect();
		out
	}

	/// Copy with source and target exchanged in every rule.
	pub fn swapped(&self) -> RuleTable {
		let mut out = RuleTable::with_options(self.options.clone());
		out.rules = self.rules.iter().map(Rule::swapped).collect();
		out
	}

	/// Validate one half of every rule on its own.
	pub fn validate_half(&self, dir: Direction) -> Result<()> {
		self.rules.iter().try_for_each(|r| r.pattern(dir).validate())
	}
}

/// Order hits from highest precedence down, dropping repeats.
fn by_precedence(mut hits: Vec<Hit>) -> Vec<Hit> {
	hits.sort_by(|a, b| b.precedence.cmp(&a.precedence));
	hits.dedup();
	hits
}

impl fmt::Display for RuleTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for rule in &self.rules {
			writeln!(f, "{rule}")?;
		}
		Ok(())
	}
}

/// Does `pattern` match `path`?
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
	Pattern::parse(pattern, CaseMode::Sensitive).matches(path)
}

/// A depot map has exactly one wildcard: a trailing `/...`.
pub fn is_valid_depot_map(pattern: &str) -> bool {
	let half = Pattern::parse(pattern, CaseMode::Sensitive);
	half.wildcard_count() == 1 && half.has_end_slash_ellipsis()
}
