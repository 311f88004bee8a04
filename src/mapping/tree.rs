//! Ternary search tree over one half of a rule table.
//!
//! Rules are sorted by literal prefix; a rule whose prefix is a parent of
//! others sits above them on the `equal` branch, so a descent only ever
//! full-matches rules whose prefix agrees with the path.

use crate::mapping::pattern::{Captures, Pattern};
use crate::mapping::rule::{Direction, Rule, RuleKind};
use std::cmp::Ordering;
use std::fmt::Write;

#[derive(Debug, Clone, Default)]
struct Node {
	/// Index of the rule in its table, which is also its precedence.
	rule: usize,
	less: Option<usize>,
	equal: Option<usize>,
	greater: Option<usize>,

	/// Prefix length shared with the tree parent.
	overlap: usize,

	/// Highest precedence in this subtree, node included.
	max_precedence: usize,

	/// Highest precedence of a non-Andmap rule in this subtree.
	max_no_andmaps: Option<usize>,

	/// An Andmap sits somewhere below this node.
	has_andmaps: bool,
}

/// Search tree for one direction of a [`crate::mapping::RuleTable`].
#[derive(Debug, Clone)]
pub struct PrecedenceTree {
	direction: Direction,
	nodes: Vec<Node>,
	root: Option<usize>,
	depth: usize,
}

/// A rule that matched during a descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Hit {
	pub precedence: usize,
	pub kind: RuleKind,
}

struct Builder<'a> {
	rules: &'a [Rule],
	direction: Direction,
	nodes: Vec<Node>,
}

impl Builder<'_> {
	fn pattern(&self, k: usize) -> &Pattern {
		self.rules[self.nodes[k].rule].pattern(self.direction)
	}

	fn is_parent(&self, a: usize, b: usize) -> bool {
		self.pattern(a).is_parent_of(self.pattern(b))
	}

	fn is_andmap(&self, k: usize) -> bool {
		self.rules[self.nodes[k].rule].kind() == RuleKind::Andmap
	}

	/// Reset node `k` to a leaf carrying only its own bounds.
	fn seed(&mut self, k: usize, overlap: usize) {
		let andmap = self.is_andmap(k);
		let node = &mut self.nodes[k];
		node.less = None;
		node.equal = None;
		node.greater = None;
		node.overlap = overlap;
		node.max_precedence = node.rule;
		node.max_no_andmaps = (!andmap).then_some(node.rule);
		node.has_andmaps = false;
	}

	/// Fold child `k`'s bounds into `parent`.
	fn absorb(&mut self, parent: usize, k: usize) {
		let andmap = self.is_andmap(k);
		let child = self.nodes[k].clone();
		let node = &mut self.nodes[parent];
		node.max_precedence = node.max_precedence.max(child.max_precedence);
		node.max_no_andmaps = node.max_no_andmaps.max(child.max_no_andmaps);
		node.has_andmaps |= andmap || child.has_andmaps;
	}

	fn build(&mut self, start: usize, end: usize, parent: Option<usize>, depth: &mut usize) -> Option<usize> {
		if start >= end {
			return None;
		}

		if end - start == 1 || self.is_parent(start, end - 1) {
			return Some(self.chain(start, end, parent, depth));
		}

		// li: first rule that is a parent of the middle one.
		// ri: one past the last rule li is a parent of.
		let mut ri = start + (end - start) / 2;
		let mut li = start;
		while li < ri && !self.is_parent(li, ri) {
			li += 1;
		}
		while ri < end && self.is_parent(li, ri) {
			ri += 1;
		}

		self.seed(li, 0);

		let mut below = 0;
		let less = self.build(start, li, Some(li), &mut below);
		let equal = self.build(li + 1, ri, Some(li), &mut below);
		let greater = self.build(ri, end, Some(li), &mut below);

		let node = &mut self.nodes[li];
		node.less = less;
		node.equal = equal;
		node.greater = greater;

		*depth = (*depth).max(below + 1);

		if let Some(p) = parent {
			self.absorb(p, li);
			let overlap = self.pattern(li).common_len(self.pattern(p));
			self.nodes[li].overlap = overlap;
		}

		Some(li)
	}

	/// Everything in `[start, end)` descends from `start`: link it as a chain.
	fn chain(&mut self, start: usize, end: usize, parent: Option<usize>, depth: &mut usize) -> usize {
		let prefix_len = self.pattern(start).fixed_len();
		let mut ri = end - 1;
		while ri > start && self.pattern(ri).fixed_len() != prefix_len {
			ri -= 1;
		}

		let overlap = parent.map_or(0, |p| self.pattern(start).common_len(self.pattern(p)));

		let mut max_precedence = 0;
		let mut max_no_andmaps = None;
		let mut has_andmaps = false;
		let mut last = None;
		let mut below = 0;

		// Rules with longer prefixes hang below the last equal-length rule.
		let chain_end = if ri < end - 1 {
			self.seed(ri, overlap);
			let equal = self.build(ri + 1, end, Some(ri), &mut below);
			self.nodes[ri].equal = equal;

			let node = &self.nodes[ri];
			max_precedence = node.max_precedence;
			max_no_andmaps = node.max_no_andmaps;
			has_andmaps = node.has_andmaps || self.is_andmap(ri);

			last = Some(ri);
			below += 1;
			ri
		} else {
			ri + 1
		};

		below += chain_end - start;

		for k in (start..chain_end).rev() {
			let own = self.nodes[k].rule;
			let andmap = self.is_andmap(k);

			max_precedence = max_precedence.max(own);
			if !andmap {
				max_no_andmaps = max_no_andmaps.max(Some(own));
			}

			let node = &mut self.nodes[k];
			node.less = None;
			node.greater = None;
			node.equal = last;
			node.overlap = overlap;
			node.max_precedence = max_precedence;
			node.max_no_andmaps = max_no_andmaps;
			node.has_andmaps = has_andmaps;

			has_andmaps |= andmap;
			last = Some(k);
		}

		if let Some(p) = parent {
			let node = &mut self.nodes[p];
			node.max_precedence = node.max_precedence.max(max_precedence);
			node.max_no_andmaps = node.max_no_andmaps.max(max_no_andmaps);
			node.has_andmaps |= has_andmaps;
		}

		*depth = (*depth).max(below);

		start
	}
}

/// Rule indices ordered by literal prefix, higher precedence first among equals.
pub(crate) fn sort_order(rules: &[Rule], direction: Direction) -> Vec<usize> {
	let mut order: Vec<usize> = (0..rules.len()).collect();
	order.sort_by(|&a, &b| {
		rules[a]
			.pattern(direction)
			.cmp_prefix(rules[b].pattern(direction))
			.then_with(|| b.cmp(&a))
	});
	order
}

impl PrecedenceTree {
	/// Build the tree for `direction` over `rules`, where a rule's index is
	/// its precedence.
	#[tracing::instrument(level = "debug", skip_all, fields(direction = ?direction, rules = rules.len()))]
	pub fn build(rules: &[Rule], direction: Direction) -> Self {
		let order = sort_order(rules, direction);

		let mut builder = Builder {
			rules,
			direction,
			nodes: order
				.into_iter()
				.map(|rule| Node {
					rule,
					..Node::default()
				})
				.collect(),
		};

		let mut depth = 0;
		let root = builder.build(0, rules.len(), None, &mut depth);
		tracing::debug!(depth, "Built precedence tree");

		PrecedenceTree {
			direction,
			nodes: builder.nodes,
			root,
			depth,
		}
	}

	pub fn direction(&self) -> Direction {
		self.direction
	}

	/// Longest descent through the tree.
	pub fn depth(&self) -> usize {
		self.depth
	}

	pub fn is_empty(&self) -> bool {
		self.root.is_none()
	}

	/// Find the matching rules for `input`.
	///
	/// Returns the highest-precedence match, plus every match seen when
	/// `collect` is set or the tree holds Andmaps. Collected hits are in
	/// descent order.
	pub(crate) fn search(
		&self,
		rules: &[Rule],
		input: &[char],
		collect: bool,
	) -> (Option<Hit>, Option<Vec<Hit>>) {
		let Some(root) = self.root else {
			return (None, None);
		};

		let root_andmap = rules[self.nodes[root].rule].kind() == RuleKind::Andmap;
		let mut hits = (collect || self.nodes[root].has_andmaps || root_andmap).then(Vec::new);

		let mut best: Option<Hit> = None;
		let mut best_non_andmap: Option<usize> = None;
		let mut offset = 0;
		let mut captures = Captures::new();
		let mut cursor = Some(root);

		while let Some(k) = cursor {
			let node = &self.nodes[k];
			let rule = &rules[node.rule];
			let half = rule.pattern(self.direction);
			let andmap = rule.kind() == RuleKind::Andmap;
			let best_precedence = best.map(|hit| hit.precedence);

			// Nothing below can win and there are no Andmaps to gather.
			if best_precedence > Some(node.max_precedence)
				&& !node.has_andmaps
				&& !andmap
				&& best_non_andmap > node.max_no_andmaps
			{
				break;
			}

			offset = offset.min(node.overlap);

			let ord = if offset < half.fixed_len() {
				half.match_prefix(input, &mut offset)
			} else {
				Ordering::Equal
			};

			if ord == Ordering::Equal
				&& (best_precedence < Some(node.rule) || hits.is_some())
				&& half.match_full(input, &mut captures)
			{
				let hit = Hit {
					precedence: node.rule,
					kind: rule.kind(),
				};
				if best_precedence < Some(node.rule) {
					best = Some(hit);
				}
				if let Some(hits) = hits.as_mut() {
					hits.push(hit);
				}
				if !andmap {
					best_non_andmap = best_non_andmap.max(Some(node.rule));
				}
			}

			cursor = match ord {
				Ordering::Less => node.less,
				Ordering::Greater => node.greater,
				Ordering::Equal => node.equal,
			};
		}

		(best, hits)
	}

	/// Render the tree, one node per line, indented by depth.
	pub fn dump(&self, rules: &[Rule]) -> String {
		let mut out = String::new();
		if let Some(root) = self.root {
			self.dump_node(rules, root, 0, "", &mut out);
		}
		out
	}

	fn dump_node(&self, rules: &[Rule], k: usize, indent: usize, label: &str, out: &mut String) {
		let node = &self.nodes[k];
		let rule = &rules[node.rule];

		let _ = writeln!(
			out,
			"{:indent$}{label}{} [{}] max={} overlap={}{}",
			"",
			rule.pattern(self.direction),
			node.rule,
			node.max_precedence,
			node.overlap,
			if node.has_andmaps { " ands" } else { "" },
			indent = indent * 2,
		);

		for (child, label) in [(node.less, "< "), (node.equal, "= "), (node.greater, "> ")] {
			if let Some(child) = child {
				self.dump_node(rules, child, indent + 1, label, out);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mapping::pattern::CaseMode;

	fn rules(lines: &[(&str, &str, RuleKind)]) -> Vec<Rule> {
		lines
			.iter()
			.map(|(l, r, kind)| Rule::new(l, r, *kind, CaseMode::Sensitive).unwrap())
			.collect()
	}

	fn best(tree: &PrecedenceTree, rules: &[Rule], path: &str) -> Option<usize> {
		let input: Vec<char> = path.chars().collect();
		tree.search(rules, &input, false).0.map(|hit| hit.precedence)
	}

	#[test]
	fn test_empty_tree() {
		let tree = PrecedenceTree::build(&[], Direction::Lhs);
		assert!(tree.is_empty());
		assert_eq!(tree.depth(), 0);
		assert_eq!(best(&tree, &[], "//depot/x"), None);
	}

	#[test]
	fn test_later_rule_wins() {
		let rules = rules(&[
			("//depot/...", "//out1/...", RuleKind::Map),
			("//depot/sub/...", "//out2/...", RuleKind::Map),
		]);
		let tree = PrecedenceTree::build(&rules, Direction::Lhs);
		assert_eq!(best(&tree, &rules, "//depot/sub/x"), Some(1));
		assert_eq!(best(&tree, &rules, "//depot/other"), Some(0));
		assert_eq!(best(&tree, &rules, "//elsewhere/x"), None);
	}

	#[test]
	fn test_split_tree_finds_every_branch() {
		let rules = rules(&[
			("//a/...", "//x/a/...", RuleKind::Map),
			("//b/...", "//x/b/...", RuleKind::Map),
			("//c/...", "//x/c/...", RuleKind::Map),
			("//d/...", "//x/d/...", RuleKind::Map),
			("//e/...", "//x/e/...", RuleKind::Map),
		]);
		let tree = PrecedenceTree::build(&rules, Direction::Lhs);
		for (i, dir) in ["a", "b", "c", "d", "e"].iter().enumerate() {
			assert_eq!(best(&tree, &rules, &format!("//{dir}/f")), Some(i));
		}
		assert_eq!(best(&tree, &rules, "//f/f"), None);
		assert!(tree.depth() >= 2);
	}

	#[test]
	fn test_reverse_direction() {
		let rules = rules(&[
			("//depot/a/...", "//client/...", RuleKind::Map),
			("//depot/b/...", "//client/b/...", RuleKind::Map),
		]);
		let tree = PrecedenceTree::build(&rules, Direction::Rhs);
		assert_eq!(best(&tree, &rules, "//client/b/x"), Some(1));
		assert_eq!(best(&tree, &rules, "//client/c/x"), Some(0));
	}

	#[test]
	fn test_andmaps_are_collected() {
		let rules = rules(&[
			("//depot/...", "//client/...", RuleKind::Map),
			("//depot/doc/...", "//client/doc/...", RuleKind::Andmap),
			("//depot/doc/...", "//client/extra/...", RuleKind::Andmap),
		]);
		let tree = PrecedenceTree::build(&rules, Direction::Lhs);
		let input: Vec<char> = "//depot/doc/x".chars().collect();
		let (best, hits) = tree.search(&rules, &input, false);
		assert_eq!(best.map(|h| h.precedence), Some(2));

		let mut found: Vec<usize> = hits.unwrap().iter().map(|h| h.precedence).collect();
		found.sort_unstable();
		assert_eq!(found, vec![0, 1, 2]);
	}

	#[test]
	fn test_dump_lists_every_rule() {
		let rules = rules(&[
			("//depot/...", "//client/...", RuleKind::Map),
			("//depot/x/...", "//client/y/...", RuleKind::Unmap),
		]);
		let tree = PrecedenceTree::build(&rules, Direction::Lhs);
		let dump = tree.dump(&rules);
		assert!(dump.contains("//depot/... [0]"));
		assert!(dump.contains("= //depot/x/... [1]"));
	}
}
