//! Composition of patterns and of whole rule tables.
//!
//! [`Pattern::join`] aligns two patterns token by token and reports every
//! way they can describe the same paths. Wildcards capture spans of a scratch
//! buffer, so a caller can rebuild any pattern of the two rules involved in
//! terms of the overlap.

use crate::error::{MapError, Result};
use crate::mapping::pattern::{Captures, Pattern, Span, Token, TokenClass};
use crate::mapping::rule::{Direction, Rule, RuleKind};
use crate::mapping::table::{EmptyReason, RuleTable};

/// Retry frames a single composition may hold.
const MAX_RETRIES: usize = 32;

/// Snapshot handed to a [`JoinSink`] for every successful alignment.
pub struct JoinState<'a> {
	buffer: &'a [char],
	left: &'a Captures,
	right: &'a Captures,
}

impl JoinState<'_> {
	/// Characters absorbed by wildcards, plus generated wildcards.
	pub fn buffer(&self) -> &[char] {
		self.buffer
	}

	/// Captures of the left pattern's wildcards, as spans of [`Self::buffer`].
	pub fn left(&self) -> &Captures {
		self.left
	}

	pub fn right(&self) -> &Captures {
		self.right
	}
}

/// Receives the results of [`Pattern::join`].
pub trait JoinSink {
	fn emit(&mut self, state: &JoinState<'_>);
}

impl<F: FnMut(&JoinState<'_>)> JoinSink for F {
	fn emit(&mut self, state: &JoinState<'_>) {
		self(state)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
	Left,
	Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
	Match,
	LeftWild,
	RightWild,
	LeftBack,
	RightBack,
	BothWild,
	LeftStar,
	RightStar,
	Miss,
	Ok,
}

/// Decide what to do with the current pair of tokens.
///
/// `backup` is the side of the wildcard being retried, if any.
fn action(backup: Option<Side>, left: TokenClass, right: TokenClass) -> Action {
	use TokenClass::*;

	let left_wild = matches!(left, Perc | Star | Dots);
	let right_wild = matches!(right, Perc | Star | Dots);

	match backup {
		None => match (left, right) {
			_ if left_wild && right_wild => Action::BothWild,
			_ if left_wild => Action::LeftWild,
			_ if right_wild => Action::RightWild,
			(End, End) => Action::Ok,
			(Char, Char) | (Slash, Slash) => Action::Match,
			_ => Action::Miss,
		},
		Some(side) => match (left, right) {
			(End, End) => Action::Ok,
			(End, _) | (_, End) => Action::Miss,
			_ if left_wild && right_wild => match side {
				Side::Left => Action::LeftStar,
				Side::Right => Action::RightStar,
			},
			(Char, Char) | (Slash, Slash) => Action::Match,
			(Char, _) if right_wild => Action::RightBack,
			(Slash, Dots) => Action::RightBack,
			(_, Char) if left_wild => Action::LeftBack,
			(Dots, Slash) => Action::LeftBack,
			_ => Action::Miss,
		},
	}
}

#[derive(Debug, Clone)]
struct Retry {
	mc1: usize,
	mc2: usize,
	side: Side,
	slot: usize,
	wilds: usize,
}

struct Composer<'p> {
	left_pattern: &'p Pattern,
	right_pattern: &'p Pattern,
	max_wildcards: usize,
	buffer: Vec<char>,
	left: Captures,
	right: Captures,
	stack: Vec<Retry>,
}

impl Composer<'_> {
	fn span(&mut self, side: Side, slot: usize) -> &mut Span {
		match side {
			Side::Left => self.left.span_mut(slot),
			Side::Right => self.right.span_mut(slot),
		}
	}

	fn too_wild(&self) -> MapError {
		MapError::TooWild {
			pattern: format!("{} {}", self.left_pattern, self.right_pattern),
			limit: self.max_wildcards,
		}
	}

	fn push(&mut self, retry: Retry) -> Result<()> {
		if self.stack.len() >= MAX_RETRIES {
			return Err(self.too_wild());
		}
		self.stack.push(retry);
		Ok(())
	}

	/// Append a wildcard standing for both `a` and `b`.
	fn make_param(&mut self, a: Token, b: Token, wilds: &mut usize) -> Result<()> {
		*wilds += 1;

		if matches!((a, b), (Token::Ellipsis(_), Token::Ellipsis(_))) {
			self.buffer.extend(['.', '.', '.']);
		} else {
			let digit = char::from_digit(*wilds as u32, 10)
				.filter(|_| *wilds <= 9)
				.ok_or_else(|| self.too_wild())?;
			self.buffer.extend(['%', '%', digit]);
		}

		Ok(())
	}
}

fn literal_same(left: &Pattern, a: Token, b: Token) -> bool {
	match (a.literal_char(), b.literal_char()) {
		(Some(x), Some(y)) => left.case_mode().same(x, y),
		_ => false,
	}
}

impl Pattern {
	/// Compose this pattern with `other`, reporting each alignment to `sink`.
	///
	/// Fails with [`MapError::TooWild`] when an alignment needs more than
	/// `max_wildcards` generated wildcards or the retry stack overflows.
	pub fn join(&self, other: &Pattern, max_wildcards: usize, sink: &mut dyn JoinSink) -> Result<()> {
		let t1 = self.tokens();
		let t2 = other.tokens();

		// Literal prefixes must agree; compare backwards to fail fast.
		let non_wild = self.fixed_len().min(other.fixed_len());
		if (0..non_wild).rev().any(|i| !literal_same(self, t1[i], t2[i])) {
			return Ok(());
		}

		let mut c = Composer {
			left_pattern: self,
			right_pattern: other,
			max_wildcards,
			buffer: Vec::new(),
			left: Captures::new(),
			right: Captures::new(),
			stack: Vec::with_capacity(MAX_RETRIES),
		};

		let mut mc1 = non_wild;
		let mut mc2 = non_wild;
		let mut wilds = 0;
		let mut current: Option<Retry> = None;

		loop {
			let frame = current.take();
			let backup = frame.as_ref().map(|f| f.side);

			let mut act = action(backup, t1[mc1].class(), t2[mc2].class());
			if act == Action::Match && !literal_same(self, t1[mc1], t2[mc2]) {
				act = Action::Miss;
			}

			let mut retreat = false;

			match (act, frame) {
				(Action::Match, _) => {
					mc1 += 1;
					mc2 += 1;
				}
				(Action::LeftWild, _) => {
					let slot = t1[mc1].slot().unwrap_or_default();
					let at = c.buffer.len();
					*c.left.span_mut(slot) = Span { start: at, end: at };
					c.push(Retry {
						mc1,
						mc2,
						side: Side::Left,
						slot,
						wilds,
					})?;
					mc1 += 1;
				}
				(Action::RightWild, _) => {
					let slot = t2[mc2].slot().unwrap_or_default();
					let at = c.buffer.len();
					*c.right.span_mut(slot) = Span { start: at, end: at };
					c.push(Retry {
						mc1,
						mc2,
						side: Side::Right,
						slot,
						wilds,
					})?;
					mc2 += 1;
				}
				(Action::LeftBack, Some(mut frame)) => {
					// The left wildcard absorbs one more character of the right.
					c.buffer.push(t2[mc2].literal_char().unwrap_or('/'));
					mc2 += 1;
					let end = c.buffer.len();
					c.span(frame.side, frame.slot).end = end;
					frame.mc2 = mc2;

					// Keep absorbing straight into an adjacent wildcard.
					if action(Some(frame.side), t1[mc1].class(), t2[mc2].class()) == Action::LeftStar {
						current = Some(frame);
					} else {
						frame.mc1 = mc1;
						mc1 += 1;
						c.push(frame)?;
					}
				}
				(Action::RightBack, Some(mut frame)) => {
					c.buffer.push(t1[mc1].literal_char().unwrap_or('/'));
					mc1 += 1;
					let end = c.buffer.len();
					c.span(frame.side, frame.slot).end = end;
					frame.mc1 = mc1;

					if action(Some(frame.side), t1[mc1].class(), t2[mc2].class()) == Action::RightStar {
						current = Some(frame);
					} else {
						frame.mc2 = mc2;
						mc2 += 1;
						c.push(frame)?;
					}
				}
				(Action::BothWild | Action::LeftStar, frame) => {
					let mut frame = match (act, frame) {
						(Action::LeftStar, Some(frame)) => frame,
						_ => {
							let slot = t1[mc1].slot().unwrap_or_default();
							c.left.span_mut(slot).start = c.buffer.len();
							Retry {
								mc1,
								mc2,
								side: Side::Left,
								slot,
								wilds,
							}
						}
					};

					let slot2 = t2[mc2].slot().unwrap_or_default();
					c.right.span_mut(slot2).start = c.buffer.len();
					c.make_param(t1[mc1], t2[mc2], &mut wilds)?;

					let end = c.buffer.len();
					c.span(frame.side, frame.slot).end = end;
					c.right.span_mut(slot2).end = end;

					frame.mc1 = mc1;
					mc1 += 1;
					let second = Retry {
						mc1,
						mc2,
						side: Side::Right,
						slot: slot2,
						wilds,
					};
					mc2 += 1;
					frame.mc2 = mc2;
					frame.wilds = wilds;

					c.push(frame)?;
					c.push(second)?;
				}
				(Action::RightStar, Some(mut frame)) => {
					let slot1 = t1[mc1].slot().unwrap_or_default();
					c.left.span_mut(slot1).start = c.buffer.len();
					c.make_param(t1[mc1], t2[mc2], &mut wilds)?;

					let end = c.buffer.len();
					c.span(frame.side, frame.slot).end = end;
					c.left.span_mut(slot1).end = end;

					let mut second = Retry {
						mc1,
						mc2,
						side: Side::Left,
						slot: slot1,
						wilds,
					};
					mc1 += 1;
					frame.mc1 = mc1;
					frame.mc2 = mc2;
					mc2 += 1;
					second.mc2 = mc2;
					frame.wilds = wilds;

					c.push(frame)?;
					c.push(second)?;
				}
				(Action::Ok, _) => {
					if wilds > c.max_wildcards {
						return Err(c.too_wild());
					}
					sink.emit(&JoinState {
						buffer: &c.buffer,
						left: &c.left,
						right: &c.right,
					});
					retreat = true;
				}
				_ => retreat = true,
			}

			if retreat {
				let Some(frame) = c.stack.pop() else {
					return Ok(());
				};

				mc1 = frame.mc1;
				mc2 = frame.mc2;
				wilds = frame.wilds;
				let end = c.span(frame.side, frame.slot).end;
				c.buffer.truncate(end);

				// A wildcard pushed by a star step covers only the generated
				// wildcard, not what was absorbed after it.
				if let Some(lower) = c.stack.last().cloned() {
					let end = c.span(lower.side, lower.slot).end;
					c.span(frame.side, frame.slot).end = end;
				}

				current = Some(frame);
			}
		}
	}
}

/// How a table join turns an overlap into a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinMode {
	/// Both outer halves: a path through the shared namespace.
	Compose,
	/// The left rule narrowed to the overlap.
	Restrict,
}

struct RowSink<'a> {
	out: &'a mut RuleTable,
	mode: JoinMode,
	dir1: Direction,
	dir2: Direction,
	left: &'a Rule,
	right: &'a Rule,
}

impl JoinSink for RowSink<'_> {
	fn emit(&mut self, state: &JoinState<'_>) {
		let buffer = state.buffer();
		let (source, target) = match self.mode {
			JoinMode::Compose => (
				self.left.opposite(self.dir1).expand(buffer, state.left()),
				self.right.opposite(self.dir2).expand(buffer, state.right()),
			),
			JoinMode::Restrict => (
				self.left.source().expand(buffer, state.left()),
				self.left.target().expand(buffer, state.left()),
			),
		};
		let kind = RuleKind::compose(self.left.kind(), self.right.kind());
		let case_mode = self.out.case_mode();

		self.out.insert_no_duplicates_rule(Rule::from_patterns(
			Pattern::parse(&source, case_mode),
			Pattern::parse(&target, case_mode),
			kind,
		));
	}
}

impl RuleTable {
	/// Compose this table's `dir1` side with `other`'s `dir2` side.
	///
	/// Each result rule runs from this table's opposite half to `other`'s
	/// opposite half.
	pub fn join(&self, dir1: Direction, other: &RuleTable, dir2: Direction) -> RuleTable {
		self.join_tables(JoinMode::Compose, dir1, other, dir2, None)
	}

	/// Like [`RuleTable::join`], recording `reason` if nothing results.
	pub fn join_with_reason(&self, dir1: Direction, other: &RuleTable, dir2: Direction, reason: &str) -> RuleTable {
		self.join_tables(JoinMode::Compose, dir1, other, dir2, Some(reason))
	}

	/// Restrict this table to the part of its `dir1` side that `other`'s
	/// `dir2` side also covers. Rules keep their orientation.
	pub fn join2(&self, dir1: Direction, other: &RuleTable, dir2: Direction) -> RuleTable {
		self.join_tables(JoinMode::Restrict, dir1, other, dir2, None)
	}

	pub fn join2_with_reason(&self, dir1: Direction, other: &RuleTable, dir2: Direction, reason: &str) -> RuleTable {
		self.join_tables(JoinMode::Restrict, dir1, other, dir2, Some(reason))
	}

	/// Does this table map anything matching `pattern` on its `dir` side?
	pub fn join_check(&self, dir: Direction, pattern: &str) -> bool {
		let mut probe = RuleTable::with_options(self.options().clone());
		let half = Pattern::parse(pattern, self.case_mode());
		probe.insert_rule(Rule::from_patterns(half.clone(), half, RuleKind::Map));

		!probe.join(Direction::Lhs, self, dir).is_empty()
	}

	#[tracing::instrument(level = "debug", skip_all, fields(mode = ?mode, left = self.len(), right = other.len()))]
	fn join_tables(
		&self,
		mode: JoinMode,
		dir1: Direction,
		other: &RuleTable,
		dir2: Direction,
		reason: Option<&str>,
	) -> RuleTable {
		let mut out = RuleTable::with_options(self.options().clone());
		let limits = &self.options().limits;
		let limit = (limits.max_rows + self.len() + other.len()).min(limits.row_cap);
		let mut failure = None;

		'rows: for left in self.iter().rev() {
			if out.len() >= limit {
				break;
			}
			for right in other.iter().rev() {
				let mut sink = RowSink {
					out: &mut out,
					mode,
					dir1,
					dir2,
					left,
					right,
				};

				if let Err(err) = left
					.pattern(dir1)
					.join(right.pattern(dir2), limits.max_wildcards, &mut sink)
				{
					failure = Some(err);
					break 'rows;
				}
				if out.len() >= limit {
					break 'rows;
				}
			}
		}

		if let Some(err) = failure {
			tracing::debug!(error = %err, "Join failed, discarding result");
			out.clear();
			out.set_join_error(true);
			out.set_empty_reason(Some(EmptyReason::TooWild));
			return out;
		}

		// Produced rows run from highest to lowest precedence.
		out.reverse();

		if out.len() >= limit {
			tracing::debug!(limit, "Join exceeded row limit");
			out.clear();
			out.set_empty_reason(Some(EmptyReason::TooWild));
		} else if self.is_empty() && self.empty_reason().is_some() {
			out.set_empty_reason(self.empty_reason().cloned());
		} else if other.is_empty() && other.empty_reason().is_some() {
			out.set_empty_reason(other.empty_reason().cloned());
		} else if out.is_empty()
			&& let Some(reason) = reason
		{
			out.set_empty_reason(Some(EmptyReason::Reason(reason.to_string())));
		}

		tracing::debug!(rows = out.len(), "Joined tables");
		out
	}
}
