use crate::error::{MapError, Result};
use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;

/// Maximum number of wildcards in a single pattern.
pub const MAX_WILDCARDS: usize = 10;

const STAR_BASE: usize = 10;
const DOTS_BASE: usize = 20;
const SLOT_TOP: usize = 23;
const SLOT_COUNT: usize = 30;

/// How literal characters are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseMode {
	/// Exact comparison everywhere.
	#[default]
	Sensitive,

	/// ASCII case is ignored everywhere.
	Insensitive,

	/// Sorting and prefix probes ignore case, full matches do not.
	Hybrid,
}

impl CaseMode {
	/// Map the numeric mode codes (0, 1, 2) used by view interchange.
	pub fn from_code(code: i32) -> Option<Self> {
		match code {
			0 => Some(CaseMode::Sensitive),
			1 => Some(CaseMode::Insensitive),
			2 => Some(CaseMode::Hybrid),
			_ => None,
		}
	}

	pub fn code(self) -> i32 {
		match self {
			CaseMode::Sensitive => 0,
			CaseMode::Insensitive => 1,
			CaseMode::Hybrid => 2,
		}
	}

	fn fold(self, c: char) -> char {
		match self {
			CaseMode::Sensitive => c,
			CaseMode::Insensitive | CaseMode::Hybrid => c.to_ascii_lowercase(),
		}
	}

	/// Ordering used for tree sorting and prefix probes.
	pub(crate) fn order(self, a: char, b: char) -> Ordering {
		self.fold(a).cmp(&self.fold(b))
	}

	/// Equality used by full matches and joins.
	pub(crate) fn same(self, a: char, b: char) -> bool {
		match self {
			CaseMode::Insensitive => a.eq_ignore_ascii_case(&b),
			CaseMode::Sensitive | CaseMode::Hybrid => a == b,
		}
	}
}

/// One compiled element of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
	/// Terminates every token sequence.
	End,
	Literal(char),
	Slash,
	/// `%%N`, slot N.
	Positional(usize),
	/// `*`, slots 10 and up.
	Star(usize),
	/// `...`, slots 20 and up.
	Ellipsis(usize),
}

/// Token categories driving the join action grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenClass {
	End,
	Char,
	Slash,
	Perc,
	Star,
	Dots,
}

impl Token {
	pub fn is_wild(self) -> bool {
		matches!(
			self,
			Token::Positional(_) | Token::Star(_) | Token::Ellipsis(_)
		)
	}

	pub fn is_literal(self) -> bool {
		matches!(self, Token::Literal(_) | Token::Slash)
	}

	/// Capture slot of a wildcard token.
	pub fn slot(self) -> Option<usize> {
		match self {
			Token::Positional(slot) | Token::Star(slot) | Token::Ellipsis(slot) => Some(slot),
			_ => None,
		}
	}

	/// The character a literal token stands for.
	pub fn literal_char(self) -> Option<char> {
		match self {
			Token::Literal(c) => Some(c),
			Token::Slash => Some('/'),
			_ => None,
		}
	}

	pub(crate) fn class(self) -> TokenClass {
		match self {
			Token::End => TokenClass::End,
			Token::Literal(_) => TokenClass::Char,
			Token::Slash => TokenClass::Slash,
			Token::Positional(_) => TokenClass::Perc,
			Token::Star(_) => TokenClass::Star,
			Token::Ellipsis(_) => TokenClass::Dots,
		}
	}
}

/// Half-open character range captured by a wildcard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
	pub start: usize,
	pub end: usize,
}

/// Wildcard captures, indexed by slot.
#[derive(Debug, Clone)]
pub struct Captures {
	spans: Vec<Span>,
}

impl Default for Captures {
	fn default() -> Self {
		Captures {
			spans: vec![Span::default(); SLOT_COUNT],
		}
	}
}

impl Captures {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, slot: usize) -> Option<Span> {
		self.spans.get(slot).copied()
	}

	pub(crate) fn span_mut(&mut self, slot: usize) -> &mut Span {
		if slot >= self.spans.len() {
			self.spans.resize(slot + 1, Span::default());
		}
		&mut self.spans[slot]
	}
}

/// A compiled wildcard path expression: one half of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
	text: String,
	tokens: Vec<Token>,
	fixed_len: usize,
	tail_start: usize,
	wildcard_count: usize,
	case_mode: CaseMode,
}

#[derive(Debug)]
struct Frame {
	resume: usize,
	slot: usize,
	start: usize,
	end: usize,
}

impl Pattern {
	/// Tokenize a pattern without validating wildcard placement.
	///
	/// Patterns produced by joins go through here; user input should use
	/// [`Pattern::compile`].
	pub fn parse(text: &str, case_mode: CaseMode) -> Self {
		let chars: Vec<char> = text.chars().collect();
		let mut tokens = Vec::with_capacity(chars.len() + 1);
		let mut stars = 0;
		let mut dots = 0;
		let mut i = 0;

		while i < chars.len() {
			if chars[i..].starts_with(&['.', '.', '.']) {
				tokens.push(Token::Ellipsis(DOTS_BASE + dots));
				dots += 1;
				i += 3;
			} else if let Some(slot) = positional_at(&chars, i) {
				tokens.push(Token::Positional(slot));
				i += 3;
			} else {
				tokens.push(match chars[i] {
					'*' => {
						stars += 1;
						Token::Star(STAR_BASE + stars - 1)
					}
					'/' => Token::Slash,
					c => Token::Literal(c),
				});
				i += 1;
			}
		}
		tokens.push(Token::End);

		let fixed_len = tokens.iter().take_while(|t| t.is_literal()).count();
		let wildcard_count = tokens.iter().filter(|t| t.is_wild()).count();
		let tail_start = tokens
			.iter()
			.rposition(|t| t.is_wild())
			.map_or(0, |last| last + 1);

		Pattern {
			text: text.to_string(),
			tokens,
			fixed_len,
			tail_start,
			wildcard_count,
			case_mode,
		}
	}

	/// Tokenize and validate a pattern.
	pub fn compile(text: &str, case_mode: CaseMode) -> Result<Self> {
		let pattern = Self::parse(text, case_mode);
		pattern.validate()?;
		Ok(pattern)
	}

	/// Check wildcard placement and counts.
	pub fn validate(&self) -> Result<()> {
		self.slot_set().map(|_| ())
	}

	/// Check both halves and that they reference the same wildcards.
	pub fn validate_pair(&self, other: &Pattern) -> Result<()> {
		let mine = self.slot_set()?;
		let theirs = other.slot_set()?;

		if mine != theirs {
			return Err(MapError::WildMismatch {
				source_half: self.text.clone(),
				target_half: other.text.clone(),
			});
		}

		Ok(())
	}

	fn slot_set(&self) -> Result<[bool; SLOT_TOP]> {
		let stars = self.tokens.iter().filter(|t| matches!(t, Token::Star(_))).count();
		if stars > DOTS_BASE - STAR_BASE {
			return Err(MapError::ExtraStars {
				pattern: self.text.clone(),
			});
		}
		if self.wildcard_count > MAX_WILDCARDS {
			return Err(MapError::TooWild {
				pattern: self.text.clone(),
				limit: MAX_WILDCARDS,
			});
		}

		let mut seen = [false; SLOT_TOP];
		let mut prev_wild = false;

		for &token in self.body() {
			let slot = match token {
				Token::Ellipsis(slot) if slot >= SLOT_TOP => {
					return Err(MapError::ExtraDots {
						pattern: self.text.clone(),
					});
				}
				Token::Positional(slot) | Token::Star(slot) | Token::Ellipsis(slot) => slot,
				_ => {
					prev_wild = false;
					continue;
				}
			};

			if seen[slot] {
				return Err(MapError::Duplicate {
					pattern: self.text.clone(),
				});
			}
			if prev_wild {
				return Err(MapError::Juxtaposed {
					pattern: self.text.clone(),
				});
			}

			seen[slot] = true;
			prev_wild = true;
		}

		Ok(seen)
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	/// Tokens including the terminating [`Token::End`].
	pub fn tokens(&self) -> &[Token] {
		&self.tokens
	}

	/// Tokens without the terminator.
	fn body(&self) -> &[Token] {
		&self.tokens[..self.tokens.len() - 1]
	}

	/// Length of the literal prefix before the first wildcard.
	pub fn fixed_len(&self) -> usize {
		self.fixed_len
	}

	pub fn is_wild(&self) -> bool {
		self.wildcard_count > 0
	}

	pub fn wildcard_count(&self) -> usize {
		self.wildcard_count
	}

	pub fn case_mode(&self) -> CaseMode {
		self.case_mode
	}

	pub(crate) fn set_case_mode(&mut self, case_mode: CaseMode) {
		self.case_mode = case_mode;
	}

	/// The literal prefix as a string.
	pub fn fixed_prefix(&self) -> String {
		self.tokens[..self.fixed_len]
			.iter()
			.filter_map(|t| t.literal_char())
			.collect()
	}

	/// Sort order of two patterns by their literal prefixes.
	///
	/// A prefix that runs out (wildcard or end) sorts before one that still
	/// has literal characters.
	pub fn cmp_prefix(&self, other: &Pattern) -> Ordering {
		for (a, b) in self.tokens.iter().zip(other.tokens.iter()) {
			match (a.literal_char(), b.literal_char()) {
				(Some(x), Some(y)) => match self.case_mode.order(x, y) {
					Ordering::Equal => continue,
					unequal => return unequal,
				},
				(Some(_), None) => return Ordering::Greater,
				(None, Some(_)) => return Ordering::Less,
				(None, None) => return Ordering::Equal,
			}
		}
		Ordering::Equal
	}

	/// How much of this pattern's literal prefix `other` shares.
	pub fn common_len(&self, other: &Pattern) -> usize {
		self.tokens[..self.fixed_len]
			.iter()
			.zip(other.tokens.iter())
			.take_while(|(a, b)| match (a.literal_char(), b.literal_char()) {
				(Some(x), Some(y)) => self.case_mode.order(x, y) == Ordering::Equal,
				_ => false,
			})
			.count()
	}

	/// True when `other`'s literal prefix starts with all of ours.
	pub fn is_parent_of(&self, other: &Pattern) -> bool {
		self.common_len(other) == self.fixed_len
	}

	/// Compare the literal prefix against `input`, starting at `offset`.
	///
	/// `offset` is advanced past the characters found equal, so a caller
	/// descending a tree can resume where the parent left off.
	pub fn match_prefix(&self, input: &[char], offset: &mut usize) -> Ordering {
		while *offset < self.fixed_len && *offset < input.len() {
			let expected = self.tokens[*offset].literal_char().unwrap_or('/');
			match self.case_mode.order(input[*offset], expected) {
				Ordering::Equal => *offset += 1,
				unequal => return unequal,
			}
		}

		if input.len() < self.fixed_len {
			Ordering::Less
		} else {
			Ordering::Equal
		}
	}

	fn accepts(&self, token: Token, c: char) -> bool {
		match token {
			Token::Literal(expected) => self.case_mode.same(expected, c),
			Token::Slash => c == '/',
			_ => false,
		}
	}

	fn literal_eq(&self, a: Token, b: Token) -> bool {
		match (a, b) {
			(Token::Literal(x), Token::Literal(y)) => self.case_mode.same(x, y),
			(Token::Slash, Token::Slash) => true,
			_ => false,
		}
	}

	/// Match `input` completely, recording wildcard spans in `captures`.
	pub fn match_full(&self, input: &[char], captures: &mut Captures) -> bool {
		if input.len() < self.fixed_len {
			return false;
		}

		// Literal tail first: rejects `....gif` against most paths cheaply.
		if self.is_wild() {
			let tail = &self.tokens[self.tail_start..self.tokens.len() - 1];
			if self.fixed_len + tail.len() > input.len() {
				return false;
			}
			let from = input.len() - tail.len();
			if !tail
				.iter()
				.zip(&input[from..])
				.all(|(&token, &c)| self.accepts(token, c))
			{
				return false;
			}
		}

		// Hybrid probes folded case, so the prefix is re-checked exactly.
		let (mut mc, mut pos) = match self.case_mode {
			CaseMode::Hybrid => (0, 0),
			_ => (self.fixed_len, self.fixed_len),
		};
		let mut frames: Vec<Frame> = Vec::with_capacity(self.wildcard_count);

		loop {
			match self.tokens[mc] {
				Token::End => {
					if pos == input.len() {
						for frame in &frames {
							*captures.span_mut(frame.slot) = Span {
								start: frame.start,
								end: frame.end,
							};
						}
						return true;
					}
					if !retreat(&mut frames, &mut mc, &mut pos) {
						return false;
					}
				}
				Token::Literal(_) | Token::Slash => {
					while self.tokens[mc].is_literal() {
						if pos < input.len() && self.accepts(self.tokens[mc], input[pos]) {
							mc += 1;
							pos += 1;
						} else {
							if !retreat(&mut frames, &mut mc, &mut pos) {
								return false;
							}
							break;
						}
					}
				}
				Token::Ellipsis(slot) => {
					frames.push(Frame {
						resume: mc + 1,
						slot,
						start: pos,
						end: input.len(),
					});
					pos = input.len();
					mc += 1;
				}
				Token::Positional(slot) | Token::Star(slot) => {
					let start = pos;
					while pos < input.len() && input[pos] != '/' {
						pos += 1;
					}
					frames.push(Frame {
						resume: mc + 1,
						slot,
						start,
						end: pos,
					});
					mc += 1;
				}
			}
		}
	}

	/// Prefix probe followed by the full match.
	pub fn match_path(&self, input: &[char], captures: &mut Captures) -> bool {
		let mut offset = 0;
		self.match_prefix(input, &mut offset) == Ordering::Equal && self.match_full(input, captures)
	}

	pub fn matches(&self, path: &str) -> bool {
		let input: Vec<char> = path.chars().collect();
		self.match_path(&input, &mut Captures::new())
	}

	/// Render this pattern, substituting captured spans of `source`.
	pub fn expand(&self, source: &[char], captures: &Captures) -> String {
		let mut out = String::with_capacity(self.text.len());

		for &token in self.body() {
			match token {
				Token::Literal(c) => out.push(c),
				Token::Slash => out.push('/'),
				wild => {
					if let Some(span) = wild.slot().and_then(|slot| captures.get(slot)) {
						out.extend(source.get(span.start..span.end).into_iter().flatten());
					}
				}
			}
		}

		out
	}

	/// Does this pattern match everything `other` matches?
	///
	/// Used to drop generated rules already masked by an earlier one.
	pub fn covers(&self, other: &Pattern) -> bool {
		let mut mc = 0;
		let mut mc2 = 0;
		let mut frames: Vec<Frame> = Vec::new();

		loop {
			match self.tokens[mc] {
				Token::End => {
					if other.tokens[mc2] == Token::End {
						return true;
					}
					if !retreat(&mut frames, &mut mc, &mut mc2) {
						return false;
					}
				}
				Token::Literal(_) | Token::Slash => {
					while self.tokens[mc].is_literal() {
						if self.literal_eq(self.tokens[mc], other.tokens[mc2]) {
							mc += 1;
							mc2 += 1;
						} else {
							if !retreat(&mut frames, &mut mc, &mut mc2) {
								return false;
							}
							break;
						}
					}
				}
				Token::Ellipsis(slot) => {
					let start = mc2;
					while other.tokens[mc2] != Token::End {
						mc2 += 1;
					}
					frames.push(Frame {
						resume: mc + 1,
						slot,
						start,
						end: mc2,
					});
					mc += 1;
				}
				Token::Positional(slot) | Token::Star(slot) => {
					let start = mc2;
					while !matches!(
						other.tokens[mc2],
						Token::End | Token::Slash | Token::Ellipsis(_)
					) {
						mc2 += 1;
					}
					frames.push(Frame {
						resume: mc + 1,
						slot,
						start,
						end: mc2,
					});
					mc += 1;
				}
			}
		}
	}

	/// Can this pattern match a subdirectory below token `from`?
	pub fn has_sub_dirs(&self, from: usize) -> bool {
		self.tokens[from.min(self.tokens.len() - 1)..]
			.iter()
			.find(|t| matches!(t, Token::End | Token::Slash | Token::Ellipsis(_)))
			.is_some_and(|t| *t != Token::End)
	}

	/// True for patterns ending in `/...` (or `\...`).
	pub fn has_end_slash_ellipsis(&self) -> bool {
		let body = self.body();
		if !self.is_wild() || body.len() < 2 {
			return false;
		}

		matches!(body[body.len() - 1], Token::Ellipsis(_))
			&& matches!(body[body.len() - 2], Token::Slash | Token::Literal('\\'))
	}
}

impl fmt::Display for Pattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.text)
	}
}

/// `%%N` at `i`?
fn positional_at(chars: &[char], i: usize) -> Option<usize> {
	match chars.get(i..i + 3) {
		Some(['%', '%', digit]) => digit.to_digit(10).map(|d| d as usize),
		_ => None,
	}
}

/// Shrink the most recent wildcard capture by one and resume after it.
///
/// Frames that cannot shrink any further are dropped. Returns false when
/// no capture is left to retry.
fn retreat(frames: &mut Vec<Frame>, mc: &mut usize, pos: &mut usize) -> bool {
	while let Some(top) = frames.last_mut() {
		if top.end > top.start {
			top.end -= 1;
			*mc = top.resume;
			*pos = top.end;
			return true;
		}
		frames.pop();
	}
	false
}
