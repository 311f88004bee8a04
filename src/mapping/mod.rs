//! The view-mapping engine.
//!
//! A [`RuleTable`] holds [`Rule`]s in declaration order; a rule's index is
//! its precedence. Queries go through a [`PrecedenceTree`] per direction,
//! built lazily and dropped whenever the table changes.

pub mod disambiguate;
pub mod join;
pub mod pattern;
pub mod rule;
pub mod table;
pub mod tree;

pub use join::{JoinSink, JoinState};
pub use pattern::{CaseMode, Captures, MAX_WILDCARDS, Pattern, Span, Token};
pub use rule::{Direction, Rule, RuleKind};
pub use table::{
	EmptyReason, JoinLimits, MapOptions, Match, PrefixString, RuleTable, Translation,
	is_valid_depot_map, pattern_matches,
};
pub use tree::PrecedenceTree;
