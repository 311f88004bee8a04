//! Viewmap - ordered wildcard views between path namespaces.
//!
//! This library provides the core functionality for viewmap, including:
//! - Pattern compilation and matching (`*`, `...`, `%%N`)
//! - Rule tables with precedence search, translation and explosion
//! - Composition of tables through a shared namespace
//! - Disambiguation of order-dependent views
//! - View file parsing
//!
//! # Example
//!
//! ```
//! use viewmap::mapping::{Direction, RuleKind, RuleTable};
//!
//! let mut view = RuleTable::new();
//! view.insert("//depot/...", "//client/...", RuleKind::Map).unwrap();
//! view.insert("//depot/secret/...", "//client/secret/...", RuleKind::Unmap).unwrap();
//!
//! let found = view.translate(Direction::Lhs, "//depot/src/main.c").unwrap();
//! assert_eq!(found.path, "//client/src/main.c");
//! assert!(view.translate(Direction::Lhs, "//depot/secret/key").is_none());
//! ```

pub mod config;
pub mod error;
pub mod mapping;

pub use error::{MapError, Result};
pub use mapping::{CaseMode, Direction, Pattern, Rule, RuleKind, RuleTable};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install the tracing subscriber.
///
/// Without `verbose` this only happens when `RUST_LOG` is set.
pub fn init_tracing(verbose: bool) {
	TRACING_INIT.call_once(|| {
		use tracing_subscriber::{EnvFilter, fmt, prelude::*};

		let filter = if std::env::var("RUST_LOG").is_ok() {
			EnvFilter::from_default_env()
		} else if verbose {
			EnvFilter::new("viewmap=debug")
		} else {
			return;
		};

		tracing_subscriber::registry()
			.with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
			.with(filter)
			.init();
	});
}
