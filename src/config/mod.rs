//! View file loading for viewmap.
//!
//! A view file is TOML: a case mode, optional join limits, view lines and
//! structured rules. See [`ViewConfig`].

pub mod parser;
pub mod types;

pub use parser::{build_table, parse_view_file, parse_view_line, parse_view_str};
pub use types::{LoadedView, RuleSpec, ViewConfig};

use crate::error::Result;
use crate::mapping::RuleTable;
use std::path::Path;

/// Load a view file and keep the path it came from.
pub fn load_view(path: &Path) -> Result<LoadedView> {
	Ok(LoadedView {
		config: parse_view_file(path)?,
		path: path.to_path_buf(),
	})
}

/// Load a view file straight into a rule table.
pub fn load_table(path: &Path) -> Result<RuleTable> {
	build_table(&parse_view_file(path)?)
}
