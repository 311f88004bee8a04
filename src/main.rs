use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use viewmap::config::{load_table, load_view};
use viewmap::mapping::{Direction, RuleTable};

#[derive(Parser)]
#[command(name = "viewmap")]
#[command(
	author,
	version,
	about = "Translate paths through ordered wildcard views"
)]
#[command(arg_required_else_help = true)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	/// Log engine activity to stderr
	#[arg(long, short, global = true)]
	verbose: bool,
}

/// Which half of the view a path belongs to.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Side {
	/// Paths are in the source namespace
	Lhs,
	/// Paths are in the target namespace
	Rhs,
}

impl From<Side> for Direction {
	fn from(side: Side) -> Self {
		match side {
			Side::Lhs => Direction::Lhs,
			Side::Rhs => Direction::Rhs,
		}
	}
}

#[derive(Subcommand)]
enum Commands {
	/// Rewrite paths into the opposite namespace
	Translate {
		/// View file
		view: PathBuf,

		/// Paths to translate
		#[arg(required = true)]
		paths: Vec<String>,

		#[arg(long, short, value_enum, default_value_t = Side::Lhs)]
		direction: Side,
	},
	/// List every translation of each path, Andmaps included
	Explode {
		view: PathBuf,

		#[arg(required = true)]
		paths: Vec<String>,

		#[arg(long, short, value_enum, default_value_t = Side::Lhs)]
		direction: Side,
	},
	/// Show which rule decides each path
	Check {
		view: PathBuf,

		#[arg(required = true)]
		paths: Vec<String>,

		#[arg(long, short, value_enum, default_value_t = Side::Lhs)]
		direction: Side,
	},
	/// Compose two views through a shared namespace
	Join {
		left: PathBuf,
		right: PathBuf,

		/// Side of the left view that meets the right view
		#[arg(long, value_enum, default_value_t = Side::Rhs)]
		left_side: Side,

		/// Side of the right view that meets the left view
		#[arg(long, value_enum, default_value_t = Side::Lhs)]
		right_side: Side,

		/// Narrow the left view to what the right view covers instead
		#[arg(long)]
		restrict: bool,
	},
	/// Make precedence explicit with generated exclusions
	Disambiguate { view: PathBuf },
	/// Check view files for errors without translating anything
	Validate {
		#[arg(required = true)]
		views: Vec<PathBuf>,
	},
	/// Display a view as parsed
	Show {
		view: PathBuf,

		/// Print the search tree instead of the rules
		#[arg(long)]
		tree: bool,

		#[arg(long, short, value_enum, default_value_t = Side::Lhs)]
		direction: Side,
	},
}

fn main() -> ExitCode {
	match run() {
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e:?}");
			ExitCode::FAILURE
		}
	}
}

fn run() -> Result<ExitCode> {
	let cli = Cli::parse();
	viewmap::init_tracing(cli.verbose);

	match cli.command {
		Commands::Translate {
			view,
			paths,
			direction,
		} => handle_translate(&view, &paths, direction.into()),
		Commands::Explode {
			view,
			paths,
			direction,
		} => handle_explode(&view, &paths, direction.into()),
		Commands::Check {
			view,
			paths,
			direction,
		} => handle_check(&view, &paths, direction.into()),
		Commands::Join {
			left,
			right,
			left_side,
			right_side,
			restrict,
		} => handle_join(&left, &right, left_side.into(), right_side.into(), restrict),
		Commands::Disambiguate { view } => handle_disambiguate(&view),
		Commands::Validate { views } => handle_validate(&views),
		Commands::Show {
			view,
			tree,
			direction,
		} => handle_show(&view, tree, direction.into()),
	}
}

fn open_table(path: &Path) -> Result<RuleTable> {
	load_table(path).with_context(|| format!("Failed to load view {}", path.display()))
}

fn handle_translate(view: &Path, paths: &[String], dir: Direction) -> Result<ExitCode> {
	let table = open_table(view)?;

	for path in paths {
		match table.translate(dir, path) {
			Some(found) => println!("{} -> {}", path, found.path),
			None => println!("{} -> (unmapped)", path),
		}
	}

	Ok(ExitCode::SUCCESS)
}

fn handle_explode(view: &Path, paths: &[String], dir: Direction) -> Result<ExitCode> {
	let table = open_table(view)?;

	for path in paths {
		let found = table.explode(dir, path);
		if found.is_empty() {
			println!("{} -> (unmapped)", path);
		}
		for translation in found {
			println!("{} -> {} [{}]", path, translation.path, translation.kind);
		}
	}

	Ok(ExitCode::SUCCESS)
}

fn handle_check(view: &Path, paths: &[String], dir: Direction) -> Result<ExitCode> {
	let table = open_table(view)?;

	for path in paths {
		let decided = table
			.check(dir, path)
			.and_then(|found| table.get(found.precedence).map(|rule| (found.precedence, rule)));

		match decided {
			Some((precedence, rule)) => println!("{}: rule {} ({})", path, precedence + 1, rule),
			None => println!("{}: no match", path),
		}
	}

	Ok(ExitCode::SUCCESS)
}

fn handle_join(left: &Path, right: &Path, left_side: Direction, right_side: Direction, restrict: bool) -> Result<ExitCode> {
	let a = open_table(left)?;
	let b = open_table(right)?;

	let reason = format!("{} and {} share nothing", left.display(), right.display());
	let joined = if restrict {
		a.join2_with_reason(left_side, &b, right_side, &reason)
	} else {
		a.join_with_reason(left_side, &b, right_side, &reason)
	};

	if let Some(reason) = joined.empty_reason().filter(|_| joined.is_empty()) {
		eprintln!("Joined view is empty: {}", reason);
	}

	print!("{}", joined);
	Ok(ExitCode::SUCCESS)
}

fn handle_disambiguate(view: &Path) -> Result<ExitCode> {
	let mut table = open_table(view)?;
	table
		.disambiguate()
		.with_context(|| format!("Failed to disambiguate {}", view.display()))?;

	print!("{}", table);
	Ok(ExitCode::SUCCESS)
}

fn handle_validate(views: &[PathBuf]) -> Result<ExitCode> {
	let mut failed = false;
	let mut valid = Vec::new();

	for path in views {
		match load_table(path) {
			Ok(table) => valid.push((path, table.len())),
			Err(e) => {
				eprintln!("View error in {}: {}", path.display(), e);
				failed = true;
			}
		}
	}

	if failed {
		return Ok(ExitCode::FAILURE);
	}

	println!("All view files are valid:");
	for (path, rules) in valid {
		println!("  {} ({} rules)", path.display(), rules);
	}
	Ok(ExitCode::SUCCESS)
}

fn handle_show(view: &Path, tree: bool, dir: Direction) -> Result<ExitCode> {
	let loaded = load_view(view).with_context(|| format!("Failed to load view {}", view.display()))?;
	let table = viewmap::config::build_table(&loaded.config)?;

	println!("# Source: {}", loaded.path.display());
	println!("# case: {:?}", loaded.config.case);
	println!("# rules: {}", table.len());
	println!("# fingerprint: {:016x}", table.fingerprint());
	println!();

	if tree {
		println!("# search tree ({:?}, depth {})", dir, table.tree_depth(dir));
		print!("{}", table.dump_tree(dir));
		return Ok(ExitCode::SUCCESS);
	}

	for (i, rule) in table.iter().enumerate() {
		println!("  {:>3}  {}", i + 1, rule);
	}

	let prefixes = table.prefix_strings(dir);
	if !prefixes.is_empty() {
		println!();
		println!("# prefixes:");
		for prefix in prefixes {
			let marker = if prefix.has_sub_dirs { " (+subdirs)" } else { "" };
			println!("  {}{}", prefix.prefix, marker);
		}
	}

	Ok(ExitCode::SUCCESS)
}
