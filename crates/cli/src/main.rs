mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::TargetArgs;

/// kang - incremental builds for Go packages with pinned dependencies
#[derive(Parser)]
#[command(name = "kang")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the .kangfile (default: nearest one in the current or a parent directory)
  #[arg(short = 'f', long = "file", global = true)]
  file: Option<PathBuf>,

  /// Increase log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, action = ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile every stale package and link the main packages
  Build(TargetArgs),

  /// Show what a build would do without running the toolchain
  Plan(TargetArgs),
}

fn init_tracing(verbose: u8) {
  let default_level = match verbose {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

/// One-line rendering of an error chain.
///
/// Library errors already embed their source in their message, so causes
/// whose text is already present are skipped.
fn render_error(err: &anyhow::Error) -> String {
  let mut line = err.to_string();
  for cause in err.chain().skip(1) {
    let message = cause.to_string();
    if !line.contains(&message) {
      line.push_str(": ");
      line.push_str(&message);
    }
  }
  line
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match &cli.command {
    Commands::Build(args) => cmd::cmd_build(cli.file.as_deref(), args),
    Commands::Plan(args) => cmd::cmd_plan(cli.file.as_deref(), args),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("fatal: {}", render_error(&err));
      ExitCode::FAILURE
    }
  }
}
