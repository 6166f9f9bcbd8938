use clap::Args;
use std::path::PathBuf;

use closer::rewrite::{self, RunReport};

use super::{require_dir, CmdResult, SettingsArgs};

#[derive(Args)]
pub struct RewriteArgs {
    /// Root directory of the source tree to rewrite
    pub path: PathBuf,

    /// Compute rewrites without writing files
    #[arg(long)]
    pub dry_run: bool,

    /// Include extraction traces in the report
    #[arg(long)]
    pub verbose: bool,

    /// Worker threads (default: one per core)
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

pub fn run(args: RewriteArgs, _global: &super::GlobalArgs) -> CmdResult<RunReport> {
    require_dir(&args.path)?;

    let mut settings = args.settings.resolve()?;
    if args.dry_run {
        settings.dry_run = true;
    }
    if args.verbose {
        settings.verbose = true;
    }
    if let Some(threads) = args.threads {
        settings.threads = threads;
    }

    let report = rewrite::rewrite_path(&args.path, &settings)?;
    let exit_code = report.exit_code();
    Ok((report, exit_code))
}
