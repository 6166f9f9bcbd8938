use clap::Args;
use std::path::PathBuf;

use closer::placeholder::{self, PlaceholderReport};

use super::{require_dir, CmdResult, SettingsArgs};

#[derive(Args)]
pub struct AuditArgs {
    /// Root directory of the source tree to audit
    pub path: PathBuf,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

pub fn run(args: AuditArgs, _global: &super::GlobalArgs) -> CmdResult<PlaceholderReport> {
    require_dir(&args.path)?;
    let settings = args.settings.resolve()?;

    let report = placeholder::audit_path(&args.path, &settings)?;
    let exit_code = if report.placeholders_unused > 0 { 1 } else { 0 };
    Ok((report, exit_code))
}
