use clap::Args;
use std::path::PathBuf;

use closer::Settings;

pub type CmdResult<T> = closer::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// Settings sources shared by every command.
///
/// Resolution order: defaults, then `--config FILE`, then explicit flags.
#[derive(Args, Default, Debug)]
pub struct SettingsArgs {
    /// JSON settings file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// File extension to scan (default: java)
    #[arg(long, value_name = "EXT")]
    pub extension: Option<String>,
}

impl SettingsArgs {
    pub fn resolve(&self) -> closer::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if let Some(extension) = &self.extension {
            settings.extension = extension.clone();
        }

        settings.validate()?;
        Ok(settings)
    }
}

/// Reject a root that is not a directory before any work starts.
pub(crate) fn require_dir(path: &std::path::Path) -> closer::Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    Err(closer::Error::validation_invalid_argument(
        "path",
        format!("Not a directory: {}", path.display()),
    )
    .with_hint("Pass the root of a source tree"))
}

pub mod audit;
pub mod rewrite;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (closer::Result<serde_json::Value>, i32) {
    crate::tty::status("closer is working...");

    match command {
        crate::Commands::Rewrite(args) => dispatch!(args, global, rewrite),
        crate::Commands::Audit(args) => dispatch!(args, global, audit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("closer.json");
        std::fs::write(&config, r#"{ "extension": "jav", "threads": 3 }"#).unwrap();

        let args = SettingsArgs {
            config: Some(config),
            extension: Some("java".to_string()),
        };
        let settings = args.resolve().unwrap();

        assert_eq!(settings.extension, "java");
        assert_eq!(settings.threads, 3);
    }

    #[test]
    fn invalid_config_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("closer.json");
        std::fs::write(&config, "{ not json").unwrap();

        let args = SettingsArgs {
            config: Some(config),
            extension: None,
        };
        let err = args.resolve().unwrap_err();
        assert_eq!(err.code, closer::ErrorCode::ConfigInvalidJson);
    }

    #[test]
    fn missing_root_is_validation_error() {
        let err = require_dir(std::path::Path::new("/nonexistent/closer-root")).unwrap_err();
        assert_eq!(err.code, closer::ErrorCode::ValidationInvalidArgument);
    }
}
