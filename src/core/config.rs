//! Run settings: defaults, optional JSON file, CLI overrides.
//!
//! Every field has a default so a config file only needs the keys it changes:
//!
//! ```json
//! { "extension": "jav", "threads": 4, "handle_prefix": "closeable" }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// File extension (without the dot) of files to scan.
    pub extension: String,
    /// Worker threads for the file pool. 0 uses the rayon default.
    pub threads: usize,
    /// Compute rewrites without writing files.
    pub dry_run: bool,
    /// Record extraction traces in each file report.
    pub verbose: bool,
    /// Prefix for renamed handle symbols.
    pub handle_prefix: String,
    /// Prefix for statement handles introduced by the repair pass.
    pub statement_prefix: String,
    /// Declared type suffix identifying prepared-query handles.
    pub query_type: String,
    /// Declared type suffix identifying result-cursor handles.
    pub cursor_type: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extension: "java".to_string(),
            threads: 0,
            dry_run: false,
            verbose: false,
            handle_prefix: "generatedVariable".to_string(),
            statement_prefix: "stmt_generated_".to_string(),
            query_type: "PreparedStatement".to_string(),
            cursor_type: "ResultSet".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
        })?;
        let settings: Settings = serde_json::from_str(&raw)
            .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would produce invalid patterns or identifiers.
    pub fn validate(&self) -> Result<()> {
        let ext = self.extension.trim_start_matches('.');
        if ext.is_empty() {
            return Err(Error::config_invalid_value(
                "extension",
                Some(self.extension.clone()),
                "extension must not be empty",
            ));
        }

        for (key, value) in [
            ("handle_prefix", &self.handle_prefix),
            ("statement_prefix", &self.statement_prefix),
            ("query_type", &self.query_type),
            ("cursor_type", &self.cursor_type),
        ] {
            if !is_identifier(value) {
                return Err(Error::config_invalid_value(
                    key,
                    Some(value.clone()),
                    "must be a plain identifier ([A-Za-z_][A-Za-z0-9_]*)",
                ));
            }
        }

        if self.handle_prefix == self.statement_prefix {
            return Err(Error::config_invalid_value(
                "statement_prefix",
                Some(self.statement_prefix.clone()),
                "must differ from handle_prefix",
            ));
        }

        Ok(())
    }

    /// The extension without a leading dot.
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_java_jdbc() {
        let settings = Settings::default();
        assert_eq!(settings.extension(), "java");
        assert_eq!(settings.query_type, "PreparedStatement");
        assert_eq!(settings.cursor_type, "ResultSet");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"threads": 3}"#).unwrap();
        assert_eq!(settings.threads, 3);
        assert_eq!(settings.handle_prefix, "generatedVariable");
    }

    #[test]
    fn rejects_non_identifier_prefix() {
        let settings = Settings {
            handle_prefix: "gen-var".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_identical_prefixes() {
        let settings = Settings {
            statement_prefix: "generatedVariable".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn extension_strips_dot() {
        let settings = Settings {
            extension: ".jav".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.extension(), "jav");
    }

    #[test]
    fn load_reports_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("closer.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConfigInvalidJson);
    }
}
