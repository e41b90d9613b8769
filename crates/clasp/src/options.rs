use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OptionsError;
use crate::model::{CommandTree, NodeId};

/// Process-wide settings, read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ApplicationOptions {
    /// Program name shown in usage lines and as the root command name.
    pub name: String,
    pub version: String,
    pub description: String,
    pub ignore_unknown_options: bool,
    pub ignore_additional_values: bool,
    pub provide_help_command: bool,
    pub provide_version_command: bool,
    pub provide_help_options: bool,
    pub provide_version_options: bool,
    pub parse_error_exit_code: i32,
}

impl Default for ApplicationOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: String::new(),
            description: String::new(),
            ignore_unknown_options: false,
            ignore_additional_values: false,
            provide_help_command: true,
            provide_version_command: true,
            provide_help_options: true,
            provide_version_options: true,
            parse_error_exit_code: 1,
        }
    }
}

impl ApplicationOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Parse options from JSON text. Missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, OptionsError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load options from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| OptionsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

/// Parser settings in effect for one command after applying overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserSettings {
    pub ignore_unknown_options: bool,
    pub ignore_additional_values: bool,
}

impl ParserSettings {
    /// Resolve settings for `node`: the nearest command on the path to the
    /// root that sets an override wins, otherwise the application value.
    pub fn resolve(tree: &CommandTree, node: NodeId, app: &ApplicationOptions) -> Self {
        let mut ignore_unknown_options = None;
        let mut ignore_additional_values = None;
        for ancestor in tree.ancestors(node) {
            let overrides = tree.node(ancestor).overrides();
            ignore_unknown_options = ignore_unknown_options.or(overrides.ignore_unknown_options);
            ignore_additional_values =
                ignore_additional_values.or(overrides.ignore_additional_values);
        }
        Self {
            ignore_unknown_options: ignore_unknown_options.unwrap_or(app.ignore_unknown_options),
            ignore_additional_values: ignore_additional_values
                .unwrap_or(app.ignore_additional_values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_keep_defaults() {
        let opts = ApplicationOptions::from_json(
            r#"{ "name": "tool", "ignore-unknown-options": true, "parse-error-exit-code": 64 }"#,
        )
        .unwrap();
        assert_eq!(opts.name, "tool");
        assert!(opts.ignore_unknown_options);
        assert!(opts.provide_help_options);
        assert!(opts.provide_version_command);
        assert_eq!(opts.parse_error_exit_code, 64);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = ApplicationOptions::from_json("{ name: ").unwrap_err();
        assert!(matches!(err, OptionsError::Json(_)));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = ApplicationOptions::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("not/here.json"), "{err}");
        let source = std::error::Error::source(&err).expect("io error is kept as the source");
        let io = source.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
        assert!(matches!(err, OptionsError::Io { .. }));
    }
}
