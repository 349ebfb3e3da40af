//! Configuration loading and validation errors.

use std::fmt::Write;
use std::path::PathBuf;

use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// `NETLEDGER_ENV` named an environment with no overlay file.
    #[error("NETLEDGER_ENV is '{env}' but {} does not exist", .path.display())]
    UnknownEnvironment { env: String, path: PathBuf },

    /// One line per failing setting, keyed by its dotted path
    /// (`batch.threshold`), the same path used by `NETLEDGER_*` overrides.
    #[error("Invalid configuration:\n{}", describe(.0))]
    Validation(#[source] ValidationErrors),

    #[error("Configuration parsing error: {0}")]
    Parsing(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Parsing(Box::new(err))
    }
}

impl From<ValidationErrors> for ConfigError {
    fn from(errors: ValidationErrors) -> Self {
        ConfigError::Validation(errors)
    }
}

fn describe(errors: &ValidationErrors) -> String {
    let mut lines = Vec::new();
    collect(errors, "", &mut lines);
    lines.sort();

    let mut output = String::new();
    for line in lines {
        let _ = writeln!(output, "  - {line}");
    }
    output
}

fn collect(errors: &ValidationErrors, prefix: &str, lines: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = format!("{prefix}{field}");
        match kind {
            ValidationErrorsKind::Field(failures) => {
                for failure in failures {
                    let reason = failure
                        .message
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| failure.code.to_string());
                    lines.push(format!("{path}: {reason}"));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect(nested, &format!("{path}."), lines),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect(nested, &format!("{path}[{index}]."), lines);
                }
            }
        }
    }
}
