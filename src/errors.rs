use miette::Diagnostic;
use thiserror::Error;

use crate::console::ConsoleError;
use crate::groups::LookupError;
use crate::rules::errors::RuleError;

#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Rules(#[from] RuleError),

    #[error("Invalid group blacklist entry `{pattern}`: {reason}")]
    #[diagnostic(
        code(permsync::invalid_blacklist),
        help("Blacklist entries are group keys or /regex/ patterns")
    )]
    InvalidBlacklist { pattern: String, reason: String },

    #[error("Invalid setting `{key}`: {reason}")]
    #[diagnostic(code(permsync::invalid_setting))]
    InvalidSetting { key: &'static str, reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Console(#[from] ConsoleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lookup(#[from] LookupError),

    #[error("File watcher error: {0}")]
    #[diagnostic(code(permsync::watch))]
    Watch(String),
}

impl From<notify::Error> for SyncError {
    fn from(value: notify::Error) -> Self {
        SyncError::Watch(value.to_string())
    }
}
