use std::io;

use thiserror::Error;

/// Everything that can stop a run before or around execution.
///
/// Failures of the executed programs themselves are not errors: they only
/// show up as exit statuses on the command trees.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("line {line}: unknown token '{found}'")]
    Lexical { line: usize, found: char },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: missing an accompanying parenthesis")]
    Unbalanced { line: usize },

    #[error("no commands found")]
    Empty,

    #[error("{path}: {source}")]
    Redirect { path: String, source: io::Error },

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Sys(#[from] nix::Error),
}

impl ShellError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        ShellError::Syntax {
            line,
            message: message.into(),
        }
    }

    /// Parse-time errors abort the whole run before anything executes.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            ShellError::Lexical { .. }
                | ShellError::Syntax { .. }
                | ShellError::Unbalanced { .. }
                | ShellError::Empty
        )
    }
}
