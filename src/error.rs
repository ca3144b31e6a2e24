//! Fatal pipeline errors.
//!
//! Only the loader can fail. Everything downstream degrades to defaults
//! and is recorded in the quality report instead.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One rejected `(encoding, delimiter)` combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub encoding: &'static str,
    pub delimiter: u8,
    pub reason: String,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {}: {}",
            self.encoding,
            delimiter_name(self.delimiter),
            self.reason
        )
    }
}

pub fn delimiter_name(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "tab".to_string(),
        other => format!("'{}'", other as char),
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    /// The file itself could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every encoding/delimiter combination was rejected.
    #[error("no encoding/delimiter combination could parse {path}:\n{}", render_attempts(.attempts))]
    Unreadable { path: PathBuf, attempts: Vec<Attempt> },
}

impl LoadError {
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            LoadError::Io { .. } => &[],
            LoadError::Unreadable { attempts, .. } => attempts,
        }
    }
}

fn render_attempts(attempts: &[Attempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("  - {}", a))
        .collect::<Vec<_>>()
        .join("\n")
}
