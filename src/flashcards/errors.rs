//! Error types for deck loading, review and persistence

use std::path::PathBuf;

use thiserror::Error;

use super::session::SessionState;

#[derive(Error, Debug)]
pub enum FlashcardError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("Failed to persist {} after {attempts} attempt(s): {source}", .path.display())]
    Persistence {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, FlashcardError>;

/// A deck source that cannot be loaded as written.
///
/// The source file is rejected as a whole; sources already loaded stay valid.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}{}: {kind}", .origin.display(), line_suffix(.line))]
pub struct FormatError {
    pub origin: PathBuf,
    pub line: Option<u64>,
    pub kind: FormatErrorKind,
}

impl FormatError {
    pub fn new(origin: impl Into<PathBuf>, line: Option<u64>, kind: FormatErrorKind) -> Self {
        Self {
            origin: origin.into(),
            line,
            kind,
        }
    }
}

fn line_suffix(line: &Option<u64>) -> String {
    line.map(|l| format!(":{l}")).unwrap_or_default()
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatErrorKind {
    #[error("missing header row")]
    MissingHeader,

    #[error("header column {column} should be '{expected}', found '{found}'")]
    MalformedHeader {
        column: usize,
        expected: &'static str,
        found: String,
    },

    #[error("expected {expected} fields, found {found}")]
    ColumnCount { expected: usize, found: usize },

    #[error("invalid number in '{column}': '{value}'")]
    InvalidNumber { column: &'static str, value: String },

    #[error("invalid date in '{column}': '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { column: &'static str, value: String },

    #[error("invalid scheduling state: {0}")]
    InvalidState(String),

    #[error("duplicate card id '{0}'")]
    DuplicateId(String),

    #[error("unreadable CSV: {0}")]
    Syntax(String),
}

/// A request that breaks the calling contract of the review core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error("grade must be 1, 2, 3 or 4, got {0}")]
    InvalidGrade(u8),

    #[error("card '{found}' is not the card awaiting a grade (expected {expected:?})")]
    CardNotCurrent {
        expected: Option<String>,
        found: String,
    },

    #[error("unknown deck '{0}'")]
    UnknownDeck(String),

    #[error("unknown card '{0}'")]
    UnknownCard(String),

    #[error("cannot {operation} while session is {state}")]
    WrongState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("review of '{card_id}' produced non-finite state (stability {stability}, difficulty {difficulty})")]
    NonFinite {
        card_id: String,
        stability: f64,
        difficulty: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_display() {
        let err = FormatError::new("decks/a.csv", Some(3), FormatErrorKind::DuplicateId("c1".to_string()));
        assert_eq!(err.to_string(), "decks/a.csv:3: duplicate card id 'c1'");

        let err = FormatError::new("decks/a.csv", None, FormatErrorKind::MissingHeader);
        assert_eq!(err.to_string(), "decks/a.csv: missing header row");
    }
}
