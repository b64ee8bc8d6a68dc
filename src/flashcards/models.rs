//! Data models for the flashcard system

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::errors::ContractError;

/// Columns every deck source starts with, in this order
pub const SCHEMA_COLUMNS: [&str; 9] = [
    "deck",
    "front",
    "back",
    "media",
    "id",
    "stability",
    "difficulty",
    "due",
    "last_review",
];

pub(crate) const DECK: usize = 0;
pub(crate) const FRONT: usize = 1;
pub(crate) const BACK: usize = 2;
pub(crate) const MEDIA: usize = 3;
pub(crate) const ID: usize = 4;
pub(crate) const STABILITY: usize = 5;
pub(crate) const DIFFICULTY: usize = 6;
pub(crate) const DUE: usize = 7;
pub(crate) const LAST_REVIEW: usize = 8;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Outcome of one review, as reported by the learner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Grade {
    /// Failed recall (a lapse)
    Again,
    Hard,
    Good,
    Easy,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::Again, Grade::Hard, Grade::Good, Grade::Easy];

    pub fn as_u8(self) -> u8 {
        match self {
            Grade::Again => 1,
            Grade::Hard => 2,
            Grade::Good => 3,
            Grade::Easy => 4,
        }
    }

    pub(crate) fn value(self) -> f64 {
        f64::from(self.as_u8())
    }

    pub fn label(self) -> &'static str {
        match self {
            Grade::Again => "again",
            Grade::Hard => "hard",
            Grade::Good => "good",
            Grade::Easy => "easy",
        }
    }
}

impl TryFrom<u8> for Grade {
    type Error = ContractError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Grade::Again),
            2 => Ok(Grade::Hard),
            3 => Ok(Grade::Good),
            4 => Ok(Grade::Easy),
            _ => Err(ContractError::InvalidGrade(n)),
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Memory-model state of a card that has been reviewed at least once
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Days until retrievability decays to the desired retention
    pub stability: f64,
    /// Inherent hardness, within [1, 10]
    pub difficulty: f64,
    pub due: NaiveDate,
    pub last_review: NaiveDate,
}

/// Smallest positive stability that survives the four decimals written to disk
pub const MIN_STORED_STABILITY: f64 = 0.0001;

/// One row of a deck source.
///
/// The record keeps the text of every cell it was read from, and the exact
/// bytes of its row. Only a review rewrites cells (the four scheduling
/// columns), and assigning a missing id fills the id cell. A row that was
/// never rewritten is saved from its original bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    deck: String,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    schedule: Option<Schedule>,
    #[serde(skip)]
    cells: Vec<String>,
    #[serde(skip)]
    line: Option<u64>,
    #[serde(skip)]
    text: RowText,
}

/// Source text of one row, split so the row can be re-encoded while the
/// line breaks around it are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RowText {
    /// Line breaks before the row
    pub lead: String,
    /// The row as written; `None` once its cells no longer match it
    pub body: Option<String>,
    /// Line terminator after the row, empty on a final unterminated row
    pub trail: String,
}

impl RowText {
    /// Split a row's span of source text into its parts
    pub fn split(span: &str) -> Self {
        let is_break = |c: char| c == '\r' || c == '\n';
        let body = span.trim_start_matches(is_break);
        let lead = &span[..span.len() - body.len()];
        let content = body.trim_end_matches(is_break);
        let trail = &body[content.len()..];
        Self {
            lead: lead.to_string(),
            body: Some(content.to_string()),
            trail: trail.to_string(),
        }
    }
}

impl CardRecord {
    /// Assemble a record from already validated cells and its source text
    pub(crate) fn from_cells(
        deck: String,
        id: String,
        schedule: Option<Schedule>,
        cells: Vec<String>,
        line: Option<u64>,
        text: RowText,
    ) -> Self {
        Self {
            deck,
            id,
            schedule,
            cells,
            line,
            text,
        }
    }

    /// Deck label used for grouping (the source file stem when the cell is empty)
    pub fn deck(&self) -> &str {
        &self.deck
    }

    pub fn front(&self) -> &str {
        &self.cells[FRONT]
    }

    pub fn back(&self) -> &str {
        &self.cells[BACK]
    }

    pub fn media(&self) -> &str {
        &self.cells[MEDIA]
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    pub fn stability(&self) -> Option<f64> {
        self.schedule.map(|s| s.stability)
    }

    pub fn difficulty(&self) -> Option<f64> {
        self.schedule.map(|s| s.difficulty)
    }

    pub fn due(&self) -> Option<NaiveDate> {
        self.schedule.map(|s| s.due)
    }

    pub fn last_review(&self) -> Option<NaiveDate> {
        self.schedule.map(|s| s.last_review)
    }

    /// Columns past the schema, verbatim
    pub fn extra(&self) -> &[String] {
        &self.cells[SCHEMA_COLUMNS.len()..]
    }

    /// A never-reviewed card
    pub fn is_new(&self) -> bool {
        self.schedule.is_none()
    }

    /// New cards are always due
    pub fn is_due(&self, today: NaiveDate) -> bool {
        match self.schedule {
            None => true,
            Some(s) => s.due <= today,
        }
    }

    /// Every cell of the row, in source column order
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// Line of the source the row started on
    pub fn line(&self) -> Option<u64> {
        self.line
    }

    pub(crate) fn text(&self) -> &RowText {
        &self.text
    }

    /// Replace the scheduling state after a review.
    ///
    /// Stability and difficulty are stored at the precision written to disk,
    /// so the in-memory record matches what a reload would produce.
    pub fn set_schedule(&mut self, schedule: Schedule) {
        let stability = round_stored(schedule.stability).max(MIN_STORED_STABILITY);
        let difficulty = round_stored(schedule.difficulty);
        self.cells[STABILITY] = format_stored(stability);
        self.cells[DIFFICULTY] = format_stored(difficulty);
        self.cells[DUE] = schedule.due.format(DATE_FORMAT).to_string();
        self.cells[LAST_REVIEW] = schedule.last_review.format(DATE_FORMAT).to_string();
        self.text.body = None;
        self.schedule = Some(Schedule {
            stability,
            difficulty,
            ..schedule
        });
    }
}

fn round_stored(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn format_stored(v: f64) -> String {
    format!("{v:.4}")
}

/// Due and total counts for one deck
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckCount {
    pub due: usize,
    pub total: usize,
}

/// What the presentation layer shows for one card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub id: String,
    pub deck: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub media: String,
    /// Front with every cloze span blanked
    pub prompt: String,
    /// Front fully revealed, followed by the back
    pub answer: String,
}

/// Number of times each grade was given in a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCounts {
    pub again: u32,
    pub hard: u32,
    pub good: u32,
    pub easy: u32,
}

impl GradeCounts {
    pub fn record(&mut self, grade: Grade) {
        match grade {
            Grade::Again => self.again += 1,
            Grade::Hard => self.hard += 1,
            Grade::Good => self.good += 1,
            Grade::Easy => self.easy += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.again + self.hard + self.good + self.easy
    }
}
