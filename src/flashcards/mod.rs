//! Flashcard and spaced repetition system for rote
//!
//! This module provides:
//! - Card records read from and written back to CSV deck sources
//! - The FSRS memory model (retrievability, stability, difficulty)
//! - Cloze rendering of card fronts
//! - Drill sessions driving reviews one card at a time

pub mod algorithm;
pub mod cloze;
pub mod errors;
pub mod models;
pub mod session;
pub mod storage;

pub use algorithm::{MemoryState, Parameters, ReviewOutcome};
pub use errors::{ContractError, FlashcardError, FormatError, FormatErrorKind};
pub use models::*;
pub use session::{DeckSelection, GradeReceipt, ReviewSession, SessionOptions, SessionState};
pub use storage::{CardStore, DeckSource};
