//! rote: spaced repetition drills over plain CSV decks.
//!
//! Cards live in CSV files that are both authored by hand and used as the
//! only database. A drill session picks the due cards, shows them with
//! their cloze spans blanked, schedules each one with the FSRS memory model
//! and writes the updated row back to its file straight away.

pub mod config;
pub mod flashcards;

pub use config::RoteConfig;
pub use flashcards::{CardStore, DeckSelection, ReviewSession};
