pub mod decks;
pub mod drill;
pub mod preview;
