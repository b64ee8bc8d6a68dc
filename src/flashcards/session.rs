//! Drill sessions
//!
//! A session owns the loaded cards and a queue of the due cards in the
//! selected decks. The presentation layer drives it in two steps:
//! [`ReviewSession::next_card`] shows the card at the head of the queue, then
//! [`ReviewSession::submit_grade`] schedules it, persists its source file
//! and advances. Control sits with the caller between the two calls.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::algorithm::{self, MemoryState, Parameters, ReviewOutcome};
use super::cloze;
use super::errors::{ContractError, Result};
use super::models::*;
use super::storage::{CardKey, CardStore};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    /// Decks not chosen yet
    SelectingDecks,
    /// Ready to show the card at the head of the queue
    Presenting,
    /// A card is shown and waits for its grade
    AwaitingGrade { card_id: String },
    /// The queue is exhausted
    Finished,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::SelectingDecks => f.write_str("selecting decks"),
            SessionState::Presenting => f.write_str("presenting"),
            SessionState::AwaitingGrade { card_id } => write!(f, "awaiting a grade for '{card_id}'"),
            SessionState::Finished => f.write_str("finished"),
        }
    }
}

/// Which decks a session drills
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeckSelection {
    All,
    Decks(BTreeSet<String>),
}

impl DeckSelection {
    pub fn decks<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DeckSelection::Decks(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, deck: &str) -> bool {
        match self {
            DeckSelection::All => true,
            DeckSelection::Decks(names) => names.contains(deck),
        }
    }
}

/// Fixed inputs of a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub params: Parameters,
    /// The day reviews are recorded on
    pub today: NaiveDate,
    /// Seed for interval fuzz
    pub seed: u64,
    /// Queue new cards after every scheduled card
    pub new_cards_last: bool,
}

/// Result of a graded card
#[derive(Debug, Clone)]
pub struct GradeReceipt {
    /// The card as persisted
    pub card: CardRecord,
    pub grade: Grade,
    pub interval: u32,
    /// Cards left in the queue
    pub remaining: usize,
}

pub struct ReviewSession {
    store: CardStore,
    options: SessionOptions,
    rng: StdRng,
    queue: VecDeque<String>,
    state: SessionState,
    counts: GradeCounts,
}

impl ReviewSession {
    pub fn new(store: CardStore, options: SessionOptions) -> Self {
        let rng = StdRng::seed_from_u64(options.seed);
        Self {
            store,
            options,
            rng,
            queue: VecDeque::new(),
            state: SessionState::SelectingDecks,
            counts: GradeCounts::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn store(&self) -> &CardStore {
        &self.store
    }

    pub fn into_store(self) -> CardStore {
        self.store
    }

    pub fn params(&self) -> &Parameters {
        &self.options.params
    }

    /// Grades given so far
    pub fn summary(&self) -> GradeCounts {
        self.counts
    }

    /// Cards still queued, including one awaiting its grade
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Ids of the queued cards, head first
    pub fn queue(&self) -> impl Iterator<Item = &str> + '_ {
        self.queue.iter().map(String::as_str)
    }

    /// Due and total counts for every deck the selection covers
    pub fn due_counts(&self, selection: &DeckSelection) -> BTreeMap<String, DeckCount> {
        let today = self.options.today;
        let mut counts: BTreeMap<String, DeckCount> = BTreeMap::new();
        for (_, card) in self.store.cards() {
            if !selection.contains(card.deck()) {
                continue;
            }
            let entry = counts.entry(card.deck().to_string()).or_default();
            entry.total += 1;
            if card.is_due(today) {
                entry.due += 1;
            }
        }
        counts
    }

    /// Choose the decks to drill and build the queue.
    ///
    /// Due cards are queued by ascending due date, ties in load order. The
    /// queue is fixed from here on. Returns the number of queued cards.
    pub fn select_decks(&mut self, selection: DeckSelection) -> Result<usize> {
        if self.state != SessionState::SelectingDecks {
            return Err(ContractError::WrongState {
                operation: "select decks",
                state: self.state.clone(),
            }
            .into());
        }
        if let DeckSelection::Decks(names) = &selection {
            let known = self.store.deck_names();
            if let Some(unknown) = names.iter().find(|n| !known.contains(n)) {
                return Err(ContractError::UnknownDeck(unknown.clone()).into());
            }
        }

        let today = self.options.today;
        let new_cards_last = self.options.new_cards_last;
        let mut due: Vec<(CardKey, Option<NaiveDate>, &str)> = self
            .store
            .cards()
            .filter(|(_, card)| selection.contains(card.deck()) && card.is_due(today))
            .map(|(key, card)| (key, card.due(), card.id()))
            .collect();
        due.sort_by(|a, b| {
            let order = match (a.1, b.1) {
                (Some(x), Some(y)) => x.cmp(&y),
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) if new_cards_last => std::cmp::Ordering::Greater,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) if new_cards_last => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
            };
            order.then(a.0.cmp(&b.0))
        });
        self.queue = due.into_iter().map(|(_, _, id)| id.to_string()).collect();

        log::info!("Session queued {} due cards", self.queue.len());
        self.advance();
        Ok(self.queue.len())
    }

    /// Show the card at the head of the queue.
    ///
    /// Asking again before grading returns the same card. Returns `None`
    /// once the session is finished or before decks are selected.
    pub fn next_card(&mut self) -> Option<CardView> {
        let card_id = match &self.state {
            SessionState::Presenting => self.queue.front()?.clone(),
            SessionState::AwaitingGrade { card_id } => card_id.clone(),
            SessionState::SelectingDecks | SessionState::Finished => return None,
        };
        let card = self.store.get(&card_id)?;
        let rendered = cloze::render(card.front(), card.back());
        let view = CardView {
            id: card.id().to_string(),
            deck: card.deck().to_string(),
            media: card.media().to_string(),
            prompt: rendered.prompt,
            answer: rendered.answer,
        };
        self.state = SessionState::AwaitingGrade { card_id };
        Some(view)
    }

    /// Grade the card awaiting its grade.
    ///
    /// The card's source file is rewritten before the queue advances. If
    /// the write fails the in-memory card is restored and the card stays at
    /// the head of the queue, still awaiting its grade.
    pub fn submit_grade(&mut self, card_id: &str, grade: u8) -> Result<GradeReceipt> {
        let grade = Grade::try_from(grade)?;
        match &self.state {
            SessionState::AwaitingGrade { card_id: current } if current == card_id => {}
            SessionState::AwaitingGrade { card_id: current } => {
                return Err(ContractError::CardNotCurrent {
                    expected: Some(current.clone()),
                    found: card_id.to_string(),
                }
                .into());
            }
            _ => {
                return Err(ContractError::CardNotCurrent {
                    expected: None,
                    found: card_id.to_string(),
                }
                .into());
            }
        }

        let previous = self
            .store
            .get(card_id)
            .cloned()
            .ok_or_else(|| ContractError::UnknownCard(card_id.to_string()))?;
        // Fuzz draws from a copy, committed only once the review is saved
        let mut rng = self.rng.clone();
        let outcome = self.schedule(&previous, grade, &mut rng);
        if !outcome.state.is_finite() {
            return Err(ContractError::NonFinite {
                card_id: card_id.to_string(),
                stability: outcome.state.stability,
                difficulty: outcome.state.difficulty,
            }
            .into());
        }

        let today = self.options.today;
        let mut updated = previous.clone();
        updated.set_schedule(Schedule {
            stability: outcome.state.stability,
            difficulty: outcome.state.difficulty,
            // Never earlier than the due date the card already had
            due: previous.due().map_or(outcome.due, |d| d.max(outcome.due)),
            last_review: today,
        });

        self.store.replace(updated.clone())?;
        if let Err(e) = self.store.save_source_of(card_id) {
            log::warn!("Review of {} not persisted, keeping it queued: {}", card_id, e);
            self.store.replace(previous)?;
            return Err(e);
        }
        self.rng = rng;

        log::debug!(
            "Graded {} as {}: next in {}d on {:?}",
            card_id,
            grade,
            outcome.interval,
            updated.due()
        );
        self.counts.record(grade);
        self.queue.pop_front();
        self.advance();

        Ok(GradeReceipt {
            card: updated,
            grade,
            interval: outcome.interval,
            remaining: self.queue.len(),
        })
    }

    fn schedule(&self, card: &CardRecord, grade: Grade, rng: &mut StdRng) -> ReviewOutcome {
        let params = &self.options.params;
        let today = self.options.today;
        match card.schedule() {
            None => algorithm::schedule_first_review(params, grade, today, rng),
            Some(s) => algorithm::schedule_review(params, memory_state(s), s.last_review, grade, today, rng),
        }
    }

    /// Interval each grade would give the card today, without fuzz
    pub fn preview(&self, card_id: &str) -> Option<[u32; 4]> {
        let card = self.store.get(card_id)?;
        let prev = card.schedule().map(|s| (memory_state(s), s.last_review));
        Some(algorithm::preview_intervals(
            &self.options.params,
            prev,
            self.options.today,
        ))
    }

    fn advance(&mut self) {
        self.state = if self.queue.is_empty() {
            log::info!("Session finished: {} cards graded", self.counts.total());
            SessionState::Finished
        } else {
            SessionState::Presenting
        };
    }
}

fn memory_state(schedule: &Schedule) -> MemoryState {
    MemoryState {
        stability: schedule.stability,
        difficulty: schedule.difficulty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashcards::errors::FlashcardError;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const HEADER: &str = "deck,front,back,media,id,stability,difficulty,due,last_review";

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn options(today: NaiveDate) -> SessionOptions {
        SessionOptions {
            params: Parameters::default().without_fuzz(),
            today,
            seed: 7,
            new_cards_last: true,
        }
    }

    fn write_deck(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut text = format!("{HEADER}\n");
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        fs::write(&path, text).unwrap();
        path
    }

    fn session_for(dir: &TempDir, today: NaiveDate) -> ReviewSession {
        let mut store = CardStore::new(0);
        let errors = store.load_all(&[dir.path().to_path_buf()]);
        assert!(errors.is_empty(), "{errors:?}");
        ReviewSession::new(store, options(today))
    }

    fn contract(err: FlashcardError) -> ContractError {
        match err {
            FlashcardError::Contract(e) => e,
            other => panic!("expected contract error, got {other:?}"),
        }
    }

    #[test]
    fn test_new_card_good() {
        let temp = TempDir::new().unwrap();
        let today = day(2025, 6, 1);
        let file = write_deck(temp.path(), "bio.csv", &["bio,The [human] body,,,c1,,,,"]);
        let mut session = session_for(&temp, today);
        assert_eq!(session.select_decks(DeckSelection::All).unwrap(), 1);

        let view = session.next_card().unwrap();
        assert_eq!(view.prompt, "The ___ body");
        assert_eq!(view.answer, "The human body");

        let receipt = session.submit_grade(&view.id, 3).unwrap();
        let expected = algorithm::initial_state(session.params(), Grade::Good);
        assert!((receipt.card.stability().unwrap() - expected.stability).abs() < 1e-4);
        assert!((receipt.card.difficulty().unwrap() - expected.difficulty).abs() < 1e-4);
        assert_eq!(receipt.card.last_review(), Some(today));
        assert_eq!(receipt.card.due(), Some(day(2025, 6, 4)));
        assert_eq!(receipt.remaining, 0);
        assert_eq!(session.state(), &SessionState::Finished);

        let saved = fs::read_to_string(file).unwrap();
        assert_eq!(saved, format!("{HEADER}\nbio,The [human] body,,,c1,3.1730,5.2824,2025-06-04,2025-06-01\n"));
    }

    #[test]
    fn test_lapse_shortens_interval() {
        let temp = TempDir::new().unwrap();
        let today = day(2025, 6, 11);
        write_deck(temp.path(), "a.csv", &["math,q,a,,c1,10,5,2025-06-11,2025-06-01"]);
        let mut session = session_for(&temp, today);
        session.select_decks(DeckSelection::All).unwrap();

        let view = session.next_card().unwrap();
        let receipt = session.submit_grade(&view.id, 1).unwrap();
        assert!(receipt.card.stability().unwrap() < 10.0);
        assert!(receipt.interval <= 3);
        assert!(receipt.card.due().unwrap() > today);
        assert_eq!(session.summary().again, 1);
    }

    #[test]
    fn test_deck_filter_across_files() {
        let temp = TempDir::new().unwrap();
        let today = day(2025, 6, 1);
        write_deck(
            temp.path(),
            "one.csv",
            &["math,m1,,,m1,,,,", "bio,b1,,,b1,,,,", "art,a1,,,a1,,,,"],
        );
        write_deck(
            temp.path(),
            "two.csv",
            &["art,a2,,,a2,,,,", "math,m2,,,m2,3,5,2025-05-30,2025-05-27", "math,m3,,,m3,3,5,2025-07-01,2025-05-29"],
        );
        let mut session = session_for(&temp, today);

        let counts = session.due_counts(&DeckSelection::All);
        assert_eq!(counts["math"], DeckCount { due: 2, total: 3 });
        assert_eq!(counts["art"], DeckCount { due: 2, total: 2 });
        assert_eq!(counts["bio"], DeckCount { due: 1, total: 1 });

        let selection = DeckSelection::decks(["math", "bio"]);
        let filtered = session.due_counts(&selection);
        assert_eq!(filtered.len(), 2);
        assert!(!filtered.contains_key("art"));

        assert_eq!(session.select_decks(selection).unwrap(), 3);
        let queued: Vec<&str> = session.queue().collect();
        // Scheduled card first, then new cards in load order
        assert_eq!(queued, vec!["m2", "m1", "b1"]);
    }

    #[test]
    fn test_queue_orders_by_due_then_load_order() {
        let temp = TempDir::new().unwrap();
        write_deck(
            temp.path(),
            "a.csv",
            &[
                "d,q,,,late,3,5,2025-05-31,2025-05-28",
                "d,q,,,new,,,,",
                "d,q,,,early,3,5,2025-05-20,2025-05-17",
                "d,q,,,tie,3,5,2025-05-31,2025-05-28",
            ],
        );
        let mut session = session_for(&temp, day(2025, 6, 1));
        session.select_decks(DeckSelection::All).unwrap();
        let queued: Vec<&str> = session.queue().collect();
        assert_eq!(queued, vec!["early", "late", "tie", "new"]);
    }

    #[test]
    fn test_unknown_deck_rejected() {
        let temp = TempDir::new().unwrap();
        write_deck(temp.path(), "a.csv", &["math,q,,,c1,,,,"]);
        let mut session = session_for(&temp, day(2025, 6, 1));
        let err = session
            .select_decks(DeckSelection::decks(["history"]))
            .unwrap_err();
        assert_eq!(contract(err), ContractError::UnknownDeck("history".to_string()));
        assert_eq!(session.state(), &SessionState::SelectingDecks);
    }

    #[test]
    fn test_grade_contract() {
        let temp = TempDir::new().unwrap();
        write_deck(temp.path(), "a.csv", &["math,q1,,,c1,,,,", "math,q2,,,c2,,,,"]);
        let mut session = session_for(&temp, day(2025, 6, 1));

        let err = session.submit_grade("c1", 3).unwrap_err();
        assert!(matches!(contract(err), ContractError::CardNotCurrent { expected: None, .. }));

        session.select_decks(DeckSelection::All).unwrap();
        let view = session.next_card().unwrap();
        assert_eq!(view.id, "c1");
        assert_eq!(session.next_card().unwrap().id, "c1");

        let err = session.submit_grade("c1", 5).unwrap_err();
        assert_eq!(contract(err), ContractError::InvalidGrade(5));
        let err = session.submit_grade("c2", 3).unwrap_err();
        assert!(matches!(contract(err), ContractError::CardNotCurrent { .. }));

        // Rejections leave the card awaiting its grade
        assert_eq!(
            session.state(),
            &SessionState::AwaitingGrade {
                card_id: "c1".to_string()
            }
        );
        session.submit_grade("c1", 4).unwrap();
        assert_eq!(session.next_card().unwrap().id, "c2");
    }

    #[test]
    fn test_persistence_failure_keeps_card_queued() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("decks");
        fs::create_dir(&dir).unwrap();
        write_deck(&dir, "a.csv", &["math,q1,,,c1,,,,"]);

        let mut store = CardStore::new(0);
        store.load_all(&[dir.clone()]);
        let mut session = ReviewSession::new(store, options(day(2025, 6, 1)));
        session.select_decks(DeckSelection::All).unwrap();
        let view = session.next_card().unwrap();

        fs::remove_dir_all(&dir).unwrap();
        let err = session.submit_grade(&view.id, 3).unwrap_err();
        assert!(matches!(err, FlashcardError::Persistence { .. }));
        assert!(session.store().get("c1").unwrap().is_new());
        assert_eq!(session.remaining(), 1);

        fs::create_dir(&dir).unwrap();
        let receipt = session.submit_grade(&view.id, 3).unwrap();
        assert_eq!(receipt.remaining, 0);
        assert!(dir.join("a.csv").exists());
    }

    #[test]
    fn test_failed_save_does_not_consume_fuzz() {
        let row = "math,q1,,,c1,100,5,2025-06-01,2025-03-01";
        let today = day(2025, 6, 1);
        let fuzzed = SessionOptions {
            params: Parameters::default(),
            ..options(today)
        };

        let control_dir = TempDir::new().unwrap();
        write_deck(control_dir.path(), "a.csv", &[row]);
        let mut store = CardStore::new(0);
        store.load_all(&[control_dir.path().to_path_buf()]);
        let mut control = ReviewSession::new(store, fuzzed.clone());
        control.select_decks(DeckSelection::All).unwrap();
        let view = control.next_card().unwrap();
        let expected = control.submit_grade(&view.id, 3).unwrap();

        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("decks");
        fs::create_dir(&dir).unwrap();
        write_deck(&dir, "a.csv", &[row]);
        let mut store = CardStore::new(0);
        store.load_all(&[dir.clone()]);
        let mut session = ReviewSession::new(store, fuzzed);
        session.select_decks(DeckSelection::All).unwrap();
        let view = session.next_card().unwrap();

        fs::remove_dir_all(&dir).unwrap();
        assert!(session.submit_grade(&view.id, 3).is_err());
        fs::create_dir(&dir).unwrap();
        let receipt = session.submit_grade(&view.id, 3).unwrap();

        assert_eq!(receipt.interval, expected.interval);
        assert_eq!(receipt.card, expected.card);
        assert_eq!(
            fs::read_to_string(dir.join("a.csv")).unwrap(),
            fs::read_to_string(control_dir.path().join("a.csv")).unwrap()
        );
    }

    #[test]
    fn test_tiny_stability_reloads() {
        let temp = TempDir::new().unwrap();
        let file = write_deck(temp.path(), "a.csv", &["math,q1,,,c1,,,,"]);
        let mut params = Parameters::default().without_fuzz();
        params.minimum_stability = 0.00001;
        params.weights[0] = 0.00001;

        let mut store = CardStore::new(0);
        store.load_file(&file).unwrap();
        let mut session = ReviewSession::new(store, SessionOptions { params, ..options(day(2025, 6, 1)) });
        session.select_decks(DeckSelection::All).unwrap();
        let view = session.next_card().unwrap();
        session.submit_grade(&view.id, 1).unwrap();

        let mut reloaded = CardStore::new(0);
        reloaded.load_file(&file).unwrap();
        assert_eq!(reloaded.get("c1").unwrap().stability(), Some(0.0001));
    }

    #[test]
    fn test_review_keeps_other_rows_in_order() {
        let temp = TempDir::new().unwrap();
        let rows = [
            "math,q1,a1,,c1,4.2,6.1,2025-07-01,2025-05-01",
            "math,q2,a2,,c2,,,,",
            "math,\"q3, quoted\",a3,,c3,1.25,3,2025-08-01,2025-05-01",
        ];
        let file = write_deck(temp.path(), "a.csv", &rows);
        let mut session = session_for(&temp, day(2025, 6, 1));
        session.select_decks(DeckSelection::All).unwrap();
        let view = session.next_card().unwrap();
        assert_eq!(view.id, "c2");
        session.submit_grade("c2", 2).unwrap();

        let saved = fs::read_to_string(file).unwrap();
        let lines: Vec<&str> = saved.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], rows[0]);
        assert!(lines[2].starts_with("math,q2,a2,,c2,"));
        assert_eq!(lines[3], rows[2]);
    }

    #[test]
    fn test_due_never_moves_backward() {
        let temp = TempDir::new().unwrap();
        let today = day(2025, 6, 1);
        write_deck(temp.path(), "a.csv", &["math,q,,,c1,,,,"]);
        let mut session = session_for(&temp, today);
        session.select_decks(DeckSelection::All).unwrap();
        let id = session.next_card().unwrap().id;
        let first = session.submit_grade(&id, 4).unwrap();

        // Review the same card again on its due date, several times over
        let mut store = session.into_store();
        let mut card = first.card;
        for grade in [1u8, 3, 1, 2, 4] {
            let review_day = card.due().unwrap();
            let mut session = ReviewSession::new(store, options(review_day));
            session.select_decks(DeckSelection::All).unwrap();
            let id = session.next_card().unwrap().id;
            let receipt = session.submit_grade(&id, grade).unwrap();
            assert!(receipt.card.due().unwrap() > card.last_review().unwrap());
            assert!(receipt.card.due().unwrap() >= card.due().unwrap());
            card = receipt.card;
            store = session.into_store();
        }
    }

    #[test]
    fn test_no_cards_due_finishes_immediately() {
        let temp = TempDir::new().unwrap();
        write_deck(temp.path(), "a.csv", &["math,q,,,c1,3,5,2025-07-01,2025-06-01"]);
        let mut session = session_for(&temp, day(2025, 6, 2));
        assert_eq!(session.select_decks(DeckSelection::All).unwrap(), 0);
        assert_eq!(session.state(), &SessionState::Finished);
        assert!(session.next_card().is_none());

        let err = session.select_decks(DeckSelection::All).unwrap_err();
        assert!(matches!(contract(err), ContractError::WrongState { .. }));
    }

    #[test]
    fn test_preview_matches_unfuzzed_review() {
        let temp = TempDir::new().unwrap();
        write_deck(temp.path(), "a.csv", &["math,q,a,,c1,10,5,2025-06-11,2025-06-01"]);
        let mut session = session_for(&temp, day(2025, 6, 11));
        session.select_decks(DeckSelection::All).unwrap();

        let intervals = session.preview("c1").unwrap();
        assert!(intervals.windows(2).all(|w| w[0] <= w[1]));
        assert!(session.preview("missing").is_none());

        let view = session.next_card().unwrap();
        let receipt = session.submit_grade(&view.id, 3).unwrap();
        assert_eq!(receipt.interval, intervals[2]);
    }
}
