//! Deck storage on plain CSV files
//!
//! Each source is one CSV file whose header starts with
//! `deck,front,back,media,id,stability,difficulty,due,last_review`.
//! Extra trailing columns are allowed and carried through untouched.
//! Sources are read fully into memory; saving rewrites a whole file through
//! a temporary sibling and a rename, so a crash never leaves half a file.
//! Rows a review did not touch are written back from their original text,
//! whatever their quoting or line endings.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use walkdir::WalkDir;

use super::errors::{FlashcardError, FormatError, FormatErrorKind, Result};
use super::models::*;

/// File extension of deck sources
pub const SOURCE_EXTENSION: &str = "csv";

/// Byte order mark some spreadsheet exports put before the header
const UTF8_BOM: &str = "\u{feff}";

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// A parsed deck source: its header and rows, in file order
#[derive(Debug, Clone, PartialEq)]
pub struct DeckSource {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub records: Vec<CardRecord>,
    /// Everything before the first row, byte order mark included
    header: String,
}

/// Parse the text of one source.
///
/// Validation is eager: the header, every field count and every scheduling
/// cell are checked before any record is returned. Rows without an id get a
/// fresh one, written on the next save of the source. Rows with an empty
/// deck cell are grouped under the file stem.
pub fn parse(raw: &str, origin: &Path) -> std::result::Result<DeckSource, FormatError> {
    let fail = |line: Option<u64>, kind| FormatError::new(origin, line, kind);

    let (bom, body) = match raw.strip_prefix(UTF8_BOM) {
        Some(rest) => (UTF8_BOM, rest),
        None => ("", raw),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());
    let mut rows = reader.records();

    let header = match rows.next() {
        Some(Ok(header)) => header,
        Some(Err(e)) => return Err(fail(Some(1), FormatErrorKind::Syntax(e.to_string()))),
        None => return Err(fail(None, FormatErrorKind::MissingHeader)),
    };
    let columns: Vec<String> = header.iter().map(str::to_string).collect();
    for (i, &expected) in SCHEMA_COLUMNS.iter().enumerate() {
        let found = columns.get(i).map(String::as_str).unwrap_or("");
        if found != expected {
            return Err(fail(
                Some(1),
                FormatErrorKind::MalformedHeader {
                    column: i + 1,
                    expected,
                    found: found.to_string(),
                },
            ));
        }
    }

    let mut parsed = Vec::new();
    for row in rows {
        let row = row.map_err(|e| {
            let line = e.position().map(|p| p.line());
            fail(line, FormatErrorKind::Syntax(e.to_string()))
        })?;
        let (start, line) = match row.position() {
            Some(p) => (p.byte() as usize, Some(p.line())),
            None => return Err(fail(None, FormatErrorKind::Syntax("row without a position".to_string()))),
        };
        parsed.push((row, start, line));
    }

    // Each row owns the text from its start up to the next row's start
    let first_start = parsed.first().map_or(body.len(), |(_, start, _)| *start);
    let header_text = format!("{bom}{}", body.get(..first_start).unwrap_or(body));
    let ends: Vec<usize> = parsed
        .iter()
        .skip(1)
        .map(|(_, start, _)| *start)
        .chain(std::iter::once(body.len()))
        .collect();

    let default_deck = origin
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default")
        .to_string();

    let mut records = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for ((row, start, line), end) in parsed.into_iter().zip(ends) {
        if row.len() != columns.len() {
            return Err(fail(
                line,
                FormatErrorKind::ColumnCount {
                    expected: columns.len(),
                    found: row.len(),
                },
            ));
        }
        let span = body
            .get(start..end)
            .ok_or_else(|| fail(line, FormatErrorKind::Syntax("row offsets out of range".to_string())))?;
        let mut text = RowText::split(span);

        let mut cells: Vec<String> = row.iter().map(str::to_string).collect();
        let schedule = parse_schedule(&cells).map_err(|kind| fail(line, kind))?;

        if cells[ID].trim().is_empty() {
            cells[ID] = uuid::Uuid::new_v4().to_string();
            text.body = None;
            log::debug!("{}: assigned id {} to line {:?}", origin.display(), cells[ID], line);
        }
        let id = cells[ID].clone();
        if !seen.insert(id.clone()) {
            return Err(fail(line, FormatErrorKind::DuplicateId(id)));
        }

        let deck = if cells[DECK].trim().is_empty() {
            default_deck.clone()
        } else {
            cells[DECK].clone()
        };
        records.push(CardRecord::from_cells(deck, id, schedule, cells, line, text));
    }

    Ok(DeckSource {
        path: origin.to_path_buf(),
        columns,
        records,
        header: header_text,
    })
}

fn parse_schedule(cells: &[String]) -> std::result::Result<Option<Schedule>, FormatErrorKind> {
    let stability = parse_number(cells, STABILITY)?;
    let difficulty = parse_number(cells, DIFFICULTY)?;
    let due = parse_date(cells, DUE)?;
    let last_review = parse_date(cells, LAST_REVIEW)?;

    match (stability, difficulty, due, last_review) {
        (None, None, None, None) => Ok(None),
        (Some(stability), Some(difficulty), Some(due), Some(last_review)) => {
            if stability <= 0.0 {
                return Err(FormatErrorKind::InvalidState(format!(
                    "stability must be positive, got {stability}"
                )));
            }
            if !(1.0..=10.0).contains(&difficulty) {
                return Err(FormatErrorKind::InvalidState(format!(
                    "difficulty must be within [1, 10], got {difficulty}"
                )));
            }
            if due < last_review {
                return Err(FormatErrorKind::InvalidState(format!(
                    "due {due} is before last_review {last_review}"
                )));
            }
            Ok(Some(Schedule {
                stability,
                difficulty,
                due,
                last_review,
            }))
        }
        _ => Err(FormatErrorKind::InvalidState(
            "stability, difficulty, due and last_review must be all set or all empty".to_string(),
        )),
    }
}

fn parse_number(cells: &[String], index: usize) -> std::result::Result<Option<f64>, FormatErrorKind> {
    let value = cells[index].trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(FormatErrorKind::InvalidNumber {
            column: SCHEMA_COLUMNS[index],
            value: value.to_string(),
        }),
    }
}

fn parse_date(cells: &[String], index: usize) -> std::result::Result<Option<NaiveDate>, FormatErrorKind> {
    let value = cells[index].trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map(Some)
        .map_err(|_| FormatErrorKind::InvalidDate {
            column: SCHEMA_COLUMNS[index],
            value: value.to_string(),
        })
}

/// Write a source back to CSV text.
///
/// The header and every unchanged row are emitted exactly as read. Rewritten
/// rows are encoded with minimal quoting between their original line breaks.
pub fn serialize(source: &DeckSource) -> Result<String> {
    let mut out = source.header.clone();
    for record in &source.records {
        let text = record.text();
        out.push_str(&text.lead);
        match &text.body {
            Some(body) => out.push_str(body),
            None => out.push_str(&encode_row(record.cells())?),
        }
        out.push_str(&text.trail);
    }
    Ok(out)
}

/// One CSV row without its terminator
fn encode_row(cells: &[String]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());
    writer.write_record(cells)?;

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    let mut row = String::from_utf8(bytes)
        .map_err(|e| FlashcardError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    if row.ends_with('\n') {
        row.pop();
    }
    Ok(row)
}

/// Find deck sources: files are taken as given, directories are searched
/// recursively for `*.csv`. Results are sorted within each directory.
pub fn discover_sources(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        log::warn!("Skipping unreadable entry under {:?}: {}", path, e);
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|p| has_source_extension(p))
                .collect();
            files.append(&mut found);
        } else if has_source_extension(path) {
            files.push(path.clone());
        } else {
            log::warn!("Ignoring {:?}: not a .{} file", path, SOURCE_EXTENSION);
        }
    }
    files
}

fn has_source_extension(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == SOURCE_EXTENSION)
}

/// Write `contents` to `path` through a temporary sibling file and a rename
pub fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();
    if result.is_err() && tmp_path.exists() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Position of a card: source index, then row index within the source.
/// Ordering by key is load order.
pub type CardKey = (usize, usize);

/// All loaded sources, seen as one ordered sequence of cards
#[derive(Debug, Clone, Default)]
pub struct CardStore {
    sources: Vec<DeckSource>,
    index: HashMap<String, CardKey>,
    write_retries: u32,
}

impl CardStore {
    /// Create an empty store. A failed save is retried `write_retries` times.
    pub fn new(write_retries: u32) -> Self {
        Self {
            sources: Vec::new(),
            index: HashMap::new(),
            write_retries,
        }
    }

    /// Load every source found under `paths`.
    ///
    /// A source that fails to load is skipped and its error returned; the
    /// sources that loaded stay in the store.
    pub fn load_all(&mut self, paths: &[PathBuf]) -> Vec<FlashcardError> {
        let mut errors = Vec::new();
        for path in discover_sources(paths) {
            if let Err(e) = self.load_file(&path) {
                log::warn!("Skipping deck source {:?}: {}", path, e);
                errors.push(e);
            }
        }
        errors
    }

    /// Read and add one source file, returning its number of cards
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let raw = fs::read_to_string(path)?;
        self.add_source(path, &raw)
    }

    /// Parse and add one source, returning its number of cards.
    ///
    /// Ids must be unique across every source in the store.
    pub fn add_source(&mut self, path: &Path, raw: &str) -> Result<usize> {
        let source = parse(raw, path)?;
        for record in &source.records {
            if self.index.contains_key(record.id()) {
                return Err(FormatError::new(
                    path,
                    record.line(),
                    FormatErrorKind::DuplicateId(record.id().to_string()),
                )
                .into());
            }
        }

        let source_idx = self.sources.len();
        for (row_idx, record) in source.records.iter().enumerate() {
            self.index.insert(record.id().to_string(), (source_idx, row_idx));
        }
        let count = source.records.len();
        log::info!("Loaded {} cards from {:?}", count, path);
        self.sources.push(source);
        Ok(count)
    }

    pub fn sources(&self) -> &[DeckSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Every card in load order
    pub fn cards(&self) -> impl Iterator<Item = (CardKey, &CardRecord)> + '_ {
        self.sources.iter().enumerate().flat_map(|(s, source)| {
            source
                .records
                .iter()
                .enumerate()
                .map(move |(r, record)| ((s, r), record))
        })
    }

    pub fn get(&self, id: &str) -> Option<&CardRecord> {
        self.index
            .get(id)
            .map(|&(s, r)| &self.sources[s].records[r])
    }

    /// Source file a card was loaded from
    pub fn source_path(&self, id: &str) -> Option<&Path> {
        self.index.get(id).map(|&(s, _)| self.sources[s].path.as_path())
    }

    /// Deck labels in sorted order
    pub fn deck_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cards().map(|(_, c)| c.deck().to_string()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Replace the card with the same id, in place, returning the old record
    pub fn replace(&mut self, record: CardRecord) -> Result<CardRecord> {
        let &(s, r) = self.index.get(record.id()).ok_or_else(|| {
            super::errors::ContractError::UnknownCard(record.id().to_string())
        })?;
        Ok(std::mem::replace(&mut self.sources[s].records[r], record))
    }

    /// Rewrite the source holding card `id`
    pub fn save_source_of(&self, id: &str) -> Result<()> {
        let &(s, _) = self
            .index
            .get(id)
            .ok_or_else(|| super::errors::ContractError::UnknownCard(id.to_string()))?;
        self.save_source(s)
    }

    fn save_source(&self, s: usize) -> Result<()> {
        let source = &self.sources[s];
        let text = serialize(source)?;
        self.write_with_retries(&source.path, || write_atomic(&source.path, &text))?;
        log::info!("Saved {} cards to {:?}", source.records.len(), source.path);
        Ok(())
    }

    /// Run `write`, retrying up to `write_retries` times with a growing pause
    fn write_with_retries<F>(&self, path: &Path, mut write: F) -> Result<()>
    where
        F: FnMut() -> std::io::Result<()>,
    {
        let attempts = self.write_retries + 1;
        let mut attempt = 1;
        loop {
            match write() {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    log::warn!(
                        "Write to {:?} failed (attempt {}/{}): {}",
                        path,
                        attempt,
                        attempts,
                        e
                    );
                    thread::sleep(RETRY_BACKOFF * attempt);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(FlashcardError::Persistence {
                        path: path.to_path_buf(),
                        attempts,
                        source: e,
                    });
                }
            }
        }
    }
}
