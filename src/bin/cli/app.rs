use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

use rote_lib::flashcards::{CardStore, ReviewSession};
use rote_lib::RoteConfig;

/// Shared state for CLI commands
pub struct App {
    pub config: RoteConfig,
    pub store: CardStore,
    pub today: NaiveDate,
}

impl App {
    /// Load the config and every deck found under `paths`.
    ///
    /// Sources that fail to load are reported and skipped; it is an error
    /// only if nothing could be loaded at all.
    pub fn load(config_path: Option<&Path>, paths: &[PathBuf], today: NaiveDate) -> Result<Self> {
        let config = RoteConfig::load(config_path).context("Failed to load config")?;

        let mut store = CardStore::new(config.persistence.write_retries);
        let errors = store.load_all(paths);
        for err in &errors {
            log::warn!("Skipping deck source: {}", err);
            eprintln!("warning: {}", err);
        }
        if store.sources().is_empty() {
            bail!("No deck sources could be loaded from the given paths");
        }

        Ok(Self { config, store, today })
    }

    /// Start a review session over the loaded store
    pub fn into_session(self) -> ReviewSession {
        let seed = self.config.session.seed.unwrap_or_else(rand::random);
        let options = self.config.session_options(self.today, seed);
        ReviewSession::new(self.store, options)
    }
}
