use anyhow::Result;

use rote_lib::flashcards::DeckSelection;

use crate::app::App;
use crate::render::terminal::{paint, Color};
use crate::OutputFormat;

pub fn run(app: App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let today = app.today;
    let session = app.into_session();
    let counts = session.due_counts(&DeckSelection::All);

    match format {
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = counts
                .iter()
                .map(|(deck, count)| {
                    serde_json::json!({
                        "deck": deck,
                        "due": count.due,
                        "total": count.total,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if counts.is_empty() {
                println!("No cards found.");
                return Ok(());
            }

            let deck_width = counts.keys().map(|d| d.chars().count()).max().unwrap_or(4).max(4);
            println!("{:<deck_w$} {:>6} {:>6}", "Deck", "Due", "Total", deck_w = deck_width);
            println!(
                "{} {} {}",
                "\u{2500}".repeat(deck_width),
                "\u{2500}".repeat(6),
                "\u{2500}".repeat(6)
            );

            for (deck, count) in &counts {
                let due = format!("{:>6}", count.due);
                let due = if count.due > 0 {
                    paint(&due, Color::GREEN, use_color)
                } else {
                    paint(&due, Color::DIM, use_color)
                };
                println!("{:<deck_w$} {} {:>6}", deck, due, count.total, deck_w = deck_width);
            }

            let due: usize = counts.values().map(|c| c.due).sum();
            println!("\n{} cards due on {}", due, today);
        }
    }

    Ok(())
}
