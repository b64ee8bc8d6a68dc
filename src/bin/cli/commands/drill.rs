use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use rote_lib::flashcards::algorithm::format_interval;
use rote_lib::flashcards::{ContractError, DeckSelection, FlashcardError, SessionState};

use crate::app::App;
use crate::render::terminal::{self, paint, Color};
use crate::OutputFormat;

/// What the learner typed at a prompt
enum Input {
    Line(String),
    Quit,
}

fn read_input(stdin: &mut impl BufRead, prompt: &str) -> Result<Input> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    if stdin.read_line(&mut line).context("Failed to read from stdin")? == 0 {
        return Ok(Input::Quit);
    }
    let line = line.trim();
    if line.eq_ignore_ascii_case("q") {
        return Ok(Input::Quit);
    }
    Ok(Input::Line(line.to_string()))
}

pub fn run(app: App, decks: Vec<String>, format: &OutputFormat, use_color: bool) -> Result<()> {
    let mut session = app.into_session();
    let selection = if decks.is_empty() {
        DeckSelection::All
    } else {
        DeckSelection::decks(decks)
    };
    let total = session.select_decks(selection)?;

    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let mut position = 0;

    if total == 0 {
        println!("No cards due.");
    }

    'cards: while let Some(card) = session.next_card() {
        position += 1;
        println!();
        println!("{}", terminal::render_card_header(&card, position, total, use_color));
        println!("{}", terminal::render_prompt(&card, use_color));

        if let Input::Quit = read_input(&mut stdin, &paint("[Enter] reveal, q quit ", Color::DIM, use_color))? {
            break;
        }
        println!("{}", terminal::render_answer(&card, use_color));

        let intervals = session.preview(&card.id).unwrap_or_default();
        println!("{}", terminal::render_grade_choices(&intervals, use_color));

        loop {
            let line = match read_input(&mut stdin, "grade [1-4]: ")? {
                Input::Quit => break 'cards,
                Input::Line(line) => line,
            };
            let Ok(grade) = line.parse::<u8>() else {
                println!("Enter 1 (again), 2 (hard), 3 (good) or 4 (easy)");
                continue;
            };

            match session.submit_grade(&card.id, grade) {
                Ok(receipt) => {
                    println!(
                        "{}",
                        paint(
                            &format!("next review in {}", format_interval(receipt.interval)),
                            terminal::grade_color(receipt.grade),
                            use_color
                        )
                    );
                    break;
                }
                Err(FlashcardError::Contract(ContractError::InvalidGrade(_))) => {
                    println!("Enter 1 (again), 2 (hard), 3 (good) or 4 (easy)");
                }
                Err(e @ FlashcardError::Persistence { .. }) => {
                    // The card stays current; grading it again retries the save
                    eprintln!("{}", paint(&format!("error: {}", e), Color::RED, use_color));
                }
                Err(e) => return Err(e).context("Failed to record review"),
            }
        }
    }

    let counts = session.summary();
    let finished = *session.state() == SessionState::Finished;
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "reviewed": counts.total(),
                "grades": counts,
                "remaining": session.remaining(),
                "finished": finished,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!();
            println!("{}", terminal::render_summary(&counts, use_color));
            if !finished {
                println!("{} cards left for later", session.remaining());
            }
        }
    }

    Ok(())
}
