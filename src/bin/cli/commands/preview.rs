use anyhow::{Context, Result};

use rote_lib::flashcards::algorithm::format_interval;
use rote_lib::flashcards::cloze;
use rote_lib::flashcards::Grade;

use crate::app::App;
use crate::render::terminal::{paint, Color};
use crate::OutputFormat;

pub fn run(app: App, id: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let card = app
        .store
        .get(id)
        .cloned()
        .with_context(|| format!("Card '{}' not found", id))?;
    let session = app.into_session();
    let intervals = session
        .preview(id)
        .with_context(|| format!("Card '{}' not found", id))?;

    match format {
        OutputFormat::Json => {
            let previews: Vec<serde_json::Value> = Grade::ALL
                .iter()
                .zip(intervals)
                .map(|(grade, days)| {
                    serde_json::json!({
                        "grade": grade.as_u8(),
                        "label": grade.label(),
                        "intervalDays": days,
                    })
                })
                .collect();
            let output = serde_json::json!({
                "card": card,
                "front": card.front(),
                "back": card.back(),
                "intervals": previews,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            let rendered = cloze::render(card.front(), card.back());
            println!("{}", paint(&rendered.prompt, Color::BOLD, use_color));
            match card.schedule() {
                Some(s) => println!(
                    "{}",
                    paint(
                        &format!(
                            "stability {:.2}  difficulty {:.2}  due {}  last review {}",
                            s.stability, s.difficulty, s.due, s.last_review
                        ),
                        Color::DIM,
                        use_color
                    )
                ),
                None => println!("{}", paint("new card", Color::DIM, use_color)),
            }
            println!();
            for (grade, days) in Grade::ALL.iter().zip(intervals) {
                println!("  {} {:<6} {:>4}d  ({})", grade.as_u8(), grade.label(), days, format_interval(days));
            }
        }
    }

    Ok(())
}
