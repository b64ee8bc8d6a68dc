use rote_lib::flashcards::algorithm::format_interval;
use rote_lib::flashcards::{CardView, Grade, GradeCounts};

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
}

/// Wrap `text` in `color` when colors are enabled
pub fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

pub fn grade_color(grade: Grade) -> &'static str {
    match grade {
        Grade::Again => Color::RED,
        Grade::Hard => Color::YELLOW,
        Grade::Good => Color::GREEN,
        Grade::Easy => Color::BLUE,
    }
}

/// Header line shown above a card
pub fn render_card_header(card: &CardView, position: usize, total: usize, use_color: bool) -> String {
    let header = format!("[{}/{}] {}", position, total, card.deck);
    let mut line = paint(&header, Color::DIM, use_color);
    if !card.media.is_empty() {
        line.push_str(&format!("  media: {}", card.media));
    }
    line
}

pub fn render_prompt(card: &CardView, use_color: bool) -> String {
    paint(&card.prompt, Color::BOLD, use_color)
}

pub fn render_answer(card: &CardView, use_color: bool) -> String {
    paint(&card.answer, Color::CYAN, use_color)
}

/// `1 again (1d)  2 hard (3d) ...` for the grade prompt
pub fn render_grade_choices(intervals: &[u32; 4], use_color: bool) -> String {
    Grade::ALL
        .iter()
        .zip(intervals)
        .map(|(grade, days)| {
            let label = format!("{} {}", grade.as_u8(), grade.label());
            format!(
                "{} ({})",
                paint(&label, grade_color(*grade), use_color),
                format_interval(*days)
            )
        })
        .collect::<Vec<_>>()
        .join("  ")
}

pub fn render_summary(counts: &GradeCounts, use_color: bool) -> String {
    let parts = [
        (Grade::Again, counts.again),
        (Grade::Hard, counts.hard),
        (Grade::Good, counts.good),
        (Grade::Easy, counts.easy),
    ]
    .iter()
    .map(|(grade, n)| paint(&format!("{} {}", n, grade.label()), grade_color(*grade), use_color))
    .collect::<Vec<_>>()
    .join(", ");
    format!("Reviewed {} cards: {}", counts.total(), parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_without_color() {
        assert_eq!(paint("x", Color::RED, false), "x");
        assert_eq!(paint("x", Color::RED, true), "\x1b[31mx\x1b[0m");
    }

    #[test]
    fn test_summary_plain() {
        let mut counts = GradeCounts::default();
        counts.record(Grade::Good);
        counts.record(Grade::Good);
        counts.record(Grade::Again);
        assert_eq!(
            render_summary(&counts, false),
            "Reviewed 3 cards: 1 again, 0 hard, 2 good, 0 easy"
        );
    }
}
