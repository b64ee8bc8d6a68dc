//! Cloze rendering
//!
//! A cloze is a bracketed span in the front of a card: `The [human] body`.
//! The prompt blanks every span at once; the answer reveals them all.
//! Brackets inside a span belong to its content. Unbalanced brackets, and
//! any LaTeX or Markdown markup, are left untouched.

/// Placeholder shown in place of each cloze span
pub const BLANK: &str = "___";

/// Separator between the revealed front and the back
const ANSWER_SEPARATOR: &str = "\n---\n";

/// Prompt and answer for one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCard {
    pub prompt: String,
    pub answer: String,
}

/// Render a card's front and back for review
pub fn render(front: &str, back: &str) -> RenderedCard {
    let revealed = expand_newlines(&reveal(front));
    let back = expand_newlines(back);
    let answer = if back.trim().is_empty() {
        revealed
    } else {
        format!("{revealed}{ANSWER_SEPARATOR}{back}")
    };
    RenderedCard {
        prompt: expand_newlines(&blank(front)),
        answer,
    }
}

/// Replace every cloze span with [`BLANK`]
pub fn blank(text: &str) -> String {
    rewrite(text, |_| BLANK)
}

/// Remove the cloze brackets, keeping their content
pub fn reveal(text: &str) -> String {
    rewrite(text, |inner| inner)
}

/// Content of every cloze span, in order
pub fn extract(text: &str) -> Vec<&str> {
    spans(text)
        .into_iter()
        .map(|(open, close)| &text[open + 1..close])
        .collect()
}

/// Turn literal `\n` sequences into line breaks
pub fn expand_newlines(text: &str) -> String {
    text.replace("\\n", "\n")
}

fn rewrite<'a, F>(text: &'a str, replace: F) -> String
where
    F: Fn(&'a str) -> &'a str,
{
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    for (open, close) in spans(text) {
        out.push_str(&text[pos..open]);
        out.push_str(replace(&text[open + 1..close]));
        pos = close + 1;
    }
    out.push_str(&text[pos..]);
    out
}

/// Byte offsets of the brackets of each outermost balanced span
fn spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    for (i, ch) in text.char_indices() {
        match ch {
            '[' => open.push(i),
            ']' => {
                if let Some(start) = open.pop() {
                    if open.is_empty() {
                        spans.push((start, i));
                    }
                }
            }
            _ => {}
        }
    }
    spans
}
