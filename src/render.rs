use crate::formatter::Formatter;
use crate::message::Message;
use crate::utils::wrap_text;

const MIN_WIDTH: usize = 24;
const BUBBLE_EDGE: usize = 2;

fn center(text: &str, width: usize) -> String {
    let len = text.chars().count();
    let pad = width.saturating_sub(len) / 2;
    format!("{}{}", " ".repeat(pad), text)
}

/// Lays the conversation out as terminal lines: a heading at each date
/// boundary, the counterpart's bubbles on the left, ours on the right.
pub fn render(messages: &[Message], formatter: &Formatter, width: usize) -> Vec<String> {
    let width = width.max(MIN_WIDTH);
    let text_width = width * 2 / 3 - BUBBLE_EDGE;
    let mut lines = Vec::new();

    for entry in formatter.group_by_date(messages) {
        if entry.is_first_of_date {
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.push(center(&format!("── {} ──", entry.date_label), width));
        }

        for line in wrap_text(&entry.message.text, text_width) {
            if entry.message.is_outgoing() {
                lines.push(format!("{:>width$}", format!("{} │", line), width = width));
            } else {
                lines.push(format!("│ {}", line));
            }
        }
    }

    lines
}
