use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style, Stylize},
    text::Line,
    widgets::{Block, Paragraph},
    Frame,
};
use ratatui_macros::line;

use crate::chart::SessionExtremes;
use crate::utils::bpm_or_dash;

// 3x5 glyphs, '#' is lit
const DIGITS: [[&str; 5]; 10] = [
    ["###", "# #", "# #", "# #", "###"],
    [" # ", "## ", " # ", " # ", "###"],
    ["###", "  #", "###", "#  ", "###"],
    ["###", "  #", "###", "  #", "###"],
    ["# #", "# #", "###", "  #", "  #"],
    ["###", "#  ", "###", "  #", "###"],
    ["###", "#  ", "###", "# #", "###"],
    ["###", "  #", "  #", "  #", "  #"],
    ["###", "# #", "###", "# #", "###"],
    ["###", "# #", "###", "  #", "###"],
];
const DASH: [&str; 5] = ["   ", "   ", "###", "   ", "   "];

/// Renders `text` in block digits, one string per row. Anything that isn't a digit shows as a dash.
pub fn big_digits(text: &str) -> Vec<String> {
    (0..5)
        .map(|row| {
            text.chars()
                .map(|c| {
                    let glyph = c
                        .to_digit(10)
                        .map_or(&DASH, |d| &DIGITS[d as usize]);
                    glyph[row].replace('#', "██").replace(' ', "  ")
                })
                .collect::<Vec<_>>()
                .join("  ")
        })
        .collect()
}

pub fn render_big_number(
    f: &mut Frame,
    area: Rect,
    bpm: Option<u16>,
    average: f64,
    extremes: &SessionExtremes,
) {
    let block = Block::bordered().title("Heart Rate".red().bold());
    let inner = block.inner(area);
    f.render_widget(block, area);

    let [_, number, stats, _] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(7),
        Constraint::Length(3),
        Constraint::Fill(1),
    ])
    .areas(inner);

    let mut rows: Vec<Line> = big_digits(&bpm_or_dash(bpm))
        .into_iter()
        .map(|row| Line::from(row).style(Style::default().fg(Color::Red)))
        .collect();
    rows.push(Line::default());
    rows.push(line!["BPM".bold()]);
    f.render_widget(Paragraph::new(rows).alignment(Alignment::Center), number);

    let average = if average > 0.0 {
        format!("{}", average.round_ties_even())
    } else {
        "--".to_owned()
    };
    let summary = vec![
        line![format!("Average: {average} BPM").gray()],
        line![format!(
            "Highest: {}   Lowest: {}",
            bpm_or_dash((extremes.highest() > 0).then_some(extremes.highest())),
            bpm_or_dash(extremes.lowest())
        )
        .dark_gray()],
    ];
    f.render_widget(Paragraph::new(summary).alignment(Alignment::Center), stats);
}
