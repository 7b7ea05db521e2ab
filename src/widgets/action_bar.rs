use ratatui::{
    layout::Constraint,
    style::{Color, Style},
    widgets::{Row, Table},
};

use crate::app::AppState;

pub const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

/// Creates a table with information about potential actions
pub fn action_bar(
    state: AppState,
    is_scanning: bool,
    auto_range: bool,
    frame_count: usize,
) -> Table<'static> {
    let index = frame_count % SPINNER.len();
    let actions: Vec<String> = match state {
        AppState::DeviceSelection => vec![
            "[q → exit]".into(),
            "[up/down → navigate]".into(),
            "[enter → connect]".into(),
            if is_scanning {
                format!("[scanning... {}]", SPINNER[index])
            } else {
                "[s → scan]".into()
            },
        ],
        AppState::Connecting => vec![
            "[q → exit]".into(),
            format!("[connecting... {}]", SPINNER[index]),
        ],
        AppState::Monitoring => vec![
            "[q → exit]".into(),
            "[tab/1-4 → view]".into(),
            "[d → disconnect]".into(),
            format!("[a → auto-range {}]", if auto_range { "on" } else { "off" }),
        ],
        AppState::Disconnecting => vec![
            "[q → exit]".into(),
            format!("[disconnecting... {}]", SPINNER[index]),
        ],
    };
    let widths: Vec<Constraint> = actions
        .iter()
        .map(|a| Constraint::Length(a.chars().count() as u16))
        .collect();

    Table::new(
        vec![Row::new(actions).style(Style::default().fg(Color::DarkGray))],
        widths,
    )
    .column_spacing(1)
}
