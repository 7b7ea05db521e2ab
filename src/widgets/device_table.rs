use ratatui::{
    layout::Constraint,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Row, Table},
};

use crate::heart_rate::transport::DeviceHandle;

/// Creates a table with the detected BTLE devices.
pub fn device_table<'a>(
    selected: Option<usize>,
    devices: &'a [DeviceHandle],
    saved_address: &str,
) -> Table<'a> {
    let selected_style = Style::default().add_modifier(Modifier::REVERSED);
    let rows: Vec<Row> = devices
        .iter()
        .enumerate()
        .map(|(i, device)| {
            let mut style = if selected == Some(i) {
                selected_style
            } else {
                Style::default()
            };
            if device.address == saved_address {
                style = style.fg(Color::Green);
            }
            Row::new(vec![
                device.display_name().to_owned(),
                device.address.clone(),
                if device.advertises_heart_rate {
                    "♥".to_owned()
                } else {
                    String::new()
                },
                device
                    .rssi
                    .map_or_else(|| "n/a".to_owned(), |rssi| format!("{rssi} dBm")),
            ])
            .style(style)
        })
        .collect();

    Table::new(
        rows,
        [
            Constraint::Length(32),
            Constraint::Length(20),
            Constraint::Length(4),
            Constraint::Length(10),
        ],
    )
    .header(
        Row::new(vec!["Name", "Address", "HR", "RSSI"]).style(Style::default().fg(Color::Yellow)),
    )
    .block(
        Block::default()
            .title("Detected Devices")
            .borders(Borders::ALL),
    )
    .highlight_style(selected_style)
}
