use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style, Stylize},
    text::Span,
    widgets::{Block, Borders, Clear, Paragraph, Tabs, Wrap},
    Frame,
};
use ratatui_macros::line;

use crate::app::{App, AppState, ChartView, ErrorPopup};
use crate::heart_rate::transport::Transport;
use crate::utils::{bpm_or_dash, centered_rect};
use crate::widgets::action_bar::action_bar;
use crate::widgets::device_table::device_table;
use crate::widgets::heart_rate::big_number::render_big_number;
use crate::widgets::heart_rate::chart_canvas::{render_scrolling_chart, render_trend_chart};
use crate::widgets::heart_rate::gauge::render_gauge;

/// Renders the user interface widgets.
pub fn render<T: Transport>(app: &mut App<T>, f: &mut Frame) {
    let [body, footer] =
        Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]).areas(f.area());

    match app.state {
        AppState::DeviceSelection | AppState::Connecting => {
            let table = device_table(
                app.table_state.selected(),
                &app.discovered_devices,
                &app.settings.ble.saved_address,
            );
            f.render_stateful_widget(table, body, &mut app.table_state);
        }
        AppState::Monitoring | AppState::Disconnecting => render_monitoring(app, f, body),
    }

    let actions = action_bar(
        app.state,
        app.is_scanning,
        app.line_chart.auto_range(),
        app.frame_count,
    );
    f.render_widget(actions, footer);

    if app.state == AppState::Connecting {
        let area = centered_rect(50, 30, f.area());
        let name = app
            .session_view
            .device_name()
            .unwrap_or_else(|| "Unknown".to_owned());
        let connecting_block = Paragraph::new(format!(
            "Connecting to:\n{}\n({})",
            name,
            app.session_view.state()
        ))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(Clear, area);
        f.render_widget(connecting_block, area);
    }

    // Draw the error overlay if the string is not empty
    if let Some(error_message) = &app.error_message {
        let (style, message) = match error_message {
            ErrorPopup::Fatal(msg) => (Style::default().fg(Color::Red), msg),
            ErrorPopup::Intermittent(msg) => (Style::default().fg(Color::Yellow), msg),
            ErrorPopup::UserMustDismiss(msg) => (Style::default().fg(Color::Blue), msg),
        };

        let area = centered_rect(60, 50, f.area());
        let error_block = Paragraph::new(Span::from(message.as_str()))
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("! Notification !")
                    .style(style),
            )
            .wrap(Wrap { trim: true });
        f.render_widget(Clear, area);
        f.render_widget(error_block, area);
    }
}

fn render_monitoring<T: Transport>(app: &mut App<T>, f: &mut Frame, area: Rect) {
    let [header, tabs, view] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Fill(1),
    ])
    .areas(area);

    let name = app
        .line_chart
        .device_name()
        .unwrap_or_else(|| "Unknown".to_owned());
    let header_line = line![
        name.bold(),
        " | ".dark_gray(),
        app.line_chart.state().to_string().green(),
        " | ".dark_gray(),
        format!("axis 0-{:.0}", app.line_chart.axis_max()).gray(),
        if app.line_chart.auto_range() {
            " (auto)".dark_gray()
        } else {
            " (fixed)".dark_gray()
        },
    ];
    f.render_widget(Paragraph::new(header_line), header);

    let selected = ChartView::ALL
        .iter()
        .position(|v| *v == app.view)
        .unwrap_or(0);
    let titles = ChartView::ALL
        .iter()
        .enumerate()
        .map(|(i, v)| format!("{} {}", i + 1, v.title()));
    f.render_widget(
        Tabs::new(titles)
            .select(selected)
            .highlight_style(Style::default().fg(Color::Red).bold()),
        tabs,
    );

    // Nothing to show until the first sample lands
    let bpm = (app.trend_chart.series().samples() > 0).then_some(app.heart_rate_status.heart_rate_bpm);
    let average = app.line_chart.average();
    match app.view {
        ChartView::LineChart => {
            let block = Block::bordered().title(format!("{} BPM", bpm_or_dash(bpm)).red().bold());
            render_scrolling_chart(f, view, &mut app.line_chart, block);
        }
        ChartView::BigNumber => render_big_number(f, view, bpm, average, &app.extremes),
        ChartView::Dashboard => render_gauge(f, view, bpm, average),
        ChartView::Trend => {
            let block = Block::bordered().title("Session Trend".red().bold());
            render_trend_chart(f, view, &mut app.trend_chart, block);
        }
    }
}
