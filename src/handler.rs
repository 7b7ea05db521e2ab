use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::debug;

use crate::app::{App, AppState, ChartView};
use crate::heart_rate::transport::Transport;
use crate::AppResult;

/// Handles the key events and updates the state of [`App`].
pub fn handle_key_events<T: Transport>(app: &mut App<T>, key_event: KeyEvent) -> AppResult<()> {
    if key_event.modifiers == KeyModifiers::CONTROL
        && matches!(key_event.code, KeyCode::Char('c') | KeyCode::Char('C'))
    {
        app.cancel_app.cancel();
        return Ok(());
    }
    // Any key dismisses a notification
    if app.error_message.is_some() {
        app.dismiss_popup();
        return Ok(());
    }

    match (app.state, key_event.code) {
        (_, KeyCode::Char('q')) => {
            app.cancel_app.cancel();
        }
        (AppState::DeviceSelection, KeyCode::Char('s')) => {
            debug!("(S) Rescanning");
            app.start_scan();
        }
        (AppState::DeviceSelection, KeyCode::Enter) => {
            app.connect_selected();
        }
        (AppState::DeviceSelection, KeyCode::Down | KeyCode::Char('j')) => {
            app.scroll_down();
        }
        (AppState::DeviceSelection, KeyCode::Up | KeyCode::Char('k')) => {
            app.scroll_up();
        }
        (AppState::Monitoring, KeyCode::Tab) => {
            app.next_view();
        }
        (AppState::Monitoring, KeyCode::Char(c @ '1'..='4')) => {
            let index = c as usize - '1' as usize;
            app.select_view(ChartView::ALL[index]);
        }
        (AppState::Monitoring, KeyCode::Char('a')) => {
            app.toggle_auto_range();
        }
        (AppState::Monitoring | AppState::Connecting, KeyCode::Char('d')) => {
            app.disconnect();
        }
        // Other handlers you could add here.
        _ => {}
    }
    Ok(())
}
