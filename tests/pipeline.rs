use std::sync::Arc;
use std::time::Duration;

use heartline::chart::{DrawCommand, ScrollingChart, TrendChart, TICK_INTERVAL};
use heartline::heart_rate::dummy::{dummy_device, DummyTransport};
use heartline::heart_rate::session::{
    session_board, spawn_session, ConnectionState, DisconnectCause, SessionEvent, SessionStatus,
};
use heartline::settings::DummySettings;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn settings(loops_before_dc: u16) -> DummySettings {
    DummySettings {
        low_bpm: 60,
        high_bpm: 80,
        bpm_speed: 4.0,
        loops_before_dc,
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn dummy_session_drives_charts() {
    let (board, view) = session_board();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel_token = CancellationToken::new();
    let session = spawn_session(
        Arc::new(DummyTransport::new(settings(0))),
        dummy_device(),
        Duration::from_secs(2),
        tx,
        board,
        cancel_token.clone(),
    );

    let mut line = ScrollingChart::new(view.clone(), 200.0, 100.0);
    let mut trend = TrendChart::new(view.clone(), 200.0, 100.0);
    let mut tick = tokio::time::interval(TICK_INTERVAL);
    let mut samples = 0;

    while samples < 30 {
        tokio::select! {
            Some(event) = rx.recv() => {
                if let SessionEvent::Sample(status) = event {
                    line.add_value(status.heart_rate_bpm);
                    trend.add_value(status.heart_rate_bpm);
                    samples += 1;
                }
            }
            _ = tick.tick() => {
                line.tick();
                trend.tick();
            }
        }
    }

    assert_eq!(view.state(), ConnectionState::Subscribed);
    assert_eq!(line.device_name().as_deref(), Some("Dummy Heart Rate Monitor"));
    assert_eq!(trend.series().samples(), 30);
    assert!(line.average() >= 60.0 && line.average() <= 80.0);
    // Quiet 60-80 range pulls the axis down from its resting max
    assert!(line.axis_max() < 200.0);

    let commands = line.draw(2.0);
    assert!(commands
        .iter()
        .any(|c| matches!(c, DrawCommand::Polyline(points) if !points.is_empty())));
    assert!(commands
        .iter()
        .any(|c| matches!(c, DrawCommand::Label { text, .. } if text.starts_with("avg "))));

    session.request_stop();
    let mut statuses = Vec::new();
    while let Some(event) = rx.recv().await {
        if let SessionEvent::Status(status) = event {
            statuses.push(status);
        }
    }
    session.join().await;
    assert_eq!(
        statuses.last(),
        Some(&SessionStatus::Disconnected(DisconnectCause::UserRequested))
    );
    assert_eq!(view.state(), ConnectionState::Disconnected);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn device_drop_reports_once() {
    let (board, view) = session_board();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = spawn_session(
        Arc::new(DummyTransport::new(settings(1))),
        dummy_device(),
        Duration::from_secs(2),
        tx,
        board,
        CancellationToken::new(),
    );

    let mut samples = 0;
    let mut disconnects = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Sample(_) => samples += 1,
            SessionEvent::Status(SessionStatus::Disconnected(cause)) => disconnects.push(cause),
            _ => {}
        }
    }
    session.join().await;

    // 60 up to 80 once, then the simulated device goes away
    assert_eq!(samples, 21);
    assert_eq!(disconnects, vec![DisconnectCause::Transport]);
    assert_eq!(view.state(), ConnectionState::Disconnected);
}
