use std::path::PathBuf;
use std::sync::Arc;

use ratatui::widgets::TableState;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::args::TopLevelCmd;
use crate::chart::{ScrollingChart, TrendChart, TICK_INTERVAL};
use crate::chart::stats::SessionExtremes;
use crate::heart_rate::dummy::DUMMY_DEVICE_ADDRESS;
use crate::heart_rate::session::{
    session_board, spawn_session, ConnectionState, DisconnectCause, SessionBoard, SessionError,
    SessionEvent, SessionHandle, SessionSnapshot, SessionStatus, SessionView,
};
use crate::heart_rate::transport::{DeviceHandle, Transport};
use crate::heart_rate::HeartRateStatus;
use crate::scan::{scan_thread, DeviceUpdate};
use crate::settings::Settings;
use crate::sinks::{Publisher, Sinks};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorPopup {
    Fatal(String),
    Intermittent(String),
    UserMustDismiss(String),
}

impl ErrorPopup {
    pub fn detailed(message: &str, error: impl std::fmt::Display) -> Self {
        ErrorPopup::UserMustDismiss(format!("{message}\n{error}"))
    }
}

impl From<&SessionError> for ErrorPopup {
    fn from(error: &SessionError) -> Self {
        match error {
            SessionError::ConnectFailure(_)
            | SessionError::Timeout(_)
            | SessionError::UnsolicitedDisconnect => ErrorPopup::Intermittent(error.to_string()),
            SessionError::ScanFailure(_)
            | SessionError::CharacteristicNotFound
            | SessionError::MalformedPayload(_) => ErrorPopup::UserMustDismiss(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    DeviceSelection,
    Connecting,
    Monitoring,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartView {
    #[default]
    LineChart,
    BigNumber,
    Dashboard,
    Trend,
}

impl ChartView {
    pub const ALL: [ChartView; 4] = [
        ChartView::LineChart,
        ChartView::BigNumber,
        ChartView::Dashboard,
        ChartView::Trend,
    ];

    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|v| *v == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    pub fn title(self) -> &'static str {
        match self {
            ChartView::LineChart => "Live",
            ChartView::BigNumber => "Big Number",
            ChartView::Dashboard => "Dashboard",
            ChartView::Trend => "Trend",
        }
    }
}

pub enum AppUpdate {
    Session(SessionEvent),
    SessionClosed,
    Device(DeviceUpdate),
    ChartTick,
}

pub struct App<T: Transport> {
    pub state: AppState,
    pub view: ChartView,
    pub settings: Settings,
    pub config_path: PathBuf,
    no_save: bool,
    headless: bool,

    transport: Arc<T>,
    // Device to connect to as soon as a scan finds it
    auto_connect: Option<String>,
    pub discovered_devices: Vec<DeviceHandle>,
    pub table_state: TableState,
    pub is_scanning: bool,
    pub frame_count: usize,
    pub error_message: Option<ErrorPopup>,

    pub heart_rate_status: HeartRateStatus,
    pub extremes: SessionExtremes,
    pub line_chart: ScrollingChart,
    pub trend_chart: TrendChart,
    pub malformed_payloads: usize,

    board: SessionBoard,
    pub session_view: SessionView,
    session: Option<SessionHandle>,
    session_rx: Option<UnboundedReceiver<SessionEvent>>,
    device_tx: UnboundedSender<DeviceUpdate>,
    device_rx: UnboundedReceiver<DeviceUpdate>,
    chart_tick: Interval,
    sinks: Sinks,

    pub cancel_app: CancellationToken,
    cancel_scan: CancellationToken,
}

async fn recv_session(rx: &mut Option<UnboundedReceiver<SessionEvent>>) -> Option<SessionEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl<T: Transport> App<T> {
    pub fn build(
        arg_config: &TopLevelCmd,
        settings: Settings,
        config_path: PathBuf,
        transport: Arc<T>,
        parent_token: Option<CancellationToken>,
    ) -> Self {
        let cancel_app = parent_token.unwrap_or_default();
        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let (board, session_view) = session_board();

        let auto_connect = if arg_config.use_dummy() {
            Some(DUMMY_DEVICE_ADDRESS.to_owned())
        } else if settings.has_saved_device() {
            Some(settings.ble.saved_address.clone())
        } else {
            None
        };

        let mut chart_tick = interval(TICK_INTERVAL);
        chart_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            state: AppState::DeviceSelection,
            view: ChartView::default(),
            no_save: arg_config.no_save,
            headless: arg_config.headless,
            transport,
            auto_connect,
            discovered_devices: Vec::new(),
            table_state: TableState::default(),
            is_scanning: false,
            frame_count: 0,
            error_message: None,
            heart_rate_status: HeartRateStatus::default(),
            extremes: SessionExtremes::default(),
            line_chart: ScrollingChart::new(session_view.clone(), 0.0, 0.0),
            trend_chart: TrendChart::new(session_view.clone(), 0.0, 0.0),
            malformed_payloads: 0,
            board,
            session_view,
            session: None,
            session_rx: None,
            device_tx,
            device_rx,
            chart_tick,
            sinks: Sinks::new(cancel_app.child_token()),
            cancel_scan: cancel_app.child_token(),
            cancel_app,
            settings,
            config_path,
        }
    }

    pub async fn init(&mut self) {
        for e in self
            .sinks
            .start(&self.settings.http, &self.settings.snapshot)
            .await
        {
            self.error_message = Some(ErrorPopup::detailed("Failed to start output.", e));
        }
        self.start_scan();
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_idle_on_device_selection(&self) -> bool {
        self.state == AppState::DeviceSelection && self.error_message.is_none()
    }

    pub fn start_scan(&mut self) {
        if self.is_scanning || self.has_session() {
            return;
        }
        self.is_scanning = true;
        // No session owns the board while discovering
        self.board.send_replace(SessionSnapshot {
            device: None,
            state: ConnectionState::Scanning,
        });
        self.cancel_scan = self.cancel_app.child_token();
        tokio::spawn(scan_thread(
            Arc::clone(&self.transport),
            self.settings.ble.scan_duration(),
            self.settings.ble.only_heart_rate_devices,
            self.device_tx.clone(),
            self.cancel_scan.clone(),
        ));
    }

    pub fn connect_selected(&mut self) {
        let Some(device) = self
            .table_state
            .selected()
            .and_then(|i| self.discovered_devices.get(i))
            .cloned()
        else {
            return;
        };
        self.connect(device);
    }

    pub fn connect(&mut self, device: DeviceHandle) {
        if self.has_session() {
            warn!("Already connected, ignoring connect to {device}");
            return;
        }
        self.cancel_scan.cancel();
        self.is_scanning = false;

        self.line_chart.reset();
        self.trend_chart.reset();
        self.extremes.reset();
        self.heart_rate_status = HeartRateStatus::default();
        self.malformed_payloads = 0;

        let (session_tx, session_rx) = mpsc::unbounded_channel();
        self.session_rx = Some(session_rx);
        self.session = Some(spawn_session(
            Arc::clone(&self.transport),
            device,
            self.settings.ble.connect_timeout(),
            session_tx,
            Arc::clone(&self.board),
            self.cancel_app.child_token(),
        ));
        self.state = AppState::Connecting;
    }

    /// Asks the session to wind down. The UI leaves monitoring once it confirms.
    pub fn disconnect(&mut self) {
        if let Some(session) = &self.session {
            info!("Disconnecting from {}", session.device());
            session.request_stop();
            self.state = AppState::Disconnecting;
            // Don't jump straight back into the device we just left
            self.auto_connect = None;
        }
    }

    pub fn toggle_auto_range(&mut self) {
        let enabled = !self.line_chart.auto_range();
        self.line_chart.set_auto_range(enabled);
        self.trend_chart.set_auto_range(enabled);
        info!("Auto-ranging {}", if enabled { "on" } else { "off" });
    }

    pub fn select_view(&mut self, view: ChartView) {
        self.view = view;
    }

    pub fn next_view(&mut self) {
        self.view = self.view.next();
    }

    pub fn scroll_down(&mut self) {
        if self.discovered_devices.is_empty() {
            return;
        }
        let next = match self.table_state.selected() {
            Some(i) if i + 1 < self.discovered_devices.len() => i + 1,
            Some(_) => 0,
            None => 0,
        };
        self.table_state.select(Some(next));
    }

    pub fn scroll_up(&mut self) {
        if self.discovered_devices.is_empty() {
            return;
        }
        let last = self.discovered_devices.len() - 1;
        let prev = match self.table_state.selected() {
            Some(0) | None => last,
            Some(i) => i - 1,
        };
        self.table_state.select(Some(prev));
    }

    pub fn dismiss_popup(&mut self) {
        if let Some(ErrorPopup::Fatal(_)) = self.error_message.take() {
            self.cancel_app.cancel();
        }
    }

    // Only used for the terminal's spinners
    pub fn term_tick(&mut self) {
        self.frame_count = self.frame_count.wrapping_add(1);
    }

    pub async fn app_receivers(&mut self) -> AppUpdate {
        tokio::select! {
            event = recv_session(&mut self.session_rx) => match event {
                Some(event) => AppUpdate::Session(event),
                None => AppUpdate::SessionClosed,
            },
            Some(update) = self.device_rx.recv() => AppUpdate::Device(update),
            _ = self.chart_tick.tick() => AppUpdate::ChartTick,
        }
    }

    pub async fn app_handlers(&mut self, update: AppUpdate) {
        match update {
            AppUpdate::Session(event) => self.handle_session_event(event),
            AppUpdate::SessionClosed => self.session_closed().await,
            AppUpdate::Device(update) => self.handle_device_update(update),
            AppUpdate::ChartTick => {
                self.line_chart.tick();
                self.trend_chart.tick();
            }
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Sample(status) => self.accept_sample(status),
            SessionEvent::Status(status) => {
                debug!("Session status: {status:?}");
                match status {
                    SessionStatus::Monitoring => {
                        self.state = AppState::Monitoring;
                        self.remember_device();
                    }
                    SessionStatus::Disconnected(cause) => self.session_ended(cause),
                    SessionStatus::Connecting
                    | SessionStatus::Connected
                    | SessionStatus::Searching => {}
                }
            }
            SessionEvent::Error(SessionError::MalformedPayload(e)) => {
                self.malformed_payloads += 1;
                debug!("Ignoring malformed payload #{}: {e}", self.malformed_payloads);
            }
            SessionEvent::Error(e) => {
                error!("Session error: {e}");
                // Retrying is up to the user from here on
                self.auto_connect = None;
                self.error_message = Some(ErrorPopup::from(&e));
                self.state = AppState::DeviceSelection;
                self.sinks.publish(0);
            }
        }
    }

    fn accept_sample(&mut self, status: HeartRateStatus) {
        let bpm = status.heart_rate_bpm;
        self.extremes.record(bpm);
        self.line_chart.add_value(bpm);
        self.trend_chart.add_value(bpm);
        self.sinks.publish(bpm);
        self.heart_rate_status = status;
    }

    fn session_ended(&mut self, cause: DisconnectCause) {
        info!("Session ended: {cause:?}");
        if cause == DisconnectCause::Transport {
            self.error_message = Some(ErrorPopup::from(&SessionError::UnsolicitedDisconnect));
            // Back to device selection, no automatic reconnect
            self.auto_connect = None;
        }
        self.state = AppState::DeviceSelection;
        self.sinks.publish(0);
    }

    async fn session_closed(&mut self) {
        self.session_rx = None;
        if let Some(session) = self.session.take() {
            session.join().await;
        }
        self.state = AppState::DeviceSelection;
        if self.headless {
            info!("Session over, nothing left to do headless");
            self.cancel_app.cancel();
        } else if !self.cancel_app.is_cancelled() {
            self.start_scan();
        }
    }

    fn handle_device_update(&mut self, update: DeviceUpdate) {
        self.is_scanning = false;
        if !self.has_session() {
            self.board
                .send_modify(|snapshot| snapshot.state = ConnectionState::Idle);
        }
        match update {
            DeviceUpdate::Discovered(devices) => {
                let target = self
                    .auto_connect
                    .as_ref()
                    .and_then(|address| devices.iter().find(|d| &d.address == address))
                    .cloned();
                self.discovered_devices = devices;
                if self.table_state.selected().is_none() && !self.discovered_devices.is_empty() {
                    self.table_state.select(Some(0));
                }
                if let Some(device) = target {
                    info!("Found saved device {device}, connecting");
                    self.connect(device);
                } else if self.headless && !self.cancel_app.is_cancelled() {
                    // Keep looking until the saved device shows up
                    self.start_scan();
                }
            }
            DeviceUpdate::Error(e) => {
                self.error_message = Some(ErrorPopup::from(&e));
                if self.headless {
                    self.cancel_app.cancel();
                }
            }
        }
    }

    fn remember_device(&mut self) {
        let Some(device) = self.session.as_ref().map(|s| s.device().clone()) else {
            return;
        };
        if device.address == DUMMY_DEVICE_ADDRESS
            || device.address == self.settings.ble.saved_address
        {
            return;
        }
        self.settings.ble.saved_address = device.address.clone();
        self.settings.ble.saved_name = device.display_name().to_owned();
        self.save_settings();
    }

    pub fn save_settings(&mut self) {
        if self.no_save {
            return;
        }
        if let Err(e) = self.settings.save(&self.config_path) {
            error!("Failed to save settings: {e}");
            self.error_message = Some(ErrorPopup::detailed("Failed to save settings.", e));
        }
    }

    pub async fn join_threads(&mut self) {
        self.cancel_scan.cancel();
        if let Some(session) = self.session.take() {
            session.request_stop();
            session.join().await;
        }
        self.sinks.publish(0);
        let sinks = std::mem::replace(&mut self.sinks, Sinks::new(CancellationToken::new()));
        sinks.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heart_rate::dummy::{dummy_device, DummyTransport};
    use crate::heart_rate::measurement::ParseError;
    use crate::settings::DummySettings;

    fn app() -> App<DummyTransport> {
        app_with(DummySettings::default())
    }

    fn app_with(dummy: DummySettings) -> App<DummyTransport> {
        let args = TopLevelCmd {
            no_save: true,
            subcommands: Some(crate::args::SubCommands::Dummy(crate::args::DummyCmd {})),
            ..Default::default()
        };
        App::build(
            &args,
            Settings::default(),
            PathBuf::from("unused.toml"),
            Arc::new(DummyTransport::new(dummy)),
            None,
        )
    }

    async fn pump_while(
        app: &mut App<DummyTransport>,
        mut busy: impl FnMut(&App<DummyTransport>) -> bool,
    ) {
        while busy(app) {
            let update = app.app_receivers().await;
            app.app_handlers(update).await;
        }
    }

    fn sample(bpm: u16) -> SessionEvent {
        SessionEvent::Sample(HeartRateStatus {
            heart_rate_bpm: bpm,
            ..Default::default()
        })
    }

    #[test]
    fn views_cycle() {
        let mut view = ChartView::LineChart;
        for expected in [
            ChartView::BigNumber,
            ChartView::Dashboard,
            ChartView::Trend,
            ChartView::LineChart,
        ] {
            view = view.next();
            assert_eq!(view, expected);
        }
    }

    #[test]
    fn popups_by_severity() {
        assert!(matches!(
            ErrorPopup::from(&SessionError::CharacteristicNotFound),
            ErrorPopup::UserMustDismiss(_)
        ));
        assert!(matches!(
            ErrorPopup::from(&SessionError::Timeout(std::time::Duration::from_secs(10))),
            ErrorPopup::Intermittent(_)
        ));
    }

    #[tokio::test]
    async fn samples_feed_every_consumer() {
        let mut app = app();
        for bpm in [70, 0, 72, 75, 74, 76] {
            app.handle_session_event(sample(bpm));
        }
        assert_eq!(app.heart_rate_status.heart_rate_bpm, 76);
        assert_eq!(app.extremes.highest(), 76);
        assert_eq!(app.extremes.lowest(), Some(70));
        assert_eq!(app.trend_chart.series().samples(), 6);
        assert_eq!(app.sinks.latest(), 76);
    }

    #[tokio::test]
    async fn malformed_payloads_stay_quiet() {
        let mut app = app();
        app.state = AppState::Monitoring;
        app.handle_session_event(SessionEvent::Error(SessionError::MalformedPayload(
            ParseError::Empty,
        )));
        assert_eq!(app.malformed_payloads, 1);
        assert_eq!(app.error_message, None);
        assert_eq!(app.state, AppState::Monitoring);
    }

    #[tokio::test]
    async fn device_drop_notifies_once_and_resets_outputs() {
        let mut app = app();
        app.state = AppState::Monitoring;
        app.handle_session_event(sample(88));
        app.handle_session_event(SessionEvent::Status(SessionStatus::Disconnected(
            DisconnectCause::Transport,
        )));
        assert!(matches!(app.error_message, Some(ErrorPopup::Intermittent(_))));
        assert_eq!(app.state, AppState::DeviceSelection);
        assert_eq!(app.sinks.latest(), 0);
    }

    #[tokio::test]
    async fn user_disconnect_has_no_popup() {
        let mut app = app();
        app.state = AppState::Monitoring;
        app.handle_session_event(SessionEvent::Status(SessionStatus::Disconnected(
            DisconnectCause::UserRequested,
        )));
        assert_eq!(app.error_message, None);
        assert_eq!(app.state, AppState::DeviceSelection);
    }

    #[tokio::test(start_paused = true)]
    async fn device_drop_does_not_reconnect() {
        let mut app = app_with(DummySettings {
            low_bpm: 60,
            high_bpm: 62,
            bpm_speed: 10.0,
            loops_before_dc: 1,
        });
        app.handle_device_update(DeviceUpdate::Discovered(vec![dummy_device()]));
        assert!(app.has_session());

        pump_while(&mut app, |app| app.has_session()).await;
        assert!(matches!(app.error_message, Some(ErrorPopup::Intermittent(_))));
        assert_eq!(app.state, AppState::DeviceSelection);

        // The rescan after the drop finds the same device again
        assert!(app.is_scanning);
        pump_while(&mut app, |app| app.is_scanning).await;
        assert_eq!(app.discovered_devices, vec![dummy_device()]);
        assert!(!app.has_session());
        assert_eq!(app.state, AppState::DeviceSelection);
    }

    #[tokio::test]
    async fn session_errors_stop_auto_connect() {
        let mut app = app();
        assert!(app.auto_connect.is_some());
        app.handle_session_event(SessionEvent::Error(SessionError::Timeout(
            std::time::Duration::from_secs(10),
        )));
        assert_eq!(app.auto_connect, None);
        assert!(matches!(app.error_message, Some(ErrorPopup::Intermittent(_))));

        app.handle_device_update(DeviceUpdate::Discovered(vec![dummy_device()]));
        assert!(!app.has_session());
    }

    #[tokio::test(start_paused = true)]
    async fn scanning_shows_on_the_board() {
        let mut app = app();
        app.auto_connect = None;
        app.start_scan();
        assert_eq!(app.session_view.state(), ConnectionState::Scanning);
        let update = app.device_rx.recv().await.unwrap();
        app.handle_device_update(update);
        assert_eq!(app.session_view.state(), ConnectionState::Idle);
        assert_eq!(app.discovered_devices, vec![dummy_device()]);
        assert_eq!(app.table_state.selected(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn scan_auto_connects_to_dummy() {
        let mut app = app();
        app.handle_device_update(DeviceUpdate::Discovered(vec![dummy_device()]));
        assert_eq!(app.state, AppState::Connecting);
        assert!(app.has_session());

        // Wait for the session to start monitoring
        while app.state != AppState::Monitoring {
            let update = app.app_receivers().await;
            app.app_handlers(update).await;
        }
        app.disconnect();
        assert_eq!(app.state, AppState::Disconnecting);
        while app.has_session() {
            let update = app.app_receivers().await;
            app.app_handlers(update).await;
        }
        assert_eq!(app.error_message, None);
        app.join_threads().await;
    }
}
