//! One device connection, end to end.
//!
//! A [`BleSession`] runs on its own task. It connects, finds and subscribes to the
//! Heart Rate Measurement characteristic, and relays parsed samples to the UI side
//! over a channel. Stopping is cooperative: the owner cancels the session's token,
//! and the session unsubscribes and disconnects by itself before finishing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::measurement::{parse_hrm, ParseError};
use super::transport::{
    CharacteristicHandle, Connection, DeviceHandle, NotificationStream, Transport,
    TransportError, HEART_RATE_MEASUREMENT,
};
use super::HeartRateStatus;
use crate::emit;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Subscribed,
    Disconnecting,
    Disconnected,
    Errored,
}

impl ConnectionState {
    /// Transitions a single session instance is allowed to make.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Subscribed | Errored | Disconnecting)
                | (Subscribed, Disconnecting | Disconnected)
                | (Disconnecting, Disconnected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Errored)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Scanning => "Scanning",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Subscribed => "Monitoring",
            ConnectionState::Disconnecting => "Disconnecting",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Errored => "Error",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    UserRequested,
    Transport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Connected,
    Searching,
    Monitoring,
    Disconnected(DisconnectCause),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Scan failed: {0}")]
    ScanFailure(TransportError),
    #[error("BLE Connection error: {0}")]
    ConnectFailure(TransportError),
    #[error("Connection timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
    #[error("Unsupported device: no Heart Rate Measurement characteristic found")]
    CharacteristicNotFound,
    #[error("Malformed heart rate payload: {0}")]
    MalformedPayload(#[from] ParseError),
    #[error("Device disconnected! You can scan again or pick another device.")]
    UnsolicitedDisconnect,
}

#[derive(Debug)]
pub enum SessionEvent {
    Sample(HeartRateStatus),
    Status(SessionStatus),
    Error(SessionError),
}

impl From<HeartRateStatus> for SessionEvent {
    fn from(status: HeartRateStatus) -> Self {
        SessionEvent::Sample(status)
    }
}

impl From<SessionStatus> for SessionEvent {
    fn from(status: SessionStatus) -> Self {
        SessionEvent::Status(status)
    }
}

impl From<SessionError> for SessionEvent {
    fn from(error: SessionError) -> Self {
        SessionEvent::Error(error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub device: Option<DeviceHandle>,
    pub state: ConnectionState,
}

/// Written by whichever session is active, read through [`SessionView`]s.
pub type SessionBoard = Arc<watch::Sender<SessionSnapshot>>;

pub fn session_board() -> (SessionBoard, SessionView) {
    let (tx, rx) = watch::channel(SessionSnapshot::default());
    (Arc::new(tx), SessionView { rx })
}

/// Read-only look at the current device and connection state.
#[derive(Debug, Clone)]
pub struct SessionView {
    rx: watch::Receiver<SessionSnapshot>,
}

impl SessionView {
    pub fn state(&self) -> ConnectionState {
        self.rx.borrow().state
    }

    pub fn device_name(&self) -> Option<String> {
        self.rx
            .borrow()
            .device
            .as_ref()
            .map(|d| d.display_name().to_owned())
    }
}

pub struct BleSession<T: Transport> {
    transport: Arc<T>,
    device: DeviceHandle,
    connect_timeout: Duration,
    events: UnboundedSender<SessionEvent>,
    board: SessionBoard,
    cancel_token: CancellationToken,

    state: ConnectionState,
    connection: Option<T::Connection>,
    subscribed: Option<CharacteristicHandle>,
    malformed_count: usize,
}

impl<T: Transport> BleSession<T> {
    pub fn new(
        transport: Arc<T>,
        device: DeviceHandle,
        connect_timeout: Duration,
        events: UnboundedSender<SessionEvent>,
        board: SessionBoard,
        cancel_token: CancellationToken,
    ) -> Self {
        board.send_replace(SessionSnapshot {
            device: Some(device.clone()),
            state: ConnectionState::Idle,
        });
        Self {
            transport,
            device,
            connect_timeout,
            events,
            board,
            cancel_token,
            state: ConnectionState::Idle,
            connection: None,
            subscribed: None,
            malformed_count: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Moves to `next` if the state machine allows it. Illegal transitions are
    /// refused and leave the state untouched.
    fn set_state(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_transition_to(next) {
            error!("Refusing session transition: {:?} -> {:?}", self.state, next);
            return false;
        }
        debug!("Session state: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.board.send_modify(|snapshot| snapshot.state = next);
        true
    }

    /// Connects and subscribes to heart rate notifications.
    ///
    /// When the device lacks the characteristic, the connection is left open
    /// (but unsubscribed) and must still be closed by the caller.
    pub async fn connect(&mut self) -> Result<NotificationStream, SessionError> {
        self.set_state(ConnectionState::Connecting);
        emit!(self.events, SessionStatus::Connecting);
        info!(
            "Connecting to Heart Rate Monitor! Name: {:?} | Address: {:?}",
            self.device.name, self.device.address
        );

        // Bounded here too, whatever the transport does with the timeout
        let connection = tokio::time::timeout(
            self.connect_timeout,
            self.transport.connect(&self.device, self.connect_timeout),
        )
        .await
        .map_err(|_| SessionError::Timeout(self.connect_timeout))?
        .map_err(|e| match e {
            TransportError::Timeout(after) => SessionError::Timeout(after),
            other => SessionError::ConnectFailure(other),
        })?;
        emit!(self.events, SessionStatus::Connected);

        let connection = self.connection.insert(connection);
        emit!(self.events, SessionStatus::Searching);
        let characteristic = connection
            .find_characteristic(HEART_RATE_MEASUREMENT)
            .ok_or(SessionError::CharacteristicNotFound)?;

        let stream = connection
            .subscribe(&characteristic)
            .await
            .map_err(SessionError::ConnectFailure)?;
        self.subscribed = Some(characteristic);
        self.set_state(ConnectionState::Subscribed);
        emit!(self.events, SessionStatus::Monitoring);
        info!("Subscribed to heart rate notifications");

        Ok(stream)
    }

    /// Drives the whole session. Returns once the connection is torn down.
    pub async fn run(mut self) {
        let stream = match self.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail(e).await;
                return;
            }
        };

        // Connects aren't interrupted, but a stop requested meanwhile still counts
        let cause = if self.cancel_token.is_cancelled() {
            DisconnectCause::UserRequested
        } else {
            self.listen(stream).await
        };
        self.teardown(cause).await;
    }

    async fn listen(&mut self, mut stream: NotificationStream) -> DisconnectCause {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    info!("Stop requested, leaving notification loop");
                    return DisconnectCause::UserRequested;
                }
                payload = stream.next() => {
                    match payload {
                        Some(payload) => self.handle_payload(&payload),
                        None => {
                            warn!("Heart Rate Monitor stream closed by the device");
                            return DisconnectCause::Transport;
                        }
                    }
                }
            }
        }
    }

    fn handle_payload(&mut self, payload: &[u8]) {
        match parse_hrm(payload) {
            Ok(measurement) => {
                let status = HeartRateStatus {
                    heart_rate_bpm: measurement.bpm,
                    rr_intervals: measurement.rr_intervals,
                    timestamp: chrono::Local::now(),
                };
                emit!(self.events, status);
            }
            Err(e) => {
                self.malformed_count += 1;
                debug!(
                    "Dropping payload {payload:02X?} ({e}), {} so far",
                    self.malformed_count
                );
                emit!(self.events, SessionError::MalformedPayload(e));
            }
        }
    }

    async fn teardown(&mut self, cause: DisconnectCause) {
        if cause == DisconnectCause::UserRequested {
            self.set_state(ConnectionState::Disconnecting);
        }
        if let Some(mut connection) = self.connection.take() {
            if let Some(characteristic) = self.subscribed.take() {
                if cause == DisconnectCause::UserRequested {
                    if let Err(e) = connection.unsubscribe(&characteristic).await {
                        warn!("Failed to unsubscribe: {e}");
                    }
                }
            }
            if let Err(e) = connection.close().await {
                warn!("Failed to close connection: {e}");
            }
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Session with {} ended ({cause:?})", self.device);
        emit!(self.events, SessionStatus::Disconnected(cause));
    }

    async fn fail(&mut self, e: SessionError) {
        error!("Session failed: {e}");
        // Only reachable with an open connection when the characteristic was missing
        // or the subscription failed
        if let Some(mut connection) = self.connection.take() {
            if let Err(close_err) = connection.close().await {
                warn!("Failed to close connection after error: {close_err}");
            }
        }
        self.set_state(ConnectionState::Errored);
        emit!(self.events, e);
    }
}

/// Owner's side of a running session.
pub struct SessionHandle {
    device: DeviceHandle,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Asks the session to wind down. Doesn't wait, and never touches the
    /// connection from this side.
    pub fn request_stop(&self) {
        self.cancel_token.cancel();
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the session to finish its own cleanup.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Session task for {} failed: {e}", self.device);
        }
    }
}

pub fn spawn_session<T: Transport>(
    transport: Arc<T>,
    device: DeviceHandle,
    connect_timeout: Duration,
    events: UnboundedSender<SessionEvent>,
    board: SessionBoard,
    cancel_token: CancellationToken,
) -> SessionHandle {
    let session = BleSession::new(
        transport,
        device.clone(),
        connect_timeout,
        events,
        board,
        cancel_token.clone(),
    );
    let task = tokio::spawn(session.run());
    SessionHandle {
        device,
        cancel_token,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heart_rate::transport::HEART_RATE_MEASUREMENT_CHARACTERISTIC_UUID;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Clone, Copy)]
    enum Outcome {
        Connects { has_hrm: bool },
        TimesOut,
        Stalls,
    }

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    struct ScriptedTransport {
        outcome: Outcome,
        payloads: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
        log: CallLog,
    }

    struct ScriptedConnection {
        has_hrm: bool,
        payloads: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
        log: CallLog,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        type Connection = ScriptedConnection;

        async fn discover(
            &self,
            _: Duration,
            _: &CancellationToken,
        ) -> Result<Vec<DeviceHandle>, TransportError> {
            Ok(vec![device()])
        }

        async fn connect(
            &self,
            _: &DeviceHandle,
            timeout: Duration,
        ) -> Result<ScriptedConnection, TransportError> {
            self.log.lock().unwrap().push("connect");
            match self.outcome {
                Outcome::TimesOut => Err(TransportError::Timeout(timeout)),
                Outcome::Stalls => std::future::pending().await,
                Outcome::Connects { has_hrm } => Ok(ScriptedConnection {
                    has_hrm,
                    payloads: self.payloads.lock().unwrap().take(),
                    log: self.log.clone(),
                }),
            }
        }
    }

    #[async_trait]
    impl Connection for ScriptedConnection {
        fn find_characteristic(&self, description: &str) -> Option<CharacteristicHandle> {
            self.has_hrm.then(|| CharacteristicHandle {
                uuid: HEART_RATE_MEASUREMENT_CHARACTERISTIC_UUID,
                service: uuid::Uuid::nil(),
                description: description.to_owned(),
            })
        }

        async fn subscribe(
            &mut self,
            _: &CharacteristicHandle,
        ) -> Result<NotificationStream, TransportError> {
            self.log.lock().unwrap().push("subscribe");
            let rx = self
                .payloads
                .take()
                .ok_or_else(|| TransportError::Other("already subscribed".into()))?;
            let stream = stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|payload| (payload, rx))
            });
            Ok(Box::pin(stream))
        }

        async fn unsubscribe(&mut self, _: &CharacteristicHandle) -> Result<(), TransportError> {
            self.log.lock().unwrap().push("unsubscribe");
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.log.lock().unwrap().push("close");
            Ok(())
        }
    }

    fn device() -> DeviceHandle {
        DeviceHandle {
            id: "test".into(),
            name: Some("Chest Strap".into()),
            address: "00:11:22:33:44:55".into(),
            rssi: Some(-50),
            advertises_heart_rate: true,
        }
    }

    struct Harness {
        handle: SessionHandle,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        payloads: mpsc::UnboundedSender<Vec<u8>>,
        view: SessionView,
        log: CallLog,
    }

    fn start(outcome: Outcome) -> Harness {
        let (payload_tx, payload_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (board, view) = session_board();
        let log = CallLog::default();
        let transport = Arc::new(ScriptedTransport {
            outcome,
            payloads: Mutex::new(Some(payload_rx)),
            log: log.clone(),
        });
        let handle = spawn_session(
            transport,
            device(),
            DEFAULT_CONNECT_TIMEOUT,
            event_tx,
            board,
            CancellationToken::new(),
        );
        Harness {
            handle,
            events: event_rx,
            payloads: payload_tx,
            view,
            log,
        }
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    fn statuses(events: &[SessionEvent]) -> Vec<SessionStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Status(status) => Some(status.clone()),
                _ => None,
            })
            .collect()
    }

    async fn wait_for_monitoring(events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            if matches!(event, SessionEvent::Status(SessionStatus::Monitoring)) {
                return;
            }
        }
        panic!("session never started monitoring");
    }

    #[test_log::test(tokio::test)]
    async fn device_drop_ends_session_with_one_notice() {
        let mut harness = start(Outcome::Connects { has_hrm: true });
        harness.payloads.send(vec![0x06, 72]).unwrap();
        drop(harness.payloads);
        harness.handle.join().await;

        let events = drain(&mut harness.events);
        assert_eq!(
            statuses(&events),
            vec![
                SessionStatus::Connecting,
                SessionStatus::Connected,
                SessionStatus::Searching,
                SessionStatus::Monitoring,
                SessionStatus::Disconnected(DisconnectCause::Transport),
            ]
        );
        let samples: Vec<u16> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Sample(s) => Some(s.heart_rate_bpm),
                _ => None,
            })
            .collect();
        assert_eq!(samples, vec![72]);
        assert_eq!(harness.view.state(), ConnectionState::Disconnected);
        // No reconnect attempt, and nothing to unsubscribe from a vanished device
        assert_eq!(
            *harness.log.lock().unwrap(),
            vec!["connect", "subscribe", "close"]
        );
    }

    #[test_log::test(tokio::test)]
    async fn stop_request_unsubscribes_then_closes() {
        let mut harness = start(Outcome::Connects { has_hrm: true });
        wait_for_monitoring(&mut harness.events).await;
        assert_eq!(harness.view.state(), ConnectionState::Subscribed);
        assert_eq!(harness.view.device_name().as_deref(), Some("Chest Strap"));

        harness.handle.request_stop();
        harness.handle.join().await;

        let events = drain(&mut harness.events);
        assert_eq!(
            statuses(&events),
            vec![SessionStatus::Disconnected(DisconnectCause::UserRequested)]
        );
        assert_eq!(
            *harness.log.lock().unwrap(),
            vec!["connect", "subscribe", "unsubscribe", "close"]
        );
        assert_eq!(harness.view.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn malformed_payloads_are_reported_and_skipped() {
        let mut harness = start(Outcome::Connects { has_hrm: true });
        harness.payloads.send(vec![]).unwrap();
        harness.payloads.send(vec![0x01, 0x48]).unwrap();
        harness.payloads.send(vec![0x00, 90]).unwrap();
        wait_for_monitoring(&mut harness.events).await;

        let mut malformed = 0;
        loop {
            match harness.events.recv().await {
                Some(SessionEvent::Error(SessionError::MalformedPayload(_))) => malformed += 1,
                Some(SessionEvent::Sample(sample)) => {
                    assert_eq!(sample.heart_rate_bpm, 90);
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(malformed, 2);
        assert_eq!(harness.view.state(), ConnectionState::Subscribed);

        harness.handle.request_stop();
        harness.handle.join().await;
    }

    #[tokio::test]
    async fn missing_characteristic_closes_and_errors() {
        let mut harness = start(Outcome::Connects { has_hrm: false });
        harness.handle.join().await;

        let events = drain(&mut harness.events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Error(SessionError::CharacteristicNotFound)
        )));
        assert!(!statuses(&events).contains(&SessionStatus::Monitoring));
        assert_eq!(harness.view.state(), ConnectionState::Errored);
        assert_eq!(*harness.log.lock().unwrap(), vec!["connect", "close"]);
    }

    #[tokio::test]
    async fn connect_timeout_is_reported() {
        let mut harness = start(Outcome::TimesOut);
        harness.handle.join().await;

        let events = drain(&mut harness.events);
        let error = events.iter().find_map(|e| match e {
            SessionEvent::Error(error) => Some(error),
            _ => None,
        });
        assert!(matches!(error, Some(SessionError::Timeout(d)) if *d == DEFAULT_CONNECT_TIMEOUT));
        assert_eq!(harness.view.state(), ConnectionState::Errored);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn stalled_connect_is_bounded() {
        let started = tokio::time::Instant::now();
        let mut harness = start(Outcome::Stalls);
        harness.handle.join().await;

        let elapsed = started.elapsed();
        assert!(elapsed >= DEFAULT_CONNECT_TIMEOUT && elapsed < DEFAULT_CONNECT_TIMEOUT * 2);
        let events = drain(&mut harness.events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Error(SessionError::Timeout(d)) if *d == DEFAULT_CONNECT_TIMEOUT
        )));
        assert_eq!(harness.view.state(), ConnectionState::Errored);
        assert_eq!(*harness.log.lock().unwrap(), vec!["connect"]);
    }

    #[tokio::test]
    async fn illegal_transitions_are_refused() {
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let (board, view) = session_board();
        let transport = Arc::new(ScriptedTransport {
            outcome: Outcome::TimesOut,
            payloads: Mutex::new(None),
            log: CallLog::default(),
        });
        let mut session = BleSession::new(
            transport,
            device(),
            DEFAULT_CONNECT_TIMEOUT,
            event_tx,
            board,
            CancellationToken::new(),
        );

        assert!(!session.set_state(ConnectionState::Subscribed));
        assert_eq!(session.state(), ConnectionState::Idle);
        assert_eq!(view.state(), ConnectionState::Idle);

        assert!(session.set_state(ConnectionState::Connecting));
        assert!(session.set_state(ConnectionState::Errored));
        assert!(!session.set_state(ConnectionState::Connecting));
        assert_eq!(view.state(), ConnectionState::Errored);
    }

    #[test]
    fn terminal_states_do_not_transition() {
        use ConnectionState::*;
        for terminal in [Disconnected, Errored] {
            assert!(terminal.is_terminal());
            for next in [Idle, Connecting, Subscribed, Disconnecting] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(Subscribed.can_transition_to(Disconnected));
        assert!(!Idle.can_transition_to(Subscribed));
    }
}
